#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    #[error("Swap quota exceeded while publishing a new repository snapshot")]
    SwapQuotaExceeded,
}
