use core::any::TypeId;

/// Failure produced by a factory or constructor while building an instance.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error("Incorrect argument value for constructor parameter. Actual: {actual:?}, expected: {expected:?}")]
    IncorrectArgument { expected: TypeId, actual: TypeId },
    #[error("Constructor expected another argument, but the argument list is exhausted")]
    MissingArgument,
    #[error("Dependency value carries a different wrapper form than the constructor expects")]
    UnexpectedForm { expected: TypeId },
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}
