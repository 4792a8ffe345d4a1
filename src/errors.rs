mod instantiate;
mod instantiator;
mod registry;
mod resolve;

pub use instantiate::InstantiateErrorKind;
pub use instantiator::InstantiatorErrorKind;
pub use registry::RegistryErrorKind;
pub use resolve::ResolveErrorKind;
