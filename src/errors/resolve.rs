use alloc::boxed::Box;
use core::any::TypeId;

use super::{instantiate::InstantiateErrorKind, instantiator::InstantiatorErrorKind, registry::RegistryErrorKind};
use crate::any::TypeInfo;

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("No registration found for {0}")]
    NoRegistration(TypeInfo),
    #[error("Unsatisfied dependency {dependency} required by {requested}")]
    UnsatisfiedDependency { requested: TypeInfo, dependency: TypeInfo },
    #[error("Circular dependency detected while resolving {0}")]
    CircularDependency(TypeInfo),
    #[error("No argument of {definition} satisfies its declared generic constraints")]
    ConstraintViolation { definition: TypeInfo },
    #[error("Requested type {0} carries no constructed-generic shape, but only an open-generic registration exists")]
    MissingGenericShape(TypeInfo),
    #[error("No usable constructor declared for {0}")]
    NoConstructor(TypeInfo),
    #[error("Incorrect provided type. Actual: {actual:?}, expected: {expected:?}")]
    IncorrectType { expected: TypeId, actual: TypeId },
    #[error(transparent)]
    Registry(#[from] RegistryErrorKind),
    #[error(transparent)]
    Instantiator(InstantiatorErrorKind<Box<ResolveErrorKind>, InstantiateErrorKind>),
}
