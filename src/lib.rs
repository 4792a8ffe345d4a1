#![no_std]

extern crate alloc;

pub(crate) mod any;
pub(crate) mod config;
pub(crate) mod container;
pub(crate) mod context;
pub(crate) mod descriptor;
pub(crate) mod errors;
pub(crate) mod finalizer;
pub(crate) mod key;
pub(crate) mod lifetime;
pub(crate) mod plan;
pub(crate) mod registration;
pub(crate) mod repository;
pub(crate) mod resolver;
pub(crate) mod scope;
pub(crate) mod service;
pub(crate) mod tree;
pub(crate) mod wrappers;

pub use any::TypeInfo;
pub use config::ContainerConfig;
pub use container::Container;
pub use descriptor::{param, param_generic, ArgList, DescriptorBuilder, GenericParamConstraint, ParamDescriptor, Resolved, TypeDescriptor};
pub use errors::{InstantiateErrorKind, InstantiatorErrorKind, RegistryErrorKind, ResolveErrorKind};
pub use finalizer::Finalizer;
pub use key::{Def, GenericContract, GenericShape, TypeKey};
pub use lifetime::Lifetime;
pub use registration::{GenericCloser, Registration};
pub use scope::{Disposable, ResolutionScope};
pub use wrappers::{Deferred, Factory1, Factory2, Lazy, Tuple, WrapperKind};
