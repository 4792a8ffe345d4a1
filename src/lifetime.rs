use crate::scope::ResolutionScope;

/// Instance-reuse policy of a registration.
///
/// Reuse is decided by where an instance is stored: nowhere for `Transient`,
/// the root scope for `Singleton`, the resolving scope for `Scoped`, the
/// nearest matching named ancestor for `NamedScope`.
///
/// First resolutions racing on one scoped/singleton key from several threads
/// may each invoke the factory; the instance map keeps the last stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// A fresh instance per resolution.
    Transient,
    /// One instance per container, stored in the root scope.
    Singleton,
    /// One instance per scope.
    Scoped,
    /// One instance per nearest ancestor scope carrying this name; behaves as
    /// `Transient` while no such scope is active.
    NamedScope(&'static str),
}

impl Lifetime {
    /// The scope instances of this lifetime are stored in, or `None` for
    /// unstored (transient) behavior.
    #[must_use]
    pub(crate) fn storage_scope(&self, current: &ResolutionScope) -> Option<ResolutionScope> {
        match self {
            Self::Transient => None,
            Self::Singleton => Some(current.root_scope()),
            Self::Scoped => Some(current.clone()),
            Self::NamedScope(name) => current.find_named(name),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn named_scope(&self) -> Option<&'static str> {
        match self {
            Self::NamedScope(name) => Some(name),
            _ => None,
        }
    }
}
