use ahash::AHasher;
use alloc::{boxed::Box, sync::Arc};
use core::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher as _},
};

/// Runtime identity of a type: its name for diagnostics, its [`TypeId`] for
/// equality and ordering.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    #[inline]
    #[must_use]
    pub fn of_val<T>(_val: &T) -> Self
    where
        T: ?Sized + 'static,
    {
        Self::of::<T>()
    }

    /// Integer key used by the repository trees. Hash equality is treated as
    /// identity there, see [`crate::tree::Tree`].
    #[inline]
    #[must_use]
    pub(crate) fn key_hash(&self) -> u64 {
        hash_one(self.id)
    }

    #[inline]
    #[must_use]
    #[allow(dead_code)]
    pub(crate) fn short_name(&self) -> &'static str {
        self.name.rsplit_once("::").map_or(self.name, |(_, name)| name)
    }
}

#[inline]
#[must_use]
pub(crate) fn hash_one(val: impl Hash) -> u64 {
    let mut hasher = AHasher::default();
    val.hash(&mut hasher);
    hasher.finish()
}

pub(crate) type RcAny = Arc<dyn Any + Send + Sync>;
pub(crate) type BoxAny = Box<dyn Any + Send + Sync>;

pub(crate) fn downcast_rc<T: Send + Sync + 'static>(value: RcAny) -> Result<Arc<T>, crate::errors::ResolveErrorKind> {
    let actual = (*value).type_id();
    value.downcast::<T>().map_err(|_| crate::errors::ResolveErrorKind::IncorrectType {
        expected: TypeId::of::<T>(),
        actual,
    })
}
