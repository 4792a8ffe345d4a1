use alloc::{collections::BTreeSet, vec::Vec};

use crate::any::{hash_one, TypeInfo};

/// Placeholder argument used to derive the identity of an open generic
/// definition: the definition of `Pair<X, Y>` is `TypeInfo::of::<Pair<Def, Def>>()`.
///
/// This requires the contract type itself to be bound-free; trait bounds
/// belong on impl blocks of types registered through the container.
pub struct Def;

/// The constructed-generic shape of a request: the open definition plus the
/// concrete arguments it was closed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericShape {
    pub definition: TypeInfo,
    pub arguments: Vec<TypeInfo>,
}

impl GenericShape {
    #[inline]
    #[must_use]
    pub fn new(definition: TypeInfo, arguments: &[TypeInfo]) -> Self {
        Self {
            definition,
            arguments: arguments.to_vec(),
        }
    }
}

/// Implemented (usually via [`generic_contract!`](crate::generic_contract)) by
/// closed generic contract types so a request for them can fall back to the
/// open-generic definition table.
pub trait GenericContract: 'static {
    fn generic_shape() -> GenericShape;
}

/// Derives [`GenericContract`] for a generic contract type, using [`Def`] as
/// the placeholder argument for the definition identity.
///
/// ```
/// # use bindery::generic_contract;
/// struct Pair<X, Y>(X, Y);
/// generic_contract!(Pair<X, Y>);
/// ```
#[macro_export]
macro_rules! generic_contract {
    (@def $arg:ident) => { $crate::Def };
    ($ty:ident < $($arg:ident),+ $(,)? >) => {
        impl<$($arg: 'static),+> $crate::GenericContract for $ty<$($arg),+> {
            fn generic_shape() -> $crate::GenericShape {
                $crate::GenericShape::new(
                    $crate::TypeInfo::of::<$ty<$($crate::generic_contract!(@def $arg)),+>>(),
                    &[$($crate::TypeInfo::of::<$arg>()),+],
                )
            }
        }
    };
}

/// A request descriptor for one dependency edge: the requested type, an
/// optional registration name, the constructed-generic shape if any, and the
/// injection site (parent type, site attributes, member flag) consulted by
/// conditional registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeKey {
    pub type_info: TypeInfo,
    pub shape: Option<GenericShape>,
    pub name: Option<&'static str>,
    pub parent: Option<TypeInfo>,
    pub attributes: BTreeSet<TypeInfo>,
    pub is_member: bool,
}

impl TypeKey {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            shape: None,
            name: None,
            parent: None,
            attributes: BTreeSet::new(),
            is_member: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn of_generic<T: GenericContract>() -> Self {
        let mut key = Self::of::<T>();
        key.shape = Some(T::generic_shape());
        key
    }

    #[inline]
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_parent(mut self, parent: TypeInfo) -> Self {
        self.parent = Some(parent);
        self
    }

    #[inline]
    #[must_use]
    pub fn attributed<A: 'static>(mut self) -> Self {
        self.attributes.insert(TypeInfo::of::<A>());
        self
    }

    #[inline]
    #[must_use]
    pub fn as_member(mut self) -> Self {
        self.is_member = true;
        self
    }

    /// Tree key of the concrete (closed) requested type.
    #[inline]
    #[must_use]
    pub(crate) fn type_hash(&self) -> u64 {
        self.type_info.key_hash()
    }

    /// Tree key of the open-generic definition, when the request is a
    /// constructed generic type.
    #[inline]
    #[must_use]
    pub(crate) fn definition_hash(&self) -> Option<u64> {
        self.shape.as_ref().map(|shape| shape.definition.key_hash())
    }

    /// Combined hash identifying the closed shape, used by the plan cache and
    /// scoped-instance maps.
    #[inline]
    #[must_use]
    pub(crate) fn closed_hash(&self) -> u64 {
        hash_one((self.type_info.id, self.name))
    }
}
