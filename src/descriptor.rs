use alloc::{collections::BTreeSet, sync::Arc, vec::Vec};
use core::any::{Any, TypeId};

use crate::{
    any::{BoxAny, RcAny, TypeInfo},
    errors::{InstantiateErrorKind, RegistryErrorKind},
    key::{GenericContract, TypeKey},
    scope::Disposable,
    tree::ConcurrentTree,
    wrappers::{Deferred, ErasedDeferred, ErasedLazy, Lazy, Tuple, WrapperKind},
};

/// One resolved dependency value handed to a constructor or member setter.
/// Consumed through the typed accessors matching the parameter's declared
/// wrapper form.
pub struct Resolved(pub(crate) ResolvedKind);

pub(crate) enum ResolvedKind {
    Shared(RcAny),
    Deferred(ErasedDeferred),
    Lazy(ErasedLazy),
    Many(Vec<RcAny>),
    Tuple(RcAny),
}

impl Resolved {
    #[inline]
    #[must_use]
    pub(crate) fn from_shared(value: RcAny) -> Self {
        Self(ResolvedKind::Shared(value))
    }

    #[inline]
    #[must_use]
    pub(crate) fn from_deferred(erased: ErasedDeferred) -> Self {
        Self(ResolvedKind::Deferred(erased))
    }

    #[inline]
    #[must_use]
    pub(crate) fn from_lazy(erased: ErasedLazy) -> Self {
        Self(ResolvedKind::Lazy(erased))
    }

    #[inline]
    #[must_use]
    pub(crate) fn from_many(values: Vec<RcAny>) -> Self {
        Self(ResolvedKind::Many(values))
    }

    #[inline]
    #[must_use]
    pub(crate) fn from_tuple(value: RcAny) -> Self {
        Self(ResolvedKind::Tuple(value))
    }

    /// # Errors
    /// Fails when the value is not a shared instance of `T`.
    pub fn shared<T: Send + Sync + 'static>(self) -> Result<Arc<T>, InstantiateErrorKind> {
        match self.0 {
            ResolvedKind::Shared(value) => downcast_arc(value),
            _ => Err(incorrect::<T>()),
        }
    }

    /// Clones the shared instance out of the wrapper.
    ///
    /// # Errors
    /// Fails when the value is not a shared instance of `T`.
    pub fn value<T: Clone + Send + Sync + 'static>(self) -> Result<T, InstantiateErrorKind> {
        self.shared::<T>().map(|value| (*value).clone())
    }

    /// # Errors
    /// Fails when the value is not a deferred factory.
    pub fn deferred<T: Send + Sync + 'static>(self) -> Result<Deferred<T>, InstantiateErrorKind> {
        match self.0 {
            ResolvedKind::Deferred(erased) => Ok(erased.typed()),
            _ => Err(incorrect::<T>()),
        }
    }

    /// # Errors
    /// Fails when the value is not a lazy slot.
    pub fn lazy<T: Send + Sync + 'static>(self) -> Result<Lazy<T>, InstantiateErrorKind> {
        match self.0 {
            ResolvedKind::Lazy(erased) => Ok(erased.typed()),
            _ => Err(incorrect::<T>()),
        }
    }

    /// # Errors
    /// Fails when the value is not a collection of `T`.
    pub fn many<T: Send + Sync + 'static>(self) -> Result<Vec<Arc<T>>, InstantiateErrorKind> {
        match self.0 {
            ResolvedKind::Many(values) => values.into_iter().map(downcast_arc).collect(),
            _ => Err(incorrect::<T>()),
        }
    }

    /// # Errors
    /// Fails when the value is not a single-element tuple of `T`.
    pub fn tuple<T: Send + Sync + 'static>(self) -> Result<Tuple<T>, InstantiateErrorKind> {
        match self.0 {
            ResolvedKind::Tuple(value) => downcast_arc(value).map(Tuple),
            _ => Err(incorrect::<T>()),
        }
    }
}

fn downcast_arc<T: Send + Sync + 'static>(value: RcAny) -> Result<Arc<T>, InstantiateErrorKind> {
    let actual = (*value).type_id();
    value.downcast::<T>().map_err(|_| InstantiateErrorKind::IncorrectArgument {
        expected: TypeId::of::<T>(),
        actual,
    })
}

fn incorrect<T: 'static>() -> InstantiateErrorKind {
    InstantiateErrorKind::UnexpectedForm {
        expected: TypeId::of::<T>(),
    }
}

/// The resolved constructor arguments, in declared parameter order.
pub struct ArgList {
    args: alloc::vec::IntoIter<Resolved>,
}

impl ArgList {
    #[inline]
    #[must_use]
    pub(crate) fn new(args: Vec<Resolved>) -> Self {
        Self { args: args.into_iter() }
    }

    /// # Errors
    /// Fails when the list is exhausted.
    pub fn next(&mut self) -> Result<Resolved, InstantiateErrorKind> {
        self.args.next().ok_or(InstantiateErrorKind::MissingArgument)
    }

    /// # Errors
    /// Fails when the list is exhausted or the next value is not a shared `T`.
    pub fn shared<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, InstantiateErrorKind> {
        self.next()?.shared()
    }

    /// # Errors
    /// Fails when the list is exhausted or the next value is not a shared `T`.
    pub fn value<T: Clone + Send + Sync + 'static>(&mut self) -> Result<T, InstantiateErrorKind> {
        self.next()?.value()
    }

    /// # Errors
    /// Fails when the list is exhausted or the next value is not deferred.
    pub fn deferred<T: Send + Sync + 'static>(&mut self) -> Result<Deferred<T>, InstantiateErrorKind> {
        self.next()?.deferred()
    }

    /// # Errors
    /// Fails when the list is exhausted or the next value is not lazy.
    pub fn lazy<T: Send + Sync + 'static>(&mut self) -> Result<Lazy<T>, InstantiateErrorKind> {
        self.next()?.lazy()
    }

    /// # Errors
    /// Fails when the list is exhausted or the next value is not a collection.
    pub fn many<T: Send + Sync + 'static>(&mut self) -> Result<Vec<Arc<T>>, InstantiateErrorKind> {
        self.next()?.many()
    }

    /// # Errors
    /// Fails when the list is exhausted or the next value is not a tuple.
    pub fn tuple<T: Send + Sync + 'static>(&mut self) -> Result<Tuple<T>, InstantiateErrorKind> {
        self.next()?.tuple()
    }
}

pub(crate) type ErasedCtor = Arc<dyn Fn(ArgList) -> Result<BoxAny, InstantiateErrorKind> + Send + Sync>;
pub(crate) type MemberSetter = Arc<dyn Fn(&mut (dyn Any + Send + Sync), Resolved) -> Result<(), InstantiateErrorKind> + Send + Sync>;
pub(crate) type DisposerFn = Arc<dyn Fn(&RcAny) -> Option<Arc<dyn Disposable>> + Send + Sync>;
type DefaultFn = Arc<dyn Fn() -> RcAny + Send + Sync>;

/// One constructor parameter: the dependency edge it requests, the wrapper
/// form it expects, and an optional default used when nothing satisfies it.
#[derive(Clone)]
pub struct ParamDescriptor {
    pub(crate) key: TypeKey,
    pub(crate) arg_name: Option<&'static str>,
    pub(crate) wrapper: Option<WrapperKind>,
    pub(crate) default: Option<DefaultFn>,
}

#[inline]
#[must_use]
pub fn param<T: ?Sized + 'static>() -> ParamDescriptor {
    ParamDescriptor {
        key: TypeKey::of::<T>(),
        arg_name: None,
        wrapper: None,
        default: None,
    }
}

#[inline]
#[must_use]
pub fn param_generic<T: GenericContract>() -> ParamDescriptor {
    ParamDescriptor {
        key: TypeKey::of_generic::<T>(),
        arg_name: None,
        wrapper: None,
        default: None,
    }
}

impl ParamDescriptor {
    /// Declares the parameter name, used by per-registration injection
    /// overrides.
    #[inline]
    #[must_use]
    pub fn arg(mut self, name: &'static str) -> Self {
        self.arg_name = Some(name);
        self
    }

    #[inline]
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.key = self.key.named(name);
        self
    }

    #[inline]
    #[must_use]
    pub fn attributed<A: 'static>(mut self) -> Self {
        self.key = self.key.attributed::<A>();
        self
    }

    #[inline]
    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.wrapper = Some(WrapperKind::Deferred);
        self
    }

    #[inline]
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.wrapper = Some(WrapperKind::Lazy);
        self
    }

    #[inline]
    #[must_use]
    pub fn collection(mut self) -> Self {
        self.wrapper = Some(WrapperKind::Collection);
        self
    }

    #[inline]
    #[must_use]
    pub fn tuple(mut self) -> Self {
        self.wrapper = Some(WrapperKind::Tuple);
        self
    }

    #[must_use]
    pub fn with_default<T: Send + Sync + 'static>(mut self, default: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(move || Arc::new(default()) as RcAny));
        self
    }
}

pub(crate) struct ConstructorDescriptor {
    pub(crate) params: Vec<ParamDescriptor>,
    pub(crate) invoke: ErasedCtor,
}

pub(crate) struct MemberDescriptor {
    #[allow(dead_code)]
    pub(crate) name: &'static str,
    pub(crate) param: ParamDescriptor,
    pub(crate) inject: MemberSetter,
}

/// Constraint set declared on one generic parameter of an open definition.
#[derive(Debug, Clone)]
pub struct GenericParamConstraint {
    pub position: usize,
    pub constraints: Vec<TypeInfo>,
}

/// Pre-computed construction metadata for one implementation type: ordered
/// constructors with ordered parameters, injectable members, generic
/// parameter constraints. The engine consumes this read-only; it is authored
/// by callers (or generated code), never reflected.
pub struct TypeDescriptor {
    pub(crate) type_info: TypeInfo,
    pub(crate) constructors: Vec<ConstructorDescriptor>,
    pub(crate) members: Vec<MemberDescriptor>,
    pub(crate) constraints: Vec<GenericParamConstraint>,
    pub(crate) disposer: Option<DisposerFn>,
}

impl TypeDescriptor {
    #[inline]
    #[must_use]
    pub fn builder<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        DescriptorBuilder {
            type_info: TypeInfo::of::<T>(),
            constructors: Vec::new(),
            members: Vec::new(),
            constraints: Vec::new(),
            disposer: None,
            _marker: core::marker::PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }
}

pub struct DescriptorBuilder<T> {
    type_info: TypeInfo,
    constructors: Vec<ConstructorDescriptor>,
    members: Vec<MemberDescriptor>,
    constraints: Vec<GenericParamConstraint>,
    disposer: Option<DisposerFn>,
    _marker: core::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    #[must_use]
    pub fn constructor(
        mut self,
        params: Vec<ParamDescriptor>,
        build: impl Fn(&mut ArgList) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    ) -> Self {
        self.constructors.push(ConstructorDescriptor {
            params,
            invoke: Arc::new(move |mut args| build(&mut args).map(|value| alloc::boxed::Box::new(value) as BoxAny)),
        });
        self
    }

    #[must_use]
    pub fn member(
        mut self,
        name: &'static str,
        param: ParamDescriptor,
        apply: impl Fn(&mut T, Resolved) -> Result<(), InstantiateErrorKind> + Send + Sync + 'static,
    ) -> Self {
        let ParamDescriptor {
            key,
            arg_name,
            wrapper,
            default,
        } = param;
        self.members.push(MemberDescriptor {
            name,
            param: ParamDescriptor {
                key: key.as_member(),
                arg_name: arg_name.or(Some(name)),
                wrapper,
                default,
            },
            inject: Arc::new(move |target, resolved| {
                let target = target.downcast_mut::<T>().ok_or(InstantiateErrorKind::UnexpectedForm {
                    expected: TypeId::of::<T>(),
                })?;
                apply(target, resolved)
            }),
        });
        self
    }

    #[must_use]
    pub fn constrained(mut self, position: usize, constraints: &[TypeInfo]) -> Self {
        self.constraints.push(GenericParamConstraint {
            position,
            constraints: constraints.to_vec(),
        });
        self
    }

    #[must_use]
    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        self.disposer = Some(Arc::new(|value: &RcAny| {
            value
                .clone()
                .downcast::<T>()
                .ok()
                .map(|typed| typed as Arc<dyn Disposable>)
        }));
        self
    }

    #[must_use]
    pub fn finish(self) -> Arc<TypeDescriptor> {
        let parent = self.type_info;
        let constructors = self
            .constructors
            .into_iter()
            .map(|ctor| ConstructorDescriptor {
                params: ctor.params.into_iter().map(|param| with_parent(param, parent)).collect(),
                invoke: ctor.invoke,
            })
            .collect();
        let members = self
            .members
            .into_iter()
            .map(|member| MemberDescriptor {
                name: member.name,
                param: with_parent(member.param, parent),
                inject: member.inject,
            })
            .collect();

        Arc::new(TypeDescriptor {
            type_info: self.type_info,
            constructors,
            members,
            constraints: self.constraints,
            disposer: self.disposer,
        })
    }
}

fn with_parent(mut param: ParamDescriptor, parent: TypeInfo) -> ParamDescriptor {
    if param.key.parent.is_none() {
        param.key = param.key.with_parent(parent);
    }
    param
}

/// The type-introspection boundary: cached descriptors per implementation
/// type, plus the capability table backing generic-constraint checks.
pub struct MetaInfoStore {
    descriptors: ConcurrentTree<Arc<TypeDescriptor>>,
    capabilities: ConcurrentTree<Arc<BTreeSet<TypeInfo>>>,
}

impl Default for MetaInfoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaInfoStore {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            descriptors: ConcurrentTree::new(),
            capabilities: ConcurrentTree::new(),
        }
    }

    /// Caches `descriptor` under its implementation type. The first descriptor
    /// for a type wins for the container's lifetime.
    pub(crate) fn insert(&self, descriptor: Arc<TypeDescriptor>) -> Result<(), RegistryErrorKind> {
        self.descriptors
            .update(descriptor.type_info.key_hash(), descriptor, &|old, _new| old.clone())
    }

    #[must_use]
    pub(crate) fn get(&self, type_info: &TypeInfo) -> Option<Arc<TypeDescriptor>> {
        self.descriptors.get(type_info.key_hash())
    }

    /// Records that `ty` satisfies the `marker` constraint (for example, that
    /// it implements the trait the marker stands for).
    pub(crate) fn add_capability(&self, ty: TypeInfo, marker: TypeInfo) -> Result<(), RegistryErrorKind> {
        let mut set = BTreeSet::new();
        set.insert(marker);
        self.capabilities.update(ty.key_hash(), Arc::new(set), &|old, new| {
            let mut merged = (**old).clone();
            merged.extend(new.iter().copied());
            Arc::new(merged)
        })
    }

    /// A type always satisfies itself; everything else comes from the
    /// capability table.
    #[must_use]
    pub(crate) fn satisfies(&self, argument: &TypeInfo, constraint: &TypeInfo) -> bool {
        if argument == constraint {
            return true;
        }
        self.capabilities
            .get(argument.key_hash())
            .is_some_and(|set| set.contains(constraint))
    }
}
