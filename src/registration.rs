use alloc::{boxed::Box, collections::BTreeSet, sync::Arc, vec::Vec};

use crate::{
    any::{BoxAny, RcAny, TypeInfo},
    descriptor::{MetaInfoStore, TypeDescriptor},
    errors::InstantiateErrorKind,
    finalizer::{boxed_finalizer_factory, BoxedCloneFinalizer, Finalizer},
    key::{GenericShape, TypeKey},
    lifetime::Lifetime,
    scope::ResolutionScope,
    service::{service_fn, BoxCloneService},
};

/// Produces the closed [`TypeDescriptor`] of an open-generic definition for a
/// concrete argument list, or `None` when it has no closing for those
/// arguments. Closers are authored by callers (or generated code), since
/// closed construction logic must exist at compile time.
pub trait GenericCloser: Send + Sync + 'static {
    fn close(&self, shape: &GenericShape) -> Option<Arc<TypeDescriptor>>;
}

impl<F> GenericCloser for F
where
    F: Fn(&GenericShape) -> Option<Arc<TypeDescriptor>> + Send + Sync + 'static,
{
    #[inline]
    fn close(&self, shape: &GenericShape) -> Option<Arc<TypeDescriptor>> {
        self(shape)
    }
}

pub(crate) type BoxedCloneInstantiator = BoxCloneService<ResolutionScope, BoxAny, InstantiateErrorKind>;

/// How a registration produces instances.
#[derive(Clone)]
pub(crate) enum Provider {
    /// Descriptor-driven construction through a cached plan.
    Plan(Arc<TypeDescriptor>),
    /// An opaque factory over the resolving scope.
    Factory(BoxedCloneInstantiator),
    /// An instance created outside the container.
    Instance(RcAny),
    /// An open-generic definition closed per request.
    OpenGeneric {
        definition: Arc<TypeDescriptor>,
        closer: Arc<dyn GenericCloser>,
    },
}

pub(crate) enum InjectionOverride {
    ByName(&'static str, RcAny),
    ByType(TypeInfo, RcAny),
}

type ConditionFn = Arc<dyn Fn(&TypeKey) -> bool + Send + Sync>;

/// An immutable-after-insertion rule describing how to satisfy a contract
/// type. Replacement creates a new registration; nothing is mutated once the
/// repository holds it.
pub struct Registration {
    pub(crate) contract: TypeInfo,
    pub(crate) provider: Provider,
    pub(crate) name: Option<&'static str>,
    pub(crate) lifetime: Lifetime,
    pub(crate) defines_scope: Option<&'static str>,
    pub(crate) condition: Option<ConditionFn>,
    pub(crate) attribute_conditions: BTreeSet<TypeInfo>,
    pub(crate) target_condition: Option<TypeInfo>,
    pub(crate) overrides: Vec<InjectionOverride>,
    pub(crate) selected_constructor: Option<usize>,
    pub(crate) is_decorator: bool,
    pub(crate) finalizer: Option<BoxedCloneFinalizer>,
    pub(crate) track_disposal: bool,
    /// Registration order, assigned at insertion. Doubles as the identity
    /// discriminator in unique-identifiers mode and in instance maps.
    pub(crate) sequence: u64,
}

impl Registration {
    /// A registration for contract `T`, built through `descriptor`'s
    /// constructors and members.
    #[must_use]
    pub fn with_descriptor<T: ?Sized + 'static>(descriptor: Arc<TypeDescriptor>) -> Self {
        Self::new(TypeInfo::of::<T>(), Provider::Plan(descriptor))
    }

    /// A registration for contract `T`, produced by `factory` on every
    /// construction.
    #[must_use]
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolutionScope) -> Result<T, InstantiateErrorKind> + Clone + Send + Sync + 'static,
    {
        let instantiator = BoxCloneService(Box::new(service_fn(move |scope: ResolutionScope| {
            factory(&scope).map(|value| Box::new(value) as BoxAny)
        })));
        Self::new(TypeInfo::of::<T>(), Provider::Factory(instantiator))
    }

    /// A registration serving an already-existing instance.
    #[must_use]
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        Self::new(TypeInfo::of::<T>(), Provider::Instance(Arc::new(value)))
    }

    /// An open-generic definition registration. `definition.type_info()` is
    /// the definition identity (the contract instantiated with
    /// [`Def`](crate::Def)); its constraints gate which closings are
    /// eligible; `closer` produces the closed descriptor per argument list.
    #[must_use]
    pub fn open_generic(definition: Arc<TypeDescriptor>, closer: impl GenericCloser) -> Self {
        let contract = definition.type_info();
        Self::new(
            contract,
            Provider::OpenGeneric {
                definition,
                closer: Arc::new(closer),
            },
        )
    }

    fn new(contract: TypeInfo, provider: Provider) -> Self {
        Self {
            contract,
            provider,
            name: None,
            lifetime: Lifetime::Transient,
            defines_scope: None,
            condition: None,
            attribute_conditions: BTreeSet::new(),
            target_condition: None,
            overrides: Vec::new(),
            selected_constructor: None,
            is_decorator: false,
            finalizer: None,
            track_disposal: true,
            sequence: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    #[inline]
    #[must_use]
    pub fn singleton(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    #[inline]
    #[must_use]
    pub fn scoped(self) -> Self {
        self.with_lifetime(Lifetime::Scoped)
    }

    /// Ties the registration to the nearest active scope named `name`: it is
    /// preferred there and stores its instance there.
    #[inline]
    #[must_use]
    pub fn in_named_scope(self, name: &'static str) -> Self {
        self.with_lifetime(Lifetime::NamedScope(name))
    }

    /// Opens a scope named `name` around this registration's own dependency
    /// subtree whenever it is constructed.
    #[inline]
    #[must_use]
    pub fn defines_scope(mut self, name: &'static str) -> Self {
        self.defines_scope = Some(name);
        self
    }

    /// Limits the registration to injection sites accepted by `condition`.
    #[must_use]
    pub fn when(mut self, condition: impl Fn(&TypeKey) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Limits the registration to injection sites carrying attribute `A`.
    #[inline]
    #[must_use]
    pub fn when_attributed<A: 'static>(mut self) -> Self {
        self.attribute_conditions.insert(TypeInfo::of::<A>());
        self
    }

    /// Limits the registration to dependencies of parent type `P`.
    #[inline]
    #[must_use]
    pub fn for_target<P: 'static>(mut self) -> Self {
        self.target_condition = Some(TypeInfo::of::<P>());
        self
    }

    /// Overrides the dependency for constructor parameters named `name`.
    #[must_use]
    pub fn with_named_override<V: Send + Sync + 'static>(mut self, name: &'static str, value: V) -> Self {
        self.overrides.push(InjectionOverride::ByName(name, Arc::new(value)));
        self
    }

    /// Overrides the dependency for constructor parameters of type `V`.
    #[must_use]
    pub fn with_override<V: Send + Sync + 'static>(mut self, value: V) -> Self {
        self.overrides.push(InjectionOverride::ByType(TypeInfo::of::<V>(), Arc::new(value)));
        self
    }

    /// Pins constructor selection to the descriptor's `index`-th constructor.
    #[inline]
    #[must_use]
    pub fn with_constructor(mut self, index: usize) -> Self {
        self.selected_constructor = Some(index);
        self
    }

    #[inline]
    #[must_use]
    pub fn as_decorator(mut self) -> Self {
        self.is_decorator = true;
        self
    }

    /// Attaches a cleanup callback run with the stored instance when the
    /// owning scope is torn down.
    #[must_use]
    pub fn with_finalizer<T: Send + Sync + 'static>(mut self, finalizer: impl Finalizer<T> + Send + Sync) -> Self {
        self.finalizer = Some(boxed_finalizer_factory(finalizer));
        self
    }

    /// Opts the registration's instances out of disposal tracking.
    #[inline]
    #[must_use]
    pub fn without_disposal_tracking(mut self) -> Self {
        self.track_disposal = false;
        self
    }
}

impl Registration {
    #[inline]
    #[must_use]
    pub(crate) fn named_scope(&self) -> Option<&'static str> {
        self.lifetime.named_scope()
    }

    #[inline]
    #[must_use]
    pub(crate) fn has_condition(&self) -> bool {
        self.condition.is_some() || !self.attribute_conditions.is_empty() || self.target_condition.is_some()
    }

    /// Whether this registration may serve the given injection site: the
    /// requested name must match, and every declared condition must accept
    /// the site.
    #[must_use]
    pub(crate) fn is_usable_for(&self, key: &TypeKey) -> bool {
        if let Some(name) = key.name {
            if self.name != Some(name) {
                return false;
            }
        }
        if let Some(target) = &self.target_condition {
            if key.parent.as_ref() != Some(target) {
                return false;
            }
        }
        if !self.attribute_conditions.is_empty() && self.attribute_conditions.is_disjoint(&key.attributes) {
            return false;
        }
        if let Some(condition) = &self.condition {
            if !(condition.as_ref())(key) {
                return false;
            }
        }
        true
    }

    /// Number of constrained generic parameters; the specificity metric used
    /// to rank otherwise-eligible candidates.
    #[must_use]
    pub(crate) fn constraint_specificity(&self) -> usize {
        match &self.provider {
            Provider::OpenGeneric { definition, .. } => definition.constraints.len(),
            _ => 0,
        }
    }

    /// Whether the declared constraints of an open-generic definition accept
    /// the request's arguments. Non-generic providers trivially accept.
    #[must_use]
    pub(crate) fn satisfies_constraints(&self, key: &TypeKey, meta: &MetaInfoStore) -> bool {
        let Provider::OpenGeneric { definition, .. } = &self.provider else {
            return true;
        };
        let Some(shape) = &key.shape else {
            return false;
        };
        definition.constraints.iter().all(|constraint| {
            shape
                .arguments
                .get(constraint.position)
                .is_some_and(|argument| constraint.constraints.iter().all(|required| meta.satisfies(argument, required)))
        })
    }
}
