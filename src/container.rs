use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::{
    any::TypeInfo,
    config::ContainerConfig,
    descriptor::{MetaInfoStore, TypeDescriptor},
    errors::{RegistryErrorKind, ResolveErrorKind},
    key::GenericContract,
    plan::PlanCache,
    registration::{Provider, Registration},
    repository::RegistrationRepository,
    scope::ResolutionScope,
    wrappers::{Deferred, Factory1, Factory2, Lazy, Tuple},
};

/// Shared, container-wide collaborators every scope carries a handle to.
/// Containers are independent: no ambient state is consulted anywhere.
pub(crate) struct ContainerServices {
    pub(crate) repository: RegistrationRepository,
    pub(crate) meta: MetaInfoStore,
    pub(crate) plans: PlanCache,
    pub(crate) config: ContainerConfig,
    sequence: AtomicU64,
}

impl ContainerServices {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// The dependency-resolution runtime: a registration repository plus a root
/// scope. `resolve` may be called concurrently from parallel threads;
/// individual scopes assume a single resolution call at a time.
pub struct Container {
    services: Arc<ContainerServices>,
    root: ResolutionScope,
}

impl Clone for Container {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            root: self.root.clone(),
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ContainerConfig) -> Self {
        let services = Arc::new(ContainerServices {
            repository: RegistrationRepository::new(),
            meta: MetaInfoStore::new(),
            plans: PlanCache::new(),
            config,
            sequence: AtomicU64::new(0),
        });
        let root = ResolutionScope::new_root(services.clone());
        Self { services, root }
    }

    /// Stores a registration. Routing follows the registration itself:
    /// decorators go to the decorator table, open-generic definitions to the
    /// definition table, everything else to the concrete-type table.
    ///
    /// # Errors
    /// Fails only on pathological repository write contention.
    pub fn register(&self, registration: Registration) -> Result<&Self, RegistryErrorKind> {
        let registration = self.prepare(registration);
        let unique = self.services.config.unique_registration_ids;

        if registration.is_decorator {
            self.services.repository.add_decorator(Arc::new(registration))?;
        } else if matches!(registration.provider, Provider::OpenGeneric { .. }) {
            self.services.repository.add_generic_definition(Arc::new(registration), unique)?;
        } else {
            self.services.repository.add(Arc::new(registration), unique)?;
        }
        Ok(self)
    }

    /// Replaces whatever is registered under the contract key, atomically
    /// discarding all prior registrations there.
    ///
    /// # Errors
    /// Fails only on pathological repository write contention.
    pub fn remap(&self, registration: Registration) -> Result<&Self, RegistryErrorKind> {
        let registration = self.prepare(registration);
        let unique = self.services.config.unique_registration_ids;

        if matches!(registration.provider, Provider::OpenGeneric { .. }) {
            self.services
                .repository
                .add_or_replace_generic_definition(Arc::new(registration), unique)?;
        } else {
            self.services.repository.add_or_replace(Arc::new(registration), unique)?;
        }
        Ok(self)
    }

    fn prepare(&self, mut registration: Registration) -> Registration {
        registration.sequence = self.services.next_sequence();

        // Keep the introspection cache warm for every descriptor that passes
        // through, so constraint checks and re-registrations reuse it.
        match &registration.provider {
            Provider::Plan(descriptor) | Provider::OpenGeneric {
                definition: descriptor, ..
            } => {
                let _ = self.services.meta.insert(descriptor.clone());
            }
            _ => {}
        }

        debug!(
            contract = registration.contract.name,
            sequence = registration.sequence,
            "Registration prepared",
        );
        registration
    }

    /// Records that `T` satisfies the constraint `Marker` stands for, making
    /// it eligible for constrained open-generic closings.
    ///
    /// # Errors
    /// Fails only on pathological repository write contention.
    pub fn register_capability<T: 'static, Marker: 'static>(&self) -> Result<&Self, RegistryErrorKind> {
        self.services
            .meta
            .add_capability(TypeInfo::of::<T>(), TypeInfo::of::<Marker>())?;
        Ok(self)
    }

    #[must_use]
    pub fn contains<T: ?Sized + 'static>(&self, name: Option<&str>) -> bool {
        self.services.repository.contains(&TypeInfo::of::<T>(), name)
    }

    /// The cached descriptor for implementation type `T`, if one has passed
    /// through a registration. Descriptors are cached for the container's
    /// lifetime; the first one for a type wins.
    #[must_use]
    pub fn descriptor_of<T: 'static>(&self) -> Option<Arc<TypeDescriptor>> {
        self.services.meta.get(&TypeInfo::of::<T>())
    }

    /// Contract and name of every stored registration, in registration order.
    #[must_use]
    pub fn registration_mappings(&self) -> Vec<(TypeInfo, Option<&'static str>)> {
        self.services
            .repository
            .all_registrations()
            .iter()
            .map(|registration| (registration.contract, registration.name))
            .collect()
    }

    #[must_use]
    pub fn root_scope(&self) -> &ResolutionScope {
        &self.root
    }

    /// Opens a nameless resolution scope under the root.
    #[must_use]
    pub fn begin_scope(&self) -> ResolutionScope {
        self.root.begin_scope()
    }

    /// Opens a named resolution scope under the root, targetable by
    /// named-scope registrations.
    #[must_use]
    pub fn begin_named_scope(&self, name: &'static str) -> ResolutionScope {
        self.root.begin_named_scope(name)
    }

    /// Tears down the root scope: singletons are finalized and disposed in
    /// most-recently-resolved-first order. A second call is a no-op.
    pub fn close(&self) {
        self.root.dispose();
    }
}

/// Resolution entry points, delegating to the root scope.
impl Container {
    /// # Errors
    /// See [`ResolutionScope::resolve`].
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.root.resolve()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_named`].
    pub fn resolve_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>, ResolveErrorKind> {
        self.root.resolve_named(name)
    }

    /// # Errors
    /// See [`ResolutionScope::try_resolve`].
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        self.root.try_resolve()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_generic`].
    pub fn resolve_generic<T: GenericContract + Send + Sync>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.root.resolve_generic()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_generic_named`].
    pub fn resolve_generic_named<T: GenericContract + Send + Sync>(&self, name: &'static str) -> Result<Arc<T>, ResolveErrorKind> {
        self.root.resolve_generic_named(name)
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_all`].
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ResolveErrorKind> {
        self.root.resolve_all()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_all_generic`].
    pub fn resolve_all_generic<T: GenericContract + Send + Sync>(&self) -> Result<Vec<Arc<T>>, ResolveErrorKind> {
        self.root.resolve_all_generic()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_deferred`].
    pub fn resolve_deferred<T: Send + Sync + 'static>(&self) -> Result<Deferred<T>, ResolveErrorKind> {
        self.root.resolve_deferred()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_lazy`].
    pub fn resolve_lazy<T: Send + Sync + 'static>(&self) -> Result<Lazy<T>, ResolveErrorKind> {
        self.root.resolve_lazy()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_tuple`].
    pub fn resolve_tuple<T: Send + Sync + 'static>(&self) -> Result<Tuple<T>, ResolveErrorKind> {
        self.root.resolve_tuple()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_factory1`].
    pub fn resolve_factory1<A, T>(&self) -> Result<Factory1<A, T>, ResolveErrorKind>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.root.resolve_factory1()
    }

    /// # Errors
    /// See [`ResolutionScope::resolve_factory2`].
    pub fn resolve_factory2<A, B, T>(&self) -> Result<Factory2<A, B, T>, ResolveErrorKind>
    where
        A: Send + Sync + 'static,
        B: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.root.resolve_factory2()
    }
}
