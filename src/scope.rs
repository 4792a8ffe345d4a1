use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::{
    any::type_name,
    mem,
    sync::atomic::{AtomicBool, Ordering},
};
use parking_lot::Mutex;
use tracing::{debug, info_span};

use crate::{
    any::{downcast_rc, RcAny},
    container::ContainerServices,
    context::ResolutionContext,
    errors::ResolveErrorKind,
    finalizer::{boxed_finalizer_factory, BoxedCloneFinalizer, Finalizer},
    key::{GenericContract, TypeKey},
    resolver,
    wrappers::{Deferred, ErasedLazy, Factory1, Factory2, Lazy, Tuple},
};

/// Explicit release capability for instances tracked by a scope. Unlike
/// [`Drop`], release runs at scope teardown in most-recently-added-first
/// order, independent of remaining references.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// A resolution scope: a disposable container of instances with an optional
/// name that registrations can target for affinity-based reuse. Scopes form a
/// singly-linked chain toward the root; singletons live in the root, scoped
/// instances in the scope that resolved them.
pub struct ResolutionScope {
    pub(crate) services: Arc<ContainerServices>,
    pub(crate) inner: Arc<ScopeInner>,
}

impl Clone for ResolutionScope {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct ScopeInner {
    name: Option<&'static str>,
    parent: Option<ResolutionScope>,
    instances: Mutex<BTreeMap<(u64, u64), RcAny>>,
    tracking: Mutex<Vec<TrackedEntry>>,
    disposed: AtomicBool,
}

enum TrackedEntry {
    Disposable(Arc<dyn Disposable>),
    Finalized { value: RcAny, finalizer: BoxedCloneFinalizer },
}

impl ResolutionScope {
    #[must_use]
    pub(crate) fn new_root(services: Arc<ContainerServices>) -> Self {
        Self {
            services,
            inner: Arc::new(ScopeInner {
                name: None,
                parent: None,
                instances: Mutex::new(BTreeMap::new()),
                tracking: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Opens a nameless child scope.
    #[must_use]
    pub fn begin_scope(&self) -> Self {
        self.child(None)
    }

    /// Opens a child scope carrying `name`, targetable by named-scope
    /// registrations.
    #[must_use]
    pub fn begin_named_scope(&self, name: &'static str) -> Self {
        self.child(Some(name))
    }

    fn child(&self, name: Option<&'static str>) -> Self {
        Self {
            services: self.services.clone(),
            inner: Arc::new(ScopeInner {
                name,
                parent: Some(self.clone()),
                instances: Mutex::new(BTreeMap::new()),
                tracking: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        self.inner.name
    }

    /// The root of this scope's chain, where singletons are stored.
    #[must_use]
    pub(crate) fn root_scope(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = &current.inner.parent {
            current = parent.clone();
        }
        current
    }

    /// Walks the chain outward to the nearest scope named `name`.
    #[must_use]
    pub(crate) fn find_named(&self, name: &str) -> Option<Self> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if scope.inner.name == Some(name) {
                return Some(scope);
            }
            current = scope.inner.parent.clone();
        }
        None
    }

    #[must_use]
    pub(crate) fn get_instance(&self, key: (u64, u64)) -> Option<RcAny> {
        self.inner.instances.lock().get(&key).cloned()
    }

    pub(crate) fn store_instance(&self, key: (u64, u64), value: RcAny) {
        self.inner.instances.lock().insert(key, value);
    }

    /// Remembers `disposable` for release on scope teardown.
    pub fn add_disposable_tracking<T: Disposable + 'static>(&self, disposable: Arc<T>) -> Arc<T> {
        self.track(TrackedEntry::Disposable(disposable.clone()));
        disposable
    }

    /// Remembers `value` together with an explicit cleanup callback, run on
    /// scope teardown before disposals.
    pub fn add_with_finalizer<T: Send + Sync + 'static>(&self, value: Arc<T>, finalizer: impl Finalizer<T> + Send + Sync) -> Arc<T> {
        self.track(TrackedEntry::Finalized {
            value: value.clone(),
            finalizer: boxed_finalizer_factory(finalizer),
        });
        value
    }

    pub(crate) fn track_disposable(&self, disposable: Arc<dyn Disposable>) {
        self.track(TrackedEntry::Disposable(disposable));
    }

    pub(crate) fn track_finalized(&self, value: RcAny, finalizer: BoxedCloneFinalizer) {
        self.track(TrackedEntry::Finalized { value, finalizer });
    }

    fn track(&self, entry: TrackedEntry) {
        self.inner.tracking.lock().push(entry);
    }

    /// Tears the scope down: runs finalizers, then disposals, each exactly
    /// once in most-recently-added-first order, and drops stored instances.
    /// A second call is a no-op.
    pub fn dispose(&self) {
        self.inner.teardown();
    }
}

impl Disposable for ResolutionScope {
    fn dispose(&self) {
        self.inner.teardown();
    }
}

impl ScopeInner {
    fn teardown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let tracked = mem::take(&mut *self.tracking.lock());
        for entry in tracked.iter().rev() {
            if let TrackedEntry::Finalized { value, finalizer } = entry {
                let _ = crate::service::Service::call(&mut finalizer.clone(), value.clone());
                debug!("Finalizer called");
            }
        }
        for entry in tracked.iter().rev() {
            if let TrackedEntry::Disposable(disposable) = entry {
                disposable.dispose();
                debug!("Tracked disposable released");
            }
        }

        self.instances.lock().clear();
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.teardown();
        debug!("Scope torn down on drop");
    }
}

/// The typed resolve facade. All entry points create a fresh
/// [`ResolutionContext`] and delegate to the engine.
impl ResolutionScope {
    /// Resolves an instance of `T` per its registration's lifetime policy.
    ///
    /// # Errors
    /// Fails when no registration is eligible, a dependency is unsatisfied,
    /// or the graph is cyclic.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.resolve_with_key(TypeKey::of::<T>())
    }

    /// Resolves the registration stored under `name`.
    ///
    /// # Errors
    /// See [`Self::resolve`].
    pub fn resolve_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>, ResolveErrorKind> {
        self.resolve_with_key(TypeKey::of::<T>().named(name))
    }

    /// Resolves a closed generic contract, falling back to its open-generic
    /// definition when no closed registration exists.
    ///
    /// # Errors
    /// See [`Self::resolve`]; additionally fails with a constraint violation
    /// when no definition's constraints accept the arguments.
    pub fn resolve_generic<T: GenericContract + Send + Sync>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.resolve_with_key(TypeKey::of_generic::<T>())
    }

    /// Named-definition form of [`Self::resolve_generic`].
    ///
    /// # Errors
    /// See [`Self::resolve_generic`].
    pub fn resolve_generic_named<T: GenericContract + Send + Sync>(&self, name: &'static str) -> Result<Arc<T>, ResolveErrorKind> {
        self.resolve_with_key(TypeKey::of_generic::<T>().named(name))
    }

    /// Like [`Self::resolve`], but a missing registration yields `Ok(None)`
    /// instead of an error. Circular-dependency failures are never
    /// suppressed.
    ///
    /// # Errors
    /// Fails on any error other than an absent registration.
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        let key = TypeKey::of::<T>();
        let span = info_span!("try_resolve", dependency = type_name::<T>());
        let _guard = span.enter();

        let mut ctx = ResolutionContext::new();
        match resolver::resolve_shared(self, &mut ctx, &key, true)? {
            Some(value) => downcast_rc(value).map(Some),
            None => Ok(None),
        }
    }

    /// Resolves one instance per eligible registration, in registration
    /// order.
    ///
    /// # Errors
    /// Fails when building any eligible candidate fails; an empty candidate
    /// set yields an empty vector.
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ResolveErrorKind> {
        self.resolve_all_with_key(TypeKey::of::<T>())
    }

    /// Collection form of [`Self::resolve_generic`].
    ///
    /// # Errors
    /// See [`Self::resolve_all`].
    pub fn resolve_all_generic<T: GenericContract + Send + Sync>(&self) -> Result<Vec<Arc<T>>, ResolveErrorKind> {
        self.resolve_all_with_key(TypeKey::of_generic::<T>())
    }

    /// A deferred factory for `T`: selection is validated now, construction
    /// happens on every call against this scope.
    ///
    /// # Errors
    /// Fails when no registration is eligible at wrap time.
    pub fn resolve_deferred<T: Send + Sync + 'static>(&self) -> Result<Deferred<T>, ResolveErrorKind> {
        let key = TypeKey::of::<T>();
        resolver::ensure_resolvable(self, &key)?;
        Ok(resolver::make_deferred(self, &key).typed())
    }

    /// A lazily resolved `T`, materialized in this scope on first access.
    ///
    /// # Errors
    /// Fails when no registration is eligible at wrap time.
    pub fn resolve_lazy<T: Send + Sync + 'static>(&self) -> Result<Lazy<T>, ResolveErrorKind> {
        let key = TypeKey::of::<T>();
        resolver::ensure_resolvable(self, &key)?;
        Ok(ErasedLazy::new(resolver::make_deferred(self, &key)).typed())
    }

    /// Single-element tuple form of [`Self::resolve`].
    ///
    /// # Errors
    /// See [`Self::resolve`].
    pub fn resolve_tuple<T: Send + Sync + 'static>(&self) -> Result<Tuple<T>, ResolveErrorKind> {
        self.resolve::<T>().map(Tuple)
    }

    /// A deferred factory whose argument overrides dependency lookup for its
    /// type during each call.
    ///
    /// # Errors
    /// Fails when no registration is eligible at wrap time.
    pub fn resolve_factory1<A, T>(&self) -> Result<Factory1<A, T>, ResolveErrorKind>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        resolver::ensure_resolvable(self, &key)?;
        Ok(Factory1::new(resolver::make_deferred(self, &key)))
    }

    /// Two-argument variant of [`Self::resolve_factory1`].
    ///
    /// # Errors
    /// Fails when no registration is eligible at wrap time.
    pub fn resolve_factory2<A, B, T>(&self) -> Result<Factory2<A, B, T>, ResolveErrorKind>
    where
        A: Send + Sync + 'static,
        B: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        resolver::ensure_resolvable(self, &key)?;
        Ok(Factory2::new(resolver::make_deferred(self, &key)))
    }

    pub(crate) fn resolve_with_key<T: Send + Sync + 'static>(&self, key: TypeKey) -> Result<Arc<T>, ResolveErrorKind> {
        let span = info_span!(
            "resolve",
            dependency = type_name::<T>(),
            scope = self.inner.name.unwrap_or("<root>"),
        );
        let _guard = span.enter();

        let mut ctx = ResolutionContext::new();
        let value = resolver::resolve_shared(self, &mut ctx, &key, false)?;
        match value {
            Some(value) => downcast_rc(value),
            None => Err(ResolveErrorKind::NoRegistration(key.type_info)),
        }
    }

    pub(crate) fn resolve_all_with_key<T: Send + Sync + 'static>(&self, key: TypeKey) -> Result<Vec<Arc<T>>, ResolveErrorKind> {
        let span = info_span!(
            "resolve_all",
            dependency = type_name::<T>(),
            scope = self.inner.name.unwrap_or("<root>"),
        );
        let _guard = span.enter();

        let mut ctx = ResolutionContext::new();
        resolver::resolve_all(self, &mut ctx, &key)?
            .into_iter()
            .map(downcast_rc)
            .collect()
    }
}
