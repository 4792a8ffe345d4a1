use alloc::{sync::Arc, vec::Vec};
use core::marker::PhantomData;
use parking_lot::Mutex;

use crate::{
    any::{downcast_rc, RcAny, TypeInfo},
    errors::ResolveErrorKind,
};

/// The generic shapes the engine recognizes before ordinary lookup. Each
/// unwraps one layer and delegates to the wrapped type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    /// A factory re-entering resolution on every call.
    Deferred,
    /// Resolved once, on first access.
    Lazy,
    /// Every eligible registration, in registration order.
    Collection,
    /// Single-element tuple around the resolved instance.
    Tuple,
}

pub(crate) type DeferredFn = Arc<dyn Fn(Vec<(TypeInfo, RcAny)>) -> Result<RcAny, ResolveErrorKind> + Send + Sync>;

/// Type-erased deferred factory. Calls re-enter the engine against the scope
/// captured at resolution time; nothing is materialized until then.
#[derive(Clone)]
pub(crate) struct ErasedDeferred {
    produce: DeferredFn,
}

impl ErasedDeferred {
    #[inline]
    #[must_use]
    pub(crate) fn new(produce: DeferredFn) -> Self {
        Self { produce }
    }

    pub(crate) fn produce(&self, overrides: Vec<(TypeInfo, RcAny)>) -> Result<RcAny, ResolveErrorKind> {
        (self.produce.as_ref())(overrides)
    }

    #[inline]
    #[must_use]
    pub(crate) fn typed<T: Send + Sync + 'static>(self) -> Deferred<T> {
        Deferred {
            erased: self,
            _marker: PhantomData,
        }
    }
}

/// A deferred factory for `T`: each [`call`](Deferred::call) runs a full
/// resolution against the scope it was resolved in.
#[derive(Clone)]
pub struct Deferred<T> {
    erased: ErasedDeferred,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// # Errors
    /// Fails with the same errors an immediate resolution of `T` would.
    pub fn call(&self) -> Result<Arc<T>, ResolveErrorKind> {
        downcast_rc::<T>(self.erased.produce(Vec::new())?)
    }
}

/// A deferred factory taking one caller-supplied argument which overrides
/// dependency lookup for its type during the resolution.
pub struct Factory1<A, T> {
    erased: ErasedDeferred,
    _marker: PhantomData<fn(A) -> T>,
}

impl<A: Send + Sync + 'static, T: Send + Sync + 'static> Factory1<A, T> {
    #[inline]
    #[must_use]
    pub(crate) fn new(erased: ErasedDeferred) -> Self {
        Self {
            erased,
            _marker: PhantomData,
        }
    }

    /// # Errors
    /// Fails with the same errors an immediate resolution of `T` would.
    pub fn call(&self, arg: A) -> Result<Arc<T>, ResolveErrorKind> {
        let overrides = alloc::vec![(TypeInfo::of::<A>(), Arc::new(arg) as RcAny)];
        downcast_rc::<T>(self.erased.produce(overrides)?)
    }
}

/// Two-argument variant of [`Factory1`].
pub struct Factory2<A, B, T> {
    erased: ErasedDeferred,
    _marker: PhantomData<fn(A, B) -> T>,
}

impl<A: Send + Sync + 'static, B: Send + Sync + 'static, T: Send + Sync + 'static> Factory2<A, B, T> {
    #[inline]
    #[must_use]
    pub(crate) fn new(erased: ErasedDeferred) -> Self {
        Self {
            erased,
            _marker: PhantomData,
        }
    }

    /// # Errors
    /// Fails with the same errors an immediate resolution of `T` would.
    pub fn call(&self, a: A, b: B) -> Result<Arc<T>, ResolveErrorKind> {
        let overrides = alloc::vec![
            (TypeInfo::of::<A>(), Arc::new(a) as RcAny),
            (TypeInfo::of::<B>(), Arc::new(b) as RcAny),
        ];
        downcast_rc::<T>(self.erased.produce(overrides)?)
    }
}

/// Type-erased lazy value: the thunk runs at most once, the result is shared
/// by every clone.
#[derive(Clone)]
pub(crate) struct ErasedLazy {
    cell: Arc<Mutex<Option<RcAny>>>,
    thunk: ErasedDeferred,
}

impl ErasedLazy {
    #[inline]
    #[must_use]
    pub(crate) fn new(thunk: ErasedDeferred) -> Self {
        Self {
            cell: Arc::new(Mutex::new(None)),
            thunk,
        }
    }

    pub(crate) fn force(&self) -> Result<RcAny, ResolveErrorKind> {
        let mut cell = self.cell.lock();
        if let Some(value) = &*cell {
            return Ok(value.clone());
        }
        let value = self.thunk.produce(Vec::new())?;
        *cell = Some(value.clone());
        Ok(value)
    }

    #[inline]
    #[must_use]
    pub(crate) fn typed<T: Send + Sync + 'static>(self) -> Lazy<T> {
        Lazy {
            erased: self,
            _marker: PhantomData,
        }
    }
}

/// A lazily resolved `T`: resolution happens on the first [`get`](Lazy::get),
/// later calls return the memoized instance.
#[derive(Clone)]
pub struct Lazy<T> {
    erased: ErasedLazy,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Lazy<T> {
    /// # Errors
    /// Fails with the same errors an immediate resolution of `T` would; a
    /// failed first access is retried on the next one.
    pub fn get(&self) -> Result<Arc<T>, ResolveErrorKind> {
        downcast_rc::<T>(self.erased.force()?)
    }
}

/// Single-element tuple wrapper around a resolved instance.
pub struct Tuple<T>(pub Arc<T>);

#[cfg(test)]
mod tests {
    use super::{ErasedDeferred, ErasedLazy};
    use crate::any::RcAny;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU8, Ordering};

    fn counting_deferred(counter: Arc<AtomicU8>) -> ErasedDeferred {
        ErasedDeferred::new(Arc::new(move |_overrides| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(3u8) as RcAny)
        }))
    }

    #[test]
    fn test_deferred_runs_every_call() {
        let counter = Arc::new(AtomicU8::new(0));
        let deferred = counting_deferred(counter.clone()).typed::<u8>();

        assert_eq!(*deferred.call().unwrap(), 3);
        assert_eq!(*deferred.call().unwrap(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lazy_runs_once() {
        let counter = Arc::new(AtomicU8::new(0));
        let lazy = ErasedLazy::new(counting_deferred(counter.clone())).typed::<u8>();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let first = lazy.get().unwrap();
        let second = lazy.get().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let deferred = counting_deferred(Arc::new(AtomicU8::new(0))).typed::<u16>();
        assert!(deferred.call().is_err());
    }
}
