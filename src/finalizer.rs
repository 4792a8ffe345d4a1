use alloc::{boxed::Box, sync::Arc};

use crate::{
    any::RcAny,
    service::{service_fn, BoxCloneService},
};

/// Cleanup callback attached to a registration, invoked with the stored
/// instance when the owning scope is torn down.
pub trait Finalizer<Dep>: Clone + 'static {
    fn finalize(&mut self, dependency: Arc<Dep>);
}

pub(crate) type BoxedCloneFinalizer = BoxCloneService<RcAny, (), ()>;

#[must_use]
pub(crate) fn boxed_finalizer_factory<Dep, Fin>(mut finalizer: Fin) -> BoxedCloneFinalizer
where
    Dep: Send + Sync + 'static,
    Fin: Finalizer<Dep> + Send + Sync,
{
    BoxCloneService(Box::new(service_fn(move |dependency: RcAny| {
        if let Ok(dependency) = dependency.downcast::<Dep>() {
            finalizer.finalize(dependency);
        }
        Ok(())
    })))
}

impl<F, Dep> Finalizer<Dep> for F
where
    F: FnMut(Arc<Dep>) + Clone + 'static,
{
    #[inline]
    fn finalize(&mut self, dependency: Arc<Dep>) {
        self(dependency);
    }
}
