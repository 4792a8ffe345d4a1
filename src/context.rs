use alloc::vec::Vec;

use crate::{
    any::{RcAny, TypeInfo},
    errors::ResolveErrorKind,
};

/// Per-call mutable state threaded through one resolution: the in-flight type
/// stack guarding against cycles, caller-supplied parameter overrides from
/// deferred-factory invocations, and the in-progress decoration stack.
pub(crate) struct ResolutionContext {
    in_flight: Vec<TypeInfo>,
    parameters: Vec<(TypeInfo, RcAny)>,
    decorated: Vec<(TypeInfo, RcAny)>,
}

impl ResolutionContext {
    #[inline]
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self {
            in_flight: Vec::new(),
            parameters: Vec::new(),
            decorated: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn with_parameters(parameters: Vec<(TypeInfo, RcAny)>) -> Self {
        Self {
            in_flight: Vec::new(),
            parameters,
            decorated: Vec::new(),
        }
    }

    /// Registers `type_info` as being resolved. A re-entrant registration of
    /// the same type within one call tree is a configuration error, not a
    /// retryable condition.
    ///
    /// Every successful `enter` must be paired with [`Self::exit`] on all
    /// exit paths; [`crate::resolver`] keeps the pair around a single
    /// construction call so failures release the slot too.
    pub(crate) fn enter(&mut self, type_info: TypeInfo) -> Result<(), ResolveErrorKind> {
        if self.in_flight.contains(&type_info) {
            return Err(ResolveErrorKind::CircularDependency(type_info));
        }
        self.in_flight.push(type_info);
        Ok(())
    }

    pub(crate) fn exit(&mut self, type_info: &TypeInfo) {
        if let Some(position) = self.in_flight.iter().rposition(|entry| entry == type_info) {
            self.in_flight.remove(position);
        }
    }

    #[must_use]
    pub(crate) fn parameter_for(&self, type_info: &TypeInfo) -> Option<RcAny> {
        self.parameters
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == type_info)
            .map(|(_, value)| value.clone())
    }

    pub(crate) fn push_decorated(&mut self, contract: TypeInfo, value: RcAny) {
        self.decorated.push((contract, value));
    }

    pub(crate) fn pop_decorated(&mut self) {
        self.decorated.pop();
    }

    #[must_use]
    pub(crate) fn decorated_for(&self, contract: &TypeInfo) -> Option<RcAny> {
        self.decorated
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == contract)
            .map(|(_, value)| value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::ResolutionContext;
    use crate::{any::TypeInfo, errors::ResolveErrorKind};
    use alloc::sync::Arc;

    struct A;
    struct B;

    #[test]
    fn test_cycle_guard() {
        let mut ctx = ResolutionContext::new();

        ctx.enter(TypeInfo::of::<A>()).unwrap();
        ctx.enter(TypeInfo::of::<B>()).unwrap();
        assert!(matches!(
            ctx.enter(TypeInfo::of::<A>()),
            Err(ResolveErrorKind::CircularDependency(info)) if info == TypeInfo::of::<A>(),
        ));

        ctx.exit(&TypeInfo::of::<A>());
        ctx.enter(TypeInfo::of::<A>()).unwrap();
    }

    #[test]
    fn test_parameter_override_lookup() {
        let ctx = ResolutionContext::with_parameters(alloc::vec![(TypeInfo::of::<u8>(), Arc::new(7u8) as _)]);

        assert!(ctx.parameter_for(&TypeInfo::of::<u8>()).is_some());
        assert!(ctx.parameter_for(&TypeInfo::of::<u16>()).is_none());
    }

    #[test]
    fn test_decorated_stack() {
        let mut ctx = ResolutionContext::new();
        assert!(ctx.decorated_for(&TypeInfo::of::<A>()).is_none());

        ctx.push_decorated(TypeInfo::of::<A>(), Arc::new(1u8) as _);
        assert!(ctx.decorated_for(&TypeInfo::of::<A>()).is_some());

        ctx.pop_decorated();
        assert!(ctx.decorated_for(&TypeInfo::of::<A>()).is_none());
    }
}
