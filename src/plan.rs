use alloc::sync::Arc;

use crate::{
    any::{hash_one, TypeInfo},
    descriptor::{DisposerFn, ErasedCtor, MemberDescriptor, ParamDescriptor, TypeDescriptor},
    errors::ResolveErrorKind,
    registration::{InjectionOverride, Registration},
    repository::RegistrationRepository,
    tree::ConcurrentTree,
};

/// The synthesized construction procedure for one (registration, closed type)
/// pair: the selected constructor with its parameter list, plus member
/// injections. Cached so repeat resolutions skip re-analysis; dependency
/// lifetimes and scope lookups are still evaluated on every invocation.
pub(crate) struct ConstructionPlan {
    descriptor: Arc<TypeDescriptor>,
    ctor_index: usize,
}

impl ConstructionPlan {
    #[inline]
    #[must_use]
    pub(crate) fn type_info(&self) -> TypeInfo {
        self.descriptor.type_info
    }

    #[inline]
    #[must_use]
    pub(crate) fn params(&self) -> &[ParamDescriptor] {
        &self.descriptor.constructors[self.ctor_index].params
    }

    #[inline]
    #[must_use]
    pub(crate) fn invoke(&self) -> &ErasedCtor {
        &self.descriptor.constructors[self.ctor_index].invoke
    }

    #[inline]
    #[must_use]
    pub(crate) fn members(&self) -> &[MemberDescriptor] {
        &self.descriptor.members
    }

    #[inline]
    #[must_use]
    pub(crate) fn disposer(&self) -> Option<&DisposerFn> {
        self.descriptor.disposer.as_ref()
    }
}

/// Builds the plan for `registration` over `descriptor`: applies the declared
/// constructor override, otherwise prefers the constructor whose parameters
/// are all satisfiable, tie-breaking by parameter count descending.
pub(crate) fn build_plan(
    registration: &Registration,
    descriptor: &Arc<TypeDescriptor>,
    repository: &RegistrationRepository,
) -> Result<Arc<ConstructionPlan>, ResolveErrorKind> {
    if descriptor.constructors.is_empty() {
        return Err(ResolveErrorKind::NoConstructor(descriptor.type_info));
    }

    let ctor_index = match registration.selected_constructor {
        Some(index) if index < descriptor.constructors.len() => index,
        _ => select_constructor(registration, descriptor, repository),
    };

    Ok(Arc::new(ConstructionPlan {
        descriptor: descriptor.clone(),
        ctor_index,
    }))
}

fn select_constructor(registration: &Registration, descriptor: &TypeDescriptor, repository: &RegistrationRepository) -> usize {
    let mut order: alloc::vec::Vec<usize> = (0..descriptor.constructors.len()).collect();
    order.sort_by_key(|&index| core::cmp::Reverse(descriptor.constructors[index].params.len()));

    order
        .iter()
        .copied()
        .find(|&index| {
            descriptor.constructors[index]
                .params
                .iter()
                .all(|param| satisfiable(registration, param, repository))
        })
        // resolution failures surface at build time with the widest constructor
        .unwrap_or(order[0])
}

fn satisfiable(registration: &Registration, param: &ParamDescriptor, repository: &RegistrationRepository) -> bool {
    if param.wrapper.is_some() || param.default.is_some() {
        return true;
    }
    let overridden = registration.overrides.iter().any(|ov| match ov {
        InjectionOverride::ByName(name, _) => param.arg_name == Some(*name),
        InjectionOverride::ByType(type_info, _) => *type_info == param.key.type_info,
    });
    overridden || repository.contains_key(&param.key)
}

/// Plans keyed by (registration sequence, closed-shape hash). The first
/// stored plan for a key wins.
pub(crate) struct PlanCache {
    plans: ConcurrentTree<Arc<ConstructionPlan>>,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanCache {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            plans: ConcurrentTree::new(),
        }
    }

    #[must_use]
    pub(crate) fn get(&self, sequence: u64, closed_hash: u64) -> Option<Arc<ConstructionPlan>> {
        self.plans.get(hash_one((sequence, closed_hash)))
    }

    pub(crate) fn store(&self, sequence: u64, closed_hash: u64, plan: Arc<ConstructionPlan>) -> Result<(), ResolveErrorKind> {
        self.plans
            .update(hash_one((sequence, closed_hash)), plan, &|old, _new| old.clone())
            .map_err(Into::into)
    }
}
