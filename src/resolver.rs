use alloc::{sync::Arc, vec::Vec};
use tracing::{debug, debug_span, error};

use crate::{
    any::{RcAny, TypeInfo},
    context::ResolutionContext,
    descriptor::{ArgList, ParamDescriptor, Resolved},
    errors::{InstantiatorErrorKind, ResolveErrorKind},
    key::TypeKey,
    plan::{build_plan, ConstructionPlan},
    registration::{InjectionOverride, Provider, Registration},
    scope::ResolutionScope,
    wrappers::{ErasedDeferred, ErasedLazy, WrapperKind},
};

/// Resolves one instance for `key`, or `Ok(None)` when nothing is registered
/// and the caller allows an absent result. Failures other than a missing
/// registration are never suppressed.
pub(crate) fn resolve_shared(
    scope: &ResolutionScope,
    ctx: &mut ResolutionContext,
    key: &TypeKey,
    null_allowed: bool,
) -> Result<Option<RcAny>, ResolveErrorKind> {
    let span = debug_span!("resolve", dependency = key.type_info.name);
    let _guard = span.enter();

    if let Some(value) = ctx.parameter_for(&key.type_info) {
        debug!("Found among caller-supplied parameters");
        return Ok(Some(value));
    }

    let Some(registration) = select_single(scope, key)? else {
        if null_allowed {
            debug!("No registration, absent result allowed");
            return Ok(None);
        }
        let err = ResolveErrorKind::NoRegistration(key.type_info);
        error!("{}", err);
        return Err(err);
    };

    build_registration(scope, ctx, key, &registration).map(Some)
}

/// Resolves one instance per eligible registration, in registration order.
pub(crate) fn resolve_all(scope: &ResolutionScope, ctx: &mut ResolutionContext, key: &TypeKey) -> Result<Vec<RcAny>, ResolveErrorKind> {
    let span = debug_span!("resolve_all", dependency = key.type_info.name);
    let _guard = span.enter();

    eligible_candidates(scope, key)?
        .iter()
        .map(|registration| build_registration(scope, ctx, key, registration))
        .collect()
}

/// Validates that a request would select a registration, without building.
/// Used by the deferred/lazy wrapper resolvers at wrap time.
pub(crate) fn ensure_resolvable(scope: &ResolutionScope, key: &TypeKey) -> Result<(), ResolveErrorKind> {
    match select_single(scope, key)? {
        Some(_) => Ok(()),
        None => Err(ResolveErrorKind::NoRegistration(key.type_info)),
    }
}

/// A deferred factory re-entering the engine against `scope` on every call,
/// with caller-supplied values taking precedence over repository lookup.
#[must_use]
pub(crate) fn make_deferred(scope: &ResolutionScope, key: &TypeKey) -> ErasedDeferred {
    let scope = scope.clone();
    let key = key.clone();
    ErasedDeferred::new(Arc::new(move |overrides| {
        let mut ctx = ResolutionContext::with_parameters(overrides);
        resolve_shared(&scope, &mut ctx, &key, false)?.ok_or(ResolveErrorKind::NoRegistration(key.type_info))
    }))
}

/// Applies the §selection rules: condition gate, generic-constraint filter,
/// named-scope partition. The result is in registration order; the "single"
/// pick is the most specific, last-registered entry.
fn eligible_candidates(scope: &ResolutionScope, key: &TypeKey) -> Result<Vec<Arc<Registration>>, ResolveErrorKind> {
    let services = &scope.services;
    let candidates = services.repository.get_candidates(key);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // Conditioned candidates shadow unconditioned ones.
    let any_conditioned = candidates.iter().any(|registration| registration.has_condition());
    let mut eligible: Vec<Arc<Registration>> = candidates
        .into_iter()
        .filter(|registration| (!any_conditioned || registration.has_condition()) && registration.is_usable_for(key))
        .collect();

    // Generic-constraint filter: an explicitly constrained request set that
    // satisfies nothing is an error, not a silent fallback.
    if let Some(shape) = &key.shape {
        let any_generic = eligible
            .iter()
            .any(|registration| matches!(registration.provider, Provider::OpenGeneric { .. }));
        if any_generic {
            let satisfied: Vec<Arc<Registration>> = eligible
                .iter()
                .filter(|registration| registration.satisfies_constraints(key, &services.meta))
                .cloned()
                .collect();
            if satisfied.is_empty() {
                let err = ResolveErrorKind::ConstraintViolation {
                    definition: shape.definition,
                };
                error!("{}", err);
                return Err(err);
            }
            eligible = satisfied;
        }
    }

    // Named-scope preference: candidates whose affinity matches the active
    // chain win outright; otherwise scoped candidates step aside unless they
    // are all there is (then they build with the transient fallback).
    let scoped: Vec<Arc<Registration>> = eligible
        .iter()
        .filter(|registration| {
            registration
                .named_scope()
                .is_some_and(|name| scope.find_named(name).is_some())
        })
        .cloned()
        .collect();
    if !scoped.is_empty() {
        return Ok(scoped);
    }
    let unscoped: Vec<Arc<Registration>> = eligible
        .iter()
        .filter(|registration| registration.named_scope().is_none())
        .cloned()
        .collect();
    if unscoped.is_empty() {
        Ok(eligible)
    } else {
        Ok(unscoped)
    }
}

pub(crate) fn select_single(scope: &ResolutionScope, key: &TypeKey) -> Result<Option<Arc<Registration>>, ResolveErrorKind> {
    let eligible = eligible_candidates(scope, key)?;
    Ok(eligible
        .into_iter()
        .max_by_key(|registration| (registration.constraint_specificity(), registration.sequence)))
}

/// Consults the lifetime policy, guards the construction against cycles,
/// applies decorators, then stores and tracks the result.
fn build_registration(
    scope: &ResolutionScope,
    ctx: &mut ResolutionContext,
    key: &TypeKey,
    registration: &Arc<Registration>,
) -> Result<RcAny, ResolveErrorKind> {
    let storage = registration.lifetime.storage_scope(scope);
    let instance_key = (registration.sequence, key.closed_hash());

    if let Some(store) = &storage {
        if let Some(existing) = store.get_instance(instance_key) {
            debug!("Found in scope cache");
            return Ok(existing);
        }
    }

    // Lifecycle tracking follows the instance's storage scope; transients are
    // tracked where they were resolved.
    let lifecycle = storage.clone().unwrap_or_else(|| scope.clone());

    ctx.enter(key.type_info)?;
    let result = construct_and_decorate(scope, ctx, key, registration, &lifecycle);
    ctx.exit(&key.type_info);
    let value = result?;

    if let Some(store) = &storage {
        store.store_instance(instance_key, value.clone());
        debug!("Stored in scope cache");
    }
    if let Some(finalizer) = &registration.finalizer {
        lifecycle.track_finalized(value.clone(), finalizer.clone());
        debug!("Finalizer tracked");
    }

    Ok(value)
}

fn construct_and_decorate(
    scope: &ResolutionScope,
    ctx: &mut ResolutionContext,
    key: &TypeKey,
    registration: &Arc<Registration>,
    lifecycle: &ResolutionScope,
) -> Result<RcAny, ResolveErrorKind> {
    // A scope-defining registration resolves its whole subtree inside a fresh
    // named scope whose teardown follows the resolving scope's.
    let build_scope = match registration.defines_scope {
        Some(name) => {
            let child = scope.begin_named_scope(name);
            lifecycle.track_disposable(Arc::new(child.clone()));
            child
        }
        None => scope.clone(),
    };

    let mut value = construct(&build_scope, ctx, key, registration, lifecycle)?;

    for decorator in scope.services.repository.get_decorators(&key.type_info) {
        ctx.push_decorated(key.type_info, value.clone());
        let decorated = construct(&build_scope, ctx, key, &decorator, lifecycle);
        ctx.pop_decorated();
        value = decorated?;
        debug!("Decorator applied");
    }

    Ok(value)
}

fn construct(
    scope: &ResolutionScope,
    ctx: &mut ResolutionContext,
    key: &TypeKey,
    registration: &Arc<Registration>,
    lifecycle: &ResolutionScope,
) -> Result<RcAny, ResolveErrorKind> {
    let services = &scope.services;

    match &registration.provider {
        Provider::Instance(value) => Ok(value.clone()),
        Provider::Factory(instantiator) => {
            let mut instantiator = instantiator.clone();
            match crate::service::Service::call(&mut instantiator, scope.clone()) {
                Ok(boxed) => Ok(Arc::from(boxed)),
                Err(err) => {
                    error!("{}", err);
                    Err(ResolveErrorKind::Instantiator(InstantiatorErrorKind::Factory(err)))
                }
            }
        }
        Provider::Plan(descriptor) => {
            let plan = match services.plans.get(registration.sequence, key.closed_hash()) {
                Some(plan) => plan,
                None => {
                    let plan = build_plan(registration, descriptor, &services.repository)?;
                    services.plans.store(registration.sequence, key.closed_hash(), plan.clone())?;
                    plan
                }
            };
            invoke_plan(scope, ctx, registration, &plan, lifecycle)
        }
        Provider::OpenGeneric { definition, closer } => {
            let Some(shape) = &key.shape else {
                return Err(ResolveErrorKind::MissingGenericShape(key.type_info));
            };
            let plan = match services.plans.get(registration.sequence, key.closed_hash()) {
                Some(plan) => plan,
                None => {
                    let Some(closed) = closer.close(shape) else {
                        let err = ResolveErrorKind::ConstraintViolation {
                            definition: definition.type_info(),
                        };
                        error!("{}", err);
                        return Err(err);
                    };
                    let plan = build_plan(registration, &closed, &services.repository)?;
                    services.plans.store(registration.sequence, key.closed_hash(), plan.clone())?;
                    plan
                }
            };
            invoke_plan(scope, ctx, registration, &plan, lifecycle)
        }
    }
}

fn invoke_plan(
    scope: &ResolutionScope,
    ctx: &mut ResolutionContext,
    registration: &Arc<Registration>,
    plan: &Arc<ConstructionPlan>,
    lifecycle: &ResolutionScope,
) -> Result<RcAny, ResolveErrorKind> {
    let mut args = Vec::with_capacity(plan.params().len());
    for param in plan.params() {
        args.push(resolve_param(scope, ctx, plan.type_info(), registration, param)?);
    }

    let mut boxed = match (plan.invoke().as_ref())(ArgList::new(args)) {
        Ok(boxed) => boxed,
        Err(err) => {
            error!("{}", err);
            return Err(ResolveErrorKind::Instantiator(InstantiatorErrorKind::Factory(err)));
        }
    };

    for member in plan.members() {
        let resolved = resolve_param(scope, ctx, plan.type_info(), registration, &member.param)?;
        if let Err(err) = (member.inject.as_ref())(&mut *boxed, resolved) {
            error!("{}", err);
            return Err(ResolveErrorKind::Instantiator(InstantiatorErrorKind::Factory(err)));
        }
    }

    let value: RcAny = Arc::from(boxed);

    if registration.track_disposal {
        if let Some(disposer) = plan.disposer() {
            if let Some(disposable) = (disposer.as_ref())(&value) {
                lifecycle.track_disposable(disposable);
                debug!("Tracked for disposal");
            }
        }
    }

    Ok(value)
}

/// Resolves one dependency edge: registration overrides first, then the
/// in-progress decoration stack, then the wrapper resolvers, then ordinary
/// repository-backed resolution with the declared default as last resort.
fn resolve_param(
    scope: &ResolutionScope,
    ctx: &mut ResolutionContext,
    owner: TypeInfo,
    registration: &Arc<Registration>,
    param: &ParamDescriptor,
) -> Result<Resolved, ResolveErrorKind> {
    for injection_override in &registration.overrides {
        match injection_override {
            InjectionOverride::ByName(name, value) if param.arg_name == Some(*name) => {
                return Ok(Resolved::from_shared(value.clone()));
            }
            InjectionOverride::ByType(type_info, value) if *type_info == param.key.type_info => {
                return Ok(Resolved::from_shared(value.clone()));
            }
            _ => {}
        }
    }

    if param.wrapper.is_none() {
        if let Some(value) = ctx.decorated_for(&param.key.type_info) {
            debug!("Injecting pre-decoration instance");
            return Ok(Resolved::from_shared(value));
        }
    }

    match param.wrapper {
        Some(WrapperKind::Deferred) => Ok(Resolved::from_deferred(make_deferred(scope, &param.key))),
        Some(WrapperKind::Lazy) => Ok(Resolved::from_lazy(ErasedLazy::new(make_deferred(scope, &param.key)))),
        Some(WrapperKind::Collection) => resolve_all(scope, ctx, &param.key).map(Resolved::from_many),
        Some(WrapperKind::Tuple) => match resolve_shared(scope, ctx, &param.key, false)? {
            Some(value) => Ok(Resolved::from_tuple(value)),
            None => Err(unsatisfied(owner, &param.key)),
        },
        None => match resolve_shared(scope, ctx, &param.key, true)? {
            Some(value) => Ok(Resolved::from_shared(value)),
            None => match &param.default {
                Some(default) => {
                    debug!("Using declared default value");
                    Ok(Resolved::from_shared((default.as_ref())()))
                }
                None => {
                    let err = unsatisfied(owner, &param.key);
                    error!("{}", err);
                    Err(err)
                }
            },
        },
    }
}

fn unsatisfied(owner: TypeInfo, key: &TypeKey) -> ResolveErrorKind {
    ResolveErrorKind::UnsatisfiedDependency {
        requested: owner,
        dependency: key.type_info,
    }
}
