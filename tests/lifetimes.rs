use bindery::{param, Container, Disposable, Registration, ResolveErrorKind, TypeDescriptor};
use std::sync::{
    atomic::{AtomicU8, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tracing_test::traced_test;

struct Counter(AtomicU8);

fn counting() -> (Registration, Arc<Counter>) {
    let counter = Arc::new(Counter(AtomicU8::new(0)));
    let registration = Registration::factory({
        let counter = counter.clone();
        move |_| {
            counter.0.fetch_add(1, Ordering::SeqCst);
            Ok(0u32)
        }
    });
    (registration, counter)
}

#[test]
#[traced_test]
fn test_transient_builds_every_time() {
    let container = Container::new();
    let (registration, counter) = counting();
    container.register(registration).unwrap();

    let a = container.resolve::<u32>().unwrap();
    let b = container.resolve::<u32>().unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(counter.0.load(Ordering::SeqCst), 2);
}

#[test]
#[traced_test]
fn test_singleton_shared_across_scopes() {
    let container = Container::new();
    let (registration, counter) = counting();
    container.register(registration.singleton()).unwrap();

    let root_instance = container.resolve::<u32>().unwrap();
    let scope = container.begin_scope();
    let scoped_instance = scope.resolve::<u32>().unwrap();
    scope.dispose();
    let after = container.begin_scope().resolve::<u32>().unwrap();

    assert!(Arc::ptr_eq(&root_instance, &scoped_instance));
    assert!(Arc::ptr_eq(&root_instance, &after));
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_scoped_reused_within_scope_fresh_after_disposal() {
    let container = Container::new();
    let (registration, counter) = counting();
    container.register(registration.scoped()).unwrap();

    let scope = container.begin_scope();
    let a = scope.resolve::<u32>().unwrap();
    let b = scope.resolve::<u32>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    scope.dispose();

    let next = container.begin_scope();
    let c = next.resolve::<u32>().unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(counter.0.load(Ordering::SeqCst), 2);
}

struct Tracked {
    id: u8,
    log: Arc<Mutex<Vec<u8>>>,
    disposals: Arc<AtomicUsize>,
}

impl Disposable for Tracked {
    fn dispose(&self) {
        self.log.lock().unwrap().push(self.id);
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
#[traced_test]
fn test_disposal_reverse_order_exactly_once() {
    let log: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let disposals = Arc::new(AtomicUsize::new(0));

    let container = Container::new();
    for (id, name) in [(1u8, "first"), (2u8, "second")] {
        let log = log.clone();
        let disposals = disposals.clone();
        let descriptor = TypeDescriptor::builder::<Tracked>()
            .constructor(vec![], move |_| {
                Ok(Tracked {
                    id,
                    log: log.clone(),
                    disposals: disposals.clone(),
                })
            })
            .disposable()
            .finish();
        container
            .register(Registration::with_descriptor::<Tracked>(descriptor).scoped().with_name(name))
            .unwrap();
    }

    let scope = container.begin_scope();
    let _first = scope.resolve_named::<Tracked>("first").unwrap();
    let _second = scope.resolve_named::<Tracked>("second").unwrap();

    scope.dispose();
    assert_eq!(*log.lock().unwrap(), vec![2, 1]);
    assert_eq!(disposals.load(Ordering::SeqCst), 2);

    // A second teardown is a no-op.
    scope.dispose();
    assert_eq!(disposals.load(Ordering::SeqCst), 2);
}

#[test]
#[traced_test]
fn test_finalizers_run_before_disposals_in_lifo_order() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let disposals = Arc::new(AtomicUsize::new(0));

    let container = Container::new();
    let descriptor = TypeDescriptor::builder::<Tracked>()
        .constructor(vec![], {
            let log2: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
            let disposals = disposals.clone();
            move |_| {
                Ok(Tracked {
                    id: 9,
                    log: log2.clone(),
                    disposals: disposals.clone(),
                })
            }
        })
        .disposable()
        .finish();
    container
        .register(Registration::with_descriptor::<Tracked>(descriptor).scoped().with_finalizer({
            let log = log.clone();
            move |_: Arc<Tracked>| {
                log.lock().unwrap().push("finalizer");
            }
        }))
        .unwrap();
    container
        .register(Registration::factory(|_| Ok(5u32)).scoped().with_finalizer({
            let log = log.clone();
            move |_: Arc<u32>| {
                log.lock().unwrap().push("last-finalizer");
            }
        }))
        .unwrap();

    let scope = container.begin_scope();
    let _tracked = scope.resolve::<Tracked>().unwrap();
    let _number = scope.resolve::<u32>().unwrap();
    scope.dispose();

    // Finalizers in most-recently-resolved-first order, then disposals.
    assert_eq!(*log.lock().unwrap(), vec!["last-finalizer", "finalizer"]);
    assert_eq!(disposals.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_try_resolve_suppresses_missing_registration_only() {
    let container = Container::new();
    assert!(container.try_resolve::<u32>().unwrap().is_none());

    container.register(Registration::factory(|_| Ok(1u32))).unwrap();
    assert_eq!(*container.try_resolve::<u32>().unwrap().unwrap(), 1);
}

#[test]
#[traced_test]
fn test_missing_registration_is_an_error() {
    let container = Container::new();
    assert!(matches!(
        container.resolve::<u32>(),
        Err(ResolveErrorKind::NoRegistration(info)) if info.name.contains("u32"),
    ));
}

struct Message(String);
struct Report {
    body: String,
}

#[test]
#[traced_test]
fn test_factory_argument_overrides_lookup() {
    let container = Container::new();
    container.register(Registration::instance(Message("default".into()))).unwrap();

    let descriptor = TypeDescriptor::builder::<Report>()
        .constructor(vec![param::<Message>()], |args| {
            Ok(Report {
                body: args.shared::<Message>()?.0.clone(),
            })
        })
        .finish();
    container.register(Registration::with_descriptor::<Report>(descriptor)).unwrap();

    let plain = container.resolve::<Report>().unwrap();
    assert_eq!(plain.body, "default");

    let factory = container.resolve_factory1::<Message, Report>().unwrap();
    let overridden = factory.call(Message("supplied".into())).unwrap();
    assert_eq!(overridden.body, "supplied");
}

#[test]
#[traced_test]
fn test_instance_registration_is_shared() {
    let container = Container::new();
    container.register(Registration::instance(7u64)).unwrap();

    let a = container.resolve::<u64>().unwrap();
    let b = container.begin_scope().resolve::<u64>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}
