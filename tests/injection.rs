use bindery::{param, Container, Registration, ResolveErrorKind, TypeDescriptor};
use std::sync::Arc;
use tracing_test::traced_test;

#[derive(Debug)]
struct Connection {
    url: String,
}

#[derive(Debug)]
struct Repo {
    connection: Arc<Connection>,
    label: Option<String>,
}

fn repo_descriptor() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder::<Repo>()
        .constructor(vec![param::<Connection>().arg("connection")], |args| {
            Ok(Repo {
                connection: args.shared()?,
                label: None,
            })
        })
        .member("label", param::<String>(), |repo, resolved| {
            repo.label = Some(resolved.value()?);
            Ok(())
        })
        .finish()
}

#[test]
#[traced_test]
fn test_member_injection() {
    let container = Container::new();
    container
        .register(Registration::instance(Connection { url: "db://a".into() }))
        .unwrap();
    container.register(Registration::instance(String::from("primary"))).unwrap();
    container.register(Registration::with_descriptor::<Repo>(repo_descriptor())).unwrap();

    let repo = container.resolve::<Repo>().unwrap();
    assert_eq!(repo.connection.url, "db://a");
    assert_eq!(repo.label.as_deref(), Some("primary"));
}

#[test]
#[traced_test]
fn test_named_injection_override() {
    let container = Container::new();
    container
        .register(Registration::instance(Connection { url: "db://a".into() }))
        .unwrap();
    container.register(Registration::instance(String::from("primary"))).unwrap();
    container
        .register(
            Registration::with_descriptor::<Repo>(repo_descriptor())
                .with_named_override("connection", Connection { url: "db://override".into() }),
        )
        .unwrap();

    let repo = container.resolve::<Repo>().unwrap();
    assert_eq!(repo.connection.url, "db://override");
}

#[test]
#[traced_test]
fn test_typed_injection_override_reaches_members() {
    let container = Container::new();
    container
        .register(Registration::instance(Connection { url: "db://a".into() }))
        .unwrap();
    container
        .register(
            Registration::with_descriptor::<Repo>(repo_descriptor()).with_override(String::from("overridden")),
        )
        .unwrap();

    let repo = container.resolve::<Repo>().unwrap();
    assert_eq!(repo.label.as_deref(), Some("overridden"));
}

#[test]
#[traced_test]
fn test_default_value_used_when_dependency_missing() {
    struct Limits {
        max: u32,
    }

    let descriptor = TypeDescriptor::builder::<Limits>()
        .constructor(vec![param::<u32>().with_default(|| 64u32)], |args| {
            Ok(Limits { max: args.value()? })
        })
        .finish();

    let container = Container::new();
    container.register(Registration::with_descriptor::<Limits>(descriptor)).unwrap();

    assert_eq!(container.resolve::<Limits>().unwrap().max, 64);
}

#[test]
#[traced_test]
fn test_unsatisfied_dependency_names_both_types() {
    let container = Container::new();
    container.register(Registration::with_descriptor::<Repo>(repo_descriptor())).unwrap();

    match container.resolve::<Repo>().unwrap_err() {
        ResolveErrorKind::UnsatisfiedDependency { requested, dependency } => {
            assert!(requested.name.contains("Repo"));
            assert!(dependency.name.contains("Connection"));
        }
        other => panic!("expected an unsatisfied-dependency error, got {other}"),
    }
}

struct Audit;
struct Metrics {
    sink: Arc<String>,
}

#[test]
#[traced_test]
fn test_target_condition_shadows_unconditioned() {
    let container = Container::new();
    container.register(Registration::instance(String::from("anywhere"))).unwrap();
    container
        .register(Registration::instance(String::from("metrics-only")).for_target::<Metrics>())
        .unwrap();

    let descriptor = TypeDescriptor::builder::<Metrics>()
        .constructor(vec![param::<String>()], |args| Ok(Metrics { sink: args.shared()? }))
        .finish();
    container.register(Registration::with_descriptor::<Metrics>(descriptor)).unwrap();

    // As a dependency of Metrics, the conditioned candidate shadows the rest.
    assert_eq!(*container.resolve::<Metrics>().unwrap().sink, "metrics-only");

    // A direct request has no parent, so the conditioned candidate does not
    // apply and nothing else is eligible.
    assert!(matches!(
        container.resolve::<String>(),
        Err(ResolveErrorKind::NoRegistration(_)),
    ));
}

#[test]
#[traced_test]
fn test_attribute_condition_matches_annotated_site() {
    let container = Container::new();
    container.register(Registration::instance(String::from("plain"))).unwrap();
    container
        .register(Registration::instance(String::from("audited")).when_attributed::<Audit>())
        .unwrap();

    let descriptor = TypeDescriptor::builder::<Metrics>()
        .constructor(vec![param::<String>().attributed::<Audit>()], |args| {
            Ok(Metrics { sink: args.shared()? })
        })
        .finish();
    container.register(Registration::with_descriptor::<Metrics>(descriptor)).unwrap();

    assert_eq!(*container.resolve::<Metrics>().unwrap().sink, "audited");
}

struct Fanout {
    all: Vec<Arc<u8>>,
    lazy_sum: bindery::Lazy<u8>,
    single: bindery::Tuple<u8>,
}

#[test]
#[traced_test]
fn test_wrapper_forms_as_constructor_dependencies() {
    let container = Container::new();
    container.register(Registration::factory(|_| Ok(1u8))).unwrap();
    container.register(Registration::factory(|_| Ok(2u8))).unwrap();

    let descriptor = TypeDescriptor::builder::<Fanout>()
        .constructor(
            vec![
                param::<u8>().collection(),
                param::<u8>().lazy(),
                param::<u8>().tuple(),
            ],
            |args| {
                Ok(Fanout {
                    all: args.many()?,
                    lazy_sum: args.lazy()?,
                    single: args.tuple()?,
                })
            },
        )
        .finish();
    container.register(Registration::with_descriptor::<Fanout>(descriptor)).unwrap();

    let fanout = container.resolve::<Fanout>().unwrap();
    assert_eq!(fanout.all.iter().map(|v| **v).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(*fanout.lazy_sum.get().unwrap(), 2);
    assert_eq!(*fanout.single.0, 2);
}

#[test]
#[traced_test]
fn test_container_introspection_surface() {
    let container = Container::new();
    container.register(Registration::with_descriptor::<Repo>(repo_descriptor())).unwrap();
    container
        .register(Registration::instance(Connection { url: "db://a".into() }).with_name("primary"))
        .unwrap();

    assert!(container.contains::<Repo>(None));
    assert!(container.contains::<Connection>(Some("primary")));
    assert!(!container.contains::<Connection>(Some("replica")));
    assert!(!container.contains::<u128>(None));

    assert!(container.descriptor_of::<Repo>().is_some());
    assert!(container.descriptor_of::<Connection>().is_none());

    let mappings = container.registration_mappings();
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[1].1, Some("primary"));
}

#[test]
#[traced_test]
fn test_resolution_condition_closure() {
    let container = Container::new();
    container.register(Registration::instance(1u8)).unwrap();
    container
        .register(Registration::instance(2u8).when(|key| key.is_member))
        .unwrap();

    struct Holder {
        first: Option<u8>,
    }

    let descriptor = TypeDescriptor::builder::<Holder>()
        .constructor(vec![], |_| Ok(Holder { first: None }))
        .member("first", param::<u8>(), |holder, resolved| {
            holder.first = Some(resolved.value()?);
            Ok(())
        })
        .finish();
    container.register(Registration::with_descriptor::<Holder>(descriptor)).unwrap();

    // Member sites satisfy the condition, so the conditioned value wins.
    assert_eq!(container.resolve::<Holder>().unwrap().first, Some(2));
}
