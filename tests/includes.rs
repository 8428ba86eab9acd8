use shimmytwig::{Context, Engine, EngineConfig, Error, FileSystemLoader, LoadError, MemoryLoader};
use std::fs;
use std::sync::Once;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("shimmytwig=debug")
            .with_test_writer()
            .init();
    });
}

fn engine() -> Engine {
    Engine::new().with_loader(
        MemoryLoader::new()
            .with("greet.twig", "Hi {{ name }}")
            .with("setter.twig", "{% set leaked = 1 %}")
            .with("self.twig", "x{% include 'self.twig' %}")
            .with("broken.twig", "\n{% if %}"),
    )
}

fn ada() -> Context {
    Context::new().with_var("name", "Ada")
}

#[test]
fn include_inherits_context() {
    assert_eq!(engine().render("{% include 'greet.twig' %}!", &ada()).unwrap(), "Hi Ada!");
}

#[test]
fn include_name_is_an_expression() {
    let ctx = ada().with_var("which", "greet");
    assert_eq!(engine().render("{% include which + '.twig' %}", &ctx).unwrap(), "Hi Ada");
}

#[test]
fn with_merges_over_context() {
    let out = engine()
        .render("{% include 'greet.twig' with {'name': 'Bob'} %}|{{ name }}", &ada())
        .unwrap();
    assert_eq!(out, "Hi Bob|Ada");
}

#[test]
fn only_drops_outer_context() {
    let engine = engine();
    assert_eq!(engine.render("{% include 'greet.twig' only %}", &ada()).unwrap(), "Hi ");
    assert_eq!(
        engine.render("{% include 'greet.twig' with {'name': 'Eve'} only %}", &ada()).unwrap(),
        "Hi Eve"
    );
}

#[test]
fn include_inside_loop_sees_loop_variable() {
    let out = engine()
        .render(
            "{% for name in ['a', 'b'] %}{% include 'greet.twig' %};{% endfor %}",
            &Context::new(),
        )
        .unwrap();
    assert_eq!(out, "Hi a;Hi b;");
}

#[test]
fn included_sets_stay_local() {
    let out = engine()
        .render("{% include 'setter.twig' %}[{{ leaked }}]", &Context::new())
        .unwrap();
    assert_eq!(out, "[]");
}

#[test]
fn include_target_must_be_string() {
    let err = engine().render("\n{% include 42 %}", &Context::new()).unwrap_err();
    assert_eq!(
        err,
        Error::Runtime {
            line: 2,
            message: "include target must be a string, got number".into()
        }
    );
}

#[test]
fn with_payload_must_be_map() {
    let err = engine().render("{% include 'greet.twig' with [1] %}", &Context::new()).unwrap_err();
    assert_eq!(
        err,
        Error::Runtime {
            line: 1,
            message: "dictionary expected".into()
        }
    );
}

#[test]
fn missing_template_names_file_and_line() {
    let err = engine().render("a\nb\n{% include 'nope.twig' %}", &Context::new()).unwrap_err();
    assert!(err.is_runtime());
    assert_eq!(err.line(), 3);
    assert!(err.to_string().contains("could not open `nope.twig`"));
}

#[test]
fn include_without_loader_is_runtime_error() {
    let err = Engine::new().render("{% include 'greet.twig' %}", &Context::new()).unwrap_err();
    assert!(err.is_runtime());
    assert!(err.to_string().contains("no loader configured"));
}

#[test]
fn runaway_recursion_is_bounded() {
    init_tracing();
    let err = engine().render("{% include 'self.twig' %}", &Context::new()).unwrap_err();
    assert!(err.to_string().contains("include depth limit of 16"));
}

#[test]
fn include_depth_is_configurable() {
    let loader = MemoryLoader::new()
        .with("a", "A{% include 'b' %}")
        .with("b", "B{% include 'c' %}")
        .with("c", "C");
    let shallow = Engine::with_config(EngineConfig {
        max_include_depth: 2,
        ..EngineConfig::default()
    })
    .with_loader(loader.clone());
    assert!(shallow.render("{% include 'a' %}", &Context::new()).is_err());

    let deep = Engine::new().with_loader(loader);
    assert_eq!(deep.render("{% include 'a' %}", &Context::new()).unwrap(), "ABC");
}

#[test]
fn errors_in_included_template_surface() {
    let err = engine().render("{% include 'broken.twig' %}", &Context::new()).unwrap_err();
    assert!(err.is_syntax());
    assert_eq!(err.line(), 2);
}

#[test]
fn closure_loader() {
    let engine = Engine::new().with_loader(|name: &str| -> Result<String, LoadError> {
        Ok(format!("<{name}:{{{{ v }}}}>"))
    });
    let ctx = Context::new().with_var("v", 1);
    assert_eq!(engine.render("{% include 'x' %}", &ctx).unwrap(), "<x:1>");
}

#[test]
fn file_system_loader_reads_below_root() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("partials")).unwrap();
    fs::write(dir.path().join("partials/footer.twig"), "-- {{ site }} --").unwrap();
    fs::write(dir.path().join("page.twig"), "body\n{% include 'partials/footer.twig' %}").unwrap();

    let engine = Engine::new().with_loader(FileSystemLoader::new(dir.path()));
    let ctx = Context::new().with_var("site", "example");
    assert_eq!(engine.render_template("page.twig", &ctx).unwrap(), "body\n-- example --");
}

#[test]
fn file_system_loader_rejects_parent_escapes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new().with_loader(FileSystemLoader::new(dir.path()));
    let err = engine.render("{% include '../outside.twig' %}", &Context::new()).unwrap_err();
    assert!(err.is_runtime());
    assert!(err.to_string().contains("not allowed"));
}
