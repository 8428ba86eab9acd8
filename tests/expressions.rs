use rstest::{fixture, rstest};
use serde_json::json;
use shimmytwig::{parse_expression, Context, Engine, Error};

#[fixture]
fn ctx() -> Context {
    Context::from_json(json!({
        "user": {"name": "Ada", "tags": ["math", "code"]},
        "n": 7,
        "items": [1, 2, 3]
    }))
    .unwrap()
}

fn eval(src: &str, ctx: &Context) -> String {
    Engine::new()
        .eval(src, ctx)
        .unwrap_or_else(|err| panic!("{src}: {err}"))
        .to_string()
}

#[rstest]
#[case("2 + 3 * 4", "14")]
#[case("(2 + 3) * 4", "20")]
#[case("10 - 4 - 3", "9")]
#[case("2 ** 10", "1024")]
#[case("7 / 2", "3.5")]
#[case("7 // 2", "3")]
#[case("-3 + 5", "2")]
#[case("1 + '1'", "11")]
#[case("true + 1", "2")]
#[case("5 b-and 3 b-or 8", "9")]
#[case("6 b-xor 3", "5")]
fn arithmetic(#[case] src: &str, #[case] expected: &str) {
    assert_eq!(eval(src, &Context::new()), expected);
}

#[rstest]
#[case("not true or true", "true")]
#[case("not (true or true)", "false")]
#[case("1 < 2 and 2 < 3", "true")]
#[case("0 or 'x'", "x")]
#[case("'b' > 'a'", "true")]
#[case("'10' < '9'", "true")]
#[case("10 < 9", "false")]
#[case("'7' == 7", "true")]
#[case("'7' === 7", "false")]
#[case("'7' !== 7", "true")]
#[case("null == missing", "true")]
#[case("null === missing", "false")]
fn logic_and_comparison(#[case] src: &str, #[case] expected: &str) {
    assert_eq!(eval(src, &Context::new()), expected);
}

#[rstest]
#[case("1 in [1, 2]", "true")]
#[case("3 in 1..5", "true")]
#[case("'z' in 'a'..'e'", "false")]
#[case("'ell' in 'hello'", "true")]
#[case("'k' in {'k': 1}", "true")]
#[case("'abc' starts with 'a'", "true")]
#[case("'abc' ends with 'bc'", "true")]
#[case("'abc' matches '/^A/i'", "true")]
#[case("[] is empty", "true")]
#[case("{} is empty", "true")]
#[case("0 is empty", "false")]
#[case("missing is defined", "false")]
#[case("null is null", "true")]
#[case("'x' is iterable", "true")]
#[case("3 is odd", "true")]
#[case("4 is not odd", "true")]
fn tests_and_membership(#[case] src: &str, #[case] expected: &str) {
    assert_eq!(eval(src, &Context::new()), expected);
}

#[rstest]
#[case("'Hello' | upper | lower", "hello")]
#[case("'  pad ' | trim | length", "3")]
#[case("[3, 1, 2] | first", "3")]
#[case("[3, 1, 2] | last", "2")]
#[case("{'a': 1, 'b': 2} | keys", "a,b")]
#[case("missing | default('none')", "none")]
#[case("'hello world' | capitalize", "Hello world")]
#[case("-5 | abs", "5")]
#[case("min(4, 2, 8)", "2")]
#[case("max([4, 2, 8])", "8")]
#[case("range(0, 10, 5)", "0,5,10")]
#[case("'a'..'c'", "a,b,c")]
#[case("'<p>' | escape('html')", "&lt;p&gt;")]
#[case("'<p>' | raw", "<p>")]
#[case(r"'it\'s'", "it's")]
fn stdlib_calls(#[case] src: &str, #[case] expected: &str) {
    assert_eq!(eval(src, &Context::new()), expected);
}

#[rstest]
#[case("user.name", "Ada")]
#[case("user['tags'][1]", "code")]
#[case("user.tags | length", "2")]
#[case("items[n]", "")]
#[case("n % 4", "3")]
#[case("n in items", "false")]
#[case("user.missing.deeper", "")]
#[case("'tags: ' + user.tags", "tags: math,code")]
fn context_lookups(ctx: Context, #[case] src: &str, #[case] expected: &str) {
    assert_eq!(eval(src, &ctx), expected);
}

fn kind(err: &Error) -> &'static str {
    match err {
        Error::Lex { .. } => "lex",
        Error::Syntax { .. } => "syntax",
        Error::Runtime { .. } => "runtime",
    }
}

#[rstest]
#[case("1 +", "syntax")]
#[case("(1", "syntax")]
#[case("[1, 2", "syntax")]
#[case("{'a' 1}", "syntax")]
#[case("1 2", "syntax")]
#[case("x is blue", "syntax")]
#[case("a @ b", "lex")]
#[case("nope()", "runtime")]
#[case("'x' | nope", "runtime")]
#[case("'x' matches 'bad'", "runtime")]
#[case("range(1, 2, 0)", "runtime")]
fn errors(#[case] src: &str, #[case] expected: &str) {
    let err = Engine::new().eval(src, &Context::new()).unwrap_err();
    assert_eq!(kind(&err), expected, "{src}: {err}");
    assert_eq!(err.line(), 1);
}

#[test]
fn same_source_shares_compiled_tree_across_contexts() {
    let engine = Engine::new();
    let a = Context::new().with_var("x", "first");
    let b = Context::new().with_var("x", "second");
    assert_eq!(engine.eval("x | upper", &a).unwrap().to_string(), "FIRST");
    assert_eq!(engine.eval("x | upper", &b).unwrap().to_string(), "SECOND");
    assert_eq!(engine.cache().len(), 1);
}

#[test]
fn ast_dump_is_graphviz() {
    let dot = parse_expression("a.b[0] + f(1)", 1).unwrap().to_dot();
    assert!(dot.starts_with("digraph ast {"));
    assert!(dot.contains("[label=\"a.b\"]"));
    assert!(dot.contains("[label=\"f()\"]"));
    assert!(dot.trim_end().ends_with('}'));
}
