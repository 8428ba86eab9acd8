use serde_json::json;
use shimmytwig::{render, Context, Engine, EngineConfig, Error, Map, Value};

fn messages(roles: &[&str]) -> Context {
    let list: Vec<_> = roles
        .iter()
        .map(|role| json!({"role": role, "content": format!("{role} says hi")}))
        .collect();
    Context::from_json(json!({ "messages": list })).unwrap()
}

// ── Text and interpolation ──

#[test]
fn plain_text_template_no_tags() {
    let template = "Hello, world!\n  <b>{not a tag}</b>\n";
    assert_eq!(render(template, &Context::new()).unwrap(), template);
}

#[test]
fn context_var_outside_loop() {
    let mut ctx = Context::new();
    ctx.set_var("bos_token", "<s>");
    ctx.set_var("eos_token", "</s>");
    let rendered = render("{{ bos_token }}PROMPT{{eos_token}}", &ctx).unwrap();
    assert_eq!(rendered, "<s>PROMPT</s>");
}

#[test]
fn special_characters_are_not_escaped_implicitly() {
    let ctx = Context::new().with_var("content", "Hello <world> & \"friends\"");
    assert_eq!(render("{{ content }}", &ctx).unwrap(), "Hello <world> & \"friends\"");
    assert_eq!(
        render("{{ content | escape }}", &ctx).unwrap(),
        "Hello &lt;world&gt; &amp; &quot;friends&quot;"
    );
}

#[test]
fn unicode_content() {
    let ctx = Context::new().with_var("content", "こんにちは 🌍");
    assert_eq!(render("«{{ content }}»", &ctx).unwrap(), "«こんにちは 🌍»");
}

#[test]
fn values_stringify_by_kind() {
    let ctx = Context::from_json(json!({
        "n": null,
        "b": true,
        "f": 2.5,
        "list": [1, null, "x"],
        "map": {"k": [1, 2]}
    }))
    .unwrap();
    let template = "{{ n }}|{{ b }}|{{ f }}|{{ list }}|{{ map }}|{{ nothing }}";
    let rendered = render(template, &ctx).unwrap();
    assert_eq!(rendered, r#"null|true|2.5|1,,x|{"k":[1,2]}|"#);
}

// ── Loops ──

#[test]
fn empty_list_produces_empty_output() {
    let template = "{% for message in messages %}{{ message.content }}{% endfor %}";
    assert_eq!(render(template, &messages(&[])).unwrap(), "");
}

#[test]
fn dot_access_and_bracket_access_equivalent() {
    let ctx = messages(&["user"]);
    let a = render("{% for message in messages %}{{ message.role }}{% endfor %}", &ctx).unwrap();
    let b = render("{% for message in messages %}{{ message['role'] }}{% endfor %}", &ctx).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "user");
}

#[test]
fn loop_first_and_last_single_item() {
    let template = "{% for message in messages %}{% if loop.first %}F{% endif %}\
        {% if loop.last %}L{% endif %}{% endfor %}";
    assert_eq!(render(template, &messages(&["user"])).unwrap(), "FL");
}

#[test]
fn loop_first_and_last_multiple_items() {
    let template = "{% for message in messages %}\
        {% if loop.first %}[{% endif %}{{ message.role }}{% if loop.last %}]{% endif %}\
        {% endfor %}";
    assert_eq!(render(template, &messages(&["a", "b", "c"])).unwrap(), "[abc]");
}

#[test]
fn loop_index_and_length() {
    let template = "{% for x in 'abc' %}{{ x }}{{ loop.index }}/{{ loop.length }} {% endfor %}";
    assert_eq!(render(template, &Context::new()).unwrap(), "a0/3 b1/3 c2/3 ");
}

#[test]
fn map_iterates_over_keys() {
    let m: Map = [("z", 1), ("a", 2)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::from(v)))
        .collect();
    let ctx = Context::new().with_var("m", m);
    let template = "{% for k in m %}{{ k }}={{ m[k] }};{% endfor %}";
    assert_eq!(render(template, &ctx).unwrap(), "z=1;a=2;");
}

#[test]
fn map_literals_print_in_insertion_order() {
    let template = "{{ {'b': 1, 'a': 2, 'c': {'z': 0, 'y': 1}} }}";
    let rendered = render(template, &Context::new()).unwrap();
    assert_eq!(rendered, r#"{"b":1,"a":2,"c":{"z":0,"y":1}}"#);
}

#[test]
fn json_context_keeps_key_order() {
    let ctx = Context::from_json(json!({"m": {"zeta": 1, "alpha": 2, "mid": 3}})).unwrap();
    let rendered = render("{% for k in m %}{{ k }};{% endfor %}{{ m }}", &ctx).unwrap();
    assert_eq!(rendered, r#"zeta;alpha;mid;{"zeta":1,"alpha":2,"mid":3}"#);
}

#[test]
fn nested_loops_see_outer_variables() {
    let template = "{% for a in [1, 2] %}{% for b in ['x', 'y'] %}{{ a }}{{ b }}{% endfor %}\
        {% endfor %}";
    assert_eq!(render(template, &Context::new()).unwrap(), "1x1y2x2y");
}

#[test]
fn non_iterable_loop_target_is_runtime_error() {
    let err = render("a\n{% for x in 5 %}{% endfor %}", &Context::new()).unwrap_err();
    assert_eq!(
        err,
        Error::Runtime {
            line: 2,
            message: "`x` must be iterable, got number".into()
        }
    );
    assert!(render("{% for x in missing %}{% endfor %}", &Context::new()).is_err());
}

#[test]
fn iteration_budget_is_enforced() {
    let engine = Engine::with_config(EngineConfig {
        max_iterations: 5,
        ..EngineConfig::default()
    });
    let ctx = Context::new();
    assert_eq!(engine.render("{% for i in 1..5 %}{{ i }}{% endfor %}", &ctx).unwrap(), "12345");

    let err = engine
        .render("{% for i in 1..3 %}{% for j in 1..3 %}{% endfor %}{% endfor %}", &ctx)
        .unwrap_err();
    assert!(err.is_runtime());
    assert!(err.to_string().contains("iteration limit"));
}

// ── Conditions ──

#[test]
fn or_operator_in_condition() {
    let template = "{% for message in messages %}\
        {% if message.role == 'user' or message.role == 'assistant' %}Y{% else %}N\
        {% endif %}{% endfor %}";
    assert_eq!(render(template, &messages(&["system", "user", "assistant"])).unwrap(), "NYY");
}

#[test]
fn elseif_chain_inside_for() {
    let template = "{% for message in messages %}{% if message.role == 'user' %}U\
        {% elseif message.role == 'system' %}S{% else %}O{% endif %}{% endfor %}";
    assert_eq!(render(template, &messages(&["user", "system", "tool"])).unwrap(), "USO");
}

#[test]
fn first_true_branch_wins() {
    let template = "{% if false %}A{% elseif true %}B{% else %}C{% endif %}";
    assert_eq!(render(template, &Context::new()).unwrap(), "B");
    let template = "{% if 1 %}A{% elseif 1 %}B{% endif %}";
    assert_eq!(render(template, &Context::new()).unwrap(), "A");
    let template = "{% if 0 %}A{% elseif '' %}B{% endif %}";
    assert_eq!(render(template, &Context::new()).unwrap(), "");
}

#[test]
fn flag_default_false_when_missing() {
    let template = "{% for message in messages %}{{ message.role }}\
        {% if loop.last and add_generation_prompt %}PROMPT{% endif %}{% endfor %}";
    assert_eq!(render(template, &messages(&["user"])).unwrap(), "user");
}

// ── Statements ──

#[test]
fn string_concat_multiple_parts() {
    let template = "{% for message in messages %}{{ 'A' + 'B' + 'C' + message.role + 'D' }}\
        {% endfor %}";
    assert_eq!(render(template, &messages(&["x"])).unwrap(), "ABCxD");
}

#[test]
fn set_inside_loop_does_not_leak() {
    let template = "{% set total = 10 %}{% for i in [1, 2] %}\
        {% set total = total + i %}{{ total }},{% endfor %}{{ total }}";
    assert_eq!(render(template, &Context::new()).unwrap(), "11,12,10");
}

#[test]
fn set_inside_if_is_visible_afterwards() {
    let template = "{% if true %}{% set shown = 'yes' %}{% endif %}{{ shown }}";
    assert_eq!(render(template, &Context::new()).unwrap(), "yes");
}

#[test]
fn do_discards_its_value() {
    assert_eq!(render("[{% do 1 + 1 %}]", &Context::new()).unwrap(), "[]");
}

#[test]
fn filter_block_pipes_rendered_body() {
    let ctx = Context::new().with_var("name", "bob");
    let template = "{% filter upper | replace({'O': '0'}) %}hello {{ name }}{% endfilter %}!";
    assert_eq!(render(template, &ctx).unwrap(), "HELL0 B0B!");
}

#[test]
fn comments_are_removed() {
    let template = "a{# hidden {{ x }} #}b\n{# two\nlines #}c";
    assert_eq!(render(template, &Context::new()).unwrap(), "ab\n\nc");
}

#[test]
fn registered_functions_are_callable() {
    let mut engine = Engine::new();
    engine.add_function("shout", |args: &[Value]| Ok(Value::from(format!("{}!", args[0]))));
    let ctx = Context::new().with_var("word", "hey");
    assert_eq!(engine.render("{{ word | shout }} {{ shout('x') }}", &ctx).unwrap(), "hey! x!");
}

// ── Errors ──

#[test]
fn unclosed_if_reports_final_line() {
    let err = render("{% if x %}A\nB\nC", &Context::new()).unwrap_err();
    assert_eq!(
        err,
        Error::Syntax {
            line: 3,
            message: "missing keyword `endif`".into()
        }
    );
}

#[test]
fn interpolation_errors_carry_their_line() {
    let err = render("one\ntwo {{ 1 +\n }}\n", &Context::new()).unwrap_err();
    assert!(err.is_syntax());
    assert_eq!(err.line(), 2);

    let err = render("\n\n{{ nope(1) }}", &Context::new()).unwrap_err();
    assert!(err.is_runtime());
    assert_eq!(err.line(), 3);
}

#[test]
fn deeply_nested_expression_is_a_syntax_error() {
    let template = format!("a\n{{{{ {}1{} }}}}", "(".repeat(200), ")".repeat(200));
    let err = render(&template, &Context::new()).unwrap_err();
    assert!(err.is_syntax());
    assert_eq!(err.line(), 2);

    let template = format!("{{{{ {}1{} }}}}", "(".repeat(40), ")".repeat(40));
    assert_eq!(render(&template, &Context::new()).unwrap(), "1");
}

#[test]
fn deeply_nested_blocks_are_a_syntax_error() {
    let template = format!("{}x{}", "{% if true %}".repeat(1000), "{% endif %}".repeat(1000));
    let err = render(&template, &Context::new()).unwrap_err();
    assert!(err.is_syntax());
    assert!(err.to_string().contains("nested deeper than"), "{err}");

    let template = format!("{}x{}", "{% for i in [1] %}".repeat(30), "{% endfor %}".repeat(30));
    assert_eq!(render(&template, &Context::new()).unwrap(), "x");
}

#[test]
fn else_with_condition_is_rejected() {
    let err = render("{% if a %}A{% else if b %}B{% endif %}", &Context::new()).unwrap_err();
    assert_eq!(
        err,
        Error::Syntax {
            line: 1,
            message: "unexpected token `if`".into()
        }
    );
}

#[test]
fn lex_errors_surface() {
    let err = render("{{ a # b }}", &Context::new()).unwrap_err();
    assert_eq!(
        err,
        Error::Lex {
            line: 1,
            token: "#".into()
        }
    );
}

// ── A realistic chat prompt template ──

#[test]
fn chat_prompt_template() {
    let template = r#"
{% for message in messages %}
{% if message['role'] == 'user' %}
{{ '<|user|>\n' + message['content'] + eos_token }}
{% elseif message['role'] == 'system' %}
{{ '<|system|>\n' + message['content'] + eos_token }}
{% endif %}
{% if loop.last and add_generation_prompt %}
{{ '<|assistant|>' }}
{% endif %}
{% endfor %}
"#
    .trim();

    let mut ctx = messages(&["system", "user"]);
    ctx.set_var("eos_token", "</s>");
    ctx.set_var("add_generation_prompt", true);

    let rendered = render(template, &ctx).unwrap();
    let lines: Vec<_> = rendered.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(
        lines,
        [
            "<|system|>",
            "system says hi</s>",
            "<|user|>",
            "user says hi</s>",
            "<|assistant|>"
        ]
    );
}
