use uliquid::{Options, Template, TemplateError, Value, parse, render, render_template};

fn parse_err(source: &str) -> TemplateError {
    Template::parse(source).unwrap_err()
}

#[test]
fn test_lex_errors_carry_positions() {
    match parse_err("ok\n  {% if x") {
        TemplateError::Lex { position, .. } => {
            assert_eq!((position.line, position.column), (2, 3));
        }
        other => panic!("Expected Lex error, got {:?}", other),
    }
    assert!(matches!(
        parse_err("{{ 'open }}"),
        TemplateError::Lex { .. }
    ));
    assert!(matches!(parse_err("{{ a ; b }}"), TemplateError::Lex { .. }));
    assert!(matches!(
        parse_err("{% raw %}never closed"),
        TemplateError::Lex { .. }
    ));
}

#[test]
fn test_strings_may_contain_delimiters() {
    assert_eq!(render_template("{{ '}}' }}{{ \"%}\" }}", &()).unwrap(), "}}%}");
}

#[test]
fn test_parse_errors() {
    for source in [
        "{% frobnicate %}",
        "{% endif %}",
        "{% else %}",
        "{% if a %}",
        "{% for x in xs %}{% endif %}",
        "{% case x %}{% when 1 %}",
        "{{ }}",
        "{{ a == }}",
        "{% assign = 1 %}",
    ] {
        assert!(
            matches!(parse_err(source), TemplateError::Parse { .. }),
            "{}",
            source
        );
    }
}

#[test]
fn test_unknown_tag_message() {
    let err = parse_err("hi {% frobnicate %}");
    assert_eq!(
        err.to_string(),
        "Parse Error: unknown tag 'frobnicate' at line 1, column 4"
    );
}

#[test]
fn test_depth_beyond_limit_is_parse_error() {
    let source = format!("{}x{}", "{% if t %}".repeat(120), "{% endif %}".repeat(120));
    let err = parse_err(&source);
    assert!(matches!(err, TemplateError::Parse { .. }));
    assert!(err.to_string().contains("maximum depth of 100"));

    let options = Options::new().max_depth(200);
    assert!(Template::parse_with(&source, &options).is_ok());
}

#[test]
fn test_runaway_loop_is_limit_exceeded() {
    let tpl = Template::parse(
        "{% for a in (1..1000) %}{% for b in (1..1000) %}{% endfor %}{% endfor %}",
    )
    .unwrap();
    let err = tpl.render(&()).unwrap_err();
    assert!(matches!(err, TemplateError::LimitExceeded(_)));
}

#[test]
fn test_huge_range_is_capped() {
    let tpl = Template::parse("{% for i in (1..100000000000) %}{% endfor %}").unwrap();
    let err = tpl.render(&()).unwrap_err();
    assert!(matches!(err, TemplateError::LimitExceeded(_)));
}

#[test]
fn test_free_render_fn() {
    let root = parse("{{ 1 | plus: 2 }}").unwrap();
    assert_eq!(render(&root, &Value::Nil).unwrap(), "3");
}

#[test]
fn test_loop_over_non_list_renders_else() {
    let out = render_template(
        "{% for x in 'abc' %}{{ x }}{% else %}none{% endfor %}",
        &(),
    )
    .unwrap();
    assert_eq!(out, "none");
}

#[test]
fn test_break_at_top_level_stops_rendering() {
    assert_eq!(render_template("a{% break %}b", &()).unwrap(), "a");
}

#[test]
fn test_inline_comment() {
    assert_eq!(render_template("a{% # note %}b", &()).unwrap(), "ab");
}

#[test]
fn test_nesting_at_exactly_max_depth_renders() {
    let source = format!(
        "{}{{{{ x }}}}{}",
        "{% if t %}".repeat(100),
        "{% endif %}".repeat(100)
    );
    let tpl = Template::parse(&source).unwrap();
    let data = Value::Map(
        [
            ("t".to_string(), Value::Bool(true)),
            ("x".to_string(), Value::Int(7)),
        ]
        .into_iter()
        .collect(),
    );
    assert_eq!(tpl.render(&data).unwrap(), "7");
}

#[test]
fn test_deeply_nested_parens_are_parse_error() {
    let source = format!("{{{{ {}1..2) }}}}", "(".repeat(20_000));
    let err = parse_err(&source);
    assert!(matches!(err, TemplateError::Parse { .. }));
    assert!(err.to_string().contains("maximum depth of 100"));
}

#[test]
fn test_deeply_nested_indexes_are_parse_error() {
    let source = format!("{{{{ {}x{} }}}}", "a[".repeat(20_000), "]".repeat(20_000));
    assert!(matches!(parse_err(&source), TemplateError::Parse { .. }));
}

#[test]
fn test_long_elsif_chain() {
    let source = format!(
        "{{% if n == 0 %}}zero{}{{% else %}}none{{% endif %}}",
        (1..=20_000)
            .map(|i| format!("{{% elsif n == {} %}}{}", i, i))
            .collect::<String>()
    );
    let tpl = Template::parse(&source).unwrap();
    let data = |n: i64| Value::Map([("n".to_string(), Value::Int(n))].into_iter().collect());
    assert_eq!(tpl.render(&data(0)).unwrap(), "zero");
    assert_eq!(tpl.render(&data(19_999)).unwrap(), "19999");
    assert_eq!(tpl.render(&data(-1)).unwrap(), "none");
    drop(tpl);

    let unless = format!(
        "{{% unless t %}}no{}{{% endunless %}}",
        "{% elsif t %}yes".repeat(20_000)
    );
    let tpl = Template::parse(&unless).unwrap();
    let data = Value::Map([("t".to_string(), Value::Bool(true))].into_iter().collect());
    assert_eq!(tpl.render(&data).unwrap(), "yes");
}

#[test]
fn test_counter_is_visible_as_variable() {
    let out = render_template(
        "{% increment c %}{% increment c %}[{{ c }}]{% assign c = 'x' %}[{{ c }}]",
        &(),
    )
    .unwrap();
    assert_eq!(out, "01[2][x]");
}

#[test]
fn test_huge_floats_keep_a_fraction() {
    let data = Value::Map(
        [
            ("x".to_string(), Value::Float(1e16)),
            ("y".to_string(), Value::Float(1e20)),
        ]
        .into_iter()
        .collect(),
    );
    assert_eq!(
        render_template("{{ x }}|{{ y }}", &data).unwrap(),
        "1.0e+16|1.0e+20"
    );
}
