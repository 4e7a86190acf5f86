//! Integration tests for macros, `{% call %}` and `caller()`.

use weft::{Environment, RenderError, data};

fn render(source: &str) -> String {
    Environment::default().render_str(source, data! {}).unwrap()
}

// =============================================================================
// Arguments
// =============================================================================

#[test]
fn test_positional_keyword_and_default_arguments() {
    let template = "{% macro greet(name, greeting='Hello') %}{{ greeting }}, {{ name }}!{% endmacro %}\
                    {{ greet('Ann') }} {{ greet('Bo', 'Hi') }} {{ greet(greeting='Yo', name='Cy') }}";
    assert_eq!(render(template), "Hello, Ann! Hi, Bo! Yo, Cy!");
}

#[test]
fn test_defaults_can_use_earlier_parameters() {
    assert_eq!(
        render("{% macro m(a, b=a * 2) %}{{ a }}:{{ b }}{% endmacro %}{{ m(3) }}|{{ m(3, 1) }}"),
        "3:6|3:1"
    );
}

#[test]
fn test_missing_arguments_are_undefined() {
    assert_eq!(render("{% macro m(a) %}[{{ a }}]{% endmacro %}{{ m() }}"), "[]");
}

#[test]
fn test_extra_positional_arguments_are_ignored() {
    assert_eq!(
        render("{% macro m(a) %}[{{ a }}]{% endmacro %}{{ m(1, 2, 3) }}"),
        "[1]"
    );
}

#[test]
fn test_unknown_keywords_are_collected_when_kwargs_is_used() {
    assert_eq!(
        render("{% macro m(a) %}{{ a }}{{ kwargs.extra }}{% endmacro %}{{ m(1, extra='x') }}"),
        "1x"
    );
    assert_eq!(
        render("{% macro m(a) %}{{ a }}{% endmacro %}{{ m(a=1, extra='x') }}"),
        "1"
    );
}

// =============================================================================
// Scoping
// =============================================================================

#[test]
fn test_macros_close_over_their_definition_scope() {
    let template = "{% set x = 'def' %}{% macro show() %}{{ x }}{% endmacro %}\
                    {% for x in ['loop'] %}{{ show() }}{% endfor %}";
    assert_eq!(render(template), "def");
}

#[test]
fn test_macro_sets_do_not_leak() {
    let template = "{% set v = 'outer' %}{% macro m() %}{% set v = 'inner' %}{{ v }}{% endmacro %}{{ m() }}-{{ v }}";
    assert_eq!(render(template), "inner-outer");
}

#[test]
fn test_recursive_macro() {
    let template = "{% macro count(n) %}{{ n }}{% if n > 0 %}{{ count(n - 1) }}{% endif %}{% endmacro %}{{ count(3) }}";
    assert_eq!(render(template), "3210");
}

#[test]
fn test_unbounded_recursion_hits_max_depth() {
    let env = Environment::builder().max_depth(10).build();
    let err = env
        .render_str("{% macro recurse() %}{{ recurse() }}{% endmacro %}{{ recurse() }}", data! {})
        .unwrap_err();
    match err {
        weft::Error::Render(err) => {
            assert!(matches!(err.root_cause(), RenderError::MaxDepthExceeded));
        }
        other => panic!("expected render error, got {other:?}"),
    }
}

#[test]
fn test_calling_a_non_macro_fails() {
    let err = Environment::default()
        .render_str("{{ name() }}", data! { "name" => "x" })
        .unwrap_err();
    assert_eq!(err.to_string(), "<string>:1:1: 'name' is not callable");
}

// =============================================================================
// call blocks
// =============================================================================

#[test]
fn test_call_block_passes_caller() {
    let env = Environment::default();
    let out = env
        .render_str(
            "{% macro wrap() %}<div>{{ caller() }}</div>{% endmacro %}{% call wrap() %}inner {{ x }}{% endcall %}",
            data! { "x" => "<" },
        )
        .unwrap();
    assert_eq!(out, "<div>inner &lt;</div>");
}

#[test]
fn test_caller_with_arguments() {
    let template = "{% macro list(items) %}{% for i in items %}{{ caller(i) }}{% endfor %}{% endmacro %}\
                    {% call(item) list([1, 2]) %}<{{ item }}>{% endcall %}";
    assert_eq!(render(template), "<1><2>");
}

#[test]
fn test_caller_sees_the_call_site_scope() {
    let template = "{% macro twice() %}{{ caller() }}{{ caller() }}{% endmacro %}\
                    {% for n in [7] %}{% call twice() %}{{ n }}{% endcall %}{% endfor %}";
    assert_eq!(render(template), "77");
}

#[test]
fn test_caller_body_sees_the_enclosing_macro_kwargs() {
    let template = "{% macro wrap() %}{{ caller() }}{% endmacro %}\
                    {% macro m() %}{% call wrap() %}[{{ kwargs.k }}]{% endcall %}{% endmacro %}\
                    {{ m(k=1) }}";
    assert_eq!(render(template), "[1]");
}
