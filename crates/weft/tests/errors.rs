//! Tests for error types and error message formatting.

use insta::assert_snapshot;
use weft::{Environment, Error, LoaderError, ParseError, Pos, compute_suggestions, data};

fn error_for(source: &str) -> Error {
    Environment::default()
        .render_str(source, data! {})
        .unwrap_err()
}

// =============================================================================
// Suggestions
// =============================================================================

#[test]
fn compute_suggestions_finds_similar_names() {
    let available = vec!["upper", "lower", "title", "trim"];

    assert_eq!(compute_suggestions("uper", &available), vec!["upper"]);
    assert_eq!(compute_suggestions("lowr", &available), vec!["lower"]);
    assert!(compute_suggestions("xyz", &available).is_empty());
}

#[test]
fn compute_suggestions_orders_by_distance_and_limits_to_three() {
    let available: Vec<String> = (0..10).map(|i| format!("item{i}")).collect();
    let suggestions = compute_suggestions("item", &available);
    assert_eq!(suggestions.len(), 3);

    let available = vec!["tile", "title", "titles"];
    let suggestions = compute_suggestions("titl", &available);
    assert_eq!(suggestions, vec!["title", "tile", "titles"]);
}

#[test]
fn compute_suggestions_short_names_need_a_close_match() {
    let available = vec!["if", "for"];
    assert_eq!(compute_suggestions("iff", &available), vec!["if"]);
    assert!(compute_suggestions("fi", &available).is_empty());
}

// =============================================================================
// Lex errors
// =============================================================================

#[test]
fn unterminated_tag() {
    assert_snapshot!(error_for("{{ name").to_string(), @"<string>: unterminated tag at 1:1");
}

#[test]
fn unterminated_string() {
    assert_snapshot!(error_for("{{ 'abc }}").to_string(), @"<string>: unterminated string at 1:4");
}

#[test]
fn unterminated_comment() {
    assert_snapshot!(error_for("a {# open").to_string(), @"<string>: unterminated comment at 1:3");
}

#[test]
fn unterminated_raw_block() {
    assert_snapshot!(error_for("{% raw %}abc").to_string(), @"<string>: unterminated raw block at 1:1");
}

#[test]
fn invalid_character() {
    assert_snapshot!(error_for("{{ a ; b }}").to_string(), @"<string>: invalid character ';' at 1:6");
}

// =============================================================================
// Parse errors
// =============================================================================

#[test]
fn unclosed_tag_reports_where_it_opened() {
    assert_snapshot!(
        error_for("line\n{% if x %}body").to_string(),
        @"<string>: unclosed 'if' tag opened at 2:1"
    );
}

#[test]
fn stray_end_tag() {
    assert_snapshot!(error_for("{% endif %}").to_string(), @"<string>: unexpected 'endif' at 1:4");
    assert_snapshot!(error_for("{% else %}").to_string(), @"<string>: unexpected 'else' at 1:4");
}

#[test]
fn unknown_tag_with_suggestion() {
    assert_snapshot!(
        error_for("{% iff x %}{% endif %}").to_string(),
        @"<string>: unknown tag 'iff' at 1:4 (did you mean: if?)"
    );
}

#[test]
fn duplicate_block() {
    assert_snapshot!(
        error_for("{% block a %}{% endblock %}{% block a %}{% endblock %}").to_string(),
        @"<string>: block 'a' defined twice at 1:37"
    );
}

#[test]
fn duplicate_extends() {
    assert_snapshot!(
        error_for("{% extends 'a' %}{% extends 'b' %}").to_string(),
        @"<string>: template extends more than one parent at 1:18"
    );
}

#[test]
fn nested_extends() {
    assert_snapshot!(
        error_for("{% if x %}{% extends 'a' %}{% endif %}").to_string(),
        @"<string>: 'extends' must appear at the top level of a template at 1:11"
    );
}

#[test]
fn assignment_to_attribute() {
    assert_snapshot!(
        error_for("{% set x.y = 1 %}").to_string(),
        @"<string>: can only assign to names at 1:9"
    );
}

#[test]
fn missing_operand() {
    assert_snapshot!(
        error_for("{{ 1 + }}").to_string(),
        @"<string>: expected an expression, found variable end at 1:8"
    );
}

#[test]
fn missing_keyword() {
    assert_snapshot!(
        error_for("{% for x of y %}{% endfor %}").to_string(),
        @"<string>: expected 'in', found 'of' at 1:10"
    );
}

#[test]
fn parse_errors_expose_position() {
    let err = error_for("\n\n  {{ 1 + }}");
    assert_eq!(err.template_name(), Some("<string>"));
    assert_eq!(err.pos(), Some(Pos::new(3, 10)));
    match err {
        Error::Parse { source, .. } => {
            assert!(matches!(source, ParseError::Unexpected { .. }));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn named_templates_carry_their_name() {
    let env = Environment::default();
    let err = env.from_string("{% if %}", Some("widget.html")).unwrap_err();
    assert_snapshot!(err.to_string(), @"widget.html: expected an expression, found block end at 1:7");
}

// =============================================================================
// Compile and render errors
// =============================================================================

#[test]
fn super_outside_block() {
    assert_snapshot!(
        error_for("{{ super() }}").to_string(),
        @"<string>: super() called outside of a block at 1:9"
    );
}

#[test]
fn unknown_filter_with_suggestion() {
    let env = Environment::default();
    env.add_filter("upper", |value, _| Ok(value.to_string().to_uppercase().into()));
    let err = env.render_str("{{ x | uppr }}", data! {}).unwrap_err();
    assert_snapshot!(err.to_string(), @"<string>:1:1: unknown filter 'uppr' (did you mean: upper?)");
}

#[test]
fn missing_import_source() {
    let env = Environment::default();
    let err = env
        .render_str("{% from 'x' import y %}", data! {})
        .unwrap_err();
    assert_snapshot!(err.to_string(), @"<string>:1:1: template not found: 'x'");
}

#[test]
fn loader_error_displays_path() {
    let err = LoaderError::Deserialize {
        path: "bundle.json".into(),
        message: "expected value".to_string(),
    };
    assert_snapshot!(err.to_string(), @"failed to load precompiled bundle 'bundle.json': expected value");
}
