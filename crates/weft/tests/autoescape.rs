//! Integration tests for autoescaping and safe values.

use weft::{Environment, Filter, Value, data};

#[test]
fn test_output_is_escaped_by_default() {
    let env = Environment::default();
    let out = env
        .render_str("{{ html }}", data! { "html" => "<a href=\"x\">&</a>" })
        .unwrap();
    assert_eq!(out, "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
}

#[test]
fn test_template_text_is_never_escaped() {
    let env = Environment::default();
    assert_eq!(env.render_str("<p>&</p>", data! {}).unwrap(), "<p>&</p>");
}

#[test]
fn test_autoescape_can_be_disabled() {
    let env = Environment::builder().autoescape(false).build();
    let out = env.render_str("{{ html }}", data! { "html" => "<b>" }).unwrap();
    assert_eq!(out, "<b>");
}

#[test]
fn test_safe_filter_marks_output() {
    let env = Environment::default();
    let out = env
        .render_str("{{ html | safe }}", data! { "html" => "<b>bold</b>" })
        .unwrap();
    assert_eq!(out, "<b>bold</b>");
}

#[test]
fn test_safe_values_from_data_are_not_escaped() {
    let env = Environment::default();
    let out = env
        .render_str("{{ html }}", data! { "html" => Value::safe("<i>x</i>") })
        .unwrap();
    assert_eq!(out, "<i>x</i>");
}

#[test]
fn test_escape_filter_escapes_once() {
    let env = Environment::default();
    let out = env
        .render_str("{{ html | escape }}|{{ html | e | e }}", data! { "html" => "<&>" })
        .unwrap();
    assert_eq!(out, "&lt;&amp;&gt;|&lt;&amp;&gt;");
}

#[test]
fn test_escape_filter_works_without_autoescape() {
    let env = Environment::builder().autoescape(false).build();
    let out = env.render_str("{{ '<' | escape }}{{ '<' }}", data! {}).unwrap();
    assert_eq!(out, "&lt;<");
}

#[test]
fn test_concat_keeps_safe_operand_intact() {
    let env = Environment::default();
    let data = data! { "link" => Value::safe("<a>"), "text" => "<b>" };
    let out = env.render_str("{{ link ~ text }}", data.clone()).unwrap();
    assert_eq!(out, "<a>&lt;b&gt;");

    let out = env.render_str("{{ text ~ text }}", data).unwrap();
    assert_eq!(out, "&lt;b&gt;&lt;b&gt;");
}

#[test]
fn test_macro_output_is_not_escaped_twice() {
    let env = Environment::default();
    let template = "{% macro tag(name) %}<{{ name }}>{% endmacro %}{{ tag('a&b') }}";
    assert_eq!(env.render_str(template, data! {}).unwrap(), "<a&amp;b>");
}

#[test]
fn test_filter_block_output_is_not_escaped_twice() {
    let env = Environment::default();
    env.add_filter("trim", |value, _| {
        let trimmed = value.to_string().trim().to_string();
        Ok(if value.is_safe() {
            Value::safe(trimmed)
        } else {
            Value::from(trimmed)
        })
    });
    let out = env
        .render_str("{% filter trim %}  {{ v }}  {% endfilter %}", data! { "v" => "<x>" })
        .unwrap();
    assert_eq!(out, "&lt;x&gt;");
}

#[test]
fn test_filter_block_escapes_unsafe_filter_output() {
    let env = Environment::default();
    env.add_filter("append", |value, args| {
        let suffix = args.first().map(ToString::to_string).unwrap_or_default();
        Ok(Value::from(format!("{value}{suffix}")))
    });
    let data = || data! { "user" => "<script>" };

    let inline = env.render_str("{{ 'x' | append(user) }}", data()).unwrap();
    let block = env
        .render_str("{% filter append(user) %}x{% endfilter %}", data())
        .unwrap();
    assert_eq!(inline, "x&lt;script&gt;");
    assert_eq!(block, "x&lt;script&gt;");
}

#[test]
fn test_filters_returning_safe_values() {
    let env = Environment::default();
    env.register_filter(
        "bold",
        Filter::sync(|value, _| Ok(Value::from(format!("<b>{value}</b>")))).safe(),
    );
    let out = env.render_str("{{ 'hi' | bold }}", data! {}).unwrap();
    assert_eq!(out, "<b>hi</b>");
}
