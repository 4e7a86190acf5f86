//! Integration tests for async filters, async extensions and ordered
//! concurrent rendering.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::executor::block_on;
use tokio::time::sleep;
use weft::environment::{Extension, ExtensionCall, ExtensionError};
use weft::lexer::Token;
use weft::parser::{CallExtension, ParseError, Parser};
use weft::{Environment, FilterError, MemoryLoader, RenderError, Value, data};

/// Register `slow`, which sleeps for `value` milliseconds and echoes it.
fn env_with_slow_filter() -> Environment {
    let env = Environment::default();
    env.add_async_filter("slow", |value, _| {
        async move {
            let ms = value.as_int().unwrap_or_default();
            sleep(Duration::from_millis(u64::try_from(ms).unwrap_or_default())).await;
            Ok(value)
        }
        .boxed()
    });
    env
}

// =============================================================================
// Async filters
// =============================================================================

#[tokio::test]
async fn test_async_filter_in_async_render() {
    let env = env_with_slow_filter();
    let out = env
        .render_str_async("[{{ 5 | slow }}]", data! {})
        .await
        .unwrap();
    assert_eq!(out, "[5]");
}

#[tokio::test]
async fn test_concurrent_loop_output_keeps_source_order() {
    let env = env_with_slow_filter();
    let delays = vec![40, 5, 30, 0, 15];
    for _ in 0..5 {
        let out = env
            .render_str_async(
                "{% for d in delays %}{{ loop.index }}:{{ d | slow }} {% endfor %}",
                data! { "delays" => delays.clone() },
            )
            .await
            .unwrap();
        assert_eq!(out, "1:40 2:5 3:30 4:0 5:15 ");
    }
}

#[tokio::test]
async fn test_concurrent_loops_run_iterations_together() {
    let env = Environment::default();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        env.add_async_filter("track", move |value, _| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        });
    }
    let out = env
        .render_str_async("{% for x in [1, 2, 3] %}{{ x | track }}{% endfor %}", data! {})
        .await
        .unwrap();
    assert_eq!(out, "123");
    assert!(peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_loops_over_imported_async_macros_run_together() {
    let env = Environment::default();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        env.add_async_filter("track", move |value, _| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        });
    }
    env.add_loader(
        [
            ("lib.html", "{% macro show(x) %}<{{ x | track }}>{% endmacro %}"),
            (
                "page.html",
                "{% from 'lib.html' import show %}{% for x in [1, 2, 3] %}{{ show(x) }}{% endfor %}",
            ),
        ]
        .into_iter()
        .collect::<MemoryLoader>(),
    );
    let out = env.render_async("page.html", data! {}).await.unwrap();
    assert_eq!(out, "<1><2><3>");
    assert!(peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_concurrent_macro_arguments_keep_order() {
    let env = env_with_slow_filter();
    let out = env
        .render_str_async(
            "{% macro pair(a, b) %}{{ a }}-{{ b }}{% endmacro %}{{ pair(30 | slow, 1 | slow) }}",
            data! {},
        )
        .await
        .unwrap();
    assert_eq!(out, "30-1");
}

#[tokio::test]
async fn test_async_macro_body() {
    let env = env_with_slow_filter();
    let out = env
        .render_str_async(
            "{% macro late(x) %}<{{ x | slow }}>{% endmacro %}{{ late(1) }}{{ late(2) }}",
            data! {},
        )
        .await
        .unwrap();
    assert_eq!(out, "<1><2>");
}

#[tokio::test]
async fn test_async_filter_errors_propagate() {
    let env = Environment::default();
    env.add_async_filter("boom", |_, _| {
        async move { Err::<Value, _>(FilterError::new("exploded")) }.boxed()
    });
    let err = env
        .render_str_async("{% for x in [1, 2] %}{{ x | boom }}{% endfor %}", data! {})
        .await
        .unwrap_err();
    match err {
        weft::Error::Render(err) => assert!(matches!(
            err.root_cause(),
            RenderError::Filter { name, message } if name == "boom" && message == "exploded"
        )),
        other => panic!("expected render error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_async_templates_through_inheritance() {
    let env = env_with_slow_filter();
    env.add_loader(
        [
            ("base.html", "<{% block main %}{% endblock %}>"),
            (
                "child.html",
                "{% extends 'base.html' %}{% block main %}{{ 3 | slow }}{% endblock %}",
            ),
        ]
        .into_iter()
        .collect::<MemoryLoader>(),
    );
    assert!(env.get_template("child.html").unwrap().is_async());
    let out = env.render_async("child.html", data! {}).await.unwrap();
    assert_eq!(out, "<3>");
}

// =============================================================================
// Synchronous renders
// =============================================================================

#[test]
fn test_sync_render_refuses_async_templates() {
    let env = env_with_slow_filter();
    let err = env.render_str("{{ 1 | slow }}", data! {}).unwrap_err();
    assert_eq!(
        err.to_string(),
        "'<string>' is async and cannot run in a synchronous render; use render_async"
    );
}

#[test]
fn test_sync_templates_render_either_way() {
    let env = env_with_slow_filter();
    let template = env.from_string("{{ 1 + 1 }}", None).unwrap();
    assert!(!template.is_async());
    assert_eq!(template.render(&env, data! {}).unwrap(), "2");
    let out = block_on(template.render_async(&env, data! {})).unwrap();
    assert_eq!(out, "2");
}

#[test]
fn test_replacing_a_filter_with_an_async_one_recompiles() {
    let env = Environment::default();
    env.add_loader([("t.html", "{{ 2 | twice }}")].into_iter().collect::<MemoryLoader>());
    env.add_filter("twice", |value, _| {
        Ok(Value::from(value.as_int().unwrap_or_default() * 2))
    });
    assert_eq!(env.render("t.html", data! {}).unwrap(), "4");

    env.add_async_filter("twice", |value, _| {
        async move { Ok(Value::from(value.as_int().unwrap_or_default() * 2)) }.boxed()
    });
    assert!(env.get_template("t.html").unwrap().is_async());
    assert!(env.render("t.html", data! {}).is_err());
}

// =============================================================================
// Extensions
// =============================================================================

/// `{% fetch key %}`, resolved asynchronously.
struct Fetch;

#[async_trait]
impl Extension for Fetch {
    fn name(&self) -> &str {
        "fetch"
    }

    fn tags(&self) -> &[&'static str] {
        &["fetch"]
    }

    fn parse(&self, parser: &mut Parser<'_>, _tag: &Token) -> Result<CallExtension, ParseError> {
        let mut node = CallExtension::new("fetch");
        node.args.push(parser.parse_expression()?);
        parser.expect_block_end()?;
        Ok(node)
    }

    fn is_async(&self) -> bool {
        true
    }

    fn run(&self, _call: ExtensionCall) -> Result<Value, ExtensionError> {
        Err(ExtensionError::new("fetch only runs asynchronously"))
    }

    async fn run_async(&self, call: ExtensionCall) -> Result<Value, ExtensionError> {
        sleep(Duration::from_millis(5)).await;
        let key = call.args.first().map(ToString::to_string).unwrap_or_default();
        Ok(Value::from(format!("<{key}>")))
    }
}

/// `{% upper %}...{% endupper %}`, a synchronous block extension.
struct Upper;

#[async_trait]
impl Extension for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    fn tags(&self) -> &[&'static str] {
        &["upper"]
    }

    fn parse(&self, parser: &mut Parser<'_>, _tag: &Token) -> Result<CallExtension, ParseError> {
        parser.expect_block_end()?;
        let (body, _) = parser.parse_until(&["endupper"])?;
        parser.expect_block_end()?;
        let mut node = CallExtension::new("upper");
        node.bodies.push(body);
        Ok(node)
    }

    fn run(&self, call: ExtensionCall) -> Result<Value, ExtensionError> {
        let body = call.bodies.first().cloned().unwrap_or_default();
        Ok(Value::safe(body.to_string().to_uppercase()))
    }
}

#[tokio::test]
async fn test_async_extension() {
    let env = Environment::default();
    env.add_extension(Fetch);
    let out = env
        .render_str_async("{% fetch 'user' %}", data! {})
        .await
        .unwrap();
    assert_eq!(out, "&lt;user&gt;");
    assert!(env.render_str("{% fetch 'user' %}", data! {}).is_err());
}

#[test]
fn test_block_extension() {
    let env = Environment::default();
    env.add_extension(Upper);
    let out = env
        .render_str("{% upper %}hi {{ name }}{% endupper %}!", data! { "name" => "<bo>" })
        .unwrap();
    assert_eq!(out, "HI &LT;BO&GT;!");
}

#[test]
fn test_adding_an_extension_drops_cached_templates() {
    let env = Environment::default();
    env.add_loader([("t.html", "x")].into_iter().collect::<MemoryLoader>());
    env.get_template("t.html").unwrap();
    assert_eq!(env.cached_templates(), vec!["t.html"]);
    env.add_extension(Upper);
    assert!(env.cached_templates().is_empty());
}
