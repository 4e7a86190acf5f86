//! Integration tests for the compiler: symbol resolution, routines and
//! async marking.

use std::collections::HashSet;

use weft::compiler::{CompileOptions, Expr, InstrKind, Program, compile};
use weft::lexer::{LexOptions, Syntax};
use weft::parser::parse_source;
use weft::{CompileError, Environment, Error};

fn compile_with(source: &str, options: &CompileOptions) -> Program {
    let ast = parse_source(source, &Syntax::default(), LexOptions::default(), &[]).unwrap();
    compile("test.html", &ast, options).unwrap()
}

fn program(source: &str) -> Program {
    compile_with(source, &CompileOptions::default())
}

fn output_expr(instr: &InstrKind) -> &Expr {
    match instr {
        InstrKind::Output(expr) => expr,
        other => panic!("expected output, got {other:?}"),
    }
}

fn async_filter(name: &str) -> CompileOptions {
    CompileOptions {
        async_filters: HashSet::from([name.to_string()]),
        async_extensions: HashSet::new(),
    }
}

// =============================================================================
// Symbol resolution
// =============================================================================

#[test]
fn test_unknown_names_are_dynamic_lookups() {
    let program = program("{{ title }}");
    assert_eq!(
        output_expr(&program.root.body[0].kind),
        &Expr::Lookup {
            name: "title".to_string()
        }
    );
}

#[test]
fn test_set_names_resolve_to_the_root_frame() {
    let program = program("{% set x = 1 %}{{ x }}");
    assert_eq!(
        output_expr(&program.root.body[1].kind),
        &Expr::Local {
            name: "x".to_string(),
            depth: 0
        }
    );
}

#[test]
fn test_names_before_their_set_are_dynamic() {
    let program = program("{{ x }}{% set x = 1 %}");
    assert!(matches!(
        output_expr(&program.root.body[0].kind),
        Expr::Lookup { .. }
    ));
}

#[test]
fn test_loop_variables_and_enclosing_frames() {
    let program = program("{% set t = 1 %}{% for x in xs %}{{ x }}{{ loop.index }}{{ t }}{% endfor %}");
    let InstrKind::For { body, iter, .. } = &program.root.body[1].kind else {
        panic!("expected a for loop");
    };
    assert!(matches!(iter, Expr::Lookup { name } if name == "xs"));
    assert_eq!(
        output_expr(&body[0].kind),
        &Expr::Local {
            name: "x".to_string(),
            depth: 0
        }
    );
    assert!(matches!(
        output_expr(&body[1].kind),
        Expr::GetAttr { target, .. } if matches!(**target, Expr::Local { depth: 0, .. })
    ));
    assert_eq!(
        output_expr(&body[2].kind),
        &Expr::Local {
            name: "t".to_string(),
            depth: 1
        }
    );
}

#[test]
fn test_blocks_resolve_outside_names_dynamically() {
    let program = program("{% set t = 1 %}{% block main %}{% set y = 2 %}{{ t }}{{ y }}{% endblock %}");
    let block = program.block("main").unwrap();
    assert_eq!(block.name, "b_main");
    assert!(matches!(output_expr(&block.body[1].kind), Expr::Lookup { .. }));
    assert!(matches!(
        output_expr(&block.body[2].kind),
        Expr::Local { depth: 0, .. }
    ));
}

#[test]
fn test_macros_see_params_and_enclosing_names() {
    let program = program(
        "{% set sep = ',' %}{% macro join(a, b) %}{{ a }}{{ sep }}{{ other }}{% endmacro %}",
    );
    let routine = program.macro_routine(0).unwrap();
    assert_eq!(routine.name, "join");
    assert!(matches!(
        output_expr(&routine.body[0].kind),
        Expr::Local { depth: 0, .. }
    ));
    assert!(matches!(
        output_expr(&routine.body[1].kind),
        Expr::Local { name, depth: 1 } if name == "sep"
    ));
    assert!(matches!(
        output_expr(&routine.body[2].kind),
        Expr::Lookup { .. }
    ));
}

// =============================================================================
// Routines
// =============================================================================

#[test]
fn test_blocks_compile_to_routines_in_source_order() {
    let program = program("{% block a %}{% block b %}{% endblock %}{% endblock %}{% block c %}{% endblock %}");
    let names: Vec<&str> = program.blocks.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["b", "a", "c"]);
    assert!(matches!(&program.root.body[0].kind, InstrKind::Block { name } if name == "a"));
}

#[test]
fn test_child_top_level_blocks_are_only_registered() {
    let program = program("{% extends 'base.html' %}{% block a %}x{% endblock %}text");
    assert!(program.parent.is_some());
    assert!(program.block("a").is_some());
    assert_eq!(program.root.body.len(), 1);
    assert!(matches!(&program.root.body[0].kind, InstrKind::Text(t) if t == "text"));
}

#[test]
fn test_super_compiles_against_the_enclosing_block() {
    let program = program("{% block head %}{{ super() }}{% endblock %}");
    let block = program.block("head").unwrap();
    assert_eq!(
        output_expr(&block.body[0].kind),
        &Expr::Super {
            block: "head".to_string()
        }
    );
}

#[test]
fn test_super_outside_block_is_rejected() {
    let ast =
        parse_source("{{ super() }}", &Syntax::default(), LexOptions::default(), &[]).unwrap();
    let err = compile("t.html", &ast, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::SuperOutsideBlock { .. }));
}

#[test]
fn test_kwargs_usage_enables_keyword_capture() {
    let program = program(
        "{% macro a(x) %}{{ kwargs }}{% endmacro %}\
         {% macro b(x) %}{{ x }}{% endmacro %}\
         {% macro c(x, kwargs) %}{{ kwargs }}{% endmacro %}",
    );
    let catches: Vec<bool> = program.macros.iter().map(|m| m.catch_kwargs).collect();
    assert_eq!(catches, vec![true, false, false]);
}

#[test]
fn test_kwargs_in_a_caller_body_belong_to_the_enclosing_macro() {
    let program = program(
        "{% macro m() %}{% call w() %}{{ kwargs.k }}{% endcall %}{% endmacro %}",
    );
    let outer = program.macros.iter().find(|m| m.name == "m").unwrap();
    let caller = program.macros.iter().find(|m| m.name == "caller").unwrap();
    assert!(outer.catch_kwargs);
    assert!(!caller.catch_kwargs);
}

#[test]
fn test_call_bodies_become_caller_routines() {
    let program = program(
        "{% macro wrap() %}[{{ caller() }}]{% endmacro %}{% call wrap() %}inner{% endcall %}",
    );
    assert_eq!(program.macros.len(), 2);
    assert_eq!(program.macros[1].name, "caller");
    assert!(matches!(
        output_expr(&program.root.body[1].kind),
        Expr::Call { caller: Some(1), .. }
    ));
}

#[test]
fn test_top_level_definitions_are_exported() {
    let program = program("{% set a = 1 %}{% for x in y %}{% set b = 2 %}{% endfor %}");
    assert!(matches!(&program.root.body[0].kind, InstrKind::Set { export: true, .. }));
    let InstrKind::For { body, .. } = &program.root.body[1].kind else {
        panic!("expected a for loop");
    };
    assert!(matches!(&body[0].kind, InstrKind::Set { export: false, .. }));
}

// =============================================================================
// Async marking
// =============================================================================

#[test]
fn test_sync_templates_are_not_async() {
    let program = program("{% for x in xs %}{{ x | upper }}{% endfor %}");
    assert!(!program.is_async);
    assert!(matches!(
        &program.root.body[0].kind,
        InstrKind::For { concurrent: false, .. }
    ));
}

#[test]
fn test_async_filters_mark_loops_concurrent() {
    let program = compile_with(
        "{% for x in xs %}{{ x | fetch }}{% endfor %}",
        &async_filter("fetch"),
    );
    assert!(program.is_async);
    assert!(program.root.is_async);
    assert!(matches!(
        &program.root.body[0].kind,
        InstrKind::For { concurrent: true, .. }
    ));
}

#[test]
fn test_loops_calling_macros_from_elsewhere_are_concurrent() {
    let program = program(
        "{% from 'lib.html' import fetch %}{% macro local(x) %}{{ x }}{% endmacro %}\
         {% for x in xs %}{{ fetch(x) }}{% endfor %}\
         {% for x in xs %}{{ local(x) }}{% endfor %}",
    );
    assert!(!program.is_async);
    let loops: Vec<bool> = program
        .root
        .body
        .iter()
        .filter_map(|instr| match &instr.kind {
            InstrKind::For { concurrent, .. } => Some(*concurrent),
            _ => None,
        })
        .collect();
    assert_eq!(loops, vec![true, false]);
}

#[test]
fn test_async_filters_mark_call_arguments_concurrent() {
    let options = async_filter("fetch");
    let program = compile_with("{{ f(a | fetch, b) }}{{ g(a | fetch) }}", &options);
    assert!(matches!(
        output_expr(&program.root.body[0].kind),
        Expr::Call { concurrent_args: true, .. }
    ));
    assert!(matches!(
        output_expr(&program.root.body[1].kind),
        Expr::Call { concurrent_args: false, .. }
    ));
}

#[test]
fn test_async_work_in_blocks_and_macros() {
    let options = async_filter("fetch");
    let program = compile_with(
        "{% block a %}{{ x | fetch }}{% endblock %}{% macro m() %}{{ y | fetch }}{% endmacro %}",
        &options,
    );
    assert!(program.is_async);
    assert!(program.block("a").unwrap().is_async);
    assert!(program.macros[0].is_async);
}

// =============================================================================
// Through the environment
// =============================================================================

#[test]
fn test_environment_compile_records_source_hash() {
    let env = Environment::default();
    let a = env.compile("hello", "a.html").unwrap();
    let b = env.compile("hello", "b.html").unwrap();
    let c = env.compile("hello!", "a.html").unwrap();
    assert_ne!(a.source_hash, 0);
    assert_eq!(a.source_hash, b.source_hash);
    assert_ne!(a.source_hash, c.source_hash);
    assert_eq!(a.name, "a.html");
}

#[test]
fn test_environment_compile_errors_are_named() {
    let env = Environment::default();
    let err = env.compile("{{ super() }}", "page.html").unwrap_err();
    assert!(matches!(err, Error::Compile { ref name, .. } if name == "page.html"));
}
