//! Minimal host harness: builds a small fixed demo program directly out of `ren-core`
//! cells and runs it to completion. There is no lexical scanner in scope (spec §1), so
//! unlike a conventional CLI this never reads a source file from disk — it plays the role
//! the teacher lineage's `ouros-cli` plays for its interpreter, minus the parsing step.

use std::{env, process::ExitCode, time::Instant};

use ren_core::{
    cell::Cell,
    context::ContextId,
    error::CoreError,
    mold,
    natives,
    run_block,
    series::Flavor,
    tracer::{NoopTracer, StderrTracer, Tracer},
    Engine, EngineConfig,
};

fn main() -> ExitCode {
    let config = EngineConfig { tracer: select_tracer(), ..EngineConfig::default() };
    let mut engine = Engine::new(config);
    let module = natives::install(&mut engine);

    let program = build_demo_program(&mut engine, module);

    let start = Instant::now();
    match run_block(&mut engine, program) {
        Ok(value) => {
            let elapsed = start.elapsed();
            eprintln!("success after: {elapsed:?}\n{}", mold::form_to(&engine, value));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let elapsed = start.elapsed();
            eprintln!("error after: {elapsed:?}\n{err}");
            ExitCode::FAILURE
        }
    }
}

/// Honors a `REN_TRACE` environment variable (spec §10.4 "embedders tune limits without
/// patching the core") — `stderr` for a human-readable step trace, anything else (or
/// unset) for the zero-overhead default.
fn select_tracer() -> Box<dyn Tracer> {
    match env::var("REN_TRACE").as_deref() {
        Ok("stderr") => Box::new(StderrTracer),
        _ => Box::new(NoopTracer),
    }
}

/// Builds `square: function [n [integer!]] [multiply n n]  print square 7` directly as
/// cells bound into `module` — the lexer that would normally produce this from source text
/// is out of scope (spec §1), so the harness plays loader itself, the same way this core's
/// own tests build blocks by hand instead of parsing (spec §10.5).
fn build_demo_program(engine: &mut Engine, module: ContextId) -> ren_core::series::SeriesId {
    use ren_core::cell::Binding;

    let word = |engine: &mut Engine, text: &str| -> Cell {
        let sym = engine.interner.intern(text);
        let mut cell = Cell::word(sym);
        cell.set_binding(Binding::Context(module));
        cell
    };

    let n = engine.interner.intern("n");
    let int_type = engine.series.make_array(vec![Cell::datatype(ren_core::cell::Kind::Integer)], Flavor::Plain);
    let spec = engine.series.make_array(vec![Cell::word(n), Cell::block(int_type)], Flavor::Plain);

    let multiply_word = word(engine, "multiply");
    let body = engine.series.make_array(vec![multiply_word, Cell::word(n), Cell::word(n)], Flavor::Plain);

    let function_word = word(engine, "function");
    let define =
        engine.series.make_array(vec![function_word, Cell::block(spec), Cell::block(body)], Flavor::Plain);

    let square_define = eval_or_panic(engine, define);
    let square_sym = engine.interner.intern("square");
    engine.contexts.declare(
        &mut engine.series,
        &mut engine.params,
        module,
        ren_core::paramlist::ParamEntry::normal(square_sym),
        square_define,
    );

    let print_word = word(engine, "print");
    let square_word = word(engine, "square");
    engine.series.make_array(vec![print_word, square_word, Cell::integer(7)], Flavor::Plain)
}

/// The harness's own bootstrap step (building and installing `square`) is not user code —
/// a failure here is this binary's bug, not a program error, so it aborts loudly rather
/// than surfacing an `ExitCode::FAILURE` indistinguishable from a real evaluation error.
fn eval_or_panic(engine: &mut Engine, block: ren_core::series::SeriesId) -> Cell {
    run_block(engine, block).unwrap_or_else(|err: CoreError| panic!("demo bootstrap failed: {err}"))
}
