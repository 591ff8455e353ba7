//! Minimal Native-Action Library (spec §11).
//!
//! Just enough natives to drive every corner of the dispatcher layer end to end: kind-
//! dispatched arithmetic through [`crate::dispatch::GenericTable`], a series mutator with
//! refinements, the `function` generator that exercises the paramlist compiler and
//! definitional return, the five composition natives (specialize/adapt/chain/enclose/
//! hijack), the control-flow primitives that produce/absorb [`crate::control::Thrown`],
//! and a small loop family. Grounded on the teacher lineage's `builtins/` directory: one
//! native per concern, registered into a module namespace rather than hardcoded into the
//! evaluator.

use crate::{
    cell::{Binding, Cell, CellFlags, Kind, Payload},
    context::{ContextId, ContextKind},
    control::{absorb_loop_signal, EvalResult, LoopSignal, Thrown, Unwind},
    dispatch::{chain, enclose, ActionId, Dispatcher, NativeFn},
    error::{CoreError, CoreResult, ErrorKind},
    evaluator::{bind_body_to_action, eval_block, run_frame},
    intern::Symbol,
    paramlist::{compile_spec, ParamClass, ParamEntry, ParamId, SpecItem, TypeSet},
    series::{Flavor, SeriesId},
    Engine,
};

/// Builds the standard module every one of this library's natives is declared into, and
/// wires [`Engine::return_action`] so definitional return (spec §4.E.2) can dispatch
/// `return` like any other action word.
#[must_use]
pub fn install(engine: &mut Engine) -> ContextId {
    let keylist = engine.series.make_array(vec![Cell::null()], Flavor::Pairlist);
    let module = engine.contexts.make(&mut engine.series, ContextKind::Module, keylist, 0);

    install_generics(engine);

    let a = engine.interner.intern("a");
    let b = engine.interner.intern("b");
    let add = build_native(engine, vec![SpecItem::Word(a), SpecItem::Word(b)], native_add);
    declare_action(engine, module, "add", add, false);
    declare_action(engine, module, "+", add, true);

    let a = engine.interner.intern("a");
    let b = engine.interner.intern("b");
    let subtract = build_native(engine, vec![SpecItem::Word(a), SpecItem::Word(b)], native_subtract);
    declare_action(engine, module, "subtract", subtract, false);
    declare_action(engine, module, "-", subtract, true);

    let a = engine.interner.intern("a");
    let b = engine.interner.intern("b");
    let multiply = build_native(engine, vec![SpecItem::Word(a), SpecItem::Word(b)], native_multiply);
    declare_action(engine, module, "multiply", multiply, false);
    declare_action(engine, module, "*", multiply, true);

    let series = engine.interner.intern("series");
    let value = engine.interner.intern("value");
    let dup = engine.interner.intern("dup");
    let count = engine.interner.intern("count");
    let only = engine.interner.intern("only");
    let append = build_native(
        engine,
        vec![
            SpecItem::Word(series),
            SpecItem::Word(value),
            SpecItem::Refinement(dup),
            SpecItem::Word(count),
            SpecItem::Refinement(only),
        ],
        native_append,
    );
    declare_action(engine, module, "append", append, false);

    let value = engine.interner.intern("value");
    let copy = build_native(engine, vec![SpecItem::Word(value)], native_copy);
    declare_action(engine, module, "copy", copy, false);

    let value = engine.interner.intern("value");
    let print = build_voidable_native(engine, vec![SpecItem::Word(value), SpecItem::Tag("void")], native_print);
    declare_action(engine, module, "print", print, false);

    let condition = engine.interner.intern("condition");
    let branch = engine.interner.intern("branch");
    let if_action = build_native(engine, vec![SpecItem::Word(condition), SpecItem::Word(branch)], native_if);
    declare_action(engine, module, "if", if_action, false);

    let condition = engine.interner.intern("condition");
    let true_branch = engine.interner.intern("true-branch");
    let false_branch = engine.interner.intern("false-branch");
    let either = build_native(
        engine,
        vec![SpecItem::Word(condition), SpecItem::Word(true_branch), SpecItem::Word(false_branch)],
        native_either,
    );
    declare_action(engine, module, "either", either, false);

    let spec = engine.interner.intern("spec");
    let body = engine.interner.intern("body");
    let function = build_native(engine, vec![SpecItem::Word(spec), SpecItem::Word(body)], native_function);
    declare_action(engine, module, "function", function, false);

    let action = engine.interner.intern("action");
    let def = engine.interner.intern("def");
    let specialize = build_native(engine, vec![SpecItem::Word(action), SpecItem::Word(def)], native_specialize);
    declare_action(engine, module, "specialize", specialize, false);

    let action = engine.interner.intern("action");
    let prelude = engine.interner.intern("prelude");
    let adapt = build_native(engine, vec![SpecItem::Word(action), SpecItem::Word(prelude)], native_adapt);
    declare_action(engine, module, "adapt", adapt, false);

    let steps = engine.interner.intern("steps");
    let chain_action = build_native(engine, vec![SpecItem::Word(steps)], native_chain);
    declare_action(engine, module, "chain", chain_action, false);

    let action = engine.interner.intern("action");
    let outer = engine.interner.intern("outer");
    let enclose_action = build_native(engine, vec![SpecItem::Word(action), SpecItem::Word(outer)], native_enclose);
    declare_action(engine, module, "enclose", enclose_action, false);

    let target = engine.interner.intern("target");
    let donor = engine.interner.intern("donor");
    let hijack = build_native(engine, vec![SpecItem::Word(target), SpecItem::Word(donor)], native_hijack);
    declare_action(engine, module, "hijack", hijack, false);

    let break_action = build_native(engine, vec![], native_break);
    declare_action(engine, module, "break", break_action, false);

    let continue_action = build_native(engine, vec![], native_continue);
    declare_action(engine, module, "continue", continue_action, false);

    let value = engine.interner.intern("value");
    let return_action = build_native(engine, vec![SpecItem::Word(value)], native_return);
    engine.return_action = Some(return_action);
    declare_action(engine, module, "return", return_action, false);

    let label = engine.interner.intern("label");
    let value = engine.interner.intern("value");
    let throw_action = build_native(engine, vec![SpecItem::GetWord(label), SpecItem::Word(value)], native_throw);
    declare_action(engine, module, "throw", throw_action, false);

    let label = engine.interner.intern("label");
    let body = engine.interner.intern("body");
    let catch_action = build_native(engine, vec![SpecItem::GetWord(label), SpecItem::Word(body)], native_catch);
    declare_action(engine, module, "catch", catch_action, false);

    let body = engine.interner.intern("body");
    let trap_action = build_native(engine, vec![SpecItem::Word(body)], native_trap);
    declare_action(engine, module, "trap", trap_action, false);

    let frame = engine.interner.intern("frame");
    let apply_action = build_native(
        engine,
        vec![SpecItem::Word(frame), SpecItem::TypeBlock(TypeSet::empty().with(Kind::Frame))],
        native_apply,
    );
    declare_action(engine, module, "apply", apply_action, false);

    let count = engine.interner.intern("count");
    let body = engine.interner.intern("body");
    let loop_action = build_native(engine, vec![SpecItem::Word(count), SpecItem::Word(body)], native_loop);
    declare_action(engine, module, "loop", loop_action, false);

    let condition = engine.interner.intern("condition");
    let body = engine.interner.intern("body");
    let while_action = build_native(engine, vec![SpecItem::Word(condition), SpecItem::Word(body)], native_while);
    declare_action(engine, module, "while", while_action, false);

    let body = engine.interner.intern("body");
    let until_action = build_native(engine, vec![SpecItem::Word(body)], native_until);
    declare_action(engine, module, "until", until_action, false);

    let word = engine.interner.intern("word");
    let series = engine.interner.intern("series");
    let body = engine.interner.intern("body");
    let for_each_action = build_native(
        engine,
        vec![SpecItem::GetWord(word), SpecItem::Word(series), SpecItem::Word(body)],
        native_for_each,
    );
    declare_action(engine, module, "for-each", for_each_action, false);

    module
}

// ---------------------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------------------

/// Reads the already-fulfilled argument named `name` out of the currently dispatching
/// frame's context — every native's equivalent of reading a local variable.
fn arg(engine: &mut Engine, name: &str) -> CoreResult<Cell> {
    let sym = engine.interner.intern(name);
    let ctx = engine
        .frames
        .top()
        .ok_or_else(|| CoreError::new(ErrorKind::Internal, "native invoked with no active frame"))?
        .context();
    let slot = engine
        .contexts
        .find_slot(&engine.series, &engine.params, ctx, sym)
        .ok_or_else(|| CoreError::new(ErrorKind::Internal, format!("native argument '{name}' not found")))?;
    engine.contexts.get_var(&engine.series, ctx, slot).map(|c| *c)
}

/// Compiles `items` into a fresh native action via [`crate::dispatch::ActionArena::reserve`]/
/// [`crate::dispatch::ActionArena::finalize`] (spec §4.C's archetype rootkey needs the
/// action's own id before the paramlist can be built).
fn build_native(engine: &mut Engine, items: Vec<SpecItem>, func: NativeFn) -> ActionId {
    let id = engine.actions.reserve(&mut engine.series);
    let ret_sym = engine.well_known.return_;
    let compiled = compile_spec(&mut engine.series, &mut engine.params, id, &items, false, ret_sym)
        .expect("builtin native spec is well-formed");
    engine.actions.finalize(id, compiled.paramlist, Dispatcher::Native(func));
    id
}

/// Like [`build_native`], but wraps the result in [`Dispatcher::Voider`] when `items`
/// carries a `<void>` spec tag (spec §14 open question #1) — `compile_spec` itself treats
/// that tag as a no-op, since suppressing the callable's visible result is the caller's
/// choice of dispatcher, not something the paramlist shape encodes.
fn build_voidable_native(engine: &mut Engine, items: Vec<SpecItem>, func: NativeFn) -> ActionId {
    let wants_void = items.iter().any(|item| matches!(item, SpecItem::Tag("void")));
    let base = build_native(engine, items, func);
    if wants_void {
        let paramlist = engine.actions.get(base).paramlist;
        engine.actions.make(paramlist, Dispatcher::Voider { base })
    } else {
        base
    }
}

/// Extends `module`'s keylist/varlist with one more variable (spec §11's native library
/// has no lexical scanner to grow a module's keylist via set-word binding — see
/// [`crate::context::ContextArena::declare`]).
fn declare(engine: &mut Engine, module: ContextId, name: &str, value: Cell) {
    let sym = engine.interner.intern(name);
    let entry = ParamEntry::normal(sym);
    engine.contexts.declare(&mut engine.series, &mut engine.params, module, entry, value);
}

fn declare_action(engine: &mut Engine, module: ContextId, name: &str, action: ActionId, enfix: bool) {
    let mut cell = Cell::action(action);
    if enfix {
        cell.set_flag(CellFlags::ENFIXED);
    }
    declare(engine, module, name, cell);
}

fn word_symbol_of(cell: Cell) -> Symbol {
    match cell.payload() {
        Payload::Symbol(sym) => sym,
        _ => unreachable!("word-like cell without a symbol payload"),
    }
}

/// Only `false` (LOGIC!) and `null` fail a branch condition (spec §11 `if`/`either`/loop
/// family) — everything else, including `blank!`, is truthy.
fn is_truthy(cell: Cell) -> bool {
    !matches!(cell.kind(), Kind::Null) && !matches!(cell.payload(), Payload::Logic(false))
}

/// Runs `branch` as a body if it's a block, otherwise returns it as a literal value — lets
/// `if`/`either` accept either shape without a separate native per case.
fn run_branch(engine: &mut Engine, branch: Cell) -> EvalResult<Cell> {
    match branch.payload() {
        Payload::Series(id) if branch.kind() == Kind::Block => eval_block(engine, id),
        _ => Ok(branch),
    }
}

fn text_cell(engine: &mut Engine, text: &str) -> Cell {
    let cells: Vec<Cell> = text.chars().map(|c| Cell::integer(i64::from(u32::from(c)))).collect();
    let id = engine.series.make_array(cells, Flavor::Plain);
    Cell::text(id)
}

fn param_symbols(engine: &Engine, action: ActionId) -> Vec<Symbol> {
    let paramlist = engine.actions.get(action).paramlist;
    engine
        .series
        .get(paramlist)
        .as_slice()
        .iter()
        .skip(1)
        .filter_map(|c| match c.payload() {
            Payload::Param(pid) => Some(engine.params.get(pid).symbol),
            _ => None,
        })
        .collect()
}

/// Rewrites every word cell in `body` matching a symbol in `symbols` to
/// `Binding::Context(ctx)` — the module/object-context analog of
/// [`bind_body_to_action`]'s relative binding, used where the target is a concrete context
/// rather than an action identity (e.g. `for-each`'s loop variable).
fn bind_body_to_context(engine: &mut Engine, body: SeriesId, ctx: ContextId, symbols: &[Symbol]) {
    let len = engine.series.get(body).len();
    for i in 0..len {
        let cell = *engine.series.get(body).get(i).expect("index in range");
        if cell.kind().is_word_like() {
            if let Payload::Symbol(sym) = cell.payload() {
                if symbols.contains(&sym) {
                    let mut bound = cell;
                    bound.set_binding(Binding::Context(ctx));
                    *engine.series.get_mut(body).get_mut(i).expect("index in range") = bound;
                }
            }
        } else if let Payload::Series(nested) = cell.payload() {
            if matches!(cell.kind(), Kind::Block | Kind::Group) {
                bind_body_to_context(engine, nested, ctx, symbols);
            }
        }
    }
}

// ---------------------------------------------------------------------------------------
// Arithmetic (spec §4.F "Generic dispatch")
// ---------------------------------------------------------------------------------------

fn install_generics(engine: &mut Engine) {
    let add = engine.interner.intern("add");
    let subtract = engine.interner.intern("subtract");
    let multiply = engine.interner.intern("multiply");
    engine.generics.register(add, Kind::Integer, generic_add_integer);
    engine.generics.register(add, Kind::Decimal, generic_add_decimal);
    engine.generics.register(subtract, Kind::Integer, generic_subtract_integer);
    engine.generics.register(subtract, Kind::Decimal, generic_subtract_decimal);
    engine.generics.register(multiply, Kind::Integer, generic_multiply_integer);
    engine.generics.register(multiply, Kind::Decimal, generic_multiply_decimal);
}

fn decimal_of(cell: Cell) -> Option<f64> {
    match cell.payload() {
        Payload::Decimal(v) => Some(v),
        Payload::Int(v) => Some(v as f64),
        _ => None,
    }
}

fn dispatch_generic(engine: &mut Engine, name: &str) -> EvalResult<Cell> {
    let a = arg(engine, "a").map_err(Unwind::Error)?;
    let generic = engine.interner.intern(name);
    match engine.generics.lookup(generic, a.kind()) {
        Some(handler) => handler(engine),
        None => Err(Unwind::Error(CoreError::argument_type("a", "INTEGER! or DECIMAL!", a.kind()))),
    }
}

fn native_add(engine: &mut Engine) -> EvalResult<Cell> {
    dispatch_generic(engine, "add")
}

fn native_subtract(engine: &mut Engine) -> EvalResult<Cell> {
    dispatch_generic(engine, "subtract")
}

fn native_multiply(engine: &mut Engine) -> EvalResult<Cell> {
    dispatch_generic(engine, "multiply")
}

fn generic_add_integer(engine: &mut Engine) -> EvalResult<Cell> {
    let a = arg(engine, "a").map_err(Unwind::Error)?;
    let b = arg(engine, "b").map_err(Unwind::Error)?;
    let (Payload::Int(x), Payload::Int(y)) = (a.payload(), b.payload()) else {
        return Err(Unwind::Error(CoreError::argument_type("b", "INTEGER!", b.kind())));
    };
    x.checked_add(y)
        .map(Cell::integer)
        .ok_or_else(|| Unwind::Error(CoreError::new(ErrorKind::Math, "integer overflow")))
}

fn generic_subtract_integer(engine: &mut Engine) -> EvalResult<Cell> {
    let a = arg(engine, "a").map_err(Unwind::Error)?;
    let b = arg(engine, "b").map_err(Unwind::Error)?;
    let (Payload::Int(x), Payload::Int(y)) = (a.payload(), b.payload()) else {
        return Err(Unwind::Error(CoreError::argument_type("b", "INTEGER!", b.kind())));
    };
    x.checked_sub(y)
        .map(Cell::integer)
        .ok_or_else(|| Unwind::Error(CoreError::new(ErrorKind::Math, "integer overflow")))
}

fn generic_multiply_integer(engine: &mut Engine) -> EvalResult<Cell> {
    let a = arg(engine, "a").map_err(Unwind::Error)?;
    let b = arg(engine, "b").map_err(Unwind::Error)?;
    let (Payload::Int(x), Payload::Int(y)) = (a.payload(), b.payload()) else {
        return Err(Unwind::Error(CoreError::argument_type("b", "INTEGER!", b.kind())));
    };
    x.checked_mul(y)
        .map(Cell::integer)
        .ok_or_else(|| Unwind::Error(CoreError::new(ErrorKind::Math, "integer overflow")))
}

fn generic_add_decimal(engine: &mut Engine) -> EvalResult<Cell> {
    let a = arg(engine, "a").map_err(Unwind::Error)?;
    let b = arg(engine, "b").map_err(Unwind::Error)?;
    let x = decimal_of(a).ok_or_else(|| Unwind::Error(CoreError::argument_type("a", "DECIMAL!", a.kind())))?;
    let y = decimal_of(b).ok_or_else(|| Unwind::Error(CoreError::argument_type("b", "DECIMAL!", b.kind())))?;
    Ok(Cell::decimal(x + y))
}

fn generic_subtract_decimal(engine: &mut Engine) -> EvalResult<Cell> {
    let a = arg(engine, "a").map_err(Unwind::Error)?;
    let b = arg(engine, "b").map_err(Unwind::Error)?;
    let x = decimal_of(a).ok_or_else(|| Unwind::Error(CoreError::argument_type("a", "DECIMAL!", a.kind())))?;
    let y = decimal_of(b).ok_or_else(|| Unwind::Error(CoreError::argument_type("b", "DECIMAL!", b.kind())))?;
    Ok(Cell::decimal(x - y))
}

fn generic_multiply_decimal(engine: &mut Engine) -> EvalResult<Cell> {
    let a = arg(engine, "a").map_err(Unwind::Error)?;
    let b = arg(engine, "b").map_err(Unwind::Error)?;
    let x = decimal_of(a).ok_or_else(|| Unwind::Error(CoreError::argument_type("a", "DECIMAL!", a.kind())))?;
    let y = decimal_of(b).ok_or_else(|| Unwind::Error(CoreError::argument_type("b", "DECIMAL!", b.kind())))?;
    Ok(Cell::decimal(x * y))
}

// ---------------------------------------------------------------------------------------
// Series natives (spec §8 scenario 2/4)
// ---------------------------------------------------------------------------------------

fn native_append(engine: &mut Engine) -> EvalResult<Cell> {
    let series_cell = arg(engine, "series").map_err(Unwind::Error)?;
    let value = arg(engine, "value").map_err(Unwind::Error)?;
    let dup = arg(engine, "dup").map_err(Unwind::Error)?;
    let only = arg(engine, "only").map_err(Unwind::Error)?;
    let Payload::Series(id) = series_cell.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("series", "BLOCK!", series_cell.kind())));
    };
    let repeat = match dup.payload() {
        Payload::Logic(true) => {
            let count = arg(engine, "count").map_err(Unwind::Error)?;
            match count.payload() {
                Payload::Int(n) if n > 0 => n as usize,
                _ => 0,
            }
        }
        _ => 1,
    };
    let splice = !matches!(only.payload(), Payload::Logic(true)) && value.kind() == Kind::Block;
    for _ in 0..repeat {
        if splice {
            let Payload::Series(src) = value.payload() else { unreachable!("checked block kind") };
            let items: Vec<Cell> = engine.series.get(src).as_slice().to_vec();
            for item in items {
                engine.series.get_mut(id).append(item).map_err(Unwind::Error)?;
            }
        } else {
            engine.series.get_mut(id).append(value).map_err(Unwind::Error)?;
        }
    }
    Ok(series_cell)
}

fn native_copy(engine: &mut Engine) -> EvalResult<Cell> {
    let value = arg(engine, "value").map_err(Unwind::Error)?;
    match value.payload() {
        Payload::Series(id) if value.kind() == Kind::Block => {
            let cells = engine.series.get(id).as_slice().to_vec();
            let new_id = engine.series.make_array(cells, Flavor::Plain);
            Ok(Cell::block(new_id))
        }
        _ => Ok(value),
    }
}

fn native_print(engine: &mut Engine) -> EvalResult<Cell> {
    let value = arg(engine, "value").map_err(Unwind::Error)?;
    println!("{}", crate::mold::form_to(engine, value));
    Ok(Cell::void())
}

// ---------------------------------------------------------------------------------------
// Conditionals
// ---------------------------------------------------------------------------------------

fn native_if(engine: &mut Engine) -> EvalResult<Cell> {
    let condition = arg(engine, "condition").map_err(Unwind::Error)?;
    let branch = arg(engine, "branch").map_err(Unwind::Error)?;
    if is_truthy(condition) {
        run_branch(engine, branch)
    } else {
        Ok(Cell::null())
    }
}

fn native_either(engine: &mut Engine) -> EvalResult<Cell> {
    let condition = arg(engine, "condition").map_err(Unwind::Error)?;
    let true_branch = arg(engine, "true-branch").map_err(Unwind::Error)?;
    let false_branch = arg(engine, "false-branch").map_err(Unwind::Error)?;
    run_branch(engine, if is_truthy(condition) { true_branch } else { false_branch })
}

// ---------------------------------------------------------------------------------------
// `function` — the paramlist-compiling generator (spec §4.C, §4.E.2)
// ---------------------------------------------------------------------------------------

/// Translates a literal spec block's cells into [`SpecItem`]s (spec §4.C); the lexical
/// scanner that would normally resolve word spellings during parsing is out of scope, so
/// this reads already-built cells directly instead.
fn scan_spec_block(engine: &Engine, block: SeriesId) -> CoreResult<Vec<SpecItem>> {
    let cells: Vec<Cell> = engine.series.get(block).as_slice().to_vec();
    let mut items = Vec::with_capacity(cells.len());
    for cell in cells {
        let item = match cell.kind() {
            Kind::Text => SpecItem::Text(crate::mold::form_to(engine, cell)),
            Kind::Block => SpecItem::TypeBlock(block_to_typeset(engine, cell)?),
            Kind::Word => SpecItem::Word(word_symbol_of(cell)),
            Kind::GetWord => SpecItem::GetWord(word_symbol_of(cell)),
            Kind::LitWord => SpecItem::LitWord(word_symbol_of(cell)),
            Kind::Issue => SpecItem::Issue(word_symbol_of(cell)),
            Kind::Refinement => SpecItem::Refinement(word_symbol_of(cell)),
            Kind::SetWord => {
                let sym = word_symbol_of(cell);
                if sym == engine.well_known.return_ {
                    SpecItem::ExplicitReturn(sym)
                } else {
                    SpecItem::SetWord(sym)
                }
            }
            Kind::Tag => {
                let sym = word_symbol_of(cell);
                match engine.interner.resolve(sym) {
                    "local" => SpecItem::Tag("local"),
                    "with" => SpecItem::Tag("with"),
                    "void" => SpecItem::Tag("void"),
                    other => {
                        return Err(CoreError::new(ErrorKind::Script, format!("unsupported spec tag <{other}>")))
                    }
                }
            }
            other => return Err(CoreError::new(ErrorKind::Script, format!("unexpected spec item kind {other:?}"))),
        };
        items.push(item);
    }
    Ok(items)
}

/// A type block's own cells are datatype words or `<opt>`/`<end>` tags (spec §3.3).
fn block_to_typeset(engine: &Engine, cell: Cell) -> CoreResult<TypeSet> {
    let Payload::Series(id) = cell.payload() else {
        return Err(CoreError::new(ErrorKind::Script, "type block cell without series payload"));
    };
    let mut set = TypeSet::empty();
    for c in engine.series.get(id).as_slice() {
        match (c.kind(), c.payload()) {
            (_, Payload::Datatype(k)) => set.allow(k),
            (Kind::Tag, Payload::Symbol(sym)) => match engine.interner.resolve(sym) {
                "opt" => set.accepts_null = true,
                "end" => set.accepts_end = true,
                other => {
                    return Err(CoreError::new(ErrorKind::Script, format!("unsupported type-block tag <{other}>")))
                }
            },
            _ => return Err(CoreError::new(ErrorKind::Script, "type block entry must be a datatype or <opt>/<end>")),
        }
    }
    Ok(set)
}

fn native_function(engine: &mut Engine) -> EvalResult<Cell> {
    let spec = arg(engine, "spec").map_err(Unwind::Error)?;
    let body = arg(engine, "body").map_err(Unwind::Error)?;
    let Payload::Series(spec_id) = spec.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("spec", "BLOCK!", spec.kind())));
    };
    let Payload::Series(body_id) = body.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("body", "BLOCK!", body.kind())));
    };
    let items = scan_spec_block(engine, spec_id).map_err(Unwind::Error)?;

    let action = engine.actions.reserve(&mut engine.series);
    let ret_sym = engine.well_known.return_;
    let compiled = compile_spec(&mut engine.series, &mut engine.params, action, &items, true, ret_sym)
        .map_err(Unwind::Error)?;
    let symbols: Vec<Symbol> = compiled.params.iter().map(|pid| engine.params.get(*pid).symbol).collect();
    bind_body_to_action(engine, body_id, action, &symbols);
    engine.actions.finalize(action, compiled.paramlist, Dispatcher::Interpreted { body: body_id });

    let wants_void = items.iter().any(|item| matches!(item, SpecItem::Tag("void")));
    if wants_void {
        let voided = engine.actions.make(compiled.paramlist, Dispatcher::Voider { base: action });
        Ok(Cell::action(voided))
    } else {
        Ok(Cell::action(action))
    }
}

// ---------------------------------------------------------------------------------------
// Composition natives (spec §4.F)
// ---------------------------------------------------------------------------------------

/// Clones `source`'s paramlist entry by entry into fresh [`ParamId`]s — specialize's
/// per-composition independence (hiding a parameter must not affect `base`'s own
/// visibility, since `hidden` lives on the shared [`ParamEntry`]).
fn clone_paramlist(engine: &mut Engine, source: SeriesId, new_action: ActionId) -> (SeriesId, Vec<ParamId>) {
    let cells: Vec<Cell> = engine.series.get(source).as_slice().to_vec();
    let mut new_cells = Vec::with_capacity(cells.len());
    new_cells.push(Cell::action(new_action));
    let mut new_ids = Vec::with_capacity(cells.len().saturating_sub(1));
    for cell in cells.into_iter().skip(1) {
        if let Payload::Param(pid) = cell.payload() {
            let entry = engine.params.get(pid).clone();
            let new_id = engine.params.push(entry);
            new_ids.push(new_id);
            new_cells.push(Cell::typeset(new_id));
        }
    }
    let new_paramlist = engine.series.make_array(new_cells, Flavor::Paramlist);
    (new_paramlist, new_ids)
}

fn native_specialize(engine: &mut Engine) -> EvalResult<Cell> {
    let action_val = arg(engine, "action").map_err(Unwind::Error)?;
    let Payload::Action(base) = action_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("action", "ACTION!", action_val.kind())));
    };
    let def = arg(engine, "def").map_err(Unwind::Error)?;
    let Payload::Series(def_id) = def.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("def", "BLOCK!", def.kind())));
    };

    let base_paramlist = engine.actions.get(base).paramlist;
    let new_action = engine.actions.reserve(&mut engine.series);
    let (new_paramlist, new_ids) = clone_paramlist(engine, base_paramlist, new_action);

    let cells: Vec<Cell> = engine.series.get(def_id).as_slice().to_vec();
    let mut frozen = Vec::new();
    let mut i = 0;
    while i + 1 < cells.len() {
        let set_word = cells[i];
        let value = cells[i + 1];
        if set_word.kind() == Kind::SetWord {
            let sym = word_symbol_of(set_word);
            if let Some(pos) = new_ids.iter().position(|pid| engine.params.get(*pid).symbol == sym) {
                let pid = new_ids[pos];
                if engine.params.get(pid).class == ParamClass::Refinement {
                    // Specializing a refinement with a value (spec §8 scenario 4, e.g.
                    // `specialize :append [dup: 2]`) marks the refinement used and
                    // redirects the value to the positional argument it guards, the
                    // next param in paramlist order.
                    engine.params.get_mut(pid).hidden = true;
                    frozen.push((pid, Cell::logic(true)));
                    if let Some(&paired) = new_ids.get(pos + 1) {
                        if matches!(
                            engine.params.get(paired).class,
                            ParamClass::Normal | ParamClass::Tight | ParamClass::HardQuote | ParamClass::SoftQuote
                        ) {
                            engine.params.get_mut(paired).hidden = true;
                            frozen.push((paired, value));
                        }
                    }
                } else {
                    engine.params.get_mut(pid).hidden = true;
                    frozen.push((pid, value));
                }
            }
        }
        i += 2;
    }
    engine.actions.finalize(new_action, new_paramlist, Dispatcher::Specialized { base, frozen });
    Ok(Cell::action(new_action))
}

fn native_adapt(engine: &mut Engine) -> EvalResult<Cell> {
    let action_val = arg(engine, "action").map_err(Unwind::Error)?;
    let Payload::Action(base) = action_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("action", "ACTION!", action_val.kind())));
    };
    let prelude = arg(engine, "prelude").map_err(Unwind::Error)?;
    let Payload::Series(prelude_id) = prelude.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("prelude", "BLOCK!", prelude.kind())));
    };

    let paramlist = engine.actions.get(base).paramlist;
    let symbols = param_symbols(engine, base);
    // The prelude runs before `base` dispatches, while the frame's phase is still this
    // composed action (spec §4.F "Adapter") — so its words must bind relative to the
    // *composed* action, not to `base`, and that id only exists once reserved.
    let adapted = engine.actions.reserve(&mut engine.series);
    bind_body_to_action(engine, prelude_id, adapted, &symbols);
    engine.actions.finalize(adapted, paramlist, Dispatcher::Adapted { base, prelude: prelude_id });
    Ok(Cell::action(adapted))
}

fn native_chain(engine: &mut Engine) -> EvalResult<Cell> {
    let steps_val = arg(engine, "steps").map_err(Unwind::Error)?;
    let Payload::Series(steps_id) = steps_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("steps", "BLOCK!", steps_val.kind())));
    };
    let cells: Vec<Cell> = engine.series.get(steps_id).as_slice().to_vec();
    let mut steps = Vec::with_capacity(cells.len());
    for cell in cells {
        let Payload::Action(action) = cell.payload() else {
            return Err(Unwind::Error(CoreError::argument_type("steps", "ACTION!", cell.kind())));
        };
        steps.push(action);
    }
    let chained = chain(&mut engine.actions, steps).map_err(Unwind::Error)?;
    Ok(Cell::action(chained))
}

fn native_enclose(engine: &mut Engine) -> EvalResult<Cell> {
    let action_val = arg(engine, "action").map_err(Unwind::Error)?;
    let outer_val = arg(engine, "outer").map_err(Unwind::Error)?;
    let Payload::Action(base) = action_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("action", "ACTION!", action_val.kind())));
    };
    let Payload::Action(outer) = outer_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("outer", "ACTION!", outer_val.kind())));
    };
    Ok(Cell::action(enclose(&mut engine.actions, base, outer)))
}

fn native_hijack(engine: &mut Engine) -> EvalResult<Cell> {
    let target_val = arg(engine, "target").map_err(Unwind::Error)?;
    let donor_val = arg(engine, "donor").map_err(Unwind::Error)?;
    let Payload::Action(target) = target_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("target", "ACTION!", target_val.kind())));
    };
    let Payload::Action(donor) = donor_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("donor", "ACTION!", donor_val.kind())));
    };
    engine.actions.hijack(target, donor);
    // `hijack` copies the donor's dispatcher into `target`'s slot by value (spec §4.F
    // "Hijacker"), but `target` keeps its own identity. An interpreted donor's body was
    // bound `Relative(donor)` at the donor's own definition time, so the copied body
    // would fail `resolve_binding`'s owner check under `target`'s phase, and rebinding
    // the shared series in place would corrupt the donor's own behavior too. Clone the
    // body before re-homing it to `target`.
    let interpreted_body = match &engine.actions.get(target).dispatcher {
        Dispatcher::Interpreted { body } => Some(*body),
        _ => None,
    };
    if let Some(body) = interpreted_body {
        let symbols = param_symbols(engine, target);
        let cloned = deep_clone_block(engine, body);
        bind_body_to_action(engine, cloned, target, &symbols);
        engine.actions.get_mut(target).dispatcher = Dispatcher::Interpreted { body: cloned };
    }
    Ok(Cell::action(target))
}

/// Recursively copies `body` into a fresh series, including any nested `Block`/`Group`
/// sub-series, so the clone's cells can be rebound without touching the original.
fn deep_clone_block(engine: &mut Engine, body: SeriesId) -> SeriesId {
    let flavor = engine.series.get(body).flavor();
    let mut cells = engine.series.get(body).as_slice().to_vec();
    for cell in &mut cells {
        if let Payload::Series(nested) = cell.payload() {
            if matches!(cell.kind(), Kind::Block | Kind::Group) {
                let cloned_nested = deep_clone_block(engine, nested);
                cell.set_payload(Payload::Series(cloned_nested));
            }
        }
    }
    engine.series.make_array(cells, flavor)
}

// ---------------------------------------------------------------------------------------
// Control flow (spec §4.E.5, §11 trap/rescue)
// ---------------------------------------------------------------------------------------

fn native_break(_engine: &mut Engine) -> EvalResult<Cell> {
    Err(Unwind::Signal(Thrown::Break))
}

fn native_continue(_engine: &mut Engine) -> EvalResult<Cell> {
    Err(Unwind::Signal(Thrown::Continue))
}

fn native_return(engine: &mut Engine) -> EvalResult<Cell> {
    let value = arg(engine, "value").map_err(Unwind::Error)?;
    let value = if value.kind() == Kind::End { Cell::void() } else { value };
    let target = engine
        .frames
        .caller()
        .map(|f| f.context())
        .ok_or_else(|| Unwind::Error(CoreError::new(ErrorKind::Script, "return used outside of a function call")))?;
    Err(Unwind::Signal(Thrown::Return { target, value }))
}

fn native_throw(engine: &mut Engine) -> EvalResult<Cell> {
    let label_cell = arg(engine, "label").map_err(Unwind::Error)?;
    let value = arg(engine, "value").map_err(Unwind::Error)?;
    let label = word_symbol_of(label_cell);
    Err(Unwind::Signal(Thrown::Throw { label, value }))
}

fn native_catch(engine: &mut Engine) -> EvalResult<Cell> {
    let label_cell = arg(engine, "label").map_err(Unwind::Error)?;
    let body = arg(engine, "body").map_err(Unwind::Error)?;
    let label = word_symbol_of(label_cell);
    let Payload::Series(body_id) = body.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("body", "BLOCK!", body.kind())));
    };
    match eval_block(engine, body_id) {
        Err(Unwind::Signal(Thrown::Throw { label: thrown, value })) if thrown == label => Ok(value),
        other => other,
    }
}

fn build_error_object(engine: &mut Engine, err: &CoreError) -> ContextId {
    let keylist = engine.series.make_array(vec![Cell::null()], Flavor::Pairlist);
    let ctx = engine.contexts.make(&mut engine.series, ContextKind::Error, keylist, 0);
    let kind_text = text_cell(engine, &err.kind.to_string());
    let kind_sym = engine.interner.intern("kind");
    engine.contexts.declare(&mut engine.series, &mut engine.params, ctx, ParamEntry::normal(kind_sym), kind_text);
    let message_text = text_cell(engine, &err.message);
    let message_sym = engine.interner.intern("message");
    engine.contexts.declare(&mut engine.series, &mut engine.params, ctx, ParamEntry::normal(message_sym), message_text);
    ctx
}

fn native_trap(engine: &mut Engine) -> EvalResult<Cell> {
    let body = arg(engine, "body").map_err(Unwind::Error)?;
    let Payload::Series(body_id) = body.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("body", "BLOCK!", body.kind())));
    };
    match eval_block(engine, body_id) {
        Ok(v) => Ok(v),
        Err(Unwind::Error(err)) if err.kind.is_recoverable() => Ok(Cell::error(build_error_object(engine, &err))),
        other => other,
    }
}

fn native_apply(engine: &mut Engine) -> EvalResult<Cell> {
    let frame_val = arg(engine, "frame").map_err(Unwind::Error)?;
    let Payload::Context(ctx) = frame_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("frame", "FRAME!", frame_val.kind())));
    };
    run_frame(engine, ctx)
}

// ---------------------------------------------------------------------------------------
// Loop family (spec §4.G / §11)
// ---------------------------------------------------------------------------------------

/// Applies the §4.G loop-return contract to a loop's normal-exit value: a loop that never
/// ran its body returns blank, and a loop that ran returns its last body result with
/// null/blank folded into void — a normally-completed loop never yields raw null, since
/// null is reserved as BREAK's own sentinel.
fn loop_exit_value(ran: bool, result: Cell) -> Cell {
    if !ran {
        return Cell::blank();
    }
    match result.kind() {
        Kind::Null | Kind::Blank => Cell::void(),
        _ => result,
    }
}

fn native_loop(engine: &mut Engine) -> EvalResult<Cell> {
    let count = arg(engine, "count").map_err(Unwind::Error)?;
    let body = arg(engine, "body").map_err(Unwind::Error)?;
    let Payload::Int(n) = count.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("count", "INTEGER!", count.kind())));
    };
    let Payload::Series(body_id) = body.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("body", "BLOCK!", body.kind())));
    };
    let mut result = Cell::null();
    let mut ran = false;
    for _ in 0..n.max(0) {
        ran = true;
        match absorb_loop_signal(eval_block(engine, body_id))? {
            LoopSignal::Normal(v) => result = v,
            LoopSignal::Continue => continue,
            LoopSignal::Break => return Ok(Cell::null()),
        }
    }
    Ok(loop_exit_value(ran, result))
}

fn native_while(engine: &mut Engine) -> EvalResult<Cell> {
    let condition = arg(engine, "condition").map_err(Unwind::Error)?;
    let body = arg(engine, "body").map_err(Unwind::Error)?;
    let Payload::Series(cond_id) = condition.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("condition", "BLOCK!", condition.kind())));
    };
    let Payload::Series(body_id) = body.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("body", "BLOCK!", body.kind())));
    };
    let mut result = Cell::null();
    let mut ran = false;
    loop {
        let test = eval_block(engine, cond_id)?;
        if !is_truthy(test) {
            break;
        }
        ran = true;
        match absorb_loop_signal(eval_block(engine, body_id))? {
            LoopSignal::Normal(v) => result = v,
            LoopSignal::Continue => continue,
            LoopSignal::Break => break,
        }
    }
    Ok(loop_exit_value(ran, result))
}

fn native_until(engine: &mut Engine) -> EvalResult<Cell> {
    let body = arg(engine, "body").map_err(Unwind::Error)?;
    let Payload::Series(body_id) = body.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("body", "BLOCK!", body.kind())));
    };
    let mut result = Cell::null();
    let mut ran = false;
    loop {
        ran = true;
        match absorb_loop_signal(eval_block(engine, body_id))? {
            LoopSignal::Normal(v) => {
                result = v;
                if is_truthy(v) {
                    break;
                }
            }
            LoopSignal::Continue => continue,
            LoopSignal::Break => break,
        }
    }
    Ok(loop_exit_value(ran, result))
}

fn native_for_each(engine: &mut Engine) -> EvalResult<Cell> {
    let word_cell = arg(engine, "word").map_err(Unwind::Error)?;
    let series_val = arg(engine, "series").map_err(Unwind::Error)?;
    let body = arg(engine, "body").map_err(Unwind::Error)?;
    let loop_sym = word_symbol_of(word_cell);
    let Payload::Series(series_id) = series_val.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("series", "BLOCK!", series_val.kind())));
    };
    let Payload::Series(body_id) = body.payload() else {
        return Err(Unwind::Error(CoreError::argument_type("body", "BLOCK!", body.kind())));
    };

    let keylist = engine.series.make_array(vec![Cell::null()], Flavor::Pairlist);
    let ctx = engine.contexts.make(&mut engine.series, ContextKind::Module, keylist, 0);
    engine.contexts.declare(&mut engine.series, &mut engine.params, ctx, ParamEntry::normal(loop_sym), Cell::null());
    bind_body_to_context(engine, body_id, ctx, &[loop_sym]);

    let items: Vec<Cell> = engine.series.get(series_id).as_slice().to_vec();
    let mut result = Cell::null();
    let mut ran = false;
    for item in items {
        ran = true;
        engine.contexts.set_var(&mut engine.series, ctx, 1, item).map_err(Unwind::Error)?;
        match absorb_loop_signal(eval_block(engine, body_id))? {
            LoopSignal::Normal(v) => result = v,
            LoopSignal::Continue => continue,
            LoopSignal::Break => break,
        }
    }
    Ok(loop_exit_value(ran, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::eval_to_end;

    fn bound_word(engine: &mut Engine, module: ContextId, text: &str) -> Cell {
        let sym = engine.interner.intern(text);
        let mut w = Cell::word(sym);
        w.set_binding(Binding::Context(module));
        w
    }

    #[test]
    fn arithmetic_dispatches_generics_for_prefix_and_enfix() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let add_word = bound_word(&mut engine, module, "add");
        let block = engine.series.make_array(vec![add_word, Cell::integer(2), Cell::integer(3)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block).unwrap().payload(), Payload::Int(5));

        let plus_word = bound_word(&mut engine, module, "+");
        let block2 = engine.series.make_array(vec![Cell::integer(4), plus_word, Cell::integer(5)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block2).unwrap().payload(), Payload::Int(9));
    }

    #[test]
    fn if_only_runs_the_branch_when_truthy() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let inner = engine.series.make_array(vec![Cell::integer(9)], Flavor::Plain);
        let if_word = bound_word(&mut engine, module, "if");
        let block = engine.series.make_array(vec![if_word, Cell::logic(false), Cell::block(inner)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block).unwrap().kind(), Kind::Null);

        let inner2 = engine.series.make_array(vec![Cell::integer(9)], Flavor::Plain);
        let if_word2 = bound_word(&mut engine, module, "if");
        let block2 = engine.series.make_array(vec![if_word2, Cell::logic(true), Cell::block(inner2)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block2).unwrap().payload(), Payload::Int(9));
    }

    #[test]
    fn user_defined_function_supports_definitional_return() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let x = engine.interner.intern("x");
        let spec_id = engine.series.make_array(vec![Cell::word(x)], Flavor::Plain);
        let add_word = bound_word(&mut engine, module, "add");
        let body_id = engine.series.make_array(vec![add_word, Cell::word(x), Cell::integer(1)], Flavor::Plain);

        let function_word = bound_word(&mut engine, module, "function");
        let call =
            engine.series.make_array(vec![function_word, Cell::block(spec_id), Cell::block(body_id)], Flavor::Plain);
        let made = eval_to_end(&mut engine, call).unwrap();
        let Payload::Action(action) = made.payload() else { panic!("expected an action") };
        declare_action(&mut engine, module, "inc", action, false);

        let inc_word = bound_word(&mut engine, module, "inc");
        let invoke = engine.series.make_array(vec![inc_word, Cell::integer(5)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, invoke).unwrap().payload(), Payload::Int(6));
    }

    #[test]
    fn function_parameter_type_block_enforces_declared_type() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let n = engine.interner.intern("n");
        let type_block_id = engine.series.make_array(vec![Cell::datatype(Kind::Integer)], Flavor::Plain);
        let spec_id = engine.series.make_array(vec![Cell::word(n), Cell::block(type_block_id)], Flavor::Plain);
        let body_id = engine.series.make_array(vec![Cell::word(n)], Flavor::Plain);

        let function_word = bound_word(&mut engine, module, "function");
        let call =
            engine.series.make_array(vec![function_word, Cell::block(spec_id), Cell::block(body_id)], Flavor::Plain);
        let made = eval_to_end(&mut engine, call).unwrap();
        let Payload::Action(action) = made.payload() else { panic!("expected an action") };
        declare_action(&mut engine, module, "identity", action, false);

        let identity_word = bound_word(&mut engine, module, "identity");
        let bad_call = engine.series.make_array(vec![identity_word, Cell::logic(true)], Flavor::Plain);
        let err = eval_to_end(&mut engine, bad_call).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn specialize_hides_and_freezes_an_argument() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let add_sym = engine.interner.intern("add");
        let mut add_word = Cell::word(add_sym);
        add_word.set_binding(Binding::Context(module));

        let b = engine.interner.intern("b");
        let set_b = Cell::set_word(b);
        let def_id = engine.series.make_array(vec![set_b, Cell::integer(10)], Flavor::Plain);

        let specialize_word = bound_word(&mut engine, module, "specialize");
        let call =
            engine.series.make_array(vec![specialize_word, add_word, Cell::block(def_id)], Flavor::Plain);
        let made = eval_to_end(&mut engine, call).unwrap();
        let Payload::Action(specialized) = made.payload() else { panic!("expected an action") };
        declare_action(&mut engine, module, "add-ten", specialized, false);

        let invoke_word = bound_word(&mut engine, module, "add-ten");
        let invoke = engine.series.make_array(vec![invoke_word, Cell::integer(5)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, invoke).unwrap().payload(), Payload::Int(15));
    }

    #[test]
    fn append_dup_only_gathers_refinements_regardless_of_written_order() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let dup = engine.interner.intern("dup");
        let only = engine.interner.intern("only");
        let copy_word = bound_word(&mut engine, module, "copy");
        let a = engine.series.make_array(vec![Cell::word(engine.interner.intern("a"))], Flavor::Plain);
        // `a` is used as a bare word here only to exercise `copy`'s literal-block
        // argument path; bind it so evaluating the inner block doesn't matter (copy
        // never evaluates its contents).
        let b = engine.series.make_array(vec![Cell::integer(99)], Flavor::Plain);

        for (first, second) in [(dup, only), (only, dup)] {
            let append_word = bound_word(&mut engine, module, "append");
            let call = engine.series.make_array(
                vec![
                    append_word,
                    Cell::refinement(first),
                    Cell::refinement(second),
                    copy_word,
                    Cell::block(a),
                    Cell::block(b),
                    Cell::integer(2),
                ],
                Flavor::Plain,
            );
            let result = eval_to_end(&mut engine, call).unwrap();
            let Payload::Series(id) = result.payload() else { panic!("expected a block") };
            let elements = engine.series.get(id).as_slice();
            assert_eq!(elements.len(), 3);
            assert_eq!(elements[1].kind(), Kind::Block);
            assert_eq!(elements[2].kind(), Kind::Block);
        }
    }

    #[test]
    fn specialize_refinement_redirects_value_to_guarded_argument() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let dup = engine.interner.intern("dup");
        let set_dup = Cell::set_word(dup);
        let def_id = engine.series.make_array(vec![set_dup, Cell::integer(2)], Flavor::Plain);

        let append_word = bound_word(&mut engine, module, "append");
        let specialize_word = bound_word(&mut engine, module, "specialize");
        let call = engine.series.make_array(vec![specialize_word, append_word, Cell::block(def_id)], Flavor::Plain);
        let made = eval_to_end(&mut engine, call).unwrap();
        let Payload::Action(dup2) = made.payload() else { panic!("expected an action") };
        declare_action(&mut engine, module, "dup2", dup2, false);

        let copy_word = bound_word(&mut engine, module, "copy");
        let a = engine.series.make_array(vec![Cell::integer(1)], Flavor::Plain);
        let value = engine.series.make_array(vec![Cell::integer(9)], Flavor::Plain);
        let dup2_word = bound_word(&mut engine, module, "dup2");
        let invoke = engine.series.make_array(
            vec![dup2_word, copy_word, Cell::block(a), Cell::block(value)],
            Flavor::Plain,
        );
        let result = eval_to_end(&mut engine, invoke).unwrap();
        let Payload::Series(id) = result.payload() else { panic!("expected a block") };
        assert_eq!(engine.series.get(id).as_slice().len(), 3);
    }

    #[test]
    fn loop_break_stops_early_and_yields_null() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let break_word = bound_word(&mut engine, module, "break");
        let body_id = engine.series.make_array(vec![break_word], Flavor::Plain);
        let loop_word = bound_word(&mut engine, module, "loop");
        let block = engine.series.make_array(vec![loop_word, Cell::integer(3), Cell::block(body_id)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block).unwrap().kind(), Kind::Null);
    }

    #[test]
    fn for_each_binds_the_loop_variable_per_element() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let x = engine.interner.intern("x");
        let series_id = engine.series.make_array(vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)], Flavor::Plain);
        let body_id = engine.series.make_array(vec![Cell::word(x)], Flavor::Plain);

        let for_each_word = bound_word(&mut engine, module, "for-each");
        let block = engine.series.make_array(
            vec![for_each_word, Cell::word(x), Cell::block(series_id), Cell::block(body_id)],
            Flavor::Plain,
        );
        assert_eq!(eval_to_end(&mut engine, block).unwrap().payload(), Payload::Int(3));
    }

    #[test]
    fn loop_zero_times_yields_blank_not_null() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let body_id = engine.series.make_array(vec![Cell::integer(9)], Flavor::Plain);
        let loop_word = bound_word(&mut engine, module, "loop");
        let block = engine.series.make_array(vec![loop_word, Cell::integer(0), Cell::block(body_id)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block).unwrap().kind(), Kind::Blank);
    }

    #[test]
    fn while_false_up_front_yields_blank_not_null() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let cond_id = engine.series.make_array(vec![Cell::logic(false)], Flavor::Plain);
        let body_id = engine.series.make_array(vec![Cell::integer(9)], Flavor::Plain);
        let while_word = bound_word(&mut engine, module, "while");
        let block =
            engine.series.make_array(vec![while_word, Cell::block(cond_id), Cell::block(body_id)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block).unwrap().kind(), Kind::Blank);
    }

    #[test]
    fn for_each_over_empty_series_yields_blank_not_null() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        let x = engine.interner.intern("x");
        let series_id = engine.series.make_array(vec![], Flavor::Plain);
        let body_id = engine.series.make_array(vec![Cell::word(x)], Flavor::Plain);

        let for_each_word = bound_word(&mut engine, module, "for-each");
        let block = engine.series.make_array(
            vec![for_each_word, Cell::word(x), Cell::block(series_id), Cell::block(body_id)],
            Flavor::Plain,
        );
        assert_eq!(eval_to_end(&mut engine, block).unwrap().kind(), Kind::Blank);
    }

    #[test]
    fn loop_body_ending_in_null_completes_as_void() {
        let mut engine = Engine::new_for_test();
        let module = install(&mut engine);

        // `if false [...]` evaluates to null; a loop that completes normally (no break)
        // must never surface that raw null (spec §4.G — null is BREAK's own sentinel).
        let if_word = bound_word(&mut engine, module, "if");
        let inner = engine.series.make_array(vec![Cell::integer(9)], Flavor::Plain);
        let body_id = engine.series.make_array(vec![if_word, Cell::logic(false), Cell::block(inner)], Flavor::Plain);
        let loop_word = bound_word(&mut engine, module, "loop");
        let block = engine.series.make_array(vec![loop_word, Cell::integer(2), Cell::block(body_id)], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block).unwrap().kind(), Kind::Void);
    }
}
