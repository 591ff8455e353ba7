//! Evaluator Loop (spec §4.E).
//!
//! `eval_one_expression` is the atomic unit: it consumes exactly one complete expression
//! from a [`Feed`] (an inert literal, a variable fetch, a prefix action call, or a chain
//! of enfix continuations off of any of those) and returns its value. `eval_block` drives
//! a whole array to completion. Grounded on the teacher lineage's bytecode dispatch loop
//! (`bytecode/vm/mod.rs`'s fetch-decode-execute step), adapted from bytecode-offset
//! stepping to cell-feed stepping.

use crate::{
    cell::{Binding, Cell, CellFlags, Kind, Payload},
    context::{ContextId, ContextKind},
    control::{absorb_return, EvalResult, Thrown, Unwind},
    dispatch::{ActionId, Dispatcher},
    error::{CoreError, CoreResult, ErrorKind},
    frame::Feed,
    paramlist::{paramlist_array, ParamClass},
    series::SeriesId,
    Engine,
};

/// Top-level driver (spec §4.E "evaluates a block to its last non-invisible result").
///
/// # Errors
/// Converts any unhandled [`Unwind`] (error or escaped control signal) into a
/// [`CoreError`] (spec §7).
pub fn eval_to_end(engine: &mut Engine, block: SeriesId) -> CoreResult<Cell> {
    eval_block(engine, block).map_err(|unwind| {
        let interner = &engine.interner;
        unwind.into_core_error(|sym| interner.resolve(sym).to_string())
    })
}

/// Runs every expression in `block` in sequence, returning the last one's value (void if
/// the block is empty).
pub fn eval_block(engine: &mut Engine, block: SeriesId) -> EvalResult<Cell> {
    let mut feed = Feed::new(block);
    let mut last = Cell::void();
    while !feed.at_end(&engine.series) {
        last = eval_one_expression(engine, &mut feed)?;
    }
    Ok(last)
}

/// Consumes and evaluates exactly one expression, including any enfix continuations
/// (spec §4.E.4).
pub fn eval_one_expression(engine: &mut Engine, feed: &mut Feed) -> EvalResult<Cell> {
    let mut out = eval_step(engine, feed)?;
    loop {
        match try_enfix_continue(engine, feed, &out)? {
            Some(next) => out = next,
            None => return Ok(out),
        }
    }
}

/// One non-enfix step: dispatches on the feed's current cell's kind (spec §4.E.1).
fn eval_step(engine: &mut Engine, feed: &mut Feed) -> EvalResult<Cell> {
    let cell = *feed.peek(&engine.series).ok_or_else(|| {
        Unwind::Error(CoreError::new(ErrorKind::Internal, "eval_step called at feed end"))
    })?;
    engine.tracer.on_step(cell.kind());

    if cell.quote_level() > 0 {
        feed.advance();
        return Ok(cell.dequotify());
    }

    match cell.kind() {
        k if k.is_inert() => {
            feed.advance();
            let mut v = cell;
            v.set_flag(CellFlags::UNEVALUATED);
            Ok(v)
        }
        Kind::Word => {
            feed.advance();
            eval_word(engine, feed, cell)
        }
        Kind::GetWord => {
            feed.advance();
            fetch_word(engine, cell).map_err(Unwind::Error)
        }
        Kind::LitWord => {
            feed.advance();
            Ok(Cell::word(word_symbol(cell)))
        }
        Kind::SetWord => {
            feed.advance();
            if feed.at_end(&engine.series) {
                return Err(Unwind::Error(CoreError::new(ErrorKind::Script, "set-word at end of input")));
            }
            let value = eval_one_expression(engine, feed)?;
            bind_and_set(engine, cell, value)
        }
        Kind::Group => {
            feed.advance();
            let Payload::Series(inner) = cell.payload() else {
                return Err(Unwind::Error(CoreError::new(ErrorKind::Internal, "group cell without series payload")));
            };
            eval_block(engine, inner)
        }
        Kind::Void => {
            feed.advance();
            Ok(cell)
        }
        other => Err(Unwind::Error(CoreError::new(ErrorKind::Internal, format!("unhandled step kind {other:?}")))),
    }
}

/// Resolves `word` and either dispatches it (if it names an action) or returns its
/// stored value (spec §4.E.1).
fn eval_word(engine: &mut Engine, feed: &mut Feed, word: Cell) -> EvalResult<Cell> {
    let resolved = fetch_word(engine, word).map_err(Unwind::Error)?;
    if let Payload::Action(action) = resolved.payload() {
        if resolved.get_flag(CellFlags::ENFIXED) {
            // An enfixed action reached in prefix position with nothing to its left is a
            // script error rather than silently treated as a plain value (spec §4.E.4).
            return Err(Unwind::Error(CoreError::new(
                ErrorKind::Script,
                "enfixed action used with no left-hand argument",
            )));
        }
        return dispatch_action(engine, feed, action);
    }
    Ok(resolved)
}

/// Looks ahead for an enfixed action bound to the feed's current word and, if found,
/// consumes it and dispatches with `left` as its first argument (spec §4.E.4).
fn try_enfix_continue(engine: &mut Engine, feed: &mut Feed, left: &Cell) -> EvalResult<Option<Cell>> {
    let Some(next) = feed.peek(&engine.series).copied() else { return Ok(None) };
    if next.kind() != Kind::Word {
        return Ok(None);
    }
    let resolved = fetch_word(engine, next).map_err(Unwind::Error)?;
    let Payload::Action(action) = resolved.payload() else { return Ok(None) };
    if !resolved.get_flag(CellFlags::ENFIXED) {
        return Ok(None);
    }
    feed.advance();
    let result = dispatch_action_with_shove(engine, feed, action, *left)?;
    Ok(Some(result))
}

fn word_symbol(cell: Cell) -> crate::intern::Symbol {
    match cell.payload() {
        Payload::Symbol(sym) => sym,
        _ => unreachable!("word-like cell without a symbol payload"),
    }
}

/// Resolves any binding a word cell may carry to a concrete context (spec §9). A
/// `Binding::Relative(owner)` resolves against the currently dispatching frame whenever
/// that frame's own phase matches `owner` — true for every body/prelude this core ever
/// binds relatively, since `bind_body_to_action` always names the frame's own defining
/// action (spec §12: no lexical enclosing-module chain, so a relative word reached from
/// somewhere else is a genuine binding error rather than a scope to search outward from).
fn resolve_binding(engine: &Engine, binding: Binding) -> CoreResult<ContextId> {
    match binding {
        Binding::Context(ctx) => Ok(ctx),
        Binding::Relative(owner) => {
            let frame = engine
                .frames
                .top()
                .ok_or_else(|| CoreError::new(ErrorKind::Internal, "relative word resolved with no active frame"))?;
            match specific_binding(binding, frame.context(), frame.phase()) {
                Binding::Context(ctx) if owner == frame.phase() => Ok(ctx),
                _ => Err(CoreError::new(ErrorKind::Internal, "relative word resolved outside its defining frame")),
            }
        }
        Binding::Unbound => Err(CoreError::new(ErrorKind::Script, "word has no binding")),
    }
}

fn fetch_word(engine: &Engine, word: Cell) -> CoreResult<Cell> {
    let ctx = resolve_binding(engine, word.binding())?;
    let symbol = word_symbol(word);
    let Some(slot) = engine.contexts.find_slot(&engine.series, &engine.params, ctx, symbol) else {
        return Err(CoreError::new(ErrorKind::Script, "word not found in its bound context"));
    };
    engine.contexts.get_var(&engine.series, ctx, slot).map(|c| *c)
}

fn bind_and_set(engine: &mut Engine, set_word: Cell, value: Cell) -> EvalResult<Cell> {
    let ctx = resolve_binding(engine, set_word.binding())?;
    let symbol = word_symbol(set_word);
    let Some(slot) = engine.contexts.find_slot(&engine.series, &engine.params, ctx, symbol) else {
        return Err(Unwind::Error(CoreError::new(ErrorKind::Script, "set-word not found in its bound context")));
    };
    engine.contexts.set_var(&mut engine.series, ctx, slot, value)?;
    Ok(value)
}

/// Prefix dispatch: `action`'s arguments are gathered starting at the feed's current
/// position (spec §4.E.2, §4.E.3).
fn dispatch_action(engine: &mut Engine, feed: &mut Feed, action: ActionId) -> EvalResult<Cell> {
    run_dispatch(engine, feed, action, None)
}

/// Enfix dispatch: `left` (already evaluated) fills the first ordinary parameter slot.
fn dispatch_action_with_shove(engine: &mut Engine, feed: &mut Feed, action: ActionId, left: Cell) -> EvalResult<Cell> {
    run_dispatch(engine, feed, action, Some(left))
}

/// The shared call machinery (spec §4.D push/fulfill/dispatch/drop): handles the full
/// Specialized/Adapted/Chained/Enclosed composition layer (spec §4.F) before finally
/// running a `Native`/`Interpreted` base dispatcher.
fn run_dispatch(engine: &mut Engine, feed: &mut Feed, action: ActionId, shoved: Option<Cell>) -> EvalResult<Cell> {
    let paramlist = engine.actions.get(action).paramlist;
    let binding = Binding::Relative(action);
    engine
        .frames
        .push(
            &mut engine.series,
            &mut engine.contexts,
            &engine.data_stack,
            &mut engine.depth,
            engine.tracer.as_mut(),
            action,
            paramlist,
            binding,
            *feed,
        )
        .map_err(Unwind::Error)?;
    let frame_ctx = engine.frames.top().expect("just pushed").context();

    let result = fulfill_and_dispatch(engine, action, shoved, frame_ctx);

    // The feed may have advanced inside the frame (args consumed); propagate its final
    // position back to the caller's feed before dropping the frame.
    *feed = *engine.frames.top().expect("still on stack").feed();
    engine.frames.drop_top(&mut engine.contexts, &mut engine.data_stack, &mut engine.depth, engine.tracer.as_mut());
    result
}

fn fulfill_and_dispatch(
    engine: &mut Engine,
    action: ActionId,
    shoved: Option<Cell>,
    frame_ctx: crate::context::ContextId,
) -> EvalResult<Cell> {
    fulfill_args(engine, action, shoved, frame_ctx)?;
    // `frame_ctx` is shared across every composition layer (Adapted's prelude, Specialized's
    // frozen-slot fill-in, the eventual Interpreted body) down to whichever one actually
    // calls `return` — so the one absorption point has to sit above all of them, not inside
    // whichever arm happens to be an interpreted body (spec §4.E.2, §4.F).
    let result = run_dispatcher(engine, action, frame_ctx);
    absorb_return(result, frame_ctx)
}

/// Walks `action`'s paramlist left to right, consuming the frame's feed for each
/// positional class and gating refinement-owned arguments (spec §4.E.3, §3.3).
fn fulfill_args(
    engine: &mut Engine,
    action: ActionId,
    shoved: Option<Cell>,
    frame_ctx: crate::context::ContextId,
) -> EvalResult<()> {
    let paramlist_id = engine.actions.get(action).paramlist;
    let array = paramlist_array(&engine.series, paramlist_id);
    let param_ids: Vec<_> = array
        .as_slice()
        .iter()
        .skip(1)
        .filter_map(|c| match c.payload() {
            Payload::Param(pid) => Some(pid),
            _ => None,
        })
        .collect();

    // Gather any refinement cells the caller wrote directly into the feed ahead of
    // positional arguments (spec §4.E.3's dsp-ordered gathering, simplified here to a
    // flat scan since the lexical path-walker that would normally drive it is out of
    // scope — see SPEC_FULL.md §14).
    let dsp_base = engine.data_stack.dsp();
    {
        let mut feed = *engine.frames.top().expect("frame active").feed();
        while let Some(next) = feed.peek(&engine.series) {
            if next.kind() != Kind::Refinement {
                break;
            }
            engine.data_stack.push(*next);
            feed.advance();
        }
        *engine.frames.top_mut().expect("frame active").feed_mut() = feed;
    }
    let requested: Vec<crate::intern::Symbol> = engine
        .data_stack
        .slice_from(dsp_base)
        .iter()
        .filter_map(|c| match c.payload() {
            Payload::Symbol(sym) => Some(sym),
            _ => None,
        })
        .collect();

    let mut shoved = shoved;
    let mut refinement_active = true;
    let mut first_positional_used = false;

    for pid in param_ids {
        let entry = engine.params.get(pid).clone();
        let Some(slot) = engine.contexts.find_slot(&engine.series, &engine.params, frame_ctx, entry.symbol) else {
            continue;
        };
        // A specialized-away parameter (spec §3.3, §4.F.1 "removed from the callable
        // interface") never consumes a feed slot — its value arrives later from
        // `Dispatcher::Specialized`'s frozen list, not from the caller. A hidden
        // refinement is always treated as used, so any trailing positional it guards
        // still reads its value from the definition block's other frozen slot rather
        // than being nulled out.
        if entry.hidden {
            if entry.class == ParamClass::Refinement {
                refinement_active = true;
            }
            continue;
        }
        match entry.class {
            ParamClass::Refinement => {
                let present = requested.contains(&entry.symbol);
                refinement_active = present;
                engine
                    .contexts
                    .set_var(&mut engine.series, frame_ctx, slot, Cell::logic(present))
                    .map_err(Unwind::Error)?;
            }
            ParamClass::Local => {
                engine.contexts.set_var(&mut engine.series, frame_ctx, slot, Cell::null()).map_err(Unwind::Error)?;
            }
            ParamClass::Return => {
                // Definitional RETURN (spec §4.E.2): the slot holds an actual ACTION!
                // value once `natives::install` has registered the shared `return`
                // native, so `return value` inside a body dispatches it like any other
                // action word rather than needing special-cased evaluator support.
                let value = engine.return_action.map_or_else(Cell::null, Cell::action);
                engine.contexts.set_var(&mut engine.series, frame_ctx, slot, value).map_err(Unwind::Error)?;
            }
            ParamClass::Normal | ParamClass::Tight | ParamClass::HardQuote | ParamClass::SoftQuote => {
                if !refinement_active {
                    engine
                        .contexts
                        .set_var(&mut engine.series, frame_ctx, slot, Cell::null())
                        .map_err(Unwind::Error)?;
                    continue;
                }
                let value = if !first_positional_used && shoved.is_some() {
                    first_positional_used = true;
                    shoved.take().expect("checked Some")
                } else {
                    first_positional_used = true;
                    take_argument(engine, entry.class)?
                };
                if !entry.types.is_empty() && !entry.types.accepts(value.kind(), entry.endable) {
                    return Err(Unwind::Error(CoreError::argument_type(
                        engine.interner.resolve(entry.symbol),
                        "declared type",
                        value.kind(),
                    )));
                }
                engine.contexts.set_var(&mut engine.series, frame_ctx, slot, value).map_err(Unwind::Error)?;
            }
        }
    }
    engine.data_stack.restore(dsp_base);
    Ok(())
}

/// Pulls one argument value off the current frame's feed, honoring the parameter's
/// evaluative class (spec §3.3, §4.E.2).
fn take_argument(engine: &mut Engine, class: ParamClass) -> EvalResult<Cell> {
    let mut feed = *engine.frames.top().expect("frame active").feed();
    let value = if feed.at_end(&engine.series) {
        Cell::end()
    } else {
        match class {
            ParamClass::HardQuote => {
                let cell = *feed.peek(&engine.series).expect("checked not at end");
                feed.advance();
                cell
            }
            ParamClass::SoftQuote => {
                let cell = *feed.peek(&engine.series).expect("checked not at end");
                if cell.kind() == Kind::Group {
                    eval_one_expression(engine, &mut feed)?
                } else {
                    feed.advance();
                    cell
                }
            }
            ParamClass::Normal | ParamClass::Tight => eval_one_expression(engine, &mut feed)?,
            ParamClass::Refinement | ParamClass::Local | ParamClass::Return => {
                unreachable!("positional-only classes")
            }
        }
    };
    *engine.frames.top_mut().expect("frame active").feed_mut() = feed;
    Ok(value)
}

/// Actually runs `action`'s dispatcher against the already-fulfilled frame (spec §4.F):
/// recurses through Specialized/Adapted/Chained/Enclosed until it reaches a
/// Native/Interpreted base.
fn run_dispatcher(engine: &mut Engine, action: ActionId, frame_ctx: crate::context::ContextId) -> EvalResult<Cell> {
    match &engine.actions.get(action).dispatcher {
        Dispatcher::Native(f) => {
            let f = *f;
            f(engine)
        }
        Dispatcher::Interpreted { body } => {
            let body = *body;
            eval_block(engine, body)
        }
        Dispatcher::Specialized { base, frozen } => {
            let base = *base;
            for (pid, value) in frozen.clone() {
                let symbol = engine.params.get(pid).symbol;
                if let Some(slot) = engine.contexts.find_slot(&engine.series, &engine.params, frame_ctx, symbol) {
                    engine.contexts.set_var(&mut engine.series, frame_ctx, slot, value).map_err(Unwind::Error)?;
                }
            }
            engine.frames.top_mut().expect("frame active").set_phase(base);
            run_dispatcher(engine, base, frame_ctx)
        }
        Dispatcher::Adapted { base, prelude } => {
            let base = *base;
            let prelude = *prelude;
            eval_block(engine, prelude)?;
            engine.frames.top_mut().expect("frame active").set_phase(base);
            run_dispatcher(engine, base, frame_ctx)
        }
        Dispatcher::Chained { steps } => {
            let steps = steps.clone();
            let mut iter = steps.into_iter();
            let first = iter.next().expect("chain always has at least one step");
            let mut value = run_dispatcher(engine, first, frame_ctx)?;
            for step in iter {
                value = apply_single_arg(engine, step, value)?;
            }
            Ok(value)
        }
        Dispatcher::Enclosed { outer, .. } => {
            // `base`'s identity is recovered from the reified frame's own rootkey (set
            // when this composed action's paramlist was built as a copy of `base`'s, spec
            // §4.F "Encloser") rather than re-threaded here.
            let outer = *outer;
            engine.frames.top_mut().expect("frame active").reify(&mut engine.series, &engine.contexts);
            let frame_value = Cell::frame(frame_ctx);
            apply_single_arg(engine, outer, frame_value)
        }
        Dispatcher::Voider { base } => {
            let base = *base;
            engine.frames.top_mut().expect("frame active").set_phase(base);
            run_dispatcher(engine, base, frame_ctx)?;
            Ok(Cell::void())
        }
    }
}

/// Runs a reified frame's own rootkey action directly against its already-fulfilled
/// vars, with no further argument gathering (spec §4.F "Encloser" — what ENCLOSE's
/// `outer` calls to actually invoke `base`, typically exposed to user code as an `apply
/// frame` native, spec §11).
///
/// # Errors
/// Returns a [`CoreError`] if `frame_ctx` carries no frame archetype (not built by
/// [`run_dispatch`]/[`apply_single_arg`]).
pub fn run_frame(engine: &mut Engine, frame_ctx: crate::context::ContextId) -> EvalResult<Cell> {
    let Some(action) = engine.contexts.get(frame_ctx).rootkey_action(&engine.series) else {
        return Err(Unwind::Error(CoreError::new(ErrorKind::Script, "value is not an invocable frame")));
    };
    let result = run_dispatcher(engine, action, frame_ctx);
    absorb_return(result, frame_ctx)
}

/// Calls `action` with exactly one already-evaluated argument — used by CHAIN (each
/// step after the first) and ENCLOSE (`outer` receiving the reified frame).
fn apply_single_arg(engine: &mut Engine, action: ActionId, arg: Cell) -> EvalResult<Cell> {
    let paramlist = engine.actions.get(action).paramlist;
    let single = engine.series.make_array(vec![arg], crate::series::Flavor::Plain);
    let binding = Binding::Relative(action);
    engine
        .frames
        .push(
            &mut engine.series,
            &mut engine.contexts,
            &engine.data_stack,
            &mut engine.depth,
            engine.tracer.as_mut(),
            action,
            paramlist,
            binding,
            Feed::new(single),
        )
        .map_err(Unwind::Error)?;
    let frame_ctx = engine.frames.top().expect("just pushed").context();
    let result = fulfill_and_dispatch(engine, action, None, frame_ctx);
    engine.frames.drop_top(&mut engine.contexts, &mut engine.data_stack, &mut engine.depth, engine.tracer.as_mut());
    result
}

/// Builds a frame context's varlist/keylist and binds `body`'s words against it — the
/// minimal "make function" support natives need (spec §4.E.2, §11). Binding here means
/// rewriting every word cell in `body` (recursively through nested blocks) whose symbol
/// matches a parameter to `Binding::Relative(action)`; words that don't match are left
/// unbound, to be resolved against an enclosing/module context by a future lookup (not
/// implemented — this core has no lexical enclosing-module chain, spec §12).
pub fn bind_body_to_action(engine: &mut Engine, body: SeriesId, action: ActionId, param_symbols: &[crate::intern::Symbol]) {
    let len = engine.series.get(body).len();
    for i in 0..len {
        let cell = *engine.series.get(body).get(i).expect("index in range");
        if cell.kind().is_word_like() {
            if let Payload::Symbol(sym) = cell.payload() {
                if param_symbols.contains(&sym) {
                    let mut bound = cell;
                    bound.set_binding(Binding::Relative(action));
                    *engine.series.get_mut(body).get_mut(i).expect("index in range") = bound;
                }
            }
        } else if let Payload::Series(nested) = cell.payload() {
            if matches!(cell.kind(), Kind::Block | Kind::Group) {
                bind_body_to_action(engine, nested, action, param_symbols);
            }
        }
    }
}

/// Reifies `action`'s relative bindings against a concrete frame context (spec §9
/// "relative binding... resolving a word requires a current frame instantiated from the
/// same action"). Here that resolution collapses to a direct `ContextId` substitution
/// since every [`Binding::Relative`] cell already names which action it is relative to.
#[must_use]
pub fn specific_binding(binding: Binding, frame_ctx: crate::context::ContextId, owner: ActionId) -> Binding {
    match binding {
        Binding::Relative(a) if a == owner => Binding::Context(frame_ctx),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paramlist::{compile_spec, SpecItem},
        series::Flavor,
    };

    fn setup_add_action(engine: &mut Engine) -> (ActionId, crate::intern::Symbol, crate::intern::Symbol) {
        let a = engine.interner.intern("a");
        let b = engine.interner.intern("b");
        let ret = engine.well_known.return_;
        let compiled = compile_spec(
            &mut engine.series,
            &mut engine.params,
            ActionId::test_handle(0),
            &[SpecItem::Word(a), SpecItem::Word(b)],
            false,
            ret,
        )
        .unwrap();
        let paramlist = compiled.paramlist;
        let action = engine.actions.make(paramlist, Dispatcher::Native(native_add));
        (action, a, b)
    }

    fn native_add(engine: &mut Engine) -> EvalResult<Cell> {
        let ctx = engine.frames.top().unwrap().context();
        let a = engine.interner.intern("a");
        let b = engine.interner.intern("b");
        let sa = engine.contexts.find_slot(&engine.series, &engine.params, ctx, a).unwrap();
        let sb = engine.contexts.find_slot(&engine.series, &engine.params, ctx, b).unwrap();
        let va = *engine.contexts.get_var(&engine.series, ctx, sa).map_err(Unwind::Error)?;
        let vb = *engine.contexts.get_var(&engine.series, ctx, sb).map_err(Unwind::Error)?;
        let (Payload::Int(x), Payload::Int(y)) = (va.payload(), vb.payload()) else {
            return Err(Unwind::Error(CoreError::new(ErrorKind::Type, "add expects integers")));
        };
        Ok(Cell::integer(x + y))
    }

    fn bind_global_word(engine: &mut Engine, ctx: crate::context::ContextId, text: &str) -> crate::cell::Cell {
        let sym = engine.interner.intern(text);
        let mut w = Cell::word(sym);
        w.set_binding(Binding::Context(ctx));
        w
    }

    fn global_module(engine: &mut Engine) -> crate::context::ContextId {
        let keylist = engine.series.make_array(vec![Cell::null()], Flavor::Pairlist);
        engine.contexts.make(&mut engine.series, ContextKind::Module, keylist, 0)
    }

    #[test]
    fn dispatches_a_prefix_native_call() {
        let mut engine = Engine::new_for_test();
        let (action, _, _) = setup_add_action(&mut engine);
        let module = global_module(&mut engine);
        let add_sym = engine.interner.intern("add");
        declare_in_context(&mut engine, module, add_sym, Cell::action(action));
        let mut add_word = Cell::word(add_sym);
        add_word.set_binding(Binding::Context(module));
        let block = engine.series.make_array(vec![add_word, Cell::integer(2), Cell::integer(3)], Flavor::Plain);
        let result = eval_to_end(&mut engine, block).unwrap();
        assert_eq!(result.payload(), Payload::Int(5));
    }

    fn declare_in_context(
        engine: &mut Engine,
        module: crate::context::ContextId,
        symbol: crate::intern::Symbol,
        value: Cell,
    ) {
        // Minimal ad hoc extension of a module context's keylist/varlist for tests, since
        // `bind`/`set` natives (spec §11) are out of scope for this unit test helper.
        let keylist = engine.contexts.get(module).keylist();
        let param = engine.params.push(crate::paramlist::ParamEntry::test_normal(symbol));
        engine.series.get_mut(keylist).append(Cell::typeset(param)).unwrap();
        let varlist = engine.contexts.get(module).varlist();
        engine.series.get_mut(varlist).append(value).unwrap();
    }

    #[test]
    fn enfix_call_consumes_left_hand_value() {
        let mut engine = Engine::new_for_test();
        let (add_action, _, _) = setup_add_action(&mut engine);
        let module = global_module(&mut engine);
        let plus_sym = engine.interner.intern("+");
        let mut action_cell = Cell::action(add_action);
        action_cell.set_flag(CellFlags::ENFIXED);
        declare_in_context(&mut engine, module, plus_sym, action_cell);
        let mut plus_word = Cell::word(plus_sym);
        plus_word.set_binding(Binding::Context(module));
        let block = engine.series.make_array(vec![Cell::integer(4), plus_word, Cell::integer(5)], Flavor::Plain);
        let result = eval_to_end(&mut engine, block).unwrap();
        assert_eq!(result.payload(), Payload::Int(9));
    }

    #[test]
    fn set_word_stores_and_yields_the_value() {
        let mut engine = Engine::new_for_test();
        let module = global_module(&mut engine);
        let x = engine.interner.intern("x");
        declare_in_context(&mut engine, module, x, Cell::null());
        let mut set_x = Cell::set_word(x);
        set_x.set_binding(Binding::Context(module));
        let block = engine.series.make_array(vec![set_x, Cell::integer(7)], Flavor::Plain);
        let result = eval_to_end(&mut engine, block).unwrap();
        assert_eq!(result.payload(), Payload::Int(7));
        let mut get_x = bind_global_word(&mut engine, module, "x");
        get_x.set_binding(Binding::Context(module));
        let block2 = engine.series.make_array(vec![get_x], Flavor::Plain);
        assert_eq!(eval_to_end(&mut engine, block2).unwrap().payload(), Payload::Int(7));
    }

    #[test]
    fn unhandled_break_surfaces_as_no_catch_error() {
        // No loop construct is registered in this unit test, so a bare BREAK dispatched
        // straight from the top level must escape all the way out and convert into a
        // typed error (spec §7 "no catch for throw") rather than panicking or silently
        // producing a value.
        fn native_break(_engine: &mut Engine) -> EvalResult<Cell> {
            Err(Unwind::Signal(Thrown::Break))
        }
        let mut engine = Engine::new_for_test();
        let compiled = compile_spec(
            &mut engine.series,
            &mut engine.params,
            ActionId::test_handle(0),
            &[],
            false,
            engine.well_known.return_,
        )
        .unwrap();
        let action = engine.actions.make(compiled.paramlist, Dispatcher::Native(native_break));
        let module = global_module(&mut engine);
        let break_sym = engine.interner.intern("break");
        declare_in_context(&mut engine, module, break_sym, Cell::action(action));
        let mut break_word = Cell::word(break_sym);
        break_word.set_binding(Binding::Context(module));
        let block = engine.series.make_array(vec![break_word], Flavor::Plain);
        let err = eval_to_end(&mut engine, block).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Script);
        assert!(err.message.contains("break"));
    }
}
