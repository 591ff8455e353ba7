//! Paramlist Builder (spec §4.C).
//!
//! Compiles a spec block (description text, parameter words with optional type blocks
//! and notes, refinements, mode tags) into a paramlist array plus an optional
//! meta-object. Grounded on the teacher lineage's `signature.rs`, which performs the same
//! job for Python parameter groups (positional-only / positional-or-keyword / `*args` /
//! keyword-only / `**kwargs`) — the grouping-and-defaults-count structure there is the
//! direct ancestor of the parameter-class/refinement-section structure here.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    cell::{Cell, Kind, Payload},
    dispatch::ActionId,
    error::{CoreError, ErrorKind},
    intern::Symbol,
    series::{Array, Flavor, SeriesArena, SeriesId},
};

/// Handle into a session's [`ParamTable`] (spec §3.3 "parameter descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(u32);

impl ParamId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Parameter class (spec §3.3, §4.E.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    Normal,
    Tight,
    HardQuote,
    SoftQuote,
    Refinement,
    Local,
    Return,
}

/// One bit per supported [`Kind`], plus the two sentinel acceptance flags named in spec
/// §3.3 (`<opt>` accepts null, `<end>` accepts end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeSet {
    bits: u64,
    pub accepts_null: bool,
    pub accepts_end: bool,
}

impl TypeSet {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A typeset accepting every kind plus null and end — used for the synthetic return
    /// parameter (spec §4.C "full-permissive type set").
    #[must_use]
    pub fn full_permissive() -> Self {
        Self { bits: u64::MAX, accepts_null: true, accepts_end: true }
    }

    #[must_use]
    pub fn with(mut self, kind: Kind) -> Self {
        self.allow(kind);
        self
    }

    pub fn allow(&mut self, kind: Kind) {
        if let Some(bit) = kind_bit(kind) {
            self.bits |= 1 << bit;
        }
    }

    #[must_use]
    pub fn contains(&self, kind: Kind) -> bool {
        kind_bit(kind).is_some_and(|bit| self.bits & (1 << bit) != 0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Whether a cell of `kind` satisfies this typeset (spec §8 invariant: "the provided
    /// argument's kind is a member of p's typeset, or p is endable and the argument is
    /// end, or p accepts null and the argument is null").
    #[must_use]
    pub fn accepts(&self, kind: Kind, endable: bool) -> bool {
        match kind {
            Kind::Null => self.accepts_null,
            Kind::End => endable && self.accepts_end,
            other => self.contains(other),
        }
    }
}

fn kind_bit(kind: Kind) -> Option<u8> {
    Some(match kind {
        Kind::Integer => 0,
        Kind::Decimal => 1,
        Kind::Text => 2,
        Kind::Binary => 3,
        Kind::Block => 4,
        Kind::Group => 5,
        Kind::Word => 6,
        Kind::SetWord => 7,
        Kind::GetWord => 8,
        Kind::LitWord => 9,
        Kind::Refinement => 10,
        Kind::Issue => 11,
        Kind::Path => 12,
        Kind::SetPath => 13,
        Kind::GetPath => 14,
        Kind::Action => 15,
        Kind::Frame => 16,
        Kind::Object => 17,
        Kind::Error => 18,
        Kind::Port => 19,
        Kind::Map => 20,
        Kind::Logic => 21,
        Kind::Blank => 22,
        Kind::Datatype => 23,
        Kind::Typeset => 24,
        Kind::Varargs => 25,
        Kind::Handle => 26,
        Kind::Tag => 27,
        Kind::Void | Kind::Null | Kind::End => return None,
    })
}

/// Keylist entry past index 0 (spec §3.3).
#[derive(Debug, Clone)]
pub struct ParamEntry {
    pub symbol: Symbol,
    pub class: ParamClass,
    pub types: TypeSet,
    /// Removed from the callable interface by specialization (spec §3.3, §4.F.1).
    pub hidden: bool,
    /// local/return kinds cannot be rebound (spec §3.3).
    pub unbindable: bool,
    pub endable: bool,
    pub variadic: bool,
}

impl ParamEntry {
    fn new(symbol: Symbol, class: ParamClass) -> Self {
        let unbindable = matches!(class, ParamClass::Local | ParamClass::Return);
        Self { symbol, class, types: TypeSet::empty(), hidden: false, unbindable, endable: false, variadic: false }
    }

    /// Builds a bare `Normal`-class entry directly, bypassing [`compile_spec`] — used by
    /// tests that need to extend a context's keylist without a full spec block.
    #[cfg(test)]
    #[must_use]
    pub fn test_normal(symbol: Symbol) -> Self {
        Self::new(symbol, ParamClass::Normal)
    }

    /// Builds a bare `Normal`-class entry directly, bypassing [`compile_spec`] — used by
    /// [`crate::context::ContextArena::declare`] (spec §11's native library and loop
    /// natives need to extend a module/object context's keylist one variable at a time,
    /// outside of any paramlist compile).
    #[must_use]
    pub fn normal(symbol: Symbol) -> Self {
        Self::new(symbol, ParamClass::Normal)
    }
}

/// Owns every compiled parameter descriptor for a session (spec §3.4 "a paramlist is
/// created once... immutable thereafter").
#[derive(Debug, Default)]
pub struct ParamTable {
    entries: Vec<ParamEntry>,
}

impl ParamTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ParamEntry) -> ParamId {
        let id = ParamId(u32::try_from(self.entries.len()).expect("param table overflow"));
        self.entries.push(entry);
        id
    }

    #[must_use]
    pub fn get(&self, id: ParamId) -> &ParamEntry {
        &self.entries[id.index()]
    }

    pub fn get_mut(&mut self, id: ParamId) -> &mut ParamEntry {
        &mut self.entries[id.index()]
    }
}

/// Attached documentation (spec §4.C): present only when the spec block carried any
/// description text or type/note annotations.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub description: Option<String>,
    pub parameter_notes: IndexMap<Symbol, String>,
    pub parameter_types: IndexMap<Symbol, TypeSet>,
    pub return_type: Option<TypeSet>,
    pub return_note: Option<String>,
}

/// The compiled result of §4.C's two-pass algorithm.
#[derive(Debug)]
pub struct CompiledParamlist {
    pub paramlist: SeriesId,
    /// `ParamId`s in paramlist order (slot 0, the archetype, excluded) — convenience
    /// index paired with the underlying array's typeset cells.
    pub params: Vec<ParamId>,
    pub meta: Option<Meta>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    Params,
    Local,
    With,
}

struct ScratchParam {
    symbol: Symbol,
    class: ParamClass,
    types: TypeSet,
    note: Option<String>,
    saw_type_block: bool,
}

/// One item of an already-scanned spec block (spec §4.C). The caller (typically the
/// `function`/`func` natives, §11) resolves word spellings against its interner before
/// building this list — in particular, a `set-word` spelled `return:` should be passed as
/// `SpecItem::ExplicitReturn` rather than `SpecItem::SetWord` so the builder can upgrade
/// it per spec §4.C without needing interner access itself.
pub enum SpecItem {
    Text(String),
    TypeBlock(TypeSet),
    Word(Symbol),
    GetWord(Symbol),
    LitWord(Symbol),
    Issue(Symbol),
    Refinement(Symbol),
    /// A `set-word` local, e.g. `x:` inside the spec body.
    SetWord(Symbol),
    /// A `set-word` spelled `return:` — upgraded from local to the `Return` class
    /// (spec §4.C).
    ExplicitReturn(Symbol),
    Tag(&'static str),
}

/// Compiles a spec block into a paramlist + optional meta-object (spec §4.C).
///
/// `wants_definitional_return` mirrors "a flag from the generator" in spec §4.C: callers
/// building a Rebol-style `function` pass `true`; callers building a bare `func`-style
/// native pass `false` unless an explicit `return:` is present.
///
/// `synthetic_return_symbol` names the synthetic return parameter when one is appended
/// (spec §4.C); callers intern `"return"` once and pass the resulting [`Symbol`].
pub fn compile_spec(
    series: &mut SeriesArena,
    params: &mut ParamTable,
    action: ActionId,
    spec_items: &[SpecItem],
    wants_definitional_return: bool,
    synthetic_return_symbol: Symbol,
) -> Result<CompiledParamlist, CoreError> {
    let mut scratch: Vec<ScratchParam> = Vec::new();
    let mut seen: AHashMap<Symbol, ()> = AHashMap::new();
    let mut description = None;
    let mut mode = ScanMode::Params;
    let mut explicit_return: Option<usize> = None;
    let mut last_was_type_block = false;

    for item in spec_items {
        match item {
            SpecItem::Text(text) => {
                if let Some(last) = scratch.last_mut() {
                    last.note = Some(text.clone());
                } else {
                    description = Some(text.clone());
                }
                last_was_type_block = false;
            }
            SpecItem::TypeBlock(types) => {
                if last_was_type_block {
                    return Err(CoreError::new(ErrorKind::Script, "two consecutive type blocks in spec"));
                }
                let Some(last) = scratch.last_mut() else {
                    return Err(CoreError::new(ErrorKind::Script, "type block before any parameter"));
                };
                if matches!(last.class, ParamClass::Local) {
                    return Err(CoreError::new(
                        ErrorKind::Script,
                        "local/extern parameters may not declare a type block",
                    ));
                }
                last.types = *types;
                last.saw_type_block = true;
                last_was_type_block = true;
            }
            SpecItem::Refinement(sym) => {
                mode = ScanMode::Params;
                push_param(&mut scratch, &mut seen, *sym, ParamClass::Refinement)?;
                last_was_type_block = false;
            }
            SpecItem::Word(sym) => {
                let class = match mode {
                    ScanMode::Params => ParamClass::Normal,
                    ScanMode::Local | ScanMode::With => ParamClass::Local,
                };
                push_param(&mut scratch, &mut seen, *sym, class)?;
                last_was_type_block = false;
            }
            SpecItem::GetWord(sym) => {
                push_param(&mut scratch, &mut seen, *sym, ParamClass::HardQuote)?;
                last_was_type_block = false;
            }
            SpecItem::LitWord(sym) => {
                push_param(&mut scratch, &mut seen, *sym, ParamClass::SoftQuote)?;
                last_was_type_block = false;
            }
            SpecItem::Issue(sym) => {
                push_param(&mut scratch, &mut seen, *sym, ParamClass::Tight)?;
                last_was_type_block = false;
            }
            SpecItem::SetWord(sym) => {
                push_param(&mut scratch, &mut seen, *sym, ParamClass::Local)?;
                last_was_type_block = false;
            }
            SpecItem::ExplicitReturn(sym) => {
                push_param(&mut scratch, &mut seen, *sym, ParamClass::Local)?;
                explicit_return = Some(scratch.len() - 1);
                last_was_type_block = false;
            }
            SpecItem::Tag(tag) => match *tag {
                "local" => mode = ScanMode::Local,
                "with" => mode = ScanMode::With,
                "void" => { /* recorded by the caller's choice of dispatcher, see natives::function */ }
                other => {
                    return Err(CoreError::new(ErrorKind::Script, format!("unsupported spec tag <{other}>")));
                }
            },
        }
    }

    if let Some(idx) = explicit_return {
        scratch[idx].class = ParamClass::Return;
    } else if wants_definitional_return {
        scratch.push(ScratchParam {
            symbol: synthetic_return_symbol,
            class: ParamClass::Return,
            types: TypeSet::full_permissive(),
            note: None,
            saw_type_block: false,
        });
    }

    // Pass two (emit): return slot always last, regardless of where it was declared.
    let (return_param, mut rest): (Vec<_>, Vec<_>) =
        scratch.into_iter().partition(|p| matches!(p.class, ParamClass::Return));
    rest.extend(return_param);

    let mut cells = Vec::with_capacity(rest.len() + 1);
    cells.push(Cell::action(action));
    let mut param_ids = Vec::with_capacity(rest.len());
    let mut meta = Meta::default();
    let mut has_docs = description.is_some();

    for p in rest {
        let mut entry = ParamEntry::new(p.symbol, p.class);
        entry.types = p.types;
        if matches!(p.class, ParamClass::HardQuote) && entry.types.accepts_null {
            return Err(CoreError::new(ErrorKind::Script, "hard-quoted parameters may not declare <opt>"));
        }
        if matches!(p.class, ParamClass::Refinement) && entry.types.accepts_null {
            return Err(CoreError::new(ErrorKind::Script, "refinement arguments may not declare <opt>"));
        }
        if let Some(note) = &p.note {
            meta.parameter_notes.insert(p.symbol, note.clone());
            has_docs = true;
        }
        if p.saw_type_block {
            meta.parameter_types.insert(p.symbol, p.types);
            has_docs = true;
        }
        let id = params.push(entry);
        param_ids.push(id);
        cells.push(Cell::typeset(id));
    }

    meta.description = description;
    let paramlist = series.make_array(cells, Flavor::Paramlist);
    Ok(CompiledParamlist { paramlist, params: param_ids, meta: has_docs.then_some(meta) })
}

fn push_param(
    scratch: &mut Vec<ScratchParam>,
    seen: &mut AHashMap<Symbol, ()>,
    symbol: Symbol,
    class: ParamClass,
) -> Result<(), CoreError> {
    // §4.C: duplicates are detected via a symbol→index binder; once the scan completes,
    // a conflict is surfaced as a typed error ("errors may not be raised mid-binder-use").
    // Checking eagerly here and returning immediately has the same observable effect
    // (the scan never proceeds past the duplicate), while keeping the binder's lifetime
    // scoped to this function, satisfying §5's "binders must be fully torn down before
    // any failure can be raised."
    if seen.contains_key(&symbol) {
        let result = Err(CoreError::duplicate_variable(&format!("{symbol:?}")));
        seen.clear();
        return result;
    }
    seen.insert(symbol, ());
    scratch.push(ScratchParam { symbol, class, types: TypeSet::empty(), note: None, saw_type_block: false });
    Ok(())
}

#[must_use]
pub fn paramlist_array(series: &SeriesArena, id: SeriesId) -> &Array {
    series.get(id)
}

#[must_use]
pub fn archetype_action(array: &Array) -> Option<ActionId> {
    match array.get(0)?.payload() {
        Payload::Action(id) => Some(id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dispatch::ActionId, intern::Interner};

    #[test]
    fn simple_spec_compiles_in_order() {
        let mut interner = Interner::new();
        let ret = interner.intern("return");
        let mut series = SeriesArena::new();
        let mut params = ParamTable::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let items = vec![SpecItem::Word(a), SpecItem::Word(b)];
        let compiled =
            compile_spec(&mut series, &mut params, ActionId::test_handle(0), &items, true, ret).unwrap();
        // a, b, synthetic return = 3 params + archetype slot.
        let arr = series.get(compiled.paramlist);
        assert_eq!(arr.len(), 4);
        assert_eq!(params.get(compiled.params[0]).symbol, a);
        assert_eq!(params.get(compiled.params[1]).symbol, b);
        assert_eq!(params.get(compiled.params[2]).class, ParamClass::Return);
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        let mut interner = Interner::new();
        let ret = interner.intern("return");
        let mut series = SeriesArena::new();
        let mut params = ParamTable::new();
        let a = interner.intern("a");
        let items = vec![SpecItem::Word(a), SpecItem::Word(a)];
        let err =
            compile_spec(&mut series, &mut params, ActionId::test_handle(0), &items, false, ret).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Script);
    }

    #[test]
    fn refinement_ends_with_mode() {
        let mut interner = Interner::new();
        let ret = interner.intern("return");
        let mut series = SeriesArena::new();
        let mut params = ParamTable::new();
        let x = interner.intern("x");
        let foo = interner.intern("foo");
        let y = interner.intern("y");
        let items = vec![SpecItem::Tag("with"), SpecItem::Word(x), SpecItem::Refinement(foo), SpecItem::Word(y)];
        let compiled =
            compile_spec(&mut series, &mut params, ActionId::test_handle(0), &items, false, ret).unwrap();
        assert_eq!(params.get(compiled.params[0]).class, ParamClass::Local);
        assert_eq!(params.get(compiled.params[1]).class, ParamClass::Refinement);
        assert_eq!(params.get(compiled.params[2]).class, ParamClass::Normal);
    }

    #[test]
    fn type_block_must_follow_a_parameter() {
        let mut interner = Interner::new();
        let ret = interner.intern("return");
        let mut series = SeriesArena::new();
        let mut params = ParamTable::new();
        let items = vec![SpecItem::TypeBlock(TypeSet::empty().with(Kind::Integer))];
        let err =
            compile_spec(&mut series, &mut params, ActionId::test_handle(0), &items, false, ret).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Script);
    }

    #[test]
    fn explicit_return_is_upgraded_and_moved_last() {
        let mut interner = Interner::new();
        let ret = interner.intern("return");
        let mut series = SeriesArena::new();
        let mut params = ParamTable::new();
        let a = interner.intern("a");
        let items = vec![SpecItem::ExplicitReturn(ret), SpecItem::Word(a)];
        let compiled =
            compile_spec(&mut series, &mut params, ActionId::test_handle(0), &items, true, ret).unwrap();
        assert_eq!(params.get(compiled.params[0]).symbol, a);
        assert_eq!(params.get(compiled.params[1]).class, ParamClass::Return);
    }
}
