//! Value & Cell Model (spec §3.1, §4.A).
//!
//! A [`Cell`] is the fixed shape every runtime value takes: a kind, a quote level, flag
//! bits, a binding, and a payload. Unlike the C-family implementation this is drawn from
//! (a two-pointer tagged union reinterpreted by kind byte), the Rust model keeps `kind`
//! and `payload` in lockstep through a typed [`Payload`] enum instead of raw bit
//! reinterpretation — the invariant the spec states ("a cell is either `end`... or
//! carries a valid kind") is then upheld by construction rather than by convention.

use std::fmt;

use crate::{
    context::ContextId,
    dispatch::ActionId,
    intern::Symbol,
    paramlist::ParamId,
    series::SeriesId,
};

/// The kind byte (spec §3.1). `End` is the sentinel kind, never visible to user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Integer,
    Decimal,
    Text,
    Binary,
    Block,
    Group,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Refinement,
    Issue,
    Path,
    SetPath,
    GetPath,
    Action,
    Frame,
    Object,
    Error,
    Port,
    Map,
    Logic,
    Blank,
    /// "no value" — the only kind for which `value?` returns false (spec §3.1).
    Null,
    /// first-class "no useful result" kind, distinct from `Null` (spec §3.1).
    Void,
    Datatype,
    Typeset,
    Varargs,
    Handle,
    /// Spec-block mode marker (`<local>`, `<with>`, `<void>`, `<opt>`, `<end>` — spec
    /// §4.C). Not in the spec's kind-byte enumeration verbatim, but required to
    /// represent the spec-block grammar §4.C describes; modeled the same way the other
    /// decorated-word kinds are (a symbol payload).
    Tag,
    /// Sentinel; never visible to user code.
    End,
}

impl Kind {
    /// Word-shaped kinds share lookup/binding semantics (spec §4.E.1); used by the
    /// evaluator to decide whether a cell participates in binding resolution.
    #[must_use]
    pub fn is_word_like(self) -> bool {
        matches!(
            self,
            Self::Word | Self::SetWord | Self::GetWord | Self::LitWord | Self::Refinement | Self::Issue
        )
    }

    /// "inert kinds" per §4.E.1: copied to `out`, marked `unevaluated`, feed advances —
    /// no further dispatch. Also covers `Null` (a literal no-value appearing directly),
    /// a bare `Action` value (only a *word* resolving to one triggers dispatch — spec
    /// §4.E.1), and the path kinds: full multi-segment path walking is out of scope for
    /// this core (refinement gathering is driven off bare `Refinement` cells directly,
    /// see `evaluator::fulfill_args`), so a `Path`/`SetPath`/`GetPath` cell is treated as
    /// an opaque inert value rather than partially evaluated.
    #[must_use]
    pub fn is_inert(self) -> bool {
        matches!(
            self,
            Self::Integer
                | Self::Decimal
                | Self::Text
                | Self::Binary
                | Self::Blank
                | Self::Block
                | Self::Logic
                | Self::Issue
                | Self::Datatype
                | Self::Typeset
                | Self::Object
                | Self::Error
                | Self::Port
                | Self::Map
                | Self::Frame
                | Self::Handle
                | Self::Varargs
                | Self::Tag
                | Self::Null
                | Self::Action
                | Self::Path
                | Self::SetPath
                | Self::GetPath
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A tiny, dependency-free bitflags substitute: spec §3.1 names a fixed, small flag set
/// and nothing here needs the full `bitflags` crate's derive machinery (no flags are
/// ever read back from an external wire format).
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $($(#[$fmeta:meta])* const $flag:ident = $val:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($ty);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self($val);)*

            #[must_use]
            pub fn empty() -> Self {
                Self(0)
            }

            #[must_use]
            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl std::ops::Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self(!self.0)
            }
        }
    };
}

bitflags_like! {
    /// Cell flag bits (spec §3.1).
    pub struct CellFlags: u16 {
        /// Overwriting this cell fails (spec §3.1, §8 invariant).
        const PROTECTED = 1 << 0;
        /// Set on the cell (not the action) to request infix dispatch (spec §4.E.4).
        const ENFIXED = 1 << 1;
        /// Set when a value was produced by a literal step; cleared after any
        /// evaluative step (spec §3.1, §4.E.1).
        const UNEVALUATED = 1 << 2;
        /// Reserved for GC traversal marking (spec §3.1).
        const MARKED = 1 << 3;
        /// Bodies/args that must not mutate their referents (spec §3.1, §9 `const`
        /// capture decision).
        const CONST = 1 << 4;
        /// Frame slot passed its type-check already (spec §3.1).
        const ARG_MARKED_CHECKED = 1 << 5;
        /// An invisible result has not overwritten `out` yet (spec §3.1, §4.E).
        const OUT_MARKED_STALE = 1 << 6;
        /// Printing hint (spec §3.1); carried for `mold`/`form` fidelity, not
        /// interpreted by the evaluator itself.
        const LINE = 1 << 7;
    }
}

/// Binding slot (spec §3.1, §9 "relative binding").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    Unbound,
    /// Absolute binding to a context.
    Context(ContextId),
    /// Relative binding: a body bound to the action that authored it. Resolving a word
    /// with this binding requires a current frame instantiated from the same action
    /// (spec §9).
    Relative(ActionId),
}

/// The payload, keyed by [`Kind`] at construction time. Kept as a typed enum (rather than
/// raw reinterpreted bytes) so Rust's exhaustiveness checking enforces the spec's "kind
/// byte + payload" pairing invariant instead of relying on convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    None,
    Int(i64),
    Decimal(f64),
    Logic(bool),
    /// Word-like kinds (word/set-word/get-word/lit-word/refinement/issue) share this
    /// payload shape; `Kind` distinguishes the decoration.
    Symbol(Symbol),
    /// block/group/path/set-path/get-path/text/binary: an array-backed series (§3.2).
    Series(SeriesId),
    Action(ActionId),
    /// object/error/port/module and reified frame archetypes (§3.2) share a context
    /// payload; `Kind` distinguishes the interpretation.
    Context(ContextId),
    Datatype(Kind),
    /// Parameter descriptor payload for a `Typeset`-kind cell (spec §3.3): keylist
    /// entries past index 0 carry one of these, pointing into the paramlist builder's
    /// side table of compiled type bitsets rather than inlining the bitset in the cell
    /// itself (a typeset's bit width already exceeds one payload word per spec §3.3).
    Param(ParamId),
    Handle(u64),
}

/// A fixed-shape tagged value slot (spec §3.1).
#[derive(Debug, Clone, Copy)]
pub struct Cell {
    kind: Kind,
    quote_level: u8,
    flags: CellFlags,
    binding: Binding,
    payload: Payload,
}

impl Cell {
    /// The `end` sentinel (spec §3.1): never visible to user code, used to terminate
    /// arrays (spec §3.2).
    #[must_use]
    pub fn end() -> Self {
        Self { kind: Kind::End, quote_level: 0, flags: CellFlags::empty(), binding: Binding::Unbound, payload: Payload::None }
    }

    #[must_use]
    pub fn null() -> Self {
        Self::reset(Kind::Null, Payload::None)
    }

    #[must_use]
    pub fn void() -> Self {
        Self::reset(Kind::Void, Payload::None)
    }

    #[must_use]
    pub fn blank() -> Self {
        Self::reset(Kind::Blank, Payload::None)
    }

    #[must_use]
    pub fn integer(v: i64) -> Self {
        Self::reset(Kind::Integer, Payload::Int(v))
    }

    #[must_use]
    pub fn decimal(v: f64) -> Self {
        Self::reset(Kind::Decimal, Payload::Decimal(v))
    }

    #[must_use]
    pub fn logic(v: bool) -> Self {
        Self::reset(Kind::Logic, Payload::Logic(v))
    }

    #[must_use]
    pub fn word(sym: Symbol) -> Self {
        Self::reset(Kind::Word, Payload::Symbol(sym))
    }

    #[must_use]
    pub fn set_word(sym: Symbol) -> Self {
        Self::reset(Kind::SetWord, Payload::Symbol(sym))
    }

    #[must_use]
    pub fn get_word(sym: Symbol) -> Self {
        Self::reset(Kind::GetWord, Payload::Symbol(sym))
    }

    #[must_use]
    pub fn lit_word(sym: Symbol) -> Self {
        Self::reset(Kind::LitWord, Payload::Symbol(sym))
    }

    #[must_use]
    pub fn refinement(sym: Symbol) -> Self {
        Self::reset(Kind::Refinement, Payload::Symbol(sym))
    }

    #[must_use]
    pub fn block(id: SeriesId) -> Self {
        Self::reset(Kind::Block, Payload::Series(id))
    }

    #[must_use]
    pub fn group(id: SeriesId) -> Self {
        Self::reset(Kind::Group, Payload::Series(id))
    }

    #[must_use]
    pub fn path(id: SeriesId) -> Self {
        Self::reset(Kind::Path, Payload::Series(id))
    }

    #[must_use]
    pub fn set_path(id: SeriesId) -> Self {
        Self::reset(Kind::SetPath, Payload::Series(id))
    }

    #[must_use]
    pub fn get_path(id: SeriesId) -> Self {
        Self::reset(Kind::GetPath, Payload::Series(id))
    }

    /// A text value, represented as a plain array of `Integer`-kind codepoint cells
    /// rather than a packed byte buffer — the full string-encoding facility (UTF-8
    /// normalization, string ports) is out of scope (spec §12), but `mold`/`form`
    /// (spec §11) still need *something* constructible to render.
    #[must_use]
    pub fn text(id: SeriesId) -> Self {
        Self::reset(Kind::Text, Payload::Series(id))
    }

    #[must_use]
    pub fn binary(id: SeriesId) -> Self {
        Self::reset(Kind::Binary, Payload::Series(id))
    }

    #[must_use]
    pub fn action(id: ActionId) -> Self {
        Self::reset(Kind::Action, Payload::Action(id))
    }

    #[must_use]
    pub fn frame(id: ContextId) -> Self {
        Self::reset(Kind::Frame, Payload::Context(id))
    }

    #[must_use]
    pub fn object(id: ContextId) -> Self {
        Self::reset(Kind::Object, Payload::Context(id))
    }

    #[must_use]
    pub fn error(id: ContextId) -> Self {
        Self::reset(Kind::Error, Payload::Context(id))
    }

    #[must_use]
    pub fn datatype(k: Kind) -> Self {
        Self::reset(Kind::Datatype, Payload::Datatype(k))
    }

    #[must_use]
    pub fn typeset(id: ParamId) -> Self {
        Self::reset(Kind::Typeset, Payload::Param(id))
    }

    #[must_use]
    pub fn tag(sym: Symbol) -> Self {
        Self::reset(Kind::Tag, Payload::Symbol(sym))
    }

    /// `reset(cell, kind, payload)` (spec §4.A): sets kind and payload, clears quote
    /// level, flags, and binding. Equivalent to constructing a fresh cell of `kind`.
    #[must_use]
    pub fn reset(kind: Kind, payload: Payload) -> Self {
        Self { kind, quote_level: 0, flags: CellFlags::empty(), binding: Binding::Unbound, payload }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn is_kind(&self, kind: Kind) -> bool {
        self.kind == kind
    }

    #[must_use]
    pub fn quote_level(&self) -> u8 {
        self.quote_level
    }

    #[must_use]
    pub fn payload(&self) -> Payload {
        self.payload
    }

    #[must_use]
    pub fn binding(&self) -> Binding {
        self.binding
    }

    pub fn set_binding(&mut self, binding: Binding) {
        self.binding = binding;
    }

    /// Overwrites just the payload, leaving kind/quote level/flags/binding untouched —
    /// used when rebuilding a series cell-by-cell (e.g. deep-cloning a block) where the
    /// nested `SeriesId` changes but nothing else about the slot does.
    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    #[must_use]
    pub fn get_flag(&self, flag: CellFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: CellFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: CellFlags) {
        self.flags.remove(flag);
    }

    /// `move(dst, src)` (spec §4.A): copies kind + payload but clears transient flags
    /// (`unevaluated`, `arg_marked_checked`, `out_marked_stale`). Binding and quote level
    /// travel with the value.
    ///
    /// # Panics
    /// Panics (debug-only invariant, spec §4.A) if `src` carries a `Binding::Relative`
    /// binding — a relative cell must be reified against a frame before becoming a
    /// "specific" slot; callers crossing that boundary must use
    /// [`Cell::move_reified`] instead.
    pub fn move_from(&mut self, src: &Cell) {
        debug_assert!(
            !matches!(src.binding, Binding::Relative(_)),
            "relative cell copied without frame reification"
        );
        self.move_reified(src);
    }

    /// Like [`Cell::move_from`] but permits copying a relative cell verbatim — used
    /// internally when the destination itself remains relatively bound to the same
    /// action (e.g. copying within a function body template).
    pub fn move_reified(&mut self, src: &Cell) {
        self.kind = src.kind;
        self.payload = src.payload;
        self.binding = src.binding;
        self.quote_level = src.quote_level;
        self.flags = src.flags
            & !(CellFlags::UNEVALUATED | CellFlags::ARG_MARKED_CHECKED | CellFlags::OUT_MARKED_STALE);
    }

    /// `quotify(cell, n)` (spec §4.A): increases the quote level by `n`. Kind and
    /// payload are untouched.
    #[must_use]
    pub fn quotify(mut self, n: u8) -> Self {
        self.quote_level = self.quote_level.saturating_add(n);
        self
    }

    /// `dequotify(cell)` (spec §4.A): removes one quote level.
    ///
    /// # Panics
    /// Panics if the cell is not quoted — callers must check `quote_level() > 0` first;
    /// this mirrors the debug-abort-on-invalid-access failure mode in spec §4.A.
    #[must_use]
    pub fn dequotify(mut self) -> Self {
        assert!(self.quote_level > 0, "dequotify on an unquoted cell");
        self.quote_level -= 1;
        self
    }

    /// Equality "modulo quote when dequoted" (spec §3.1): compares kind and payload,
    /// ignoring quote level, flags, and binding.
    #[must_use]
    pub fn eq_dequoted(&self, other: &Cell) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }
}

#[cfg(test)]
pub mod test_support {
    //! Tiny in-crate cell builders for tests (spec §10.5) — the lexical scanner that
    //! would normally produce these cells from source text is an out-of-scope external
    //! collaborator (spec §1), so tests build blocks directly instead of parsing text,
    //! the same way the teacher lineage builds bytecode chunks directly in its VM tests.

    use super::{Cell, Kind};
    use crate::{intern::Interner, series::SeriesArena};

    pub fn word(interner: &mut Interner, text: &str) -> Cell {
        Cell::word(interner.intern(text))
    }

    pub fn set_word(interner: &mut Interner, text: &str) -> Cell {
        Cell::set_word(interner.intern(text))
    }

    pub fn refinement(interner: &mut Interner, text: &str) -> Cell {
        Cell::refinement(interner.intern(text))
    }

    pub fn block(arena: &mut SeriesArena, cells: Vec<Cell>) -> Cell {
        let id = arena.make_array(cells, crate::series::Flavor::Plain);
        Cell::block(id)
    }

    #[test]
    fn quote_round_trip() {
        let c = Cell::integer(5);
        let q = c.quotify(3);
        assert_eq!(q.quote_level(), 3);
        let d = q.dequotify().dequotify().dequotify();
        assert_eq!(d.quote_level(), 0);
        assert!(d.eq_dequoted(&c));
    }

    #[test]
    fn kind_classification() {
        assert!(Kind::Integer.is_inert());
        assert!(!Kind::Word.is_inert());
        assert!(Kind::Word.is_word_like());
        assert!(Kind::Refinement.is_word_like());
    }
}
