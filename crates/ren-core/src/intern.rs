//! Symbol interning for words, refinements, and other identifier-shaped cells.
//!
//! Interning gives every distinct identifier a small, `Copy` index (`Symbol`) so cells
//! can compare identifiers by integer equality instead of string comparison, and so the
//! paramlist builder's duplicate-name check (§4.C) and the binder (§4.C/§5) can key a
//! scratch map by a cheap value.

use ahash::AHashMap;

/// Interned identifier. Two `Symbol`s are equal iff the underlying strings were equal at
/// intern time — comparison never touches the backing string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A symbol's "canon form" (§3.3): Rebol word comparison is case-insensitive, so two
/// spellings of a word intern to the same `Symbol` but the interner retains the first
/// spelling seen as the canonical display form.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, Symbol>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the backing vector/map (spec §10.4 `EngineConfig`) so an embedder that
    /// knows roughly how many distinct words a program uses can avoid reallocation during
    /// startup binding.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { strings: Vec::with_capacity(capacity), lookup: AHashMap::with_capacity(capacity) }
    }

    /// Interns `text`, returning its `Symbol`. Lookup key is the lowercased spelling
    /// (Rebol words are case-insensitive); the first-seen spelling is kept as canon.
    pub fn intern(&mut self, text: &str) -> Symbol {
        let key = text.to_ascii_lowercase().into_boxed_str();
        if let Some(&sym) = self.lookup.get(&key) {
            return sym;
        }
        let sym = Symbol(u32::try_from(self.strings.len()).expect("symbol table overflow"));
        self.strings.push(text.into());
        self.lookup.insert(key, sym);
        sym
    }

    /// Returns the canon spelling for an already-interned symbol.
    ///
    /// # Panics
    /// Panics if `sym` was not produced by this interner (an internal invariant
    /// violation, not a user-reachable error).
    #[must_use]
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
