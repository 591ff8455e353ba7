//! Typed error taxonomy for the core (spec §7).
//!
//! Errors are a closed kind enum rather than a boxed `dyn Error`, because `trap`/`rescue`
//! (§7, §11) need to match on error *kind* at runtime the same way they match on a
//! thrown BREAK/CONTINUE/RETURN label (§4.E.5). A `CoreError` is exactly the payload of
//! one more kind of labeled throw; see `control::Thrown::Error`.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::cell::Kind;

/// The seven error kinds named in spec §7. Not Rust exception *types* — a closed
/// classification used for `trap`/`rescue` matching and for picking a message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    /// Raised by `fail` with a message block or id.
    User,
    /// Argument or return type mismatch.
    Type,
    /// Bad spec, duplicate variable, malformed path.
    Script,
    /// Protected series/cell modification, iteration hold violation.
    Access,
    /// Overflow, division by zero.
    Math,
    /// Loader-reported lexical error, wrapped as a value at the core boundary.
    Syntax,
    /// Assertion failures, corruption detected by debug checks. Never recoverable by
    /// user code (§7).
    Internal,
}

impl ErrorKind {
    /// Whether this kind may ever be caught by `trap`/`rescue`. `Internal` errors are
    /// never recoverable by user code (§7) — `rescue` must not swallow them.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::Internal)
    }
}

/// A location hint captured at the point an error was raised, for the "near" text and
/// file/line the host sees on an unhandled error (§6.4, §7 "User-visible behavior").
#[derive(Debug, Clone, Default)]
pub struct CodeLoc {
    pub file: Option<String>,
    pub line: Option<u32>,
    /// A short rendering of the offending expression, built with `mold` (§11).
    pub near: Option<String>,
}

/// A structured runtime error: the core's thrown-error payload (§4.E.5, §6.4).
#[derive(Debug, Clone)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: CodeLoc,
    /// Arguments captured at the raise site (e.g. the mismatched value and the expected
    /// typeset, for a `Type` error), kept structured rather than pre-formatted so a host
    /// can build its own presentation (§6.4 "captured arguments").
    pub args: Vec<String>,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), loc: CodeLoc::default(), args: Vec::new() }
    }

    #[must_use]
    pub fn with_near(mut self, near: impl Into<String>) -> Self {
        self.loc.near = Some(near.into());
        self
    }

    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// §4.E.2 "fail with a typed 'argument type' error naming the parameter".
    #[must_use]
    pub fn argument_type(param_name: &str, expected: &str, got: Kind) -> Self {
        Self::new(
            ErrorKind::Type,
            format!("{param_name}: expected {expected}, got {got}"),
        )
        .with_arg(param_name.to_string())
    }

    /// §4.C "duplicate variable" error.
    #[must_use]
    pub fn duplicate_variable(name: &str) -> Self {
        Self::new(ErrorKind::Script, format!("duplicate variable: {name}"))
    }

    /// §3.4 "expired frame" error on access to a dropped stack-lifetime varlist.
    #[must_use]
    pub fn expired_frame() -> Self {
        Self::new(ErrorKind::Access, "frame is no longer on the stack")
    }

    /// §3.1 writing a protected cell.
    #[must_use]
    pub fn protected() -> Self {
        Self::new(ErrorKind::Access, "cell is protected")
    }

    /// §4.B iteration-hold violation.
    #[must_use]
    pub fn series_held() -> Self {
        Self::new(ErrorKind::Access, "series is locked for iteration")
    }

    /// §7 "no catch for throw" — a BREAK/CONTINUE/RETURN/STOP escaped its owner.
    #[must_use]
    pub fn no_catch_for_throw(label: &str) -> Self {
        Self::new(ErrorKind::Script, format!("no catch for throw: {label}"))
    }

    /// §10.3 recursion-depth exhaustion.
    #[must_use]
    pub fn recursion_limit(limit: usize) -> Self {
        Self::new(ErrorKind::Internal, format!("maximum call depth exceeded ({limit})"))
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(near) = &self.loc.near {
            write!(f, " (near: {near})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CoreError {}
