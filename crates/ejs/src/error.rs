//! Errors, exceptions, and stack traces (component M) plus the crate's
//! internal Rust-level error type (ambient component O).
//!
//! Two tiers, mirroring the teacher's split between `ResourceError`/
//! `exception_private::RunError` (host/Rust-level failures) and
//! `exception_private::ExceptionRaise`/`SimpleException`, captured with a
//! `RawStackFrame` in `bytecode/vm/exceptions.rs` (JS-level thrown values):
//!
//! - [`Error`] is what a fallible *Rust* API in this crate returns (pool
//!   exhaustion it could not recover from, a malformed pre-tokenised byte
//!   stream). It is a genuine bug-or-resource-exhaustion signal, not a JS
//!   value.
//! - [`Exception`] is a JS-level thrown value: what `throw`, an uncaught
//!   `TypeError`, or a failed native call surfaces to the embedder through
//!   `Engine::exec`.

use std::fmt;

/// The error taxonomy from spec §7, identifying *what went wrong* rather
/// than a JS constructor name (several JS error constructors map onto one
/// `Kind`, e.g. `TypeError` and `RangeError` both being [`Kind::Type`] vs
/// [`Kind::Range`] respectively — see [`Kind::constructor_name`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Syntax,
    Reference,
    Type,
    Range,
    Memory,
    MemoryBusy,
    Interrupted,
    /// Internal invariant violation. Fatal: the caller should treat this as
    /// a panic-equivalent, not something to `catch`.
    Assertion,
    /// A bare `throw "string"`/`throw {}` with no error-object wrapping.
    Plain,
}

impl Kind {
    #[must_use]
    pub fn constructor_name(self) -> &'static str {
        match self {
            Kind::Syntax => "SyntaxError",
            Kind::Reference => "ReferenceError",
            Kind::Type => "TypeError",
            Kind::Range => "RangeError",
            Kind::Memory => "Error",
            Kind::MemoryBusy => "Error",
            Kind::Interrupted => "Error",
            Kind::Assertion => "InternalError",
            Kind::Plain => "Error",
        }
    }
}

/// A line/column source position, attached to stack frames and to
/// `SyntaxError` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeLoc {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// One frame of a captured stack trace, built by walking the active call
/// chain at `throw` time (§4.J "Exceptions").
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function_name: String,
    pub loc: CodeLoc,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  at {} ({})", self.function_name, self.loc)
    }
}

/// A JS-level thrown value, already formatted for display: the `toString()`
/// of the thrown value plus the stack trace captured at `throw` time.
///
/// Kept independent of [`JsVar`]'s lifetime inside the pool: by the time an
/// exception crosses `Engine::exec`'s return boundary the pool may have run a
/// GC, so the thrown value is rendered to an owned string immediately.
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: Kind,
    pub message: String,
    pub stack: Vec<StackFrame>,
}

impl Exception {
    #[must_use]
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Exception { kind, message: message.into(), stack: Vec::new() }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    /// Renders the "Uncaught ..." form the console sink prints for an
    /// exception that escapes `ejs_exec` (§7 "User-visible failure output").
    #[must_use]
    pub fn render_uncaught(&self) -> String {
        let mut out = format!("Uncaught {}\n", self.message);
        for frame in &self.stack {
            out.push_str(&frame.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.constructor_name(), self.message)
    }
}

impl std::error::Error for Exception {}

/// Rust-level failure distinct from a JS exception: the pool could not
/// satisfy an allocation even after GC and the host's pressure callback, or
/// a pre-tokenised byte stream was malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    OutOfMemory,
    MemoryBusy,
    MalformedTokenStream,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "variable pool exhausted"),
            Error::MemoryBusy => write!(f, "allocation attempted while memory is busy"),
            Error::MalformedTokenStream => write!(f, "malformed pre-tokenised byte stream"),
        }
    }
}

impl std::error::Error for Error {}

/// What a JS-level operation returns: either a value or a propagating
/// exception, mirroring `exception_private::RunResult`.
pub(crate) type JsResult<T> = Result<T, Exception>;
