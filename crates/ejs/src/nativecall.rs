//! Native-function identification and argument marshalling (component K).
//!
//! The original engine switches on a 16-bit argspec word to cast a raw
//! function pointer and convert `JsVar`s to/from native ints/floats/bools.
//! Rust has no portable function-pointer-plus-type-tag cast that is both
//! safe and `unsafe`-free, so per §9 Design Notes this becomes a table of
//! boxed closures keyed by a small `NativeFnId` enum — one entry per
//! built-in, each already knowing its own argument/return shape because
//! it's an ordinary typed Rust closure rather than a cast function pointer.
//! The `argspec` word itself is kept (as `u16`) purely so `Payload`'s
//! `NativeFunction` variant and the calling convention stay recognisably
//! the one described in §4.K; dispatch does not need to decode it.

use crate::{engine::Engine, error::Exception, jsvar::JsVar};

/// Identifies one native (builtin) function. Builtins register a
/// `NativeFnId -> NativeFn` mapping in [`crate::builtins::registry`]; the
/// `Payload::NativeFunction` cell stores only this small tag, never a
/// function pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeFnId(pub u32);

/// Bit flags folded into a native function's `argspec` word (§4.K "High
/// bits").
pub mod argspec_flags {
    /// Prepend `this` as the first argument.
    pub const THIS_ARG: u16 = 1 << 14;
    /// Called immediately at symbol lookup rather than bound as a callable
    /// (accessor-style builtins such as `Array#length`'s getter).
    pub const EXECUTE_IMMEDIATELY: u16 = 1 << 15;
}

/// The shape every native function implementation has: the engine, `this`,
/// and the already-evaluated argument list, returning a value or a thrown
/// exception. Variadic by construction, so there is no 4-bit-slots argument
/// count to decode — each closure reads as many of `args` as it declares.
pub type NativeFn = fn(&mut Engine, JsVar, &[JsVar]) -> Result<JsVar, Exception>;

impl Engine {
    /// `functionCall` step 1 (§4.J): invokes a native function directly,
    /// with no activation-record allocation.
    pub(crate) fn call_native(&mut self, id: NativeFnId, this: JsVar, args: &[JsVar]) -> Result<JsVar, Exception> {
        let f = crate::builtins::lookup_native(id).ok_or_else(|| {
            self.type_error(format!("unknown native function id {}", id.0))
        })?;
        f(self, this, args)
    }

    /// Fetches argument `i`, or `undefined` if the caller passed fewer
    /// arguments than the builtin's arity (ordinary JS semantics).
    pub(crate) fn arg(args: &[JsVar], i: usize) -> JsVar {
        args.get(i).copied().unwrap_or(JsVar::UNDEFINED)
    }
}
