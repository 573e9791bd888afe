//! The single `Engine` struct that replaces the original interpreter's
//! collection of global mutables (`activeEJS`, `execInfo`, `jsVars`,
//! `jsVarsSize`, `jsFlags`, ...) per the §9 Design Notes. Every function that
//! used to read those globals now takes `&mut Engine`.
//!
//! This module also implements the embedding API of §6 (`ejs_create`,
//! `ejs_exec`, ...) as methods, since there is exactly one `Engine` per
//! "interpreter instance" in the spec's terms — `ejs_create_instance` /
//! `ejs_destroy_instance` become `Engine::new` / `Drop`.

use crate::{
    cellpool::{AllocError, Busy, Cell, CellIndex, PoolStats, Variant},
    error::{Error, Exception, Kind},
    gc,
    host::Host,
    jsvar::JsVar,
    resource::{NoLimitTracker, ResourceTracker},
    tracer::{NoopTracer, TraceEvent, VmTracer},
};

/// Construction-time configuration (ambient component Q).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Number of cells in the pool (spec: "typical: 1000-16000").
    pub cell_count: usize,
    /// Max function/eval call depth before `RangeError("Too much recursion")`.
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { cell_count: 4000, max_call_depth: crate::resource::DEFAULT_MAX_CALL_DEPTH }
    }
}

/// One interpreter instance: its cell pool, global scope, and the bits of
/// engine-private bookkeeping the spec calls `hiddenRoot` (pending
/// exception, last stack trace).
pub struct Engine {
    pub(crate) pool: crate::cellpool::Pool,
    /// The global object (`root` in the spec).
    pub(crate) root: JsVar,
    /// Engine-private sibling of `root` used for caches and the pending
    /// exception slot (`hiddenRoot`).
    pub(crate) hidden_root: JsVar,
    pub(crate) pending_exception: Option<Exception>,
    pub(crate) tracker: Box<dyn ResourceTracker>,
    pub(crate) tracer: Box<dyn VmTracer>,
    pub(crate) interrupted: std::rc::Rc<std::cell::Cell<bool>>,
    pub(crate) host: Box<dyn Host>,
    /// Set the first time [`Self::exec`] runs, so that the global-object
    /// builtins (`Math`, `JSON`, `console`, `Array.prototype`, ...) are
    /// installed lazily rather than in `new` — keeps a freshly constructed
    /// `Engine` cheap to build with a tiny `cell_count` in tests that never
    /// call `exec` at all.
    pub(crate) builtins_installed: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("pool_stats", &self.pool.stats()).finish()
    }
}

impl Engine {
    /// `ejs_create_instance` + `ejs_set_instance` folded into one: there is
    /// no process-global "active instance" pointer here (§9 Design Notes)
    /// since ownership of an `Engine` is just ordinary Rust ownership.
    #[must_use]
    pub fn new(config: EngineConfig, host: impl Host + 'static) -> Self {
        let mut pool = crate::cellpool::Pool::init(config.cell_count);
        let root_idx = pool.alloc_one(Variant::Root).expect("initial root allocation");
        let hidden_idx = pool.alloc_one(Variant::Root).expect("initial hiddenRoot allocation");
        let tracker = NoLimitTracker::new(crate::resource::ResourceLimits { max_call_depth: config.max_call_depth });
        let interrupted = tracker.interrupt_handle();
        Engine {
            pool,
            root: JsVar::from_index(root_idx),
            hidden_root: JsVar::from_index(hidden_idx),
            pending_exception: None,
            tracker: Box::new(tracker),
            tracer: Box::new(NoopTracer),
            interrupted,
            host: Box::new(host),
            builtins_installed: false,
        }
    }

    pub fn set_tracer(&mut self, tracer: impl VmTracer + 'static) {
        self.tracer = Box::new(tracer);
    }

    #[must_use]
    pub fn root(&self) -> JsVar {
        self.root
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// `EXEC_INTERRUPTED`: asks the running (or next) evaluation to unwind
    /// cooperatively at the next checkpoint (§5 "Cancellation / timeouts").
    pub fn interrupt(&self) {
        self.interrupted.set(true);
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.set(false);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.get()
    }

    pub fn has_memory_error(&self) -> bool {
        self.pool.is_oom_latched()
    }

    pub fn clear_memory_error(&mut self) {
        self.pool.clear_oom();
    }

    /// Allocates one cell of `variant`, running the full GC-then-pressure-
    /// callback-then-retry dance from §4.A on exhaustion. Returns the
    /// matching JS-level [`Exception`] on final failure (`MEMORY`) or if
    /// memory is currently busy (`MemoryBusy`, which the caller should
    /// generally surface as a Type/Range error per §7's table).
    pub(crate) fn alloc(&mut self, variant: Variant) -> Result<CellIndex, Error> {
        match self.pool.alloc_one(variant) {
            Ok(idx) => Ok(idx),
            Err(AllocError::MemoryBusy) => Err(Error::MemoryBusy),
            Err(AllocError::OutOfMemory) => self.alloc_after_pressure(variant),
        }
    }

    fn alloc_after_pressure(&mut self, variant: Variant) -> Result<CellIndex, Error> {
        let stats = gc::collect(self);
        self.tracer.trace(TraceEvent::Gc { reclaimed: stats.freed, live_after: self.pool.stats().live });
        if let Ok(idx) = self.pool.alloc_one(variant) {
            return Ok(idx);
        }
        if self.host.free_more_memory() {
            if let Ok(idx) = self.pool.alloc_one(variant) {
                return Ok(idx);
            }
        }
        self.pool.latch_oom();
        self.tracer.trace(TraceEvent::AllocFailed);
        Err(Error::OutOfMemory)
    }

    pub(crate) fn get_cell(&self, var: JsVar) -> &Cell {
        self.pool.get(var.index())
    }

    pub(crate) fn get_cell_mut(&mut self, var: JsVar) -> &mut Cell {
        self.pool.get_mut(var.index())
    }

    pub fn print(&mut self, bytes: &[u8]) {
        self.host.print(bytes);
    }

    pub fn now_micros(&self) -> i64 {
        self.host.get_microseconds()
    }

    /// `ejs_exec`: parse and run `source` against this instance's global
    /// scope, returning the last statement's value or the caught exception.
    pub fn exec(&mut self, source: &str) -> Result<JsVar, Exception> {
        self.clear_interrupt();
        if !self.builtins_installed {
            self.builtins_installed = true;
            if let Err(exc) = crate::builtins::install(self) {
                self.pending_exception = Some(exc.clone());
                return Err(exc);
            }
        }
        match crate::parser::run_program(self, source, "<input>") {
            Ok(v) => Ok(v),
            Err(exc) => {
                self.tracer.trace(TraceEvent::Thrown { message: exc.message.clone() });
                self.pending_exception = Some(exc.clone());
                Err(exc)
            }
        }
    }

    /// `ejs_catch_exception`: consumes the latched exception, if any.
    pub fn catch_exception(&mut self) -> Option<Exception> {
        self.pending_exception.take()
    }

    /// `ejs_clear_exception`.
    pub fn clear_exception(&mut self) {
        self.pending_exception = None;
    }

    /// Runs a GC pass on demand (the `gc()` global and `Engine::collect`
    /// embedding entry point share this).
    pub fn collect_garbage(&mut self) -> gc::Stats {
        gc::collect(self)
    }

    /// Defragments the pool. Per the §9 open question, this is resolved as
    /// "never callable while JS is running" — only exposed here, on `Engine`
    /// directly, and only succeeds when every movable cell has lock count 0.
    pub fn defragment(&mut self) -> bool {
        gc::defragment(self)
    }

    /// §8 invariant 2 as a callable diagnostic: `true` if every live cell's
    /// outgoing links point at either null or another live cell.
    pub fn validate_heap(&self) -> bool {
        gc::validate_no_dangling_edges(self)
    }

    /// Compacts `source` into the pre-tokenised byte form (§6 "Pre-tokenised
    /// code format"). This crate's own call convention (§4.J step 2) always
    /// re-lexes a saved function body's raw source text rather than this
    /// compact form; it is exposed for callers that want to persist source
    /// more compactly and expand it back with
    /// [`Engine::expand_tokenised_string`] before calling [`Engine::exec`].
    #[must_use]
    pub fn tokenise_source(source: &str) -> Vec<u8> {
        crate::lexer::tokenise(source)
    }

    /// Inverse of [`Engine::tokenise_source`]: expands a pre-tokenised byte
    /// stream back into source text suitable for `exec`/`eval`.
    pub fn expand_tokenised_string(&self, bytes: &[u8]) -> Result<String, Exception> {
        crate::lexer::print_tokenised_string(bytes).map_err(|e| self.from_alloc_error(e))
    }

    pub(crate) fn type_error(&self, msg: impl Into<String>) -> Exception {
        Exception::new(Kind::Type, msg.into())
    }

    pub(crate) fn range_error(&self, msg: impl Into<String>) -> Exception {
        Exception::new(Kind::Range, msg.into())
    }

    pub(crate) fn reference_error(&self, msg: impl Into<String>) -> Exception {
        Exception::new(Kind::Reference, msg.into())
    }

    pub(crate) fn syntax_error(&self, msg: impl Into<String>) -> Exception {
        Exception::new(Kind::Syntax, msg.into())
    }

    pub(crate) fn from_resource_error(&self, e: crate::resource::ResourceError) -> Exception {
        match e {
            crate::resource::ResourceError::Recursion { .. } => {
                Exception::new(Kind::Range, "Too much recursion")
            }
            crate::resource::ResourceError::Interrupted => Exception::new(Kind::Interrupted, "execution interrupted"),
            crate::resource::ResourceError::OutOfMemory => Exception::new(Kind::Memory, "out of memory"),
        }
    }

    pub(crate) fn from_alloc_error(&self, e: Error) -> Exception {
        match e {
            Error::OutOfMemory => Exception::new(Kind::Memory, "out of memory"),
            Error::MemoryBusy => Exception::new(Kind::MemoryBusy, "allocator busy"),
            Error::MalformedTokenStream => Exception::new(Kind::Assertion, "malformed token stream"),
        }
    }

    pub(crate) fn enter_call(&mut self) -> Result<(), Exception> {
        if self.is_interrupted() {
            return Err(Exception::new(Kind::Interrupted, "execution interrupted"));
        }
        self.tracker.enter_call().map_err(|e| self.from_resource_error(e))
    }

    pub(crate) fn exit_call(&mut self) {
        self.tracker.exit_call();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // `ejs_destroy_instance`: clearing the exception is the only
        // observable teardown step left once Rust's ordinary drop glue
        // releases the pool itself.
        self.pending_exception = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    #[test]
    fn new_engine_has_free_cells() {
        let engine = Engine::new(EngineConfig { cell_count: 100, ..Default::default() }, NullHost::new());
        let stats = engine.stats();
        assert!(stats.free > 0);
        assert_eq!(stats.capacity, 100);
    }
}
