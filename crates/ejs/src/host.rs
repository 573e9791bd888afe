//! Host callback traits (§6 "Host callbacks"). The only two things the
//! interpreter core needs from the outside world: a byte-writing console
//! sink and a monotonic microsecond clock. Hardware peripherals, flash
//! storage, and the `heatshrink` codec are external collaborators the
//! embedded build stubs — `ejs` stubs them identically by simply not
//! implementing them.

/// Everything the interpreter needs from its embedder.
pub trait Host {
    /// Write raw bytes to the console. Called once per `console.log`/`print`
    /// argument list (already space-joined and newline-terminated).
    fn print(&mut self, bytes: &[u8]);

    /// Monotonic microseconds since an arbitrary epoch, used for `Date.now()`
    /// and `setTimeout` bookkeeping.
    fn get_microseconds(&self) -> i64;

    /// Called when the cell pool is exhausted, before the interpreter gives
    /// up and latches an out-of-memory error. A real embedder might free
    /// caches here; the default does nothing (no memory to free).
    fn free_more_memory(&mut self) -> bool {
        false
    }
}

/// A host that writes to stdout and uses [`std::time::Instant`] for the
/// clock. What `ejs-cli` uses.
#[derive(Debug, Default)]
pub struct StdoutHost {
    start: Option<std::time::Instant>,
}

impl StdoutHost {
    #[must_use]
    pub fn new() -> Self {
        StdoutHost { start: Some(std::time::Instant::now()) }
    }
}

impl Host for StdoutHost {
    fn print(&mut self, bytes: &[u8]) {
        use std::io::Write;
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    }

    fn get_microseconds(&self) -> i64 {
        match &self.start {
            Some(start) => start.elapsed().as_micros() as i64,
            None => 0,
        }
    }
}

/// A host that discards everything. Useful for tests and for the GC
/// out-of-memory property test (§8 invariant 8) where console output isn't
/// part of the assertion.
#[derive(Debug, Default)]
pub struct NullHost {
    buffer: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
}

impl NullHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a `NullHost` alongside a cloneable [`OutputHandle`] that can
    /// read back everything written to it — needed because `Engine` owns its
    /// `Box<dyn Host>` and doesn't hand it back, so a test can't otherwise
    /// reach the buffer once the host has moved into `Engine::new`.
    #[must_use]
    pub fn with_handle() -> (Self, OutputHandle) {
        let host = Self::default();
        let handle = OutputHandle { buffer: host.buffer.clone() };
        (host, handle)
    }

    /// Everything written so far, as a lossy UTF-8 string.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.borrow()).into_owned()
    }
}

impl Host for NullHost {
    fn print(&mut self, bytes: &[u8]) {
        self.buffer.borrow_mut().extend_from_slice(bytes);
    }

    fn get_microseconds(&self) -> i64 {
        0
    }
}

/// A cloneable handle onto a [`NullHost`]'s buffer, obtained from
/// [`NullHost::with_handle`]. Lets a test read captured console output after
/// the host itself has been moved into an `Engine`.
#[derive(Debug, Clone, Default)]
pub struct OutputHandle {
    buffer: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
}

impl OutputHandle {
    /// Everything written so far, as a lossy UTF-8 string.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.borrow()).into_owned()
    }
}
