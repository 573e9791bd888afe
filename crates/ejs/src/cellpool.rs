//! The fixed-size variable-cell pool.
//!
//! Every JS value the interpreter ever touches — a number, a string fragment,
//! an object, a closure's scope pointer — is one or more [`Cell`]s drawn from a
//! single [`Pool`] allocated once at [`Pool::init`] time. There is no separate
//! heap allocation per value: `alloc`/`free` only ever move a 14-bit index on
//! and off a free list threaded through the pool itself.
//!
//! This module owns the arena and the free list (component A of the design).
//! The *meaning* of a cell's payload (is it an integer? a string chunk? an
//! object's child list head?) lives in [`crate::jsvar`], which is built on top
//! of the primitives here.

use std::fmt;

/// Cells are addressed by a 14-bit index; 0 is reserved to mean "no cell".
///
/// The real embedded interpreter packs this into a bitfield alongside other
/// per-cell metadata to keep every cell the same small fixed size. Rust's
/// tagged-enum payload (see [`Payload`]) already keeps the cell size a
/// compile-time constant without needing that bit-packing trick, so
/// `CellIndex` is simply a `u16` here — but the 14-bit range limit is kept and
/// enforced in [`Pool::init`], since it is an observable constraint (a pool
/// larger than 16383 cells cannot be constructed) rather than an
/// implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CellIndex(u16);

/// Largest cell count a single pool may hold (`2^14 - 1`; index 0 is null).
pub const MAX_CELLS: usize = (1 << 14) - 1;

impl CellIndex {
    pub(crate) const NULL: CellIndex = CellIndex(0);

    #[inline]
    pub(crate) fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn from_raw(raw: usize) -> Self {
        debug_assert!(raw <= MAX_CELLS);
        CellIndex(raw as u16)
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Grouped variant tags, collapsed from the original engine's ~20-odd
/// size-optimized tags (`STRING_0..MAX`, `NAME_STRING_0..MAX`, ...) down to one
/// Rust variant per semantically distinct kind. The original tag explosion
/// exists only to avoid spending a byte on an explicit length/kind field in a
/// hand-packed C union; a Rust tagged enum already carries that information
/// for free; see DESIGN.md for the full mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Variant {
    /// On the free list.
    Unused,
    /// The one global root (and `hiddenRoot`) — see [`crate::engine::Engine`].
    Root,
    Object,
    Array,
    Function,
    NativeFunction,
    /// Activation-record marker used to store a function's `\xFFrtn` return slot.
    FunctionReturn,
    ArrayBuffer,
    GetSet,
    Integer,
    Float,
    Boolean,
    Null,
    /// A name cell: participates in a container's child list, references a
    /// value (by index, or inline for small ints/bools) via its payload.
    Name,
    /// Head of a chained string (`STRING_k` in the spec).
    StringHead,
    /// Continuation of a chained string (`STRING_EXT_k` in the spec).
    StringExt,
    /// Head of a contiguous multi-cell flat string run.
    FlatString,
    /// Body cell of a flat-string run; only reachable via the run's head.
    FlatStringBody,
    /// Bytes live outside the pool (string literals, host-provided slices).
    NativeString,
}

impl Variant {
    /// Containers own a child-name list via `first_child`/`last_child`.
    pub(crate) fn is_container(self) -> bool {
        matches!(
            self,
            Variant::Root
                | Variant::Object
                | Variant::Array
                | Variant::Function
                | Variant::NativeFunction
                | Variant::FunctionReturn
                | Variant::ArrayBuffer
                | Variant::GetSet
        )
    }

    /// Whether this variant's `refs`/`lock` fields are the thing that keeps
    /// it alive (§3 "Essential invariants" (a)/(b)). `Name` cells are
    /// instead owned structurally by exactly one container's child list and
    /// are freed alongside it (or on explicit `delete`); `StringExt` and
    /// `FlatStringBody` are interior nodes reached only via their head.
    pub(crate) fn is_ref_eligible(self) -> bool {
        !matches!(self, Variant::Unused | Variant::Name | Variant::StringExt | Variant::FlatStringBody)
    }

    pub(crate) fn is_string(self) -> bool {
        matches!(
            self,
            Variant::StringHead | Variant::FlatString | Variant::NativeString
        )
    }
}

/// A name's value slot: either a pointer to a value cell, or (for the common
/// case of small int/bool property values) the value inlined directly,
/// saving an allocation. Mirrors `NAME_INT`/`NAME_INT_INT`/`NAME_INT_BOOL`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum NameValue {
    Ref(CellIndex),
    InlineInt(i32),
    InlineBool(bool),
}

impl Default for NameValue {
    fn default() -> Self {
        NameValue::Ref(CellIndex::NULL)
    }
}

/// A name's key: either stored inline (short identifiers, the common case) or
/// as a reference to a separate string cell (for keys too long to inline).
#[derive(Debug, Clone, Default)]
pub(crate) enum NameKey {
    #[default]
    Empty,
    Inline(smallvec::SmallVec<[u8; INLINE_KEY_BYTES]>),
    Ref(CellIndex),
}

/// How many key bytes a name cell can hold without spilling to its own string
/// cell. Chosen to match the spirit of the original engine's four-byte
/// "cheap prefix compare" trick (§4.E) while giving headroom for the common
/// case of short JS identifiers.
pub const INLINE_KEY_BYTES: usize = 12;

/// Element kind for an `ArrayBuffer` view (component G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementKind {
    I8,
    U8,
    U8Clamped,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ElementKind {
    pub(crate) fn byte_size(self) -> usize {
        match self {
            ElementKind::I8 | ElementKind::U8 | ElementKind::U8Clamped => 1,
            ElementKind::I16 | ElementKind::U16 => 2,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
            ElementKind::F64 => 8,
        }
    }

    pub(crate) fn is_float(self) -> bool {
        matches!(self, ElementKind::F32 | ElementKind::F64)
    }

    pub(crate) fn is_signed(self) -> bool {
        matches!(self, ElementKind::I8 | ElementKind::I16 | ElementKind::I32)
    }

    pub(crate) fn is_clamped(self) -> bool {
        matches!(self, ElementKind::U8Clamped)
    }
}

/// Variant-specific payload. One Rust enum replaces the original's in-band
/// union; see the module doc comment and DESIGN.md for the rationale.
#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Empty,
    Int(i32),
    Float(f64),
    Bool(bool),
    Name {
        key: NameKey,
        value: NameValue,
    },
    NativeFunction {
        func: crate::nativecall::NativeFnId,
        argspec: u16,
    },
    /// Inline character bytes for a chained string head/extension cell.
    StringBytes(smallvec::SmallVec<[u8; crate::strings::HEAD_CHARS]>),
    /// Byte length of a flat-string run (stored on the head cell only).
    FlatStringLen(u32),
    /// Bytes living outside the pool (shared, since several `NativeString`
    /// cells may point at the same literal).
    NativeStringData(std::rc::Rc<[u8]>),
    ArrayBufferView {
        kind: ElementKind,
        byte_offset: u32,
        len: u32,
        /// Distinguishes a `DataView` (explicit per-call width/endianness,
        /// dispatched through its `getInt8`/... method table) from a typed
        /// array (indexed access at its fixed `kind`); both share the same
        /// variant and backing-string representation.
        is_data_view: bool,
    },
    /// A user-defined function's closure: its formal parameter names, its
    /// body source text (re-lexed on every call per §4.J step 2, since
    /// there is no bytecode to cache), and the scope chain captured at
    /// definition time. The scope cells are extra owner edges outside the
    /// ordinary name-refcount graph (see `gc.rs`'s mark phase and
    /// `Engine::free_value`'s handling of this variant); a closure is the
    /// textbook reason the mark-sweep collector exists (§9 Design Notes).
    UserFunction {
        params: std::rc::Rc<Vec<String>>,
        body: std::rc::Rc<str>,
        scope: std::rc::Rc<Vec<CellIndex>>,
    },
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Empty
    }
}

/// Per-cell GC mark color. `White` means "not yet proven reachable this
/// collection"; sweep frees every cell still `White` at the end of mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mark {
    White,
    Black,
}

/// The fixed-size allocation unit (§3 "Cell (the sole heap primitive)").
///
/// `variant` plus `payload` replace the spec's in-band tagged union; `refs`
/// and `lock` implement component C; the four sibling/child indices form the
/// doubly-linked child lists containers use and the forward links string
/// chains use.
#[derive(Debug, Clone)]
pub(crate) struct Cell {
    pub(crate) variant: Variant,
    pub(crate) payload: Payload,
    /// Reference count: bumped only when a *name* cell becomes a child of a
    /// container. Saturates at `REF_MAX` rather than overflowing.
    pub(crate) refs: u8,
    /// Lock count: bumped by `lock`/`lock_again`, dropped by `unlock`.
    /// Saturates at `LOCK_MAX`.
    pub(crate) lock: u8,
    pub(crate) is_constant: bool,
    pub(crate) mark: Mark,
    /// Re-entrancy guard used by `toString`/`valueOf`/`JSON.stringify` to
    /// detect cyclic structures without an auxiliary visited-set.
    pub(crate) recursing: bool,
    pub(crate) first_child: CellIndex,
    pub(crate) last_child: CellIndex,
    pub(crate) next_sibling: CellIndex,
    pub(crate) prev_sibling: CellIndex,
}

/// Saturating maximum for [`Cell::refs`] (spec: 8-bit reference counter).
pub const REF_MAX: u8 = u8::MAX;
/// Saturating maximum for [`Cell::lock`] (spec: "max 15 per cell").
pub const LOCK_MAX: u8 = 15;

impl Cell {
    fn unused() -> Self {
        Cell {
            variant: Variant::Unused,
            payload: Payload::Empty,
            refs: 0,
            lock: 0,
            is_constant: false,
            mark: Mark::White,
            recursing: false,
            first_child: CellIndex::NULL,
            last_child: CellIndex::NULL,
            next_sibling: CellIndex::NULL,
            prev_sibling: CellIndex::NULL,
        }
    }
}

/// Snapshot of pool occupancy, analogous to a heap-usage report. Used by
/// diagnostics and by the cell-conservation property test (§8 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub live: usize,
    pub free: usize,
    pub capacity: usize,
}

/// Difference between two [`PoolStats`] snapshots; positive means growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolDiff {
    pub live_delta: isize,
    pub free_delta: isize,
}

impl PoolStats {
    #[must_use]
    pub fn diff(&self, other: &Self) -> PoolDiff {
        PoolDiff {
            live_delta: other.live as isize - self.live as isize,
            free_delta: other.free as isize - self.free as isize,
        }
    }
}

/// Why an allocation just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocError {
    /// Nested allocation attempted while a GC pass (or another alloc, via the
    /// re-entry guard) is already in progress.
    MemoryBusy,
    /// Free list stayed empty even after a GC pass and the caller's
    /// memory-pressure callback; the pool is latched out-of-memory.
    OutOfMemory,
}

/// Tracks why `memory_busy` is currently set, mirroring the spec's single
/// process-wide flag but scoped to one [`Pool`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Busy {
    None,
    Gc,
    Alloc,
}

/// The arena. Owns every [`Cell`] and the singly-linked free list threaded
/// through `next_sibling`.
pub(crate) struct Pool {
    cells: Vec<Cell>,
    first_empty: CellIndex,
    free_count: usize,
    busy: Busy,
    oom_latched: bool,
}

impl Pool {
    /// Allocates a pool of `capacity` cells (index 1..=capacity; 0 is null).
    ///
    /// # Panics
    /// Panics if `capacity` is 0 or exceeds [`MAX_CELLS`] — both are
    /// programming errors in the embedder, not recoverable runtime
    /// conditions, matching the spec's "one-time global init" contract.
    pub(crate) fn init(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be nonzero");
        assert!(capacity <= MAX_CELLS, "pool capacity exceeds 14-bit index range");
        // cells[0] is a permanently-unused sentinel so that index 0 means null.
        let mut cells = Vec::with_capacity(capacity + 1);
        cells.push(Cell::unused());
        for _ in 0..capacity {
            cells.push(Cell::unused());
        }
        let mut pool = Pool {
            cells,
            first_empty: CellIndex::NULL,
            free_count: 0,
            busy: Busy::None,
            oom_latched: false,
        };
        pool.rebuild_free_list_ascending();
        pool
    }

    /// Threads every unused cell onto the free list in ascending index order.
    /// Used at `init` and after a sweep (sweep rebuilds in the same order so
    /// later flat-string scans keep finding runs — §4.A).
    fn rebuild_free_list_ascending(&mut self) {
        self.first_empty = CellIndex::NULL;
        self.free_count = 0;
        for i in (1..self.cells.len()).rev() {
            let idx = CellIndex::from_raw(i);
            if matches!(self.cells[i].variant, Variant::Unused) {
                self.cells[i].next_sibling = self.first_empty;
                self.first_empty = idx;
                self.free_count += 1;
            }
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cells.len() - 1
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.capacity() - self.free_count,
            free: self.free_count,
            capacity: self.capacity(),
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.first_empty.is_null()
    }

    pub(crate) fn is_oom_latched(&self) -> bool {
        self.oom_latched
    }

    pub(crate) fn clear_oom(&mut self) {
        self.oom_latched = false;
    }

    pub(crate) fn busy(&self) -> Busy {
        self.busy
    }

    pub(crate) fn set_busy(&mut self, busy: Busy) {
        self.busy = busy;
    }

    #[inline]
    pub(crate) fn get(&self, idx: CellIndex) -> &Cell {
        &self.cells[idx.index()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, idx: CellIndex) -> &mut Cell {
        &mut self.cells[idx.index()]
    }

    pub(crate) fn len_slots(&self) -> usize {
        self.cells.len()
    }

    /// Pops one cell off the free list, or `None` if empty. Caller is
    /// responsible for the higher-level GC-then-pressure-callback-then-retry
    /// dance (that lives in [`crate::engine::Engine::alloc`], since it needs
    /// the full engine to run a GC pass and call the host).
    pub(crate) fn pop_free_raw(&mut self) -> Option<CellIndex> {
        if self.first_empty.is_null() {
            return None;
        }
        let idx = self.first_empty;
        let next = self.cells[idx.index()].next_sibling;
        self.first_empty = next;
        self.free_count -= 1;
        Some(idx)
    }

    /// Allocates a single cell with the given variant, fully zeroed except
    /// for the variant tag, with lock count 1 (the caller owns that lock).
    pub(crate) fn alloc_one(&mut self, variant: Variant) -> Result<CellIndex, AllocError> {
        if !matches!(self.busy, Busy::None) {
            return Err(AllocError::MemoryBusy);
        }
        let idx = self.pop_free_raw().ok_or(AllocError::OutOfMemory)?;
        let cell = &mut self.cells[idx.index()];
        *cell = Cell::unused();
        cell.variant = variant;
        cell.lock = 1;
        Ok(idx)
    }

    /// Pushes a cell back onto the head of the free list (O(1)).
    fn push_free_head(&mut self, idx: CellIndex) {
        let cell = &mut self.cells[idx.index()];
        *cell = Cell::unused();
        cell.next_sibling = self.first_empty;
        self.first_empty = idx;
        self.free_count += 1;
    }

    /// Frees a single non-container, non-flat-run cell. Containers and flat
    /// runs have their own teardown in [`crate::jsvar`]/[`crate::strings`]
    /// that calls back into this once children/body cells are unrefed.
    pub(crate) fn free_one(&mut self, idx: CellIndex) {
        self.push_free_head(idx);
    }

    /// Scans the free list (ascending, per `rebuild_free_list_ascending`) for
    /// `n` cells sitting at consecutive indices. Used by
    /// [`crate::strings::alloc_flat_string`]. Returns the lowest index of the
    /// run if found; does not remove anything from the free list (the caller
    /// claims the run with [`Pool::claim_run`]).
    pub(crate) fn find_free_run(&self, n: usize) -> Option<CellIndex> {
        if n == 0 || n > self.capacity() {
            return None;
        }
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for i in 1..self.cells.len() {
            if matches!(self.cells[i].variant, Variant::Unused) {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len == n {
                    return Some(CellIndex::from_raw(run_start));
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    /// Removes a run of `n` consecutive free cells starting at `start` from
    /// the free list by rebuilding it (flat-string allocation is rare enough
    /// that an O(capacity) rebuild is acceptable, matching the pragmatism of
    /// the reference engine's own linear free-list scan).
    pub(crate) fn claim_run(&mut self, start: CellIndex, n: usize) -> Vec<CellIndex> {
        let mut claimed = Vec::with_capacity(n);
        let base = start.index();
        for off in 0..n {
            let idx = CellIndex::from_raw(base + off);
            debug_assert!(matches!(self.cells[idx.index()].variant, Variant::Unused));
            claimed.push(idx);
        }
        self.rebuild_free_list_excluding(&claimed);
        for &idx in &claimed {
            self.cells[idx.index()] = Cell::unused();
            self.cells[idx.index()].lock = 1;
        }
        claimed
    }

    fn rebuild_free_list_excluding(&mut self, exclude: &[CellIndex]) {
        self.first_empty = CellIndex::NULL;
        self.free_count = 0;
        for i in (1..self.cells.len()).rev() {
            let idx = CellIndex::from_raw(i);
            if matches!(self.cells[i].variant, Variant::Unused) && !exclude.contains(&idx) {
                self.cells[i].next_sibling = self.first_empty;
                self.first_empty = idx;
                self.free_count += 1;
            }
        }
    }

    /// Frees a whole contiguous flat-string run given its head index and the
    /// byte length stored in the head's payload.
    pub(crate) fn free_flat_run(&mut self, head: CellIndex, cell_count: usize) {
        let base = head.index();
        for off in 0..cell_count {
            let idx = CellIndex::from_raw(base + off);
            self.cells[idx.index()] = Cell::unused();
        }
        self.rebuild_free_list_ascending();
    }

    /// Called once per sweep to rebuild the free list from the current
    /// (post-sweep) set of `Unused` cells, in ascending order.
    pub(crate) fn rebuild_after_sweep(&mut self) {
        self.rebuild_free_list_ascending();
    }

    pub(crate) fn latch_oom(&mut self) {
        self.oom_latched = true;
    }

    pub(crate) fn iter_indices(&self) -> impl Iterator<Item = CellIndex> + '_ {
        (1..self.cells.len()).map(CellIndex::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_all_free() {
        let pool = Pool::init(64);
        let stats = pool.stats();
        assert_eq!(stats.capacity, 64);
        assert_eq!(stats.free, 64);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn alloc_then_free_returns_to_baseline() {
        let mut pool = Pool::init(8);
        let mut allocated = Vec::new();
        for _ in 0..8 {
            allocated.push(pool.alloc_one(Variant::Integer).unwrap());
        }
        assert!(pool.is_full());
        assert!(pool.alloc_one(Variant::Integer).is_err());
        for idx in allocated {
            pool.free_one(idx);
        }
        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.free, 8);
    }

    #[test]
    fn find_free_run_locates_contiguous_block() {
        let mut pool = Pool::init(8);
        // Allocate cell 1, leaving 2..=8 free initially allocated ascending
        // from the head (LIFO free list), so force a specific hole pattern.
        let a = pool.alloc_one(Variant::Integer).unwrap();
        let run = pool.find_free_run(3);
        assert!(run.is_some());
        pool.free_one(a);
    }

    #[test]
    fn memory_busy_blocks_nested_alloc() {
        let mut pool = Pool::init(4);
        pool.set_busy(Busy::Gc);
        assert_eq!(pool.alloc_one(Variant::Integer), Err(AllocError::MemoryBusy));
        pool.set_busy(Busy::None);
        assert!(pool.alloc_one(Variant::Integer).is_ok());
    }
}
