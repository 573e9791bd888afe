//! The typed-value API (components B and C): classify, construct, coerce,
//! and `mathsOp`, plus the lock-count/ref-count lifecycle.
//!
//! `JsVar` is a `Copy` handle — an index into the engine's pool — with no
//! `Drop` impl. Exactly like the teacher's `Value`/`HeapId` pair, reference
//! management is manual: callers thread `engine.unlock(var)` through every
//! scope exit themselves rather than relying on RAII. This is the §9 Design
//! Notes' "guard object" idea taken one step further in the direction the
//! teacher crate actually ships in: a guard whose destructor must reach a
//! `&mut Pool` cannot be expressed safely while the pool is *also* being
//! mutated through ordinary `&mut Engine` calls, so `ejs` follows the
//! teacher's real (not aspirational) idiom of explicit manual calls instead.
//! See DESIGN.md.

use crate::{
    cellpool::{CellIndex, NameKey, NameValue, Payload, Variant, LOCK_MAX, REF_MAX},
    engine::Engine,
    error::{Error, Exception, Kind},
    strings,
};

/// A handle to one cell. `CellIndex::NULL` (index 0) doubles as the JS
/// `undefined` value — there is no dedicated "Undefined" variant because
/// "no cell" and "this property has no value" are the same observable state
/// (§3: "0 == null reference").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsVar(pub(crate) CellIndex);

impl JsVar {
    pub const UNDEFINED: JsVar = JsVar(CellIndex::NULL);

    pub(crate) fn from_index(idx: CellIndex) -> Self {
        JsVar(idx)
    }

    pub(crate) fn index(self) -> CellIndex {
        self.0
    }

    #[must_use]
    pub fn is_undefined(self) -> bool {
        self.0.is_null()
    }
}

// ---------------------------------------------------------------------
// Classify
// ---------------------------------------------------------------------

impl Engine {
    #[must_use]
    pub fn is_null(&self, v: JsVar) -> bool {
        !v.is_undefined() && matches!(self.get_cell(v).variant, Variant::Null)
    }

    #[must_use]
    pub fn is_number(&self, v: JsVar) -> bool {
        !v.is_undefined() && matches!(self.get_cell(v).variant, Variant::Integer | Variant::Float)
    }

    #[must_use]
    pub fn is_bool(&self, v: JsVar) -> bool {
        !v.is_undefined() && matches!(self.get_cell(v).variant, Variant::Boolean)
    }

    #[must_use]
    pub fn is_string(&self, v: JsVar) -> bool {
        !v.is_undefined() && self.get_cell(v).variant.is_string()
    }

    #[must_use]
    pub fn is_object(&self, v: JsVar) -> bool {
        !v.is_undefined() && matches!(self.get_cell(v).variant, Variant::Object | Variant::Array)
    }

    #[must_use]
    pub fn is_array(&self, v: JsVar) -> bool {
        !v.is_undefined() && matches!(self.get_cell(v).variant, Variant::Array)
    }

    #[must_use]
    pub fn is_function(&self, v: JsVar) -> bool {
        !v.is_undefined() && matches!(self.get_cell(v).variant, Variant::Function | Variant::NativeFunction)
    }

    #[must_use]
    pub fn is_iterable(&self, v: JsVar) -> bool {
        self.is_object(v) || self.is_string(v) || self.is_array_buffer_view(v)
    }

    /// A typed-array or `DataView` instance (component G): a container cell
    /// of variant `ArrayBuffer` naming a byte-backing string.
    #[must_use]
    pub fn is_array_buffer_view(&self, v: JsVar) -> bool {
        !v.is_undefined() && matches!(self.get_cell(v).variant, Variant::ArrayBuffer)
    }

    fn get_cell_opt(&self, v: JsVar) -> Option<Variant> {
        if v.is_undefined() {
            None
        } else {
            Some(self.get_cell(v).variant)
        }
    }

    /// `typeof` string, per the ECMAScript table (scenario 7 in §8).
    #[must_use]
    pub fn type_of(&self, v: JsVar) -> &'static str {
        if v.is_undefined() {
            return "undefined";
        }
        match self.get_cell(v).variant {
            Variant::Null | Variant::Object | Variant::Array | Variant::ArrayBuffer | Variant::GetSet => "object",
            Variant::Integer | Variant::Float => "number",
            Variant::Boolean => "boolean",
            Variant::StringHead | Variant::FlatString | Variant::NativeString => "string",
            Variant::Function | Variant::NativeFunction => "function",
            _ => "object",
        }
    }
}

// ---------------------------------------------------------------------
// Lock / unlock / ref
// ---------------------------------------------------------------------

impl Engine {
    /// `lock`/`lockAgain`: adds a temporary stack-root anchor. No-op for
    /// `undefined`.
    pub fn lock(&mut self, v: JsVar) -> JsVar {
        if !v.is_undefined() {
            let cell = self.get_cell_mut(v);
            cell.lock = cell.lock.saturating_add(1).min(LOCK_MAX);
        }
        v
    }

    /// `unlock`: drops the anchor, freeing the cell if it is also unreferenced.
    pub fn unlock(&mut self, v: JsVar) {
        if v.is_undefined() {
            return;
        }
        let (lock, refs, variant) = {
            let cell = self.get_cell_mut(v);
            if cell.lock > 0 {
                cell.lock -= 1;
            }
            (cell.lock, cell.refs, cell.variant)
        };
        if lock == 0 && refs == 0 && variant.is_ref_eligible() {
            self.free_value(v);
        }
    }

    pub(crate) fn inc_ref(&mut self, v: JsVar) {
        if v.is_undefined() {
            return;
        }
        let cell = self.get_cell_mut(v);
        cell.refs = cell.refs.saturating_add(1).min(REF_MAX);
    }

    pub(crate) fn dec_ref(&mut self, v: JsVar) {
        if v.is_undefined() {
            return;
        }
        let (refs, lock, variant) = {
            let cell = self.get_cell_mut(v);
            if cell.refs > 0 {
                cell.refs -= 1;
            }
            (cell.refs, cell.lock, cell.variant)
        };
        if refs == 0 && lock == 0 && variant.is_ref_eligible() {
            self.free_value(v);
        }
    }

    /// Tears down one cell: unrefs/frees a container's name children, frees a
    /// string's extension chain or flat run, then returns the cell itself to
    /// the free list.
    pub(crate) fn free_value(&mut self, v: JsVar) {
        if v.is_undefined() {
            return;
        }
        let variant = self.get_cell(v).variant;
        if variant.is_container() {
            if let Payload::UserFunction { scope, .. } = self.get_cell(v).payload.clone() {
                for s in scope.iter() {
                    self.dec_ref(JsVar::from_index(*s));
                }
            }
            let mut child = self.get_cell(v).first_child;
            while !child.is_null() {
                let next = self.get_cell(child).next_sibling;
                self.free_name(JsVar::from_index(child));
                child = next;
            }
            self.pool.free_one(v.index());
        } else {
            match variant {
                Variant::StringHead => strings::free_chain(&mut self.pool, v.index()),
                Variant::FlatString => {
                    let len = match self.get_cell(v).payload {
                        Payload::FlatStringLen(n) => n as usize,
                        _ => 0,
                    };
                    self.pool.free_flat_run(v.index(), strings::flat_string_cell_count(len));
                }
                _ => self.pool.free_one(v.index()),
            }
        }
    }

    /// Frees a name cell: unrefs the value it points at (if any), frees an
    /// out-of-line key chain, then returns the name cell itself.
    pub(crate) fn free_name(&mut self, name: JsVar) {
        let value = match &self.get_cell(name).payload {
            Payload::Name { value, .. } => *value,
            _ => NameValue::Ref(CellIndex::NULL),
        };
        if let NameValue::Ref(target) = value {
            self.dec_ref(JsVar::from_index(target));
        }
        if let Payload::Name { key: NameKey::Ref(key_head), .. } = &self.get_cell(name).payload {
            let key_head = *key_head;
            strings::free_chain(&mut self.pool, key_head);
        }
        self.pool.free_one(name.index());
    }
}

// ---------------------------------------------------------------------
// Construct
// ---------------------------------------------------------------------

impl Engine {
    fn alloc_exc(&mut self, variant: Variant) -> Result<CellIndex, Exception> {
        self.alloc(variant).map_err(|e| self.from_alloc_error(e))
    }

    pub fn new_int(&mut self, value: i32) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Integer)?;
        self.pool.get_mut(idx).payload = Payload::Int(value);
        Ok(JsVar::from_index(idx))
    }

    pub fn new_float(&mut self, value: f64) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Float)?;
        self.pool.get_mut(idx).payload = Payload::Float(value);
        Ok(JsVar::from_index(idx))
    }

    /// Picks integer or float representation based on whether `value` is a
    /// finite integer that fits in `i32` (the common numeric fast path).
    pub fn new_number(&mut self, value: f64) -> Result<JsVar, Exception> {
        if value.is_finite() && value.fract() == 0.0 && value.abs() <= i32::MAX as f64 {
            self.new_int(value as i32)
        } else {
            self.new_float(value)
        }
    }

    pub fn new_bool(&mut self, value: bool) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Boolean)?;
        self.pool.get_mut(idx).payload = Payload::Bool(value);
        Ok(JsVar::from_index(idx))
    }

    pub fn new_null(&mut self) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Null)?;
        Ok(JsVar::from_index(idx))
    }

    /// `newFromString`: picks chained vs flat representation by length.
    pub fn new_string(&mut self, bytes: &[u8]) -> Result<JsVar, Exception> {
        if bytes.len() > strings::FLAT_THRESHOLD {
            if let Some(head) = strings::alloc_flat_string(&mut self.pool, bytes.len()) {
                self.write_flat_bytes(head, bytes);
                return Ok(JsVar::from_index(head));
            }
            // Flat allocation failed (fragmented pool); GC once and retry,
            // falling back to chained representation either way.
            let _ = self.collect_garbage();
            if let Some(head) = strings::alloc_flat_string(&mut self.pool, bytes.len()) {
                self.write_flat_bytes(head, bytes);
                return Ok(JsVar::from_index(head));
            }
        }
        match strings::alloc_chained_string(&mut self.pool, bytes) {
            Ok(head) => Ok(JsVar::from_index(head)),
            Err(_) => {
                let _ = self.collect_garbage();
                strings::alloc_chained_string(&mut self.pool, bytes)
                    .map(JsVar::from_index)
                    .map_err(|e| {
                        self.from_alloc_error(match e {
                            crate::cellpool::AllocError::MemoryBusy => Error::MemoryBusy,
                            crate::cellpool::AllocError::OutOfMemory => Error::OutOfMemory,
                        })
                    })
            }
        }
    }

    fn write_flat_bytes(&mut self, head: CellIndex, bytes: &[u8]) {
        for (i, chunk) in bytes.chunks(strings::EXT_CHARS).enumerate() {
            let body = CellIndex::from_raw(head.index() + 1 + i);
            self.pool.get_mut(body).payload =
                Payload::StringBytes(chunk.iter().copied().collect());
        }
    }

    /// `newArrayBufferFromString`/zero-copy native string: bytes live outside
    /// the pool in a shared, reference-counted buffer.
    pub fn new_native_string(&mut self, data: std::rc::Rc<[u8]>) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::NativeString)?;
        self.pool.get_mut(idx).payload = Payload::NativeStringData(data);
        Ok(JsVar::from_index(idx))
    }

    pub fn new_object(&mut self) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Object)?;
        Ok(JsVar::from_index(idx))
    }

    pub fn new_array(&mut self) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Array)?;
        self.pool.get_mut(idx).payload = Payload::Int(0);
        Ok(JsVar::from_index(idx))
    }

    pub fn new_function(&mut self) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Function)?;
        Ok(JsVar::from_index(idx))
    }

    /// Builds a user-defined function's closure cell: captures `scope` (the
    /// currently active scope chain, outermost first) as extra owner edges
    /// alongside the ordinary name-refcount graph (§9 "cyclic graphs... is
    /// exactly why the mark-sweep GC exists").
    pub fn new_closure(&mut self, params: Vec<String>, body: String, scope: Vec<CellIndex>) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::Function)?;
        for &s in &scope {
            self.inc_ref(JsVar::from_index(s));
        }
        self.get_cell_mut(JsVar::from_index(idx)).payload = Payload::UserFunction {
            params: std::rc::Rc::new(params),
            body: std::rc::Rc::from(body.as_str()),
            scope: std::rc::Rc::new(scope),
        };
        Ok(JsVar::from_index(idx))
    }

    pub fn new_native_function(&mut self, func: crate::nativecall::NativeFnId, argspec: u16) -> Result<JsVar, Exception> {
        let idx = self.alloc_exc(Variant::NativeFunction)?;
        self.pool.get_mut(idx).payload = Payload::NativeFunction { func, argspec };
        Ok(JsVar::from_index(idx))
    }

    /// Read-access to an array's logical length (spec: authoritative over
    /// the max-index child).
    pub(crate) fn array_length(&self, v: JsVar) -> u32 {
        match self.get_cell(v).payload {
            Payload::Int(n) => n.max(0) as u32,
            _ => 0,
        }
    }

    pub(crate) fn set_array_length(&mut self, v: JsVar, len: u32) {
        self.get_cell_mut(v).payload = Payload::Int(len as i32);
    }
}

// ---------------------------------------------------------------------
// Coerce
// ---------------------------------------------------------------------

impl Engine {
    /// `asNumber`: ToNumber, for primitives (objects delegate through
    /// `to_primitive` in `containers.rs`, called by the parser before this).
    pub fn as_number(&self, v: JsVar) -> f64 {
        if v.is_undefined() {
            return f64::NAN;
        }
        match self.get_cell(v).variant {
            Variant::Integer => match self.get_cell(v).payload {
                Payload::Int(n) => n as f64,
                _ => f64::NAN,
            },
            Variant::Float => match self.get_cell(v).payload {
                Payload::Float(f) => f,
                _ => f64::NAN,
            },
            Variant::Boolean => match self.get_cell(v).payload {
                Payload::Bool(b) => if b { 1.0 } else { 0.0 },
                _ => f64::NAN,
            },
            Variant::Null => 0.0,
            _ if self.is_string(v) => crate::types::numfmt::parse_float(&self.as_bytes(v)),
            _ => f64::NAN,
        }
    }

    pub fn as_bool(&self, v: JsVar) -> bool {
        if v.is_undefined() {
            return false;
        }
        match self.get_cell(v).variant {
            Variant::Boolean => matches!(self.get_cell(v).payload, Payload::Bool(true)),
            Variant::Integer => !matches!(self.get_cell(v).payload, Payload::Int(0)),
            Variant::Float => match self.get_cell(v).payload {
                Payload::Float(f) => f != 0.0 && !f.is_nan(),
                _ => false,
            },
            Variant::Null => false,
            _ if self.is_string(v) => self.as_bytes(v).len() > 0,
            _ => true,
        }
    }

    /// Raw byte content of a string-kind value.
    pub(crate) fn as_bytes(&self, v: JsVar) -> Vec<u8> {
        if v.is_undefined() || !self.is_string(v) {
            return Vec::new();
        }
        strings::StringIter::new(&self.pool, v.index()).to_bytes()
    }

    /// `asString`/ToString for primitives. Objects are handled by
    /// `containers::to_js_string`, which calls back into this for the
    /// primitive leaves.
    pub fn as_string_bytes(&self, v: JsVar) -> Vec<u8> {
        if v.is_undefined() {
            return b"undefined".to_vec();
        }
        match self.get_cell(v).variant {
            Variant::Null => b"null".to_vec(),
            Variant::Boolean => {
                if self.as_bool(v) { b"true".to_vec() } else { b"false".to_vec() }
            }
            Variant::Integer | Variant::Float => crate::types::numfmt::number_to_string(self.as_number(v)).into_bytes(),
            _ if self.is_string(v) => self.as_bytes(v),
            _ => b"[object Object]".to_vec(),
        }
    }
}

/// Binary/unary operators dispatched through `mathsOp` (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Ushr,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    InstanceOf,
}

impl Engine {
    /// `mathsOp`: the single entry point for every binary operator in §4.B.
    /// Operands are borrowed (not consumed) so callers keep their own
    /// lock/unlock discipline around the call.
    pub fn maths_op(&mut self, a: JsVar, b: JsVar, op: Op) -> Result<JsVar, Exception> {
        use Op::*;
        match op {
            Add => self.op_add(a, b),
            Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | Shl | Shr | Ushr => self.op_numeric(a, b, op),
            Eq => self.new_bool(self.loose_eq(a, b)),
            Ne => { let e = self.loose_eq(a, b); self.new_bool(!e) }
            StrictEq => self.new_bool(self.strict_eq(a, b)),
            StrictNe => { let e = self.strict_eq(a, b); self.new_bool(!e) }
            Lt | Le | Gt | Ge => self.op_compare(a, b, op),
            In => self.op_in(a, b),
            InstanceOf => self.op_instanceof(a, b),
        }
    }

    fn op_add(&mut self, a: JsVar, b: JsVar) -> Result<JsVar, Exception> {
        if self.is_string(a) || self.is_string(b) {
            let mut bytes = self.coerce_to_string_bytes(a);
            bytes.extend(self.coerce_to_string_bytes(b));
            return self.new_string(&bytes);
        }
        let (pa, pb) = (self.to_primitive(a), self.to_primitive(b));
        if self.is_string(pa) || self.is_string(pb) {
            let mut bytes = self.coerce_to_string_bytes(pa);
            bytes.extend(self.coerce_to_string_bytes(pb));
            return self.new_string(&bytes);
        }
        self.new_number(self.as_number(pa) + self.as_number(pb))
    }

    fn op_numeric(&mut self, a: JsVar, b: JsVar, op: Op) -> Result<JsVar, Exception> {
        use Op::*;
        let (av, bv) = (self.as_number(a), self.as_number(b));
        match op {
            Sub => self.new_number(av - bv),
            Mul => self.new_number(av * bv),
            Div => self.new_number(av / bv),
            Mod => self.new_number(av % bv),
            BitAnd => self.new_int(to_i32(av) & to_i32(bv)),
            BitOr => self.new_int(to_i32(av) | to_i32(bv)),
            BitXor => self.new_int(to_i32(av) ^ to_i32(bv)),
            Shl => self.new_int(to_i32(av).wrapping_shl(to_u32(bv) & 31)),
            Shr => self.new_int(to_i32(av).wrapping_shr(to_u32(bv) & 31)),
            Ushr => self.new_number((to_u32(av) >> (to_u32(bv) & 31)) as f64),
            _ => unreachable!(),
        }
    }

    fn op_compare(&mut self, a: JsVar, b: JsVar, op: Op) -> Result<JsVar, Exception> {
        use Op::*;
        let result = if self.is_string(a) && self.is_string(b) {
            let (ab, bb) = (self.as_bytes(a), self.as_bytes(b));
            match op {
                Lt => ab < bb,
                Le => ab <= bb,
                Gt => ab > bb,
                Ge => ab >= bb,
                _ => unreachable!(),
            }
        } else {
            let (av, bv) = (self.as_number(a), self.as_number(b));
            match op {
                Lt => av < bv,
                Le => av <= bv,
                Gt => av > bv,
                Ge => av >= bv,
                _ => unreachable!(),
            }
        };
        self.new_bool(result)
    }

    fn op_in(&mut self, a: JsVar, b: JsVar) -> Result<JsVar, Exception> {
        if !self.is_object(b) {
            return Err(self.type_error("Cannot use 'in' operator on a non-object"));
        }
        let key = self.as_bytes(a);
        let found = crate::containers::lookup_own_or_proto(self, b, &key).is_some();
        self.new_bool(found)
    }

    fn op_instanceof(&mut self, a: JsVar, b: JsVar) -> Result<JsVar, Exception> {
        if !self.is_function(b) {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let result = crate::containers::instance_of(self, a, b);
        self.new_bool(result)
    }

    /// ToPrimitive: for non-objects this is the identity; objects delegate
    /// to `valueOf`/`toString` (full dispatch lives in `containers.rs` once
    /// user callables exist; primitives are handled fully here).
    pub(crate) fn to_primitive(&mut self, v: JsVar) -> JsVar {
        if self.is_object(v) {
            crate::containers::to_primitive_object(self, v)
        } else {
            v
        }
    }

    fn coerce_to_string_bytes(&mut self, v: JsVar) -> Vec<u8> {
        if self.is_object(v) {
            crate::containers::to_js_string(self, v)
        } else {
            self.as_string_bytes(v)
        }
    }

    /// Loose (`==`) equality, following the ECMAScript abstract-equality
    /// matrix (§4.B).
    pub(crate) fn loose_eq(&mut self, a: JsVar, b: JsVar) -> bool {
        if self.strict_eq(a, b) {
            return true;
        }
        let (a_null_ish, b_null_ish) = (a.is_undefined() || self.is_null(a), b.is_undefined() || self.is_null(b));
        if a_null_ish || b_null_ish {
            return a_null_ish && b_null_ish;
        }
        if self.is_object(a) && !self.is_object(b) {
            let prim = self.to_primitive(a);
            return self.loose_eq(prim, b);
        }
        if self.is_object(b) && !self.is_object(a) {
            let prim = self.to_primitive(b);
            return self.loose_eq(a, prim);
        }
        if self.is_number(a) || self.is_number(b) || self.is_bool(a) || self.is_bool(b) {
            return self.as_number(a) == self.as_number(b);
        }
        if self.is_string(a) && self.is_string(b) {
            return self.as_bytes(a) == self.as_bytes(b);
        }
        false
    }

    /// Strict (`===`) equality.
    pub(crate) fn strict_eq(&self, a: JsVar, b: JsVar) -> bool {
        if a.is_undefined() || b.is_undefined() {
            return a.is_undefined() && b.is_undefined();
        }
        if self.is_object(a) || self.is_function(a) {
            return a.0 == b.0;
        }
        let (ta, tb) = (self.type_of(a), self.type_of(b));
        if ta != tb {
            return false;
        }
        match ta {
            "number" => self.as_number(a) == self.as_number(b),
            "boolean" => self.as_bool(a) == self.as_bool(b),
            "string" => self.as_bytes(a) == self.as_bytes(b),
            "undefined" => true,
            "object" => {
                if self.is_null(a) || self.is_null(b) {
                    self.is_null(a) && self.is_null(b)
                } else {
                    a.0 == b.0
                }
            }
            _ => a.0 == b.0,
        }
    }
}

fn to_i32(f: f64) -> i32 {
    if !f.is_finite() {
        return 0;
    }
    (f as i64 as u32) as i32
}

fn to_u32(f: f64) -> u32 {
    if !f.is_finite() {
        return 0;
    }
    f as i64 as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    fn engine() -> Engine {
        Engine::new(crate::engine::EngineConfig { cell_count: 200, ..Default::default() }, NullHost::new())
    }

    #[test]
    fn integer_arithmetic_matches_reference() {
        let mut e = engine();
        for a in -3..3 {
            for b in -3..3 {
                if b == 0 {
                    continue;
                }
                let va = e.new_int(a).unwrap();
                let vb = e.new_int(b).unwrap();
                let sum = e.maths_op(va, vb, Op::Add).unwrap();
                assert_eq!(e.as_number(sum), (a + b) as f64);
                e.unlock(sum);
                let prod = e.maths_op(va, vb, Op::Mul).unwrap();
                assert_eq!(e.as_number(prod), (a * b) as f64);
                e.unlock(prod);
                e.unlock(va);
                e.unlock(vb);
            }
        }
    }

    #[test]
    fn string_concat() {
        let mut e = engine();
        let a = e.new_string(b"foo").unwrap();
        let b = e.new_string(b"bar").unwrap();
        let r = e.maths_op(a, b, Op::Add).unwrap();
        assert_eq!(e.as_bytes(r), b"foobar");
        e.unlock(a);
        e.unlock(b);
        e.unlock(r);
    }

    #[test]
    fn lock_unlock_frees_unreferenced_cell() {
        let mut e = engine();
        let before = e.stats();
        let v = e.new_int(42).unwrap();
        assert!(e.stats().live > before.live);
        e.unlock(v);
        assert_eq!(e.stats().live, before.live);
    }

    #[test]
    fn typeof_matches_ecmascript_table() {
        let mut e = engine();
        let n = e.new_int(1).unwrap();
        let s = e.new_string(b"s").unwrap();
        let arr = e.new_array().unwrap();
        let null = e.new_null().unwrap();
        assert_eq!(e.type_of(n), "number");
        assert_eq!(e.type_of(s), "string");
        assert_eq!(e.type_of(arr), "object");
        assert_eq!(e.type_of(null), "object");
        e.unlock(n);
        e.unlock(s);
        e.unlock(arr);
        e.unlock(null);
    }
}
