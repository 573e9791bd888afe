//! Object/array child-name-list discipline, `__proto__` chain walking, and
//! the object-side halves of ToPrimitive/ToString (component E).
//!
//! Objects and arrays share one representation: a container cell whose
//! `first_child`/`last_child` thread a doubly-linked list of `Name` cells.
//! Objects keep plain insertion order. Arrays keep their numeric-keyed
//! children in ascending order (§4.E: "the insertion routine walks the list
//! from `lastChild` backwards if the key is numeric") so that `for...in` and
//! `Object.keys` both observe ascending index order regardless of the order
//! `set(i, v)` calls arrived in; arrays additionally track a `length` in the
//! container's own payload (`Payload::Int`, written by
//! [`crate::jsvar::Engine::new_array`]).

use crate::{
    cellpool::{CellIndex, NameKey, NameValue, Payload, Variant},
    engine::Engine,
    error::Exception,
    jsvar::JsVar,
    strings,
};

const PROTO_KEY: &[u8] = b"__proto__";

impl Engine {
    /// Appends a new name cell to `container`'s child list, bumping the
    /// child's ref count (§3 invariant (b): a container holds one ref per
    /// name-edge it owns). For arrays, a canonical numeric key is inserted
    /// in ascending position among the trailing run of numeric-keyed
    /// siblings (walking backward from `lastChild`, per §4.E) rather than
    /// always at the tail; every other key (objects, and non-canonical
    /// array keys like `"01"`) keeps plain insertion order.
    fn append_name(&mut self, container: JsVar, key: &[u8], value: NameValue) -> Result<CellIndex, Exception> {
        let name_idx = self.alloc(Variant::Name).map_err(|e| self.from_alloc_error(e))?;
        let key_repr = if key.len() <= crate::cellpool::INLINE_KEY_BYTES {
            NameKey::Inline(key.iter().copied().collect())
        } else {
            let head = strings::alloc_chained_string(&mut self.pool, key)
                .map_err(|_| self.type_error("out of memory allocating property key"))?;
            NameKey::Ref(head)
        };
        if let NameValue::Ref(target) = value {
            self.inc_ref(JsVar::from_index(target));
        }
        {
            let name_cell = self.get_cell_mut(JsVar::from_index(name_idx));
            name_cell.payload = Payload::Name { key: key_repr, value };
        }

        let new_index = if self.is_array(container) { canonical_array_index(key) } else { None };
        let insert_after = if new_index.is_some() {
            let mut cur = self.get_cell(container).last_child;
            while !cur.is_null() {
                let sibling_index = match &self.get_cell(JsVar::from_index(cur)).payload {
                    Payload::Name { key: k, .. } => canonical_array_index(&key_to_bytes(k, &self.pool)),
                    _ => None,
                };
                match sibling_index {
                    Some(v) if v > new_index.unwrap() => cur = self.get_cell(JsVar::from_index(cur)).prev_sibling,
                    _ => break,
                }
            }
            cur
        } else {
            self.get_cell(container).last_child
        };

        let next = if insert_after.is_null() {
            self.get_cell(container).first_child
        } else {
            self.get_cell(JsVar::from_index(insert_after)).next_sibling
        };
        self.get_cell_mut(JsVar::from_index(name_idx)).prev_sibling = insert_after;
        self.get_cell_mut(JsVar::from_index(name_idx)).next_sibling = next;
        if insert_after.is_null() {
            self.get_cell_mut(container).first_child = name_idx;
        } else {
            self.get_cell_mut(JsVar::from_index(insert_after)).next_sibling = name_idx;
        }
        if next.is_null() {
            self.get_cell_mut(container).last_child = name_idx;
        } else {
            self.get_cell_mut(JsVar::from_index(next)).prev_sibling = name_idx;
        }
        Ok(name_idx)
    }

    /// Finds the name cell for `key` among `container`'s own children
    /// (no prototype walk), using the cheap prefix/inline compare of §4.E.
    pub(crate) fn find_own_name(&self, container: JsVar, key: &[u8]) -> Option<CellIndex> {
        let mut cur = self.get_cell(container).first_child;
        while !cur.is_null() {
            let matches = match &self.get_cell(JsVar::from_index(cur)).payload {
                Payload::Name { key: k, .. } => strings::name_key_prefix_eq(k, &self.pool, key),
                _ => false,
            };
            if matches {
                return Some(cur);
            }
            cur = self.get_cell(JsVar::from_index(cur)).next_sibling;
        }
        None
    }

    fn name_value(&self, name: CellIndex) -> JsVar {
        match &self.get_cell(JsVar::from_index(name)).payload {
            Payload::Name { value: NameValue::Ref(v), .. } => JsVar::from_index(*v),
            Payload::Name { value: NameValue::InlineInt(_), .. }
            | Payload::Name { value: NameValue::InlineBool(_), .. } => JsVar::UNDEFINED,
            _ => JsVar::UNDEFINED,
        }
    }

    /// Reads an own-or-inherited property, following `__proto__` links.
    /// Inline int/bool name values are materialized into fresh cells on
    /// read, mirroring the original engine's "unpack on demand" trick.
    /// Accessing a property of `undefined`/`null` throws, matching every
    /// other engine's `TypeError`; when the own/proto walk comes up empty
    /// the lookup falls through to the kind-keyed built-in method table
    /// (`Array.prototype.push`, `String.prototype.charAt`, ...) rather than
    /// retrofitting literal `__proto__` links onto every value at
    /// construction time — see DESIGN.md.
    pub fn get_property(&mut self, obj: JsVar, key: &[u8]) -> Result<JsVar, Exception> {
        if obj.is_undefined() || self.is_null(obj) {
            return Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                if obj.is_undefined() { "undefined" } else { "null" },
                String::from_utf8_lossy(key),
            )));
        }
        if self.is_string(obj) {
            return self.get_string_property(obj, key);
        }
        if self.is_array_buffer_view(obj) {
            return self.get_array_buffer_property(obj, key);
        }
        if key == b"length" && self.is_array(obj) {
            return self.new_number(self.array_length(obj) as f64);
        }
        let mut cur = obj;
        loop {
            if let Some(name_idx) = self.find_own_name(cur, key) {
                return self.materialize_name_value(name_idx);
            }
            match self.find_own_name(cur, PROTO_KEY) {
                Some(p) => {
                    let next = self.materialize_name_value(p)?;
                    if next.is_undefined() || !self.is_object(next) {
                        break;
                    }
                    cur = next;
                }
                None => break,
            }
        }
        if let Some(id) = crate::builtins::lookup_builtin_method(self, obj, key) {
            return self.new_native_function(id, 0);
        }
        Ok(JsVar::UNDEFINED)
    }

    /// Strings have no own-name chain (their `first_child`/`last_child`
    /// fields carry the chained-string body instead), so indexed access and
    /// `.length` are handled directly rather than through `find_own_name`.
    fn get_string_property(&mut self, obj: JsVar, key: &[u8]) -> Result<JsVar, Exception> {
        if key == b"length" {
            return self.new_number(self.as_bytes(obj).len() as f64);
        }
        if let Ok(text) = std::str::from_utf8(key) {
            if let Ok(idx) = text.parse::<usize>() {
                let bytes = self.as_bytes(obj);
                return match bytes.get(idx) {
                    Some(&b) => self.new_string(&[b]),
                    None => Ok(JsVar::UNDEFINED),
                };
            }
        }
        if let Some(id) = crate::builtins::lookup_builtin_method(self, obj, key) {
            return self.new_native_function(id, 0);
        }
        Ok(JsVar::UNDEFINED)
    }

    /// TypedArray/`DataView` indexed and `.length`/`.byteLength` reads
    /// (component G). The `getInt8`/`setFloat64`/... method table falls
    /// through to the builtin lookup below, same as every other kind.
    fn get_array_buffer_property(&mut self, obj: JsVar, key: &[u8]) -> Result<JsVar, Exception> {
        if key == b"byteLength" {
            return self.new_number(self.array_buffer_byte_len(obj)? as f64);
        }
        // A DataView has no indexed access or `.length` of its own — every
        // read goes through its `getInt8`/... method table below.
        if !self.is_data_view(obj) {
            if key == b"length" {
                return self.new_number(self.array_buffer_len(obj)? as f64);
            }
            if let Ok(text) = std::str::from_utf8(key) {
                if let Ok(idx) = text.parse::<usize>() {
                    return match self.array_buffer_get(obj, idx) {
                        Ok(n) => self.new_number(n),
                        Err(_) => Ok(JsVar::UNDEFINED),
                    };
                }
            }
        }
        if let Some(id) = crate::builtins::lookup_builtin_method(self, obj, key) {
            return self.new_native_function(id, 0);
        }
        Ok(JsVar::UNDEFINED)
    }

    fn materialize_name_value(&mut self, name: CellIndex) -> Result<JsVar, Exception> {
        match self.get_cell(JsVar::from_index(name)).payload.clone() {
            Payload::Name { value: NameValue::Ref(v), .. } => Ok(JsVar::from_index(v)),
            Payload::Name { value: NameValue::InlineInt(n), .. } => self.new_int(n),
            Payload::Name { value: NameValue::InlineBool(b), .. } => self.new_bool(b),
            _ => Ok(JsVar::UNDEFINED),
        }
    }

    /// Writes an own property, creating the name cell if absent. Overwriting
    /// drops the ref on the previous value first (§3 invariant (b)).
    pub fn set_property(&mut self, obj: JsVar, key: &[u8], value: JsVar) -> Result<(), Exception> {
        if self.is_array_buffer_view(obj) {
            return self.set_array_buffer_property(obj, key, value);
        }
        if let Some(name_idx) = self.find_own_name(obj, key) {
            let old = self.name_value(name_idx);
            if !old.is_undefined() {
                self.dec_ref(old);
            }
            if !value.is_undefined() {
                self.inc_ref(value);
            }
            self.get_cell_mut(JsVar::from_index(name_idx)).payload = {
                let key_repr = match &self.get_cell(JsVar::from_index(name_idx)).payload {
                    Payload::Name { key, .. } => key.clone(),
                    _ => NameKey::Empty,
                };
                Payload::Name { key: key_repr, value: NameValue::Ref(value.index()) }
            };
        } else {
            self.append_name(obj, key, NameValue::Ref(value.index()))?;
            if self.is_array(obj) {
                self.bump_length_if_numeric(obj, key);
            }
        }
        Ok(())
    }

    /// TypedArray indexed writes (`DataView` goes through its method table,
    /// not here). Out-of-range indices and non-numeric keys are silently
    /// ignored — a typed array never grows or gains ordinary properties.
    fn set_array_buffer_property(&mut self, obj: JsVar, key: &[u8], value: JsVar) -> Result<(), Exception> {
        if self.is_data_view(obj) {
            return Ok(());
        }
        if let Ok(text) = std::str::from_utf8(key) {
            if let Ok(idx) = text.parse::<usize>() {
                let n = self.as_number(value);
                let _ = self.array_buffer_set(obj, idx, n, crate::jsarraybuffer::Endian::Native);
            }
        }
        Ok(())
    }

    fn bump_length_if_numeric(&mut self, arr: JsVar, key: &[u8]) {
        if let Ok(s) = std::str::from_utf8(key) {
            if let Ok(idx) = s.parse::<u32>() {
                let len = self.array_length(arr);
                if idx >= len {
                    self.set_array_length(arr, idx + 1);
                }
            }
        }
    }

    /// `delete obj.key`: unrefs the value, frees the name cell, unlinks it.
    pub fn delete_property(&mut self, obj: JsVar, key: &[u8]) -> bool {
        let Some(name_idx) = self.find_own_name(obj, key) else {
            return false;
        };
        let (prev, next) = {
            let cell = self.get_cell(JsVar::from_index(name_idx));
            (cell.prev_sibling, cell.next_sibling)
        };
        if prev.is_null() {
            self.get_cell_mut(obj).first_child = next;
        } else {
            self.get_cell_mut(JsVar::from_index(prev)).next_sibling = next;
        }
        if next.is_null() {
            self.get_cell_mut(obj).last_child = prev;
        } else {
            self.get_cell_mut(JsVar::from_index(next)).prev_sibling = prev;
        }
        self.free_name(JsVar::from_index(name_idx));
        true
    }

    /// Own enumerable keys: insertion order for objects, ascending numeric
    /// order for array indices (see [`Self::append_name`]).
    pub fn own_keys(&self, obj: JsVar) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut cur = self.get_cell(obj).first_child;
        while !cur.is_null() {
            if let Payload::Name { key, .. } = &self.get_cell(JsVar::from_index(cur)).payload {
                out.push(key_to_bytes(key, &self.pool));
            }
            cur = self.get_cell(JsVar::from_index(cur)).next_sibling;
        }
        out
    }
}

/// A key is a canonical array index (`asArrayIndex` in §4.B) when it is the
/// decimal re-rendering of some `u32` with no leading zero (so `"01"` and
/// `"4294967296"` are ordinary string keys, not indices).
fn canonical_array_index(key: &[u8]) -> Option<u32> {
    let s = std::str::from_utf8(key).ok()?;
    let v: u32 = s.parse().ok()?;
    (v.to_string() == s).then_some(v)
}

fn key_to_bytes(key: &NameKey, pool: &crate::cellpool::Pool) -> Vec<u8> {
    match key {
        NameKey::Empty => Vec::new(),
        NameKey::Inline(b) => b.to_vec(),
        NameKey::Ref(head) => strings::StringIter::new(pool, *head).to_bytes(),
    }
}

/// `Object.prototype.toString`/`valueOf` default dispatch for plain objects
/// and arrays (no user-defined `toString`/`valueOf` lookup yet — added once
/// the evaluator can invoke user functions from here).
pub(crate) fn to_primitive_object(engine: &mut Engine, obj: JsVar) -> JsVar {
    if engine.is_array(obj) {
        let bytes = array_join(engine, obj, b",");
        return engine.new_string(&bytes).unwrap_or(JsVar::UNDEFINED);
    }
    engine.new_string(b"[object Object]").unwrap_or(JsVar::UNDEFINED)
}

pub(crate) fn to_js_string(engine: &mut Engine, obj: JsVar) -> Vec<u8> {
    if engine.is_array(obj) {
        return array_join(engine, obj, b",");
    }
    b"[object Object]".to_vec()
}

fn array_join(engine: &mut Engine, arr: JsVar, sep: &[u8]) -> Vec<u8> {
    let len = engine.array_length(arr);
    let mut out = Vec::new();
    for i in 0..len {
        if i > 0 {
            out.extend_from_slice(sep);
        }
        let key = i.to_string();
        if let Ok(v) = engine.get_property(arr, key.as_bytes()) {
            if !v.is_undefined() && !engine.is_null(v) {
                out.extend(engine.as_string_bytes(v));
            }
        }
    }
    out
}

/// `key in obj` / own-or-proto lookup used by `instanceof` and the `in`
/// operator.
pub(crate) fn lookup_own_or_proto(engine: &Engine, obj: JsVar, key: &[u8]) -> Option<CellIndex> {
    let mut cur = obj;
    loop {
        if let Some(n) = engine.find_own_name(cur, key) {
            return Some(n);
        }
        let proto = engine.find_own_name(cur, PROTO_KEY)?;
        cur = engine.name_value(proto);
        if cur.is_undefined() || !engine.is_object(cur) {
            return None;
        }
    }
}

/// `a instanceof b`: walks `a`'s prototype chain looking for `b.prototype`.
pub(crate) fn instance_of(engine: &mut Engine, a: JsVar, b: JsVar) -> bool {
    let Ok(proto) = engine.get_property(b, b"prototype") else {
        return false;
    };
    if proto.is_undefined() {
        return false;
    }
    let mut cur = a;
    loop {
        let Ok(cur_proto) = engine.get_property(cur, PROTO_KEY) else {
            return false;
        };
        if cur_proto.is_undefined() {
            return false;
        }
        if cur_proto == proto {
            return true;
        }
        cur = cur_proto;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    fn engine() -> Engine {
        Engine::new(crate::engine::EngineConfig { cell_count: 300, ..Default::default() }, NullHost::new())
    }

    #[test]
    fn set_then_get_own_property() {
        let mut e = engine();
        let obj = e.new_object().unwrap();
        let v = e.new_int(7).unwrap();
        e.set_property(obj, b"x", v).unwrap();
        let got = e.get_property(obj, b"x").unwrap();
        assert_eq!(e.as_number(got), 7.0);
        e.unlock(got);
        e.unlock(v);
        e.unlock(obj);
    }

    #[test]
    fn prototype_chain_is_walked() {
        let mut e = engine();
        let base = e.new_object().unwrap();
        let v = e.new_int(1).unwrap();
        e.set_property(base, b"shared", v).unwrap();
        e.unlock(v);
        let derived = e.new_object().unwrap();
        e.set_property(derived, b"__proto__", base).unwrap();
        let got = e.get_property(derived, b"shared").unwrap();
        assert_eq!(e.as_number(got), 1.0);
        e.unlock(got);
        e.unlock(base);
        e.unlock(derived);
    }

    #[test]
    fn delete_removes_own_property() {
        let mut e = engine();
        let obj = e.new_object().unwrap();
        let v = e.new_int(1).unwrap();
        e.set_property(obj, b"y", v).unwrap();
        assert!(e.delete_property(obj, b"y"));
        let got = e.get_property(obj, b"y").unwrap();
        assert!(got.is_undefined());
        e.unlock(v);
        e.unlock(obj);
    }

    #[test]
    fn array_join_matches_js_default_tostring() {
        let mut e = engine();
        let arr = e.new_array().unwrap();
        for i in 0..3 {
            let v = e.new_int(i).unwrap();
            e.set_property(arr, i.to_string().as_bytes(), v).unwrap();
            e.unlock(v);
        }
        let s = to_primitive_object(&mut e, arr);
        assert_eq!(e.as_bytes(s), b"0,1,2");
        e.unlock(s);
        e.unlock(arr);
    }

    #[test]
    fn array_keys_stay_ascending_regardless_of_set_order() {
        let mut e = engine();
        let arr = e.new_array().unwrap();
        for &i in &[5u32, 1, 3, 0, 4] {
            let v = e.new_int(i as i32).unwrap();
            e.set_property(arr, i.to_string().as_bytes(), v).unwrap();
            e.unlock(v);
        }
        assert_eq!(e.own_keys(arr), vec![b"0".to_vec(), b"1".to_vec(), b"3".to_vec(), b"4".to_vec(), b"5".to_vec()]);
        e.unlock(arr);
    }

    #[test]
    fn non_canonical_array_keys_keep_insertion_order() {
        let mut e = engine();
        let arr = e.new_array().unwrap();
        let a = e.new_int(1).unwrap();
        let b = e.new_int(2).unwrap();
        e.set_property(arr, b"foo", a).unwrap();
        e.set_property(arr, b"01", b).unwrap();
        e.unlock(a);
        e.unlock(b);
        assert_eq!(e.own_keys(arr), vec![b"foo".to_vec(), b"01".to_vec()]);
        e.unlock(arr);
    }
}
