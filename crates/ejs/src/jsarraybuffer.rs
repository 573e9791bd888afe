//! Typed array views and `DataView` (component G). A view is a container
//! cell of variant `ArrayBuffer` whose payload packs {element kind, byte
//! offset, length}; `first_child` names the backing string cell, which
//! holds the raw bytes (any string representation works as the backing
//! store, per §4.G).

use crate::{
    cellpool::{CellIndex, ElementKind, Payload, Pool, Variant},
    engine::Engine,
    error::Exception,
    jsvar::JsVar,
    strings::{self, EXT_CHARS},
};

/// Writes one byte at logical position `pos` of a string-backed buffer,
/// working across both chained and flat representations.
fn set_backing_byte(pool: &mut Pool, head: CellIndex, pos: usize, byte: u8) {
    if matches!(pool.get(head).variant, Variant::FlatString) {
        let body_idx = pos / EXT_CHARS;
        let off = pos % EXT_CHARS;
        let cell_idx = CellIndex::from_raw(head.index() + 1 + body_idx);
        if let Payload::StringBytes(bytes) = &mut pool.get_mut(cell_idx).payload {
            if off < bytes.len() {
                bytes[off] = byte;
            }
        }
        return;
    }
    let mut remaining = pos;
    let mut cur = head;
    loop {
        let len = match &pool.get(cur).payload {
            Payload::StringBytes(v) => v.len(),
            _ => 0,
        };
        if remaining < len {
            if let Payload::StringBytes(v) = &mut pool.get_mut(cur).payload {
                v[remaining] = byte;
            }
            return;
        }
        remaining -= len;
        let next = pool.get(cur).last_child;
        if next.is_null() {
            return;
        }
        cur = next;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
    /// Typed-array element access always uses host-native order (§4.G).
    Native,
}

impl Engine {
    /// Creates a typed-array view over a freshly allocated, zero-filled
    /// backing byte string of `len * kind.byte_size()` bytes.
    pub fn new_array_buffer(&mut self, kind: ElementKind, len: usize) -> Result<JsVar, Exception> {
        let byte_len = len * kind.byte_size();
        let backing = self.new_string(&vec![0u8; byte_len])?;
        let idx = self.alloc(Variant::ArrayBuffer).map_err(|e| self.from_alloc_error(e))?;
        self.get_cell_mut(JsVar::from_index(idx)).payload =
            Payload::ArrayBufferView { kind, byte_offset: 0, len: len as u32, is_data_view: false };
        self.get_cell_mut(JsVar::from_index(idx)).first_child = backing.index();
        self.inc_ref(backing);
        self.unlock(backing);
        Ok(JsVar::from_index(idx))
    }

    /// Wraps an existing backing string in a view without copying bytes —
    /// `newArrayBufferWithPtr` in the embedding-facing terms of §4.B.
    pub fn new_array_buffer_view(
        &mut self,
        backing: JsVar,
        kind: ElementKind,
        byte_offset: usize,
        len: usize,
        is_data_view: bool,
    ) -> Result<JsVar, Exception> {
        let idx = self.alloc(Variant::ArrayBuffer).map_err(|e| self.from_alloc_error(e))?;
        self.get_cell_mut(JsVar::from_index(idx)).payload =
            Payload::ArrayBufferView { kind, byte_offset: byte_offset as u32, len: len as u32, is_data_view };
        self.get_cell_mut(JsVar::from_index(idx)).first_child = backing.index();
        self.inc_ref(backing);
        Ok(JsVar::from_index(idx))
    }

    fn view_parts(&self, view: JsVar) -> Result<(ElementKind, usize, usize, JsVar), Exception> {
        match self.get_cell(view).payload {
            Payload::ArrayBufferView { kind, byte_offset, len, .. } => {
                let backing = JsVar::from_index(self.get_cell(view).first_child);
                Ok((kind, byte_offset as usize, len as usize, backing))
            }
            _ => Err(self.type_error("not an array buffer view")),
        }
    }

    pub fn array_buffer_len(&self, view: JsVar) -> Result<usize, Exception> {
        match self.get_cell(view).payload {
            Payload::ArrayBufferView { len, .. } => Ok(len as usize),
            _ => Err(self.type_error("not an array buffer view")),
        }
    }

    /// Whether `view` was constructed as a `DataView` rather than a typed
    /// array (`new Int8Array`/...). Gates which method table `get_property`
    /// exposes for an `ArrayBuffer`-variant cell.
    pub fn is_data_view(&self, view: JsVar) -> bool {
        matches!(self.get_cell(view).payload, Payload::ArrayBufferView { is_data_view: true, .. })
    }

    /// `byteLength`: the view's element count times its element width,
    /// independent of `array_buffer_len`'s element count (used by both
    /// typed-array `.byteLength` and `DataView` construction).
    pub fn array_buffer_byte_len(&self, view: JsVar) -> Result<usize, Exception> {
        let (kind, _, len, _) = self.view_parts(view)?;
        Ok(len * kind.byte_size())
    }

    /// `DataView#get*`: reads `kind` at an explicit byte offset into the
    /// view's backing store, ignoring the view's own stored element kind
    /// (a `DataView` is constructed over a `U8` view but every call picks
    /// its own width/signedness/endianness, per §4.G).
    pub fn dataview_get_at(&self, view: JsVar, byte_offset: usize, kind: ElementKind, endian: Endian) -> Result<f64, Exception> {
        let (_, base_offset, _, backing) = self.view_parts(view)?;
        let size = kind.byte_size();
        let start = base_offset + byte_offset;
        let all = strings::StringIter::new(&self.pool, backing.index()).to_bytes();
        if start + size > all.len() {
            return Err(self.range_error("byte offset out of range"));
        }
        Ok(decode(kind, &all[start..start + size], endian))
    }

    /// `DataView#set*`: writes `kind` at an explicit byte offset, per
    /// [`Self::dataview_get_at`]'s "ignore the view's own kind" rule.
    pub fn dataview_set_at(
        &mut self,
        view: JsVar,
        byte_offset: usize,
        kind: ElementKind,
        value: f64,
        endian: Endian,
    ) -> Result<(), Exception> {
        let (_, base_offset, _, backing) = self.view_parts(view)?;
        let encoded = encode(kind, value, endian);
        self.write_backing_bytes(backing, base_offset + byte_offset, &encoded)
    }

    /// Wraps an existing view/`ArrayBuffer`'s backing bytes in a fresh view of
    /// a different element kind — `new Int8Array(buffer)` / `new
    /// DataView(buffer, byteOffset, length)` both reinterpret rather than
    /// copy. `byte_offset` is relative to `source`'s own window, and a `None`
    /// length consumes everything remaining.
    pub fn array_buffer_view_over(
        &mut self,
        source: JsVar,
        kind: ElementKind,
        byte_offset: usize,
        len: Option<usize>,
        is_data_view: bool,
    ) -> Result<JsVar, Exception> {
        let (_, base_offset, _, backing) = self.view_parts(source)?;
        let byte_len = self.array_buffer_byte_len(source)?;
        let avail = byte_len
            .checked_sub(byte_offset)
            .ok_or_else(|| self.range_error("byte offset out of range"))?;
        let elem_len = len.unwrap_or(avail / kind.byte_size());
        if elem_len * kind.byte_size() > avail {
            return Err(self.range_error("view length out of range"));
        }
        self.new_array_buffer_view(backing, kind, base_offset + byte_offset, elem_len, is_data_view)
    }

    fn read_bytes(&self, view: JsVar, index: usize) -> Result<Vec<u8>, Exception> {
        let (kind, byte_offset, len, backing) = self.view_parts(view)?;
        if index >= len {
            return Err(self.range_error("array buffer index out of range"));
        }
        let size = kind.byte_size();
        let start = byte_offset + index * size;
        let all = strings::StringIter::new(&self.pool, backing.index()).to_bytes();
        if start + size > all.len() {
            return Err(self.range_error("array buffer index out of range"));
        }
        Ok(all[start..start + size].to_vec())
    }

    /// Element get, always host-native order for typed-array access. Use
    /// [`Engine::dataview_get`] for an explicit endianness.
    pub fn array_buffer_get(&self, view: JsVar, index: usize) -> Result<f64, Exception> {
        let (kind, _, _, _) = self.view_parts(view)?;
        let bytes = self.read_bytes(view, index)?;
        Ok(decode(kind, &bytes, Endian::Native))
    }

    pub fn dataview_get(&self, view: JsVar, index: usize, endian: Endian) -> Result<f64, Exception> {
        let (kind, _, _, _) = self.view_parts(view)?;
        let bytes = self.read_bytes(view, index)?;
        Ok(decode(kind, &bytes, endian))
    }

    /// Element set (§4.G): integer targets truncate via `ToInteger`
    /// (clamping to `[0,255]` first when the kind is `U8Clamped`); float
    /// targets write the IEEE-754 bit pattern of matching width.
    pub fn array_buffer_set(&mut self, view: JsVar, index: usize, value: f64, endian: Endian) -> Result<(), Exception> {
        let (kind, byte_offset, len, backing) = self.view_parts(view)?;
        if index >= len {
            return Err(self.range_error("array buffer index out of range"));
        }
        let encoded = encode(kind, value, endian);
        let start = byte_offset + index * kind.byte_size();
        self.write_backing_bytes(backing, start, &encoded)
    }

    /// Mutates the backing store in place, byte by byte, so the view's
    /// `first_child` index stays valid (rebuilding the chain would move the
    /// backing to a new head, stranding every view that still names the old
    /// one).
    fn write_backing_bytes(&mut self, backing: JsVar, start: usize, bytes: &[u8]) -> Result<(), Exception> {
        let len = strings::StringIter::new(&self.pool, backing.index()).len();
        if start + bytes.len() > len {
            return Err(self.range_error("array buffer write out of range"));
        }
        for (i, &b) in bytes.iter().enumerate() {
            set_backing_byte(&mut self.pool, backing.index(), start + i, b);
        }
        Ok(())
    }
}

fn decode(kind: ElementKind, bytes: &[u8], endian: Endian) -> f64 {
    let mut buf = bytes.to_vec();
    if matches!(endian, Endian::Big) {
        buf.reverse();
    }
    match kind {
        ElementKind::I8 => buf[0] as i8 as f64,
        ElementKind::U8 | ElementKind::U8Clamped => buf[0] as f64,
        ElementKind::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
        ElementKind::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
        ElementKind::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        ElementKind::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        ElementKind::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        ElementKind::F64 => f64::from_le_bytes(buf[..8].try_into().unwrap()),
    }
}

fn encode(kind: ElementKind, value: f64, endian: Endian) -> Vec<u8> {
    let mut bytes = match kind {
        ElementKind::I8 => vec![to_i32_trunc(value) as i8 as u8],
        ElementKind::U8 => vec![to_i32_trunc(value) as u8],
        ElementKind::U8Clamped => vec![value.round().clamp(0.0, 255.0) as u8],
        ElementKind::I16 => (to_i32_trunc(value) as i16).to_le_bytes().to_vec(),
        ElementKind::U16 => (to_i32_trunc(value) as u16).to_le_bytes().to_vec(),
        ElementKind::I32 => to_i32_trunc(value).to_le_bytes().to_vec(),
        ElementKind::U32 => (to_i32_trunc(value) as u32).to_le_bytes().to_vec(),
        ElementKind::F32 => (value as f32).to_le_bytes().to_vec(),
        ElementKind::F64 => value.to_le_bytes().to_vec(),
    };
    if matches!(endian, Endian::Big) {
        bytes.reverse();
    }
    bytes
}

fn to_i32_trunc(f: f64) -> i32 {
    if !f.is_finite() {
        return 0;
    }
    (f as i64 as u32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    #[test]
    fn u8_view_round_trips() {
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 200, ..Default::default() }, NullHost::new());
        let view = e.new_array_buffer(ElementKind::U8, 4).unwrap();
        e.array_buffer_set(view, 0, 200.0, Endian::Native).unwrap();
        assert_eq!(e.array_buffer_get(view, 0).unwrap(), 200.0);
        e.unlock(view);
    }

    #[test]
    fn clamped_u8_clips_out_of_range() {
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 200, ..Default::default() }, NullHost::new());
        let view = e.new_array_buffer(ElementKind::U8Clamped, 2).unwrap();
        e.array_buffer_set(view, 0, 400.0, Endian::Native).unwrap();
        assert_eq!(e.array_buffer_get(view, 0).unwrap(), 255.0);
        e.unlock(view);
    }

    #[test]
    fn reinterpreting_view_shares_the_same_backing_bytes() {
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 200, ..Default::default() }, NullHost::new());
        let bytes = e.new_array_buffer(ElementKind::U8, 4).unwrap();
        e.array_buffer_set(bytes, 0, 1.0, Endian::Native).unwrap();
        e.array_buffer_set(bytes, 1, 0.0, Endian::Native).unwrap();
        e.array_buffer_set(bytes, 2, 0.0, Endian::Native).unwrap();
        e.array_buffer_set(bytes, 3, 0.0, Endian::Native).unwrap();
        let as_i32 = e.array_buffer_view_over(bytes, ElementKind::I32, 0, None, false).unwrap();
        assert_eq!(e.array_buffer_len(as_i32).unwrap(), 1);
        assert_eq!(e.array_buffer_get(as_i32, 0).unwrap(), 1.0);
        e.unlock(bytes);
        e.unlock(as_i32);
    }

    #[test]
    fn dataview_get_set_respects_requested_endianness() {
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 200, ..Default::default() }, NullHost::new());
        let buf = e.new_array_buffer(ElementKind::U8, 4).unwrap();
        let view = e.array_buffer_view_over(buf, ElementKind::U8, 0, None, true).unwrap();
        assert!(e.is_data_view(view));
        e.dataview_set_at(view, 0, ElementKind::U16, 0x0102 as f64, Endian::Big).unwrap();
        assert_eq!(e.dataview_get_at(view, 0, ElementKind::U16, Endian::Big).unwrap(), 0x0102 as f64);
        assert_eq!(e.dataview_get_at(view, 0, ElementKind::U16, Endian::Little).unwrap(), 0x0201 as f64);
        e.unlock(buf);
        e.unlock(view);
    }
}
