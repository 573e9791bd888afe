//! Unified traversal over strings, object children, arrays and array-buffer
//! views (component F). One tagged iterator type instead of four unrelated
//! ones, mirroring the uniform byte-iteration interface [`crate::strings`]
//! already gives the string representations.

use crate::{engine::Engine, jsvar::JsVar, strings::StringIter};

/// What a single iteration step yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterStep {
    pub index: u32,
    pub defined: bool,
}

enum Kind<'p> {
    StringBytes(StringIter<'p>),
    ObjectChildren { keys: std::vec::IntoIter<Vec<u8>> },
    FullArray { len: u32, pos: u32 },
    DefinedArray { keys: std::vec::IntoIter<Vec<u8>> },
}

/// A cursor over one of the four traversal modes named in §4.F. Built fresh
/// for each traversal rather than cached on the cell, since mutation during
/// iteration is only promised to be safe for `setValue` (restarting is
/// required after any structural change, per §4.F).
pub struct ValueIter<'p> {
    kind: Kind<'p>,
    current_key: Option<Vec<u8>>,
}

impl<'p> ValueIter<'p> {
    pub(crate) fn over_string(pool: &'p crate::cellpool::Pool, head: crate::cellpool::CellIndex) -> Self {
        ValueIter { kind: Kind::StringBytes(StringIter::new(pool, head)), current_key: None }
    }
}

impl Engine {
    /// `EVERY_ARRAY_ELEMENT` traversal: every index `0..length`, holes
    /// included (§8 invariant 6).
    pub fn array_indices_full(&self, arr: JsVar) -> Vec<u32> {
        (0..self.array_length(arr)).collect()
    }

    /// `DEFINED_ARRAY_ELEMENTS` traversal: only indices with an own name
    /// cell, ascending.
    pub fn array_indices_defined(&self, arr: JsVar) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .own_keys(arr)
            .into_iter()
            .filter_map(|k| std::str::from_utf8(&k).ok()?.parse::<u32>().ok())
            .collect();
        out.sort_unstable();
        out
    }

    /// Object-child traversal: every own key in insertion order (§4.F).
    pub fn object_keys_ordered(&self, obj: JsVar) -> Vec<Vec<u8>> {
        self.own_keys(obj)
    }

    /// Array-buffer element traversal: reads every element in order via the
    /// view's own element accessor (component G).
    pub fn array_buffer_values(&self, view: JsVar) -> Result<Vec<f64>, crate::error::Exception> {
        let len = self.array_buffer_len(view)?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.array_buffer_get(view, i)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    #[test]
    fn full_array_includes_holes() {
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 200, ..Default::default() }, NullHost::new());
        let arr = e.new_array().unwrap();
        let v = e.new_int(1).unwrap();
        e.set_property(arr, b"2", v).unwrap();
        e.unlock(v);
        assert_eq!(e.array_indices_full(arr), vec![0, 1, 2]);
        assert_eq!(e.array_indices_defined(arr), vec![2]);
        e.unlock(arr);
    }
}
