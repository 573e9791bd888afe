//! `JSON.parse`/`JSON.stringify` (component N), including the ES5
//! `replacer`/`space` and `reviver` callback forms.
//!
//! Cyclic structures are rejected during `stringify` using each cell's
//! `recursing` flag (set on entry, cleared on exit) rather than an auxiliary
//! visited-set — the same re-entrancy-guard idea the cell already carries
//! for exactly this purpose (see `cellpool::Cell::recursing`'s doc comment).

use crate::{engine::Engine, error::{Exception, Kind}, jsvar::JsVar, parser, types::numfmt};

/// Maximum indent width honored from a numeric `space` argument, matching
/// the real engine's own clamp on how wide `JSON.stringify`'s indentation
/// can grow.
const MAX_INDENT: usize = 10;

/// Parsed form of `stringify`'s second and third arguments.
struct StringifyOptions {
    /// `Some(fn)` when `replacer` is itself callable.
    replacer_fn: Option<JsVar>,
    /// `Some(keys)` when `replacer` is an array: an explicit key allowlist,
    /// applied in the array's own order, to every plain object encountered
    /// (arrays are always written in full regardless of this list).
    allow_keys: Option<Vec<Vec<u8>>>,
    /// Per-level indentation text; empty means the compact single-line form.
    indent: String,
}

impl StringifyOptions {
    fn parse(engine: &mut Engine, replacer: JsVar, space: JsVar) -> Self {
        let (replacer_fn, allow_keys) = if engine.is_function(replacer) {
            (Some(replacer), None)
        } else if engine.is_array(replacer) {
            let len = engine.array_length(replacer);
            let mut keys = Vec::new();
            for i in 0..len {
                if let Ok(v) = engine.get_property(replacer, i.to_string().as_bytes()) {
                    if engine.is_string(v) || engine.is_number(v) {
                        keys.push(engine.as_string_bytes(v));
                    }
                    engine.unlock(v);
                }
            }
            (None, Some(keys))
        } else {
            (None, None)
        };
        let indent = if engine.is_number(space) {
            let n = engine.as_number(space);
            let width = if n.is_finite() && n > 0.0 { (n as usize).min(MAX_INDENT) } else { 0 };
            " ".repeat(width)
        } else if engine.is_string(space) {
            let bytes = engine.as_bytes(space);
            let width = bytes.len().min(MAX_INDENT);
            String::from_utf8_lossy(&bytes[..width]).into_owned()
        } else {
            String::new()
        };
        StringifyOptions { replacer_fn, allow_keys, indent }
    }
}

/// `JSON.stringify(value, replacer, space)`. `replacer`/`space` should be
/// [`JsVar::UNDEFINED`] when the caller omitted them.
pub(crate) fn stringify(
    engine: &mut Engine,
    value: JsVar,
    replacer: JsVar,
    space: JsVar,
) -> Result<Option<Vec<u8>>, Exception> {
    let opts = StringifyOptions::parse(engine, replacer, space);
    let holder = engine.new_object()?;
    engine.set_property(holder, b"", value)?;
    let root_value = apply_replacer(engine, &opts, holder, b"", value)?;
    let mut out = Vec::new();
    let written = write_value(engine, &opts, root_value, 0, &mut out)?;
    engine.unlock(root_value);
    engine.unlock(holder);
    Ok(if written { Some(out) } else { None })
}

/// Runs `replacer_fn.call(holder, key, value)` when a function replacer was
/// given, returning its transformed result as a freshly locked value;
/// otherwise returns `value` re-locked so the result is always independently
/// owned by the caller regardless of which branch ran. Per ES5, this happens
/// for *every* value considered, including the root (called with key `""`).
fn apply_replacer(
    engine: &mut Engine,
    opts: &StringifyOptions,
    holder: JsVar,
    key: &[u8],
    value: JsVar,
) -> Result<JsVar, Exception> {
    match opts.replacer_fn {
        Some(f) => {
            let key_str = engine.new_string(key)?;
            let result = parser::call_value(engine, f, holder, &[key_str, value]);
            engine.unlock(key_str);
            result
        }
        None => Ok(engine.lock(value)),
    }
}

fn write_newline_indent(out: &mut Vec<u8>, indent: &str, depth: usize) {
    if indent.is_empty() {
        return;
    }
    out.push(b'\n');
    for _ in 0..depth {
        out.extend_from_slice(indent.as_bytes());
    }
}

/// Returns `false` when `value` has no JSON representation (`undefined`, a
/// function) — `JSON.stringify` of such a value yields `undefined` itself,
/// and a member holding one is simply omitted from its parent.
fn write_value(
    engine: &mut Engine,
    opts: &StringifyOptions,
    value: JsVar,
    depth: usize,
    out: &mut Vec<u8>,
) -> Result<bool, Exception> {
    if value.is_undefined() || engine.is_function(value) {
        return Ok(false);
    }
    if engine.is_null(value) {
        out.extend_from_slice(b"null");
        return Ok(true);
    }
    if engine.is_bool(value) {
        out.extend_from_slice(if engine.as_bool(value) { b"true" } else { b"false" });
        return Ok(true);
    }
    if engine.is_number(value) {
        let n = engine.as_number(value);
        if n.is_finite() {
            out.extend_from_slice(numfmt::number_to_string(n).as_bytes());
        } else {
            out.extend_from_slice(b"null");
        }
        return Ok(true);
    }
    if engine.is_string(value) {
        write_json_string(&engine.as_bytes(value), out);
        return Ok(true);
    }
    if engine.is_array(value) {
        write_array(engine, opts, value, depth, out)?;
        return Ok(true);
    }
    if engine.is_object(value) {
        write_object(engine, opts, value, depth, out)?;
        return Ok(true);
    }
    Ok(false)
}

fn write_array(
    engine: &mut Engine,
    opts: &StringifyOptions,
    arr: JsVar,
    depth: usize,
    out: &mut Vec<u8>,
) -> Result<(), Exception> {
    if engine.get_cell(arr).recursing {
        return Err(Exception::new(Kind::Type, "Converting circular structure to JSON"));
    }
    engine.get_cell_mut(arr).recursing = true;
    out.push(b'[');
    let len = engine.array_length(arr);
    for i in 0..len {
        if i > 0 {
            out.push(b',');
        }
        write_newline_indent(out, &opts.indent, depth + 1);
        let key = i.to_string();
        let raw = engine.get_property(arr, key.as_bytes())?;
        let v = apply_replacer(engine, opts, arr, key.as_bytes(), raw)?;
        engine.unlock(raw);
        if !write_value(engine, opts, v, depth + 1, out)? {
            out.extend_from_slice(b"null");
        }
        engine.unlock(v);
    }
    if len > 0 {
        write_newline_indent(out, &opts.indent, depth);
    }
    out.push(b']');
    engine.get_cell_mut(arr).recursing = false;
    Ok(())
}

fn write_object(
    engine: &mut Engine,
    opts: &StringifyOptions,
    obj: JsVar,
    depth: usize,
    out: &mut Vec<u8>,
) -> Result<(), Exception> {
    if engine.get_cell(obj).recursing {
        return Err(Exception::new(Kind::Type, "Converting circular structure to JSON"));
    }
    engine.get_cell_mut(obj).recursing = true;
    out.push(b'{');
    let mut first = true;
    let keys = match &opts.allow_keys {
        Some(allow) => allow.clone(),
        None => engine.own_keys(obj),
    };
    for key in keys {
        if key == b"__proto__" {
            continue;
        }
        let raw = engine.get_property(obj, &key)?;
        let v = apply_replacer(engine, opts, obj, &key, raw)?;
        engine.unlock(raw);
        let mut member = Vec::new();
        let written = write_value(engine, opts, v, depth + 1, &mut member)?;
        engine.unlock(v);
        if !written {
            continue;
        }
        if !first {
            out.push(b',');
        }
        first = false;
        write_newline_indent(out, &opts.indent, depth + 1);
        write_json_string(&key, out);
        out.push(b':');
        if !opts.indent.is_empty() {
            out.push(b' ');
        }
        out.extend(member);
    }
    if !first {
        write_newline_indent(out, &opts.indent, depth);
    }
    out.push(b'}');
    engine.get_cell_mut(obj).recursing = false;
    Ok(())
}

fn write_json_string(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(b'"');
    for &b in bytes {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x00..=0x1f => out.extend(format!("\\u{b:04x}").into_bytes()),
            _ => out.push(b),
        }
    }
    out.push(b'"');
}

/// `JSON.parse(text, reviver)`. `reviver` should be [`JsVar::UNDEFINED`]
/// when the caller omitted it. A small recursive-descent reader over the
/// same byte slice, mirroring the tokenizer style `lexer.rs` uses for the
/// language proper but scoped to the much smaller JSON grammar.
pub(crate) fn parse(engine: &mut Engine, text: &[u8], reviver: JsVar) -> Result<JsVar, Exception> {
    let mut p = JsonParser { bytes: text, pos: 0 };
    p.skip_ws();
    let v = p.parse_value(engine)?;
    p.skip_ws();
    if p.pos != p.bytes.len() {
        engine.unlock(v);
        return Err(Exception::new(Kind::Syntax, "Unexpected trailing characters in JSON"));
    }
    if engine.is_function(reviver) {
        let holder = engine.new_object()?;
        engine.set_property(holder, b"", v)?;
        engine.unlock(v);
        let revived = walk_revive(engine, reviver, holder, b"")?;
        engine.unlock(holder);
        Ok(revived)
    } else {
        Ok(v)
    }
}

/// ES5 "Walk" algorithm: revives `holder[key]` bottom-up, recursing into
/// arrays/objects first so nested values are already revived by the time
/// `reviver` sees their parent, then calling `reviver.call(holder, key,
/// value)` and writing its result back (or deleting the property when the
/// result is `undefined`).
fn walk_revive(engine: &mut Engine, reviver: JsVar, holder: JsVar, key: &[u8]) -> Result<JsVar, Exception> {
    let value = engine.get_property(holder, key)?;
    if engine.is_array(value) {
        let len = engine.array_length(value);
        for i in 0..len {
            let child_key = i.to_string();
            let revived = walk_revive(engine, reviver, value, child_key.as_bytes())?;
            if revived.is_undefined() {
                engine.delete_property(value, child_key.as_bytes());
            } else {
                engine.set_property(value, child_key.as_bytes(), revived)?;
            }
            engine.unlock(revived);
        }
    } else if engine.is_object(value) {
        for child_key in engine.own_keys(value) {
            let revived = walk_revive(engine, reviver, value, &child_key)?;
            if revived.is_undefined() {
                engine.delete_property(value, &child_key);
            } else {
                engine.set_property(value, &child_key, revived)?;
            }
            engine.unlock(revived);
        }
    }
    let key_str = engine.new_string(key)?;
    let result = parser::call_value(engine, reviver, holder, &[key_str, value]);
    engine.unlock(key_str);
    engine.unlock(value);
    result
}

struct JsonParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> JsonParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), Exception> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(Exception::new(Kind::Syntax, format!("expected '{}' in JSON", b as char)))
        }
    }

    fn parse_value(&mut self, engine: &mut Engine) -> Result<JsVar, Exception> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_object(engine),
            Some(b'[') => self.parse_array(engine),
            Some(b'"') => {
                let bytes = self.parse_string()?;
                engine.new_string(&bytes)
            }
            Some(b't') => {
                self.expect_literal("true")?;
                engine.new_bool(true)
            }
            Some(b'f') => {
                self.expect_literal("false")?;
                engine.new_bool(false)
            }
            Some(b'n') => {
                self.expect_literal("null")?;
                engine.new_null()
            }
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(engine),
            _ => Err(Exception::new(Kind::Syntax, "Unexpected token in JSON")),
        }
    }

    fn expect_literal(&mut self, lit: &str) -> Result<(), Exception> {
        if self.bytes[self.pos..].starts_with(lit.as_bytes()) {
            self.pos += lit.len();
            Ok(())
        } else {
            Err(Exception::new(Kind::Syntax, format!("expected '{lit}' in JSON")))
        }
    }

    fn parse_number(&mut self, engine: &mut Engine) -> Result<JsVar, Exception> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("0");
        let value: f64 = text.parse().unwrap_or(f64::NAN);
        engine.new_number(value)
    }

    fn parse_string(&mut self) -> Result<Vec<u8>, Exception> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(Exception::new(Kind::Syntax, "unterminated string in JSON")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"') => { out.push(b'"'); self.pos += 1; }
                        Some(b'\\') => { out.push(b'\\'); self.pos += 1; }
                        Some(b'/') => { out.push(b'/'); self.pos += 1; }
                        Some(b'n') => { out.push(b'\n'); self.pos += 1; }
                        Some(b't') => { out.push(b'\t'); self.pos += 1; }
                        Some(b'r') => { out.push(b'\r'); self.pos += 1; }
                        Some(b'u') => {
                            self.pos += 1;
                            let hex = std::str::from_utf8(self.bytes.get(self.pos..self.pos + 4).unwrap_or(b"0000")).unwrap_or("0000");
                            let code = u32::from_str_radix(hex, 16).unwrap_or(0);
                            self.pos += 4;
                            if let Some(c) = char::from_u32(code) {
                                let mut buf = [0u8; 4];
                                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                            }
                        }
                        _ => return Err(Exception::new(Kind::Syntax, "bad escape in JSON string")),
                    }
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_array(&mut self, engine: &mut Engine) -> Result<JsVar, Exception> {
        self.expect(b'[')?;
        let arr = engine.new_array()?;
        self.skip_ws();
        let mut i = 0u32;
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(arr);
        }
        loop {
            let v = self.parse_value(engine)?;
            engine.set_property(arr, i.to_string().as_bytes(), v)?;
            engine.unlock(v);
            i += 1;
            self.skip_ws();
            match self.peek() {
                Some(b',') => { self.pos += 1; self.skip_ws(); }
                Some(b']') => { self.pos += 1; break; }
                _ => return Err(Exception::new(Kind::Syntax, "expected ',' or ']' in JSON array")),
            }
        }
        Ok(arr)
    }

    fn parse_object(&mut self, engine: &mut Engine) -> Result<JsVar, Exception> {
        self.expect(b'{')?;
        let obj = engine.new_object()?;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(obj);
        }
        loop {
            self.skip_ws();
            let key = self.parse_string()?;
            self.skip_ws();
            self.expect(b':')?;
            let v = self.parse_value(engine)?;
            engine.set_property(obj, &key, v)?;
            engine.unlock(v);
            self.skip_ws();
            match self.peek() {
                Some(b',') => { self.pos += 1; }
                Some(b'}') => { self.pos += 1; break; }
                _ => return Err(Exception::new(Kind::Syntax, "expected ',' or '}' in JSON object")),
            }
        }
        Ok(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    fn engine() -> Engine {
        Engine::new(crate::engine::EngineConfig { cell_count: 400, ..Default::default() }, NullHost::new())
    }

    #[test]
    fn stringify_round_trips_through_parse() {
        let mut e = engine();
        let obj = e.new_object().unwrap();
        let n = e.new_int(42).unwrap();
        e.set_property(obj, b"answer", n).unwrap();
        e.unlock(n);
        let text = stringify(&mut e, obj, JsVar::UNDEFINED, JsVar::UNDEFINED).unwrap().unwrap();
        e.unlock(obj);
        let parsed = parse(&mut e, &text, JsVar::UNDEFINED).unwrap();
        let got = e.get_property(parsed, b"answer").unwrap();
        assert_eq!(e.as_number(got), 42.0);
        e.unlock(got);
        e.unlock(parsed);
    }

    #[test]
    fn stringify_rejects_cycles() {
        let mut e = engine();
        let obj = e.new_object().unwrap();
        e.set_property(obj, b"self", obj).unwrap();
        assert!(stringify(&mut e, obj, JsVar::UNDEFINED, JsVar::UNDEFINED).is_err());
        e.unlock(obj);
    }

    #[test]
    fn stringify_with_array_replacer_filters_keys() {
        let (host, output) = NullHost::with_handle();
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 400, ..Default::default() }, host);
        e.exec("print(JSON.stringify({ a: 1, b: 2, c: 3 }, ['a', 'c']));").unwrap();
        assert_eq!(output.output(), "{\"a\":1,\"c\":3}\n");
    }

    #[test]
    fn stringify_with_function_replacer_transforms_values() {
        let (host, output) = NullHost::with_handle();
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 400, ..Default::default() }, host);
        e.exec(
            "print(JSON.stringify({ a: 1, b: 2 }, function(k, v) { \
                return typeof v === 'number' ? v * 10 : v; \
             }));",
        )
        .unwrap();
        assert_eq!(output.output(), "{\"a\":10,\"b\":20}\n");
    }

    #[test]
    fn stringify_with_numeric_space_indents_output() {
        let (host, output) = NullHost::with_handle();
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 400, ..Default::default() }, host);
        e.exec("print(JSON.stringify({ a: 1 }, null, 2));").unwrap();
        assert_eq!(output.output(), "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn parse_with_reviver_transforms_values() {
        let (host, output) = NullHost::with_handle();
        let mut e = Engine::new(crate::engine::EngineConfig { cell_count: 400, ..Default::default() }, host);
        e.exec(
            "var obj = JSON.parse('{\"a\":1,\"b\":2}', function(k, v) { \
                return typeof v === 'number' ? v + 1 : v; \
             }); \
             print(obj.a, obj.b);",
        )
        .unwrap();
        assert_eq!(output.output(), "2 3\n");
    }
}
