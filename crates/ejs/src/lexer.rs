//! Tokeniser (component I). Scans UTF-8 source text into a flat stream of
//! [`Token`]s that [`crate::parser`] consumes directly — there is no AST, so
//! the lexer's only job is turning bytes into a sequence of typed lexemes
//! plus the source position needed for stack traces (§4.I "Position and
//! stack traces").
//!
//! This engine's own call convention always re-lexes a function's saved
//! source text on each call (the `NATIVE_STRING` path of §4.J "Call
//! convention" step 2) rather than replaying the compact form below — but
//! the compact pre-tokenised byte format itself (§6 "Pre-tokenised code
//! format") is implemented in full as [`tokenise`]/[`print_tokenised_string`],
//! since it is a named external interface and the subject of its own
//! testable property (§8 invariant 4). See DESIGN.md.

use crate::error::{CodeLoc, Error};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Eof,
    Ident(String),
    Keyword(&'static str),
    Int(i32),
    Float(f64),
    Str(Vec<u8>),
    Regex { pattern: String, flags: String },
    /// A template literal, pre-split into alternating literal/substitution
    /// segments (§4.I "Template literals" — desugared to string
    /// concatenation by the parser, not given its own grammar production).
    Template(Vec<TemplateSeg>),
    /// Any punctuation/operator, normalised to its canonical spelling
    /// (`===`, `>>>=`, `=>`, `??`, ...).
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplateSeg {
    Str(Vec<u8>),
    /// Raw source text of one `${...}` substitution, re-lexed by the parser.
    Expr(String),
}

const KEYWORDS: &[&str] = &[
    "var", "let", "const", "function", "return", "if", "else", "for", "while", "do", "break",
    "continue", "true", "false", "null", "undefined", "new", "typeof", "instanceof", "in", "of",
    "this", "try", "catch", "finally", "throw", "switch", "case", "default", "delete", "void",
    "class", "extends", "super", "static",
];

/// Longest-match punctuation table, ordered longest-first so `>>>=` is
/// preferred over `>>>` over `>>` over `>`.
const PUNCTS: &[&str] = &[
    ">>>=", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "...",
    "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "**", "<<", ">>",
    "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^",
    "!", "~", "?", ":", "=", ".",
];

#[derive(Debug, Clone)]
pub(crate) struct Lexer<'s> {
    src: &'s [u8],
    pos: usize,
    pub(crate) tok: Tok,
    pub(crate) tok_start: usize,
}

impl<'s> Lexer<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        let mut lex = Lexer { src: src.as_bytes(), pos: 0, tok: Tok::Eof, tok_start: 0 };
        lex.advance();
        lex
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, off: usize) -> u8 {
        *self.src.get(self.pos + off).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek();
        if c != 0 {
            self.pos += 1;
        }
        c
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while self.peek() != b'\n' && self.peek() != 0 {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.pos += 2;
                    while !(self.peek() == b'*' && self.peek_at(1) == b'/') && self.peek() != 0 {
                        self.pos += 1;
                    }
                    self.pos += 2;
                }
                _ => break,
            }
        }
    }

    /// `true` when a `/` at the current position should be read as the
    /// start of a regex literal rather than a division operator — decided
    /// by what token preceded it, the same heuristic real JS lexers use.
    fn regex_allowed(&self, prev: &Tok) -> bool {
        !matches!(
            prev,
            Tok::Ident(_) | Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::Regex { .. } | Tok::Template(_)
        ) && !matches!(prev, Tok::Punct(")") | Tok::Punct("]"))
    }

    pub(crate) fn advance(&mut self) {
        let prev = self.tok.clone();
        self.skip_trivia();
        self.tok_start = self.pos;
        let c = self.peek();
        self.tok = if c == 0 {
            Tok::Eof
        } else if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_ascii_digit()) {
            self.lex_number()
        } else if c == b'"' || c == b'\'' {
            self.lex_string(c)
        } else if c == b'`' {
            self.lex_template()
        } else if c == b'_' || c == b'$' || c.is_ascii_alphabetic() {
            self.lex_ident()
        } else if c == b'/' && self.regex_allowed(&prev) {
            self.lex_regex()
        } else {
            self.lex_punct()
        };
    }

    fn lex_number(&mut self) -> Tok {
        let start = self.pos;
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.pos += 2;
            while self.peek().is_ascii_hexdigit() {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.src[start + 2..self.pos]).unwrap_or("0");
            let v = i64::from_str_radix(text, 16).unwrap_or(0);
            return Tok::Int(v as i32);
        }
        let mut is_float = false;
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek() == b'.' {
            is_float = true;
            self.pos += 1;
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.peek() == b'e' || self.peek() == b'E' {
            is_float = true;
            self.pos += 1;
            if self.peek() == b'+' || self.peek() == b'-' {
                self.pos += 1;
            }
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0");
        if is_float {
            Tok::Float(text.parse().unwrap_or(f64::NAN))
        } else {
            match text.parse::<i32>() {
                Ok(v) => Tok::Int(v),
                Err(_) => Tok::Float(text.parse().unwrap_or(f64::NAN)),
            }
        }
    }

    fn lex_string(&mut self, quote: u8) -> Tok {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let c = self.bump();
            if c == 0 || c == quote {
                break;
            }
            if c == b'\\' {
                let esc = self.bump();
                out.push(match esc {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    b'0' => 0,
                    b'\\' => b'\\',
                    other if other == quote => quote,
                    other => other,
                });
            } else {
                out.push(c);
            }
        }
        Tok::Str(out)
    }

    /// Splits a `` `...${a}...` `` literal into alternating `Str`/`Expr`
    /// segments at lex time, tracking brace depth so a substitution may
    /// itself contain `{`/`}` (object literals, blocks) without ending the
    /// segment early.
    fn lex_template(&mut self) -> Tok {
        self.pos += 1;
        let mut segs = Vec::new();
        let mut lit = Vec::new();
        loop {
            let c = self.peek();
            if c == 0 || c == b'`' {
                self.pos += if c == b'`' { 1 } else { 0 };
                break;
            }
            if c == b'\\' {
                self.pos += 1;
                let esc = self.bump();
                lit.push(match esc {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    b'`' => b'`',
                    b'\\' => b'\\',
                    other => other,
                });
                continue;
            }
            if c == b'$' && self.peek_at(1) == b'{' {
                segs.push(TemplateSeg::Str(std::mem::take(&mut lit)));
                self.pos += 2;
                let start = self.pos;
                let mut depth = 1i32;
                while depth > 0 {
                    match self.peek() {
                        0 => break,
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        self.pos += 1;
                    }
                }
                let expr = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                segs.push(TemplateSeg::Expr(expr));
                self.pos += 1; // closing '}'
                continue;
            }
            lit.push(c);
            self.pos += 1;
        }
        segs.push(TemplateSeg::Str(lit));
        Tok::Template(segs)
    }

    fn lex_ident(&mut self) -> Tok {
        let start = self.pos;
        while matches!(self.peek(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'$') {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("").to_string();
        match KEYWORDS.iter().find(|k| **k == text) {
            Some(k) => Tok::Keyword(k),
            None => Tok::Ident(text),
        }
    }

    fn lex_regex(&mut self) -> Tok {
        self.pos += 1;
        let start = self.pos;
        let mut in_class = false;
        loop {
            let c = self.peek();
            if c == 0 {
                break;
            }
            if c == b'\\' {
                self.pos += 2;
                continue;
            }
            if c == b'[' {
                in_class = true;
            } else if c == b']' {
                in_class = false;
            } else if c == b'/' && !in_class {
                break;
            }
            self.pos += 1;
        }
        let pattern = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        self.pos += 1; // closing '/'
        let flag_start = self.pos;
        while self.peek().is_ascii_alphabetic() {
            self.pos += 1;
        }
        let flags = String::from_utf8_lossy(&self.src[flag_start..self.pos]).into_owned();
        Tok::Regex { pattern, flags }
    }

    fn lex_punct(&mut self) -> Tok {
        for &p in PUNCTS {
            if self.src[self.pos..].starts_with(p.as_bytes()) {
                self.pos += p.len();
                return Tok::Punct(p);
            }
        }
        self.pos += 1;
        Tok::Punct(";")
    }

    /// `file:line:col`-style location of the token at `byte_offset`, built
    /// by counting newlines from the start of source (§4.I).
    pub(crate) fn loc_at(&self, byte_offset: usize) -> CodeLoc {
        let mut line = 1u32;
        let mut col = 1u32;
        for &b in &self.src[..byte_offset.min(self.src.len())] {
            if b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        CodeLoc { line, col }
    }

    pub(crate) fn current_loc(&self) -> CodeLoc {
        self.loc_at(self.tok_start)
    }

    /// Produces a fresh lexer over the same source positioned at
    /// `byte_offset`, used to re-drive a loop's condition/update/body from a
    /// remembered position instead of caching a token list.
    pub(crate) fn rewind_to(&self, byte_offset: usize) -> Lexer<'s> {
        let mut lex = Lexer { src: self.src, pos: byte_offset, tok: Tok::Eof, tok_start: byte_offset };
        lex.advance();
        lex
    }

    /// Raw source text between two byte offsets, used to capture a
    /// function body's text for later re-lexing.
    pub(crate) fn source_slice(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.src[start..end.min(self.src.len())]).into_owned()
    }
}

// ---------------------------------------------------------------------
// Compact pre-tokenised byte form (§6 "Pre-tokenised code format")
// ---------------------------------------------------------------------

const RAW_STRING8: u8 = 0xFB;
const RAW_STRING16: u8 = 0xFC;
const RAW_INT0: u8 = 0xFD;
const RAW_INT8: u8 = 0xFE;
const RAW_INT16: u8 = 0xFF;

/// First byte code assigned to a reserved word; codes run
/// `KEYWORD_BASE..KEYWORD_BASE + KEYWORDS.len()`.
const KEYWORD_BASE: u8 = 0x80;
/// First byte code assigned to a multi-character operator (the single-char
/// ones are their own ASCII byte and need no code); codes run
/// `PUNCT_BASE..PUNCT_BASE + multi_puncts().len()`. `KEYWORDS`/`PUNCTS` are
/// small fixed tables (≈35 + 32 entries), leaving comfortable headroom below
/// the `0xFB` `RAW_*` markers.
const PUNCT_BASE: u8 = KEYWORD_BASE + KEYWORDS.len() as u8;

fn multi_puncts() -> Vec<&'static str> {
    PUNCTS.iter().copied().filter(|p| p.len() > 1).collect()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Encodes a value that fits the compact integer markers, or `None` if it
/// must fall back to raw decimal text. General-purpose over the full signed
/// `i16` range (not just the non-negative magnitudes a lexed `Int` token can
/// produce), so the wire format itself round-trips every integer in
/// `[-32768, 32767]` per §9's note on `RAW_INT8`/`RAW_INT16` fidelity.
fn encode_small_int(v: i32) -> Option<Vec<u8>> {
    if v == 0 {
        Some(vec![RAW_INT0])
    } else if let Ok(v8) = i8::try_from(v) {
        Some(vec![RAW_INT8, v8 as u8])
    } else if let Ok(v16) = i16::try_from(v) {
        let b = v16.to_le_bytes();
        Some(vec![RAW_INT16, b[0], b[1]])
    } else {
        None
    }
}

/// Appends `bytes` to `out`, inserting a literal space first when the
/// previous raw-text token and this one would otherwise glue into a single
/// identifier/number on re-lex (§4.I "Whitespace preservation between
/// adjacent identifiers/numbers").
fn push_raw_span(out: &mut Vec<u8>, bytes: &[u8], last_word: &mut bool) {
    if *last_word && bytes.first().is_some_and(|&b| is_word_byte(b)) {
        out.push(b' ');
    }
    out.extend_from_slice(bytes);
    *last_word = bytes.last().is_some_and(|&b| is_word_byte(b));
}

fn push_string_literal(out: &mut Vec<u8>, bytes: &[u8]) {
    if let Ok(len) = u8::try_from(bytes.len()) {
        out.push(RAW_STRING8);
        out.push(len);
    } else {
        out.push(RAW_STRING16);
        out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(bytes);
}

/// Reconstructs a template literal's original `` `...${expr}...` `` spelling
/// from its pre-split segments, for pass-through raw-text encoding (backtick
/// and backslash re-escaped so the result re-lexes to the same segments).
fn render_template_source(segs: &[TemplateSeg]) -> String {
    let mut s = String::from("`");
    for seg in segs {
        match seg {
            TemplateSeg::Str(bytes) => {
                for &b in bytes.iter() {
                    match b {
                        b'`' => s.push_str("\\`"),
                        b'\\' => s.push_str("\\\\"),
                        _ => s.push(b as char),
                    }
                }
            }
            TemplateSeg::Expr(expr) => {
                s.push_str("${");
                s.push_str(expr);
                s.push('}');
            }
        }
    }
    s.push('`');
    s
}

/// Standard base64 (RFC 4648, alphabet + padding) decode, used only to fold
/// `atob("...")` literals at tokenise time (§4.I). Hand-rolled rather than a
/// crate dependency since this is the only call site in the whole engine.
fn base64_decode(input: &[u8]) -> Option<Vec<u8>> {
    fn sextet(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let mut out = Vec::with_capacity(input.len() * 3 / 4 + 3);
    let mut buf = 0u32;
    let mut bits = 0u32;
    for &c in input.iter().filter(|&&b| b != b'=' && !b.is_ascii_whitespace()) {
        buf = (buf << 6) | sextet(c)? as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((buf >> bits) as u8);
        }
    }
    Some(out)
}

fn collect_tokens(source: &str) -> Vec<Tok> {
    let mut lex = Lexer::new(source);
    let mut toks = Vec::new();
    loop {
        if matches!(lex.tok, Tok::Eof) {
            break;
        }
        toks.push(lex.tok.clone());
        lex.advance();
    }
    toks
}

/// Replaces an `atob("...")` call in argument position with the decoded
/// bytes as a plain string token, stripping the surrounding `atob(`/`)`
/// (§4.I "Pre-tokenisation").
fn fold_atob(toks: Vec<Tok>) -> Vec<Tok> {
    let mut out = Vec::with_capacity(toks.len());
    let mut i = 0;
    while i < toks.len() {
        let is_atob_call = matches!(&toks[i], Tok::Ident(name) if name == "atob")
            && matches!(toks.get(i + 1), Some(Tok::Punct("(")))
            && matches!(toks.get(i + 2), Some(Tok::Str(_)))
            && matches!(toks.get(i + 3), Some(Tok::Punct(")")));
        if is_atob_call {
            if let Tok::Str(content) = &toks[i + 2] {
                if let Some(decoded) = base64_decode(content) {
                    out.push(Tok::Str(decoded));
                    i += 4;
                    continue;
                }
            }
        }
        out.push(toks[i].clone());
        i += 1;
    }
    out
}

/// `tokenise`: compacts `source` into the byte stream format from §6. Always
/// round-trips through [`print_tokenised_string`] to source text that
/// re-lexes to an equivalent token stream; the byte form itself is not valid
/// UTF-8 source (keyword/operator codes live above `0x7F`).
pub(crate) fn tokenise(source: &str) -> Vec<u8> {
    let toks = fold_atob(collect_tokens(source));
    let mp = multi_puncts();
    let mut out = Vec::new();
    let mut last_word = false;
    for tok in toks {
        match tok {
            Tok::Eof => {}
            Tok::Keyword(k) => {
                let idx = KEYWORDS.iter().position(|w| *w == k).expect("keyword in table");
                out.push(KEYWORD_BASE + idx as u8);
                last_word = false;
            }
            Tok::Punct(p) => {
                if p.len() == 1 {
                    out.push(p.as_bytes()[0]);
                } else {
                    let idx = mp.iter().position(|w| *w == p).expect("punct in table");
                    out.push(PUNCT_BASE + idx as u8);
                }
                last_word = false;
            }
            Tok::Ident(name) => push_raw_span(&mut out, name.as_bytes(), &mut last_word),
            Tok::Int(v) => match encode_small_int(v) {
                Some(bytes) => {
                    out.extend(bytes);
                    last_word = false;
                }
                None => push_raw_span(&mut out, v.to_string().as_bytes(), &mut last_word),
            },
            Tok::Float(f) => push_raw_span(&mut out, f.to_string().as_bytes(), &mut last_word),
            Tok::Str(bytes) => {
                push_string_literal(&mut out, &bytes);
                last_word = false;
            }
            Tok::Regex { pattern, flags } => {
                let text = format!("/{pattern}/{flags}");
                push_raw_span(&mut out, text.as_bytes(), &mut last_word);
            }
            Tok::Template(segs) => {
                let text = render_template_source(&segs);
                push_raw_span(&mut out, text.as_bytes(), &mut last_word);
            }
        }
    }
    out
}

fn quote_string(content: &[u8]) -> String {
    let mut s = String::with_capacity(content.len() + 2);
    s.push('"');
    for &b in content {
        match b {
            b'"' => s.push_str("\\\""),
            b'\\' => s.push_str("\\\\"),
            b'\n' => s.push_str("\\n"),
            b'\r' => s.push_str("\\r"),
            b'\t' => s.push_str("\\t"),
            0 => s.push_str("\\0"),
            _ => s.push(b as char),
        }
    }
    s.push('"');
    s
}

fn is_special_byte(b: u8, mp: &[&str]) -> bool {
    matches!(b, RAW_STRING8 | RAW_STRING16 | RAW_INT0 | RAW_INT8 | RAW_INT16)
        || (KEYWORD_BASE..KEYWORD_BASE + KEYWORDS.len() as u8).contains(&b)
        || (PUNCT_BASE..PUNCT_BASE + mp.len() as u8).contains(&b)
}

/// Appends `frag` to `out`, inserting a separating space when `out` ends in
/// a word character and `frag` begins with one — the decode-side half of the
/// same collision rule [`push_raw_span`] applies at encode time, needed here
/// because keyword/int codes expand to word-shaped text with no such space
/// baked into the byte stream.
fn append_frag(out: &mut String, frag: &str) {
    if frag.is_empty() {
        return;
    }
    let ends_word = out.as_bytes().last().is_some_and(|&b| is_word_byte(b));
    let starts_word = frag.as_bytes().first().is_some_and(|&b| is_word_byte(b));
    if ends_word && starts_word {
        out.push(' ');
    }
    out.push_str(frag);
}

/// `printTokenisedString`: expands a byte stream produced by [`tokenise`]
/// back into source text. Scoped to ASCII content (string/regex/template
/// bytes outside the 7-bit range are reproduced via their Latin-1 codepoint
/// rather than preserved byte-for-byte) — consistent with this crate's
/// stance on the spec's own "UTF-8 handling is under-specified" note (§9).
pub(crate) fn print_tokenised_string(bytes: &[u8]) -> Result<String, Error> {
    let mp = multi_puncts();
    let mut out = String::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            RAW_STRING8 => {
                let len = *bytes.get(i + 1).ok_or(Error::MalformedTokenStream)? as usize;
                let start = i + 2;
                let end = start.checked_add(len).ok_or(Error::MalformedTokenStream)?;
                let content = bytes.get(start..end).ok_or(Error::MalformedTokenStream)?;
                append_frag(&mut out, &quote_string(content));
                i = end;
            }
            RAW_STRING16 => {
                let lo = *bytes.get(i + 1).ok_or(Error::MalformedTokenStream)?;
                let hi = *bytes.get(i + 2).ok_or(Error::MalformedTokenStream)?;
                let len = u16::from_le_bytes([lo, hi]) as usize;
                let start = i + 3;
                let end = start.checked_add(len).ok_or(Error::MalformedTokenStream)?;
                let content = bytes.get(start..end).ok_or(Error::MalformedTokenStream)?;
                append_frag(&mut out, &quote_string(content));
                i = end;
            }
            RAW_INT0 => {
                append_frag(&mut out, "0");
                i += 1;
            }
            RAW_INT8 => {
                let raw = *bytes.get(i + 1).ok_or(Error::MalformedTokenStream)?;
                append_frag(&mut out, &(raw as i8).to_string());
                i += 2;
            }
            RAW_INT16 => {
                let lo = *bytes.get(i + 1).ok_or(Error::MalformedTokenStream)?;
                let hi = *bytes.get(i + 2).ok_or(Error::MalformedTokenStream)?;
                append_frag(&mut out, &i16::from_le_bytes([lo, hi]).to_string());
                i += 3;
            }
            _ if (KEYWORD_BASE..KEYWORD_BASE + KEYWORDS.len() as u8).contains(&b) => {
                append_frag(&mut out, KEYWORDS[(b - KEYWORD_BASE) as usize]);
                i += 1;
            }
            _ if (PUNCT_BASE..PUNCT_BASE + mp.len() as u8).contains(&b) => {
                append_frag(&mut out, mp[(b - PUNCT_BASE) as usize]);
                i += 1;
            }
            _ => {
                let start = i;
                while i < bytes.len() && !is_special_byte(bytes[i], &mp) {
                    i += 1;
                }
                let frag = String::from_utf8_lossy(&bytes[start..i]).into_owned();
                append_frag(&mut out, &frag);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenises_arithmetic_expression() {
        let mut lx = Lexer::new("1+2*3");
        let mut toks = Vec::new();
        loop {
            toks.push(lx.tok.clone());
            if matches!(lx.tok, Tok::Eof) {
                break;
            }
            lx.advance();
        }
        assert_eq!(
            toks,
            vec![Tok::Int(1), Tok::Punct("+"), Tok::Int(2), Tok::Punct("*"), Tok::Int(3), Tok::Eof]
        );
    }

    #[test]
    fn distinguishes_division_from_regex() {
        let mut lx = Lexer::new("a / b");
        assert!(matches!(lx.tok, Tok::Ident(_)));
        lx.advance();
        assert_eq!(lx.tok, Tok::Punct("/"));
    }

    #[test]
    fn reads_regex_literal_after_open_paren() {
        let mut lx = Lexer::new("(/[0-9]+/g)");
        lx.advance();
        match &lx.tok {
            Tok::Regex { pattern, flags } => {
                assert_eq!(pattern, "[0-9]+");
                assert_eq!(flags, "g");
            }
            other => panic!("expected regex token, got {other:?}"),
        }
    }

    #[test]
    fn tracks_line_and_column() {
        let lx = Lexer::new("a\nb\nccc");
        let loc = lx.loc_at(4);
        assert_eq!(loc.line, 3);
    }

    fn retokenises_to_same_stream(source: &str) {
        let expanded = print_tokenised_string(&tokenise(source)).expect("valid token stream");
        assert_eq!(collect_tokens(&expanded), collect_tokens(source), "source: {source:?} -> {expanded:?}");
    }

    #[test]
    fn tokenise_round_trips_arithmetic() {
        retokenises_to_same_stream("1+2*3-400");
    }

    #[test]
    fn tokenise_round_trips_function_declaration() {
        retokenises_to_same_stream("function add(a, b) { return a + b; }");
    }

    #[test]
    fn tokenise_round_trips_keyword_adjacent_to_identifier() {
        retokenises_to_same_stream("var xyz = typeof abc;");
        retokenises_to_same_stream("return x;");
    }

    #[test]
    fn tokenise_round_trips_identifiers_that_would_otherwise_glue() {
        retokenises_to_same_stream("var a; var bb; var ccc;");
    }

    #[test]
    fn tokenise_round_trips_string_and_punctuation() {
        retokenises_to_same_stream(r#"let s = "hi\nthere"; if (s === "x") { s = s + "!"; }"#);
    }

    #[test]
    fn tokenise_round_trips_long_string_via_raw_string16() {
        let body = "a".repeat(300);
        let source = format!(r#"let s = "{body}";"#);
        retokenises_to_same_stream(&source);
    }

    #[test]
    fn tokenise_round_trips_template_literal() {
        retokenises_to_same_stream("let s = `hello ${name} !`;");
    }

    #[test]
    fn tokenise_round_trips_regex_literal() {
        retokenises_to_same_stream("let r = /[a-z]+/gi;");
    }

    #[test]
    fn tokenise_folds_atob_call_into_decoded_string() {
        // "hi" base64-encoded.
        let bytes = tokenise(r#"var s = atob("aGk=");"#);
        let expanded = print_tokenised_string(&bytes).unwrap();
        assert!(expanded.contains("\"hi\""), "expected decoded literal in {expanded:?}");
        assert!(!expanded.contains("atob"));
    }

    #[test]
    fn tokenise_leaves_non_atob_calls_untouched() {
        retokenises_to_same_stream(r#"var s = foo("aGk=");"#);
    }

    #[test]
    fn print_tokenised_string_rejects_truncated_stream() {
        assert!(print_tokenised_string(&[RAW_STRING8, 5, b'a']).is_err());
        assert!(print_tokenised_string(&[RAW_STRING16, 0]).is_err());
        assert!(print_tokenised_string(&[RAW_INT16, 0]).is_err());
    }

    #[test]
    fn small_int_round_trips_full_i8_range() {
        for v in -128i32..=127 {
            let bytes = encode_small_int(v).expect("i8 range always encodes");
            let decoded = match bytes[0] {
                RAW_INT0 => 0,
                RAW_INT8 => bytes[1] as i8 as i32,
                other => panic!("unexpected tag {other}"),
            };
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn small_int_round_trips_sampled_i16_range() {
        for v in [-32768i32, -32000, -1000, 1000, 32000, 32767] {
            let bytes = encode_small_int(v).expect("i16 range always encodes");
            assert_eq!(bytes[0], RAW_INT16);
            let decoded = i16::from_le_bytes([bytes[1], bytes[2]]) as i32;
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn small_int_out_of_i16_range_falls_back() {
        assert_eq!(encode_small_int(100_000), None);
        assert_eq!(encode_small_int(-100_000), None);
    }
}
