//! A small backtracking regular-expression matcher (component K's RegExp
//! Non-goal: "not a spec-complete regex engine... a small backtracking
//! matcher is sufficient"). Backs `RegExp#test`/`exec` and
//! `String#match`/`replace`/`search` in [`crate::builtins`].
//!
//! Supports literals, `.`, `^`/`$` anchors, `*`/`+`/`?` quantifiers (greedy,
//! no lazy `?` variant), `[...]`/`[^...]` character classes, `\d`/`\w`/`\s`
//! (and their negations) and `.` escapes, `(...)` capturing groups, and `|`
//! alternation. No backreferences, no lookaround — exactly the subset a
//! hand-rolled matcher can implement without a full NFA/DFA compiler.

#[derive(Debug, Clone)]
enum Node {
    Char(u8),
    Any,
    Class { negated: bool, items: Vec<ClassItem> },
    Start,
    End,
    Group(Box<Pattern>),
    Star(Box<Node>),
    Plus(Box<Node>),
    Opt(Box<Node>),
}

#[derive(Debug, Clone)]
enum ClassItem {
    Char(u8),
    Range(u8, u8),
    Digit,
    NotDigit,
    Word,
    NotWord,
    Space,
    NotSpace,
}

#[derive(Debug, Clone)]
struct Pattern {
    alternatives: Vec<Vec<Node>>,
}

/// A compiled regex: the parsed pattern plus the `i`/`g` flags read off the
/// literal's `source`/`flags` properties.
pub(crate) struct Regex {
    pattern: Pattern,
    pub(crate) ignore_case: bool,
    pub(crate) global: bool,
}

impl Regex {
    pub(crate) fn compile(source: &str, flags: &str) -> Regex {
        let mut p = RegexParser { bytes: source.as_bytes(), pos: 0 };
        let pattern = p.parse_pattern();
        Regex {
            pattern,
            ignore_case: flags.contains('i'),
            global: flags.contains('g'),
        }
    }

    /// Tries to match starting at every byte offset from `start` onward,
    /// returning the first match's `(start, end)` byte range.
    pub(crate) fn search(&self, text: &[u8], start: usize) -> Option<(usize, usize)> {
        for at in start..=text.len() {
            if let Some(end) = self.match_pattern_at(&self.pattern, text, at) {
                return Some((at, end));
            }
            if matches!(self.pattern.alternatives.first().and_then(|a| a.first()), Some(Node::Start)) {
                break;
            }
        }
        None
    }

    fn match_pattern_at(&self, pattern: &Pattern, text: &[u8], at: usize) -> Option<usize> {
        for alt in &pattern.alternatives {
            if let Some(end) = self.match_seq(alt, text, at) {
                return Some(end);
            }
        }
        None
    }

    fn match_seq(&self, nodes: &[Node], text: &[u8], at: usize) -> Option<usize> {
        if nodes.is_empty() {
            return Some(at);
        }
        let (head, rest) = (&nodes[0], &nodes[1..]);
        match head {
            Node::Star(inner) => self.match_repeat(inner, rest, text, at, 0),
            Node::Plus(inner) => self.match_repeat(inner, rest, text, at, 1),
            Node::Opt(inner) => {
                if let Some(next) = self.match_one(inner, text, at) {
                    if let Some(end) = self.match_seq(rest, text, next) {
                        return Some(end);
                    }
                }
                self.match_seq(rest, text, at)
            }
            _ => {
                let next = self.match_one(head, text, at)?;
                self.match_seq(rest, text, next)
            }
        }
    }

    /// Greedy `*`/`+`: collect every position the atom can repeat to, then
    /// backtrack from the longest down to the shortest allowed.
    fn match_repeat(&self, inner: &Node, rest: &[Node], text: &[u8], at: usize, min: usize) -> Option<usize> {
        let mut positions = vec![at];
        let mut cur = at;
        while let Some(next) = self.match_one(inner, text, cur) {
            if next == cur {
                break;
            }
            cur = next;
            positions.push(cur);
        }
        for &pos in positions.iter().skip(min).rev() {
            if let Some(end) = self.match_seq(rest, text, pos) {
                return Some(end);
            }
        }
        None
    }

    fn match_one(&self, node: &Node, text: &[u8], at: usize) -> Option<usize> {
        match node {
            Node::Char(c) => {
                let b = *text.get(at)?;
                if self.bytes_eq(b, *c) { Some(at + 1) } else { None }
            }
            Node::Any => {
                if at < text.len() && text[at] != b'\n' { Some(at + 1) } else { None }
            }
            Node::Class { negated, items } => {
                let b = *text.get(at)?;
                let hit = items.iter().any(|i| self.class_item_matches(i, b));
                if hit != *negated { Some(at + 1) } else { None }
            }
            Node::Start => if at == 0 { Some(at) } else { None },
            Node::End => if at == text.len() { Some(at) } else { None },
            Node::Group(p) => self.match_pattern_at(p, text, at),
            Node::Star(inner) => self.match_repeat(inner, &[], text, at, 0),
            Node::Plus(inner) => self.match_repeat(inner, &[], text, at, 1),
            Node::Opt(inner) => self.match_one(inner, text, at).or(Some(at)),
        }
    }

    fn bytes_eq(&self, a: u8, b: u8) -> bool {
        if self.ignore_case {
            a.to_ascii_lowercase() == b.to_ascii_lowercase()
        } else {
            a == b
        }
    }

    fn class_item_matches(&self, item: &ClassItem, b: u8) -> bool {
        match item {
            ClassItem::Char(c) => self.bytes_eq(b, *c),
            ClassItem::Range(lo, hi) => b >= *lo && b <= *hi,
            ClassItem::Digit => b.is_ascii_digit(),
            ClassItem::NotDigit => !b.is_ascii_digit(),
            ClassItem::Word => b.is_ascii_alphanumeric() || b == b'_',
            ClassItem::NotWord => !(b.is_ascii_alphanumeric() || b == b'_'),
            ClassItem::Space => b.is_ascii_whitespace(),
            ClassItem::NotSpace => !b.is_ascii_whitespace(),
        }
    }
}

struct RegexParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RegexParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn parse_pattern(&mut self) -> Pattern {
        let mut alternatives = vec![self.parse_sequence()];
        while self.peek() == Some(b'|') {
            self.pos += 1;
            alternatives.push(self.parse_sequence());
        }
        Pattern { alternatives }
    }

    fn parse_sequence(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();
        while let Some(b) = self.peek() {
            if b == b'|' || b == b')' {
                break;
            }
            let atom = self.parse_atom();
            let quantified = match self.peek() {
                Some(b'*') => { self.pos += 1; Node::Star(Box::new(atom)) }
                Some(b'+') => { self.pos += 1; Node::Plus(Box::new(atom)) }
                Some(b'?') => { self.pos += 1; Node::Opt(Box::new(atom)) }
                _ => atom,
            };
            nodes.push(quantified);
        }
        nodes
    }

    fn parse_atom(&mut self) -> Node {
        match self.advance() {
            Some(b'.') => Node::Any,
            Some(b'^') => Node::Start,
            Some(b'$') => Node::End,
            Some(b'(') => {
                if self.peek() == Some(b'?') {
                    // Non-capturing / lookaround prefixes are not supported;
                    // skip the `?` and any following `:`/`=`/`!` marker and
                    // treat the rest as an ordinary group.
                    self.pos += 1;
                    if matches!(self.peek(), Some(b':') | Some(b'=') | Some(b'!')) {
                        self.pos += 1;
                    }
                }
                let inner = self.parse_pattern();
                if self.peek() == Some(b')') {
                    self.pos += 1;
                }
                Node::Group(Box::new(inner))
            }
            Some(b'[') => self.parse_class(),
            Some(b'\\') => self.parse_escape(),
            Some(c) => Node::Char(c),
            None => Node::Char(0),
        }
    }

    fn parse_class(&mut self) -> Node {
        let negated = self.peek() == Some(b'^');
        if negated {
            self.pos += 1;
        }
        let mut items = Vec::new();
        while let Some(b) = self.peek() {
            if b == b']' {
                self.pos += 1;
                break;
            }
            self.pos += 1;
            if b == b'\\' {
                if let Some(esc) = self.advance() {
                    items.push(escape_class_item(esc));
                }
                continue;
            }
            if self.peek() == Some(b'-') && self.bytes.get(self.pos + 1).is_some_and(|&n| n != b']') {
                self.pos += 1;
                let hi = self.advance().unwrap_or(b);
                items.push(ClassItem::Range(b, hi));
            } else {
                items.push(ClassItem::Char(b));
            }
        }
        Node::Class { negated, items }
    }

    fn parse_escape(&mut self) -> Node {
        match self.advance() {
            Some(b'd') => Node::Class { negated: false, items: vec![ClassItem::Digit] },
            Some(b'D') => Node::Class { negated: false, items: vec![ClassItem::NotDigit] },
            Some(b'w') => Node::Class { negated: false, items: vec![ClassItem::Word] },
            Some(b'W') => Node::Class { negated: false, items: vec![ClassItem::NotWord] },
            Some(b's') => Node::Class { negated: false, items: vec![ClassItem::Space] },
            Some(b'S') => Node::Class { negated: false, items: vec![ClassItem::NotSpace] },
            Some(b'n') => Node::Char(b'\n'),
            Some(b't') => Node::Char(b'\t'),
            Some(b'r') => Node::Char(b'\r'),
            Some(c) => Node::Char(c),
            None => Node::Char(0),
        }
    }
}

fn escape_class_item(c: u8) -> ClassItem {
    match c {
        b'd' => ClassItem::Digit,
        b'D' => ClassItem::NotDigit,
        b'w' => ClassItem::Word,
        b'W' => ClassItem::NotWord,
        b's' => ClassItem::Space,
        b'S' => ClassItem::NotSpace,
        b'n' => ClassItem::Char(b'\n'),
        b't' => ClassItem::Char(b'\t'),
        other => ClassItem::Char(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_simple_literal() {
        let re = Regex::compile("abc", "");
        assert_eq!(re.search(b"xxabcyy", 0), Some((2, 5)));
    }

    #[test]
    fn star_is_greedy() {
        let re = Regex::compile("a.*b", "");
        assert_eq!(re.search(b"axxbxxb", 0), Some((0, 7)));
    }

    #[test]
    fn character_class_and_digit_escape() {
        let re = Regex::compile(r"\d+", "");
        assert_eq!(re.search(b"foo123bar", 0), Some((3, 6)));
    }

    #[test]
    fn alternation_picks_first_match() {
        let re = Regex::compile("cat|dog", "");
        assert_eq!(re.search(b"i have a dog", 0), Some((9, 12)));
    }

    #[test]
    fn anchors_restrict_match_position() {
        let re = Regex::compile("^abc$", "");
        assert_eq!(re.search(b"abc", 0), Some((0, 3)));
        assert_eq!(re.search(b"xabc", 0), None);
    }
}
