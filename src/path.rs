//! Path addressing.
//!
//! A path is an ordered sequence of [`Segment`]s. Paths can be written as
//! strings with dot and bracket syntax (`"a.b[3].c"`, `a["x.y"]`) or given
//! pre-split. Both forms normalize to the same canonical [`PathKey`]:
//! a key made only of decimal digits is an index, so `"a.0"`, `"a[0]"`
//! and `["a", "0"]` all address the same value.

use crate::error::{Result, StateError};
use std::borrow::Cow;
use std::fmt;

/// One step of a path.
///
/// Indices order before keys; indices ascend numerically and keys
/// lexicographically. Subscription tries enumerate children in this order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Index(usize),
    Key(String),
}

impl Segment {
    /// Canonical segment for a raw key.
    pub fn key(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match parse_index(&raw) {
            Some(i) => Segment::Index(i),
            None => Segment::Key(raw),
        }
    }

    /// The segment as a mapping key.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Segment::Index(i) => Cow::Owned(i.to_string()),
            Segment::Key(k) => Cow::Borrowed(k),
        }
    }

    /// The segment as a sequence index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(i) => Some(*i),
            Segment::Key(_) => None,
        }
    }
}

/// Digits without a leading zero (or exactly "0") that fit in a usize.
fn parse_index(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "{}", i),
            Segment::Key(k) => write!(f, "{:?}", k),
        }
    }
}

impl From<&str> for Segment {
    fn from(raw: &str) -> Self {
        Segment::key(raw)
    }
}

impl From<String> for Segment {
    fn from(raw: String) -> Self {
        Segment::key(raw)
    }
}

impl From<usize> for Segment {
    fn from(i: usize) -> Self {
        Segment::Index(i)
    }
}

/// A canonical path.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathKey(Vec<Segment>);

impl PathKey {
    /// The root path.
    pub fn root() -> Self {
        PathKey(Vec::new())
    }

    /// Build a path from segments, canonicalizing digit keys.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        PathKey(
            segments
                .into_iter()
                .map(|s| match s.into() {
                    Segment::Key(k) => Segment::key(k),
                    index => index,
                })
                .collect(),
        )
    }

    /// Parse dot/bracket syntax.
    ///
    /// The empty string is the root path. Empty segments, dangling dots,
    /// unclosed brackets and non-numeric unquoted bracket contents are
    /// rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        if input.is_empty() {
            return Ok(PathKey(segments));
        }

        let chars: Vec<char> = input.chars().collect();
        let mut pos = 0;
        // True at the start and right after a dot.
        let mut need_segment = true;

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    if need_segment {
                        return Err(StateError::invalid_path(input, "empty segment"));
                    }
                    need_segment = true;
                    pos += 1;
                }
                '[' => {
                    if need_segment && pos > 0 {
                        return Err(StateError::invalid_path(input, "empty segment before '['"));
                    }
                    let (segment, next) = parse_bracket(input, &chars, pos + 1)?;
                    segments.push(segment);
                    need_segment = false;
                    pos = next;
                }
                ']' => {
                    return Err(StateError::invalid_path(input, "unexpected ']'"));
                }
                _ => {
                    if !need_segment {
                        return Err(StateError::invalid_path(
                            input,
                            format!("expected '.' or '[' at offset {}", pos),
                        ));
                    }
                    let start = pos;
                    while pos < chars.len() && !matches!(chars[pos], '.' | '[' | ']') {
                        pos += 1;
                    }
                    let raw: String = chars[start..pos].iter().collect();
                    segments.push(Segment::key(raw));
                    need_segment = false;
                }
            }
        }

        if need_segment {
            return Err(StateError::invalid_path(input, "trailing '.'"));
        }

        Ok(PathKey(segments))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is a (non-strict) prefix of this path.
    pub fn starts_with(&self, prefix: &PathKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// This path extended by one segment.
    pub fn child(&self, segment: impl Into<Segment>) -> PathKey {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        PathKey::new(segments)
    }

    /// This path followed by `other`.
    pub fn join(&self, other: &PathKey) -> PathKey {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        PathKey(segments)
    }
}

/// Parse the inside of a bracket starting at `pos`, returning the segment
/// and the position after the closing bracket.
fn parse_bracket(input: &str, chars: &[char], mut pos: usize) -> Result<(Segment, usize)> {
    match chars.get(pos) {
        Some(&quote) if quote == '"' || quote == '\'' => {
            // A backslash takes the next character literally.
            let mut raw = String::new();
            pos += 1;
            loop {
                match chars.get(pos) {
                    Some(&'\\') => {
                        let escaped = chars
                            .get(pos + 1)
                            .ok_or_else(|| StateError::invalid_path(input, "unterminated quote"))?;
                        raw.push(*escaped);
                        pos += 2;
                    }
                    Some(&c) if c == quote => break,
                    Some(&c) => {
                        raw.push(c);
                        pos += 1;
                    }
                    None => return Err(StateError::invalid_path(input, "unterminated quote")),
                }
            }
            if chars.get(pos + 1) != Some(&']') {
                return Err(StateError::invalid_path(input, "expected ']' after quoted key"));
            }
            Ok((Segment::key(raw), pos + 2))
        }
        Some(_) => {
            let start = pos;
            while pos < chars.len() && chars[pos] != ']' {
                pos += 1;
            }
            if pos == chars.len() {
                return Err(StateError::invalid_path(input, "unclosed '['"));
            }
            let raw: String = chars[start..pos].iter().collect();
            let index = raw.trim().parse::<usize>().map_err(|_| {
                StateError::invalid_path(input, format!("invalid index {:?}", raw))
            })?;
            Ok((Segment::Index(index), pos + 1))
        }
        None => Err(StateError::invalid_path(input, "unclosed '['")),
    }
}

impl fmt::Debug for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathKey({})", self)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Index(index) => write!(f, "[{}]", index)?,
                Segment::Key(key) if needs_quoting(key) => {
                    f.write_str("[\"")?;
                    for c in key.chars() {
                        if c == '"' || c == '\\' {
                            f.write_str("\\")?;
                        }
                        write!(f, "{}", c)?;
                    }
                    f.write_str("\"]")?;
                }
                Segment::Key(key) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
            }
        }
        Ok(())
    }
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(['.', '[', ']', '"', '\'', '\\'])
}

impl From<Vec<Segment>> for PathKey {
    fn from(segments: Vec<Segment>) -> Self {
        PathKey::new(segments)
    }
}

impl<'a> IntoIterator for &'a PathKey {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Anything that can be normalized into a [`PathKey`].
///
/// Strings are parsed and may fail; pre-split sequences always succeed.
pub trait IntoPath {
    fn into_path(self) -> Result<PathKey>;
}

impl IntoPath for PathKey {
    fn into_path(self) -> Result<PathKey> {
        Ok(self)
    }
}

impl IntoPath for &PathKey {
    fn into_path(self) -> Result<PathKey> {
        Ok(self.clone())
    }
}

impl IntoPath for &str {
    fn into_path(self) -> Result<PathKey> {
        PathKey::parse(self)
    }
}

impl IntoPath for String {
    fn into_path(self) -> Result<PathKey> {
        PathKey::parse(&self)
    }
}

impl IntoPath for &String {
    fn into_path(self) -> Result<PathKey> {
        PathKey::parse(self)
    }
}

impl IntoPath for Vec<Segment> {
    fn into_path(self) -> Result<PathKey> {
        Ok(PathKey::new(self))
    }
}

impl IntoPath for &[Segment] {
    fn into_path(self) -> Result<PathKey> {
        Ok(PathKey::new(self.iter().cloned()))
    }
}

impl<const N: usize> IntoPath for [Segment; N] {
    fn into_path(self) -> Result<PathKey> {
        Ok(PathKey::new(self))
    }
}

impl<const N: usize> IntoPath for [&str; N] {
    fn into_path(self) -> Result<PathKey> {
        Ok(PathKey::new(self))
    }
}

impl IntoPath for &[&str] {
    fn into_path(self) -> Result<PathKey> {
        Ok(PathKey::new(self.iter().copied()))
    }
}

impl IntoPath for Vec<&str> {
    fn into_path(self) -> Result<PathKey> {
        Ok(PathKey::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(raw: &str) -> Segment {
        Segment::key(raw)
    }

    #[test]
    fn test_parse_dotted_and_indexed() {
        let path = PathKey::parse("a.b[3].c").unwrap();
        assert_eq!(
            path.segments(),
            &[seg("a"), seg("b"), Segment::Index(3), seg("c")]
        );
    }

    #[test]
    fn test_parse_root() {
        assert!(PathKey::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_leading_bracket() {
        let path = PathKey::parse("[0].name").unwrap();
        assert_eq!(path.segments(), &[Segment::Index(0), seg("name")]);
    }

    #[test]
    fn test_parse_quoted_key() {
        let path = PathKey::parse(r#"a["x.y"]['z']"#).unwrap();
        assert_eq!(
            path.segments(),
            &[seg("a"), Segment::Key("x.y".into()), seg("z")]
        );
    }

    #[test]
    fn test_digit_keys_are_indices() {
        let dotted = PathKey::parse("items.0").unwrap();
        let bracket = PathKey::parse("items[0]").unwrap();
        let split = ["items", "0"].into_path().unwrap();
        assert_eq!(dotted, bracket);
        assert_eq!(dotted, split);
        // Leading zeros stay keys.
        assert_eq!(
            PathKey::parse("a.01").unwrap().segments(),
            &[seg("a"), Segment::Key("01".into())]
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = PathKey::parse("a.b[3].c").unwrap();
        let twice = PathKey::new(once.segments().to_vec());
        assert_eq!(once, twice);
        let reparsed = PathKey::parse(&once.to_string()).unwrap();
        assert_eq!(once, reparsed);
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["a..b", ".a", "a.", "a[", "a[x]", "a[1]b", "a]", "a.[0]", "a[\"x]"] {
            let result = PathKey::parse(bad);
            assert!(
                matches!(result, Err(StateError::InvalidPath { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_display() {
        let path = PathKey::new([seg("a"), Segment::Index(2), Segment::Key("x.y".into()), seg("b")]);
        assert_eq!(path.to_string(), r#"a[2]["x.y"].b"#);
        assert_eq!(PathKey::root().to_string(), "");
    }

    #[test]
    fn test_quoted_keys_with_escapes_round_trip() {
        let path = PathKey::new(["a", "x\"y", "back\\slash", "it's"]);
        assert_eq!(path.to_string(), r#"a["x\"y"]["back\\slash"]["it's"]"#);
        assert_eq!(PathKey::parse(&path.to_string()).unwrap(), path);

        let single = PathKey::parse(r"a['it\'s']").unwrap();
        assert_eq!(single.segments(), &[seg("a"), seg("it's")]);
        assert!(PathKey::parse(r#"a["x\"]"#).is_err());
    }

    #[test]
    fn test_prefix_helpers() {
        let parent = PathKey::parse("a.b").unwrap();
        let child = parent.child("c");
        assert!(child.starts_with(&parent));
        assert!(!parent.starts_with(&child));
        assert_eq!(parent.join(&PathKey::parse("c").unwrap()), child);
    }

    #[test]
    fn test_segment_order() {
        let mut segments = vec![seg("b"), Segment::Index(10), seg("a"), Segment::Index(2)];
        segments.sort();
        assert_eq!(segments, vec![Segment::Index(2), Segment::Index(10), seg("a"), seg("b")]);
    }
}
