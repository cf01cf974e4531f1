//! Path parsing and escaping (spec §4.1).
//!
//! Splitting recognizes `/` and `\` as delimiters, except when the delimiter
//! is preceded by an odd number of backslashes (i.e. it is itself escaped).
//! Empty (whitespace-only) segments are discarded; a path with zero
//! non-empty segments is invalid.

use crate::error::{Error, Result};
use crate::persistence::strategy::PersistenceStrategy;

/// An escaped, owned path segment sequence. Always has at least one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// Parses `path`, validating intermediate/leaf segment names against
    /// `strategy` when given.
    pub fn parse(
        path: &str,
        is_item_path: bool,
        check_validity: bool,
        strategy: Option<&dyn PersistenceStrategy>,
    ) -> Result<Self> {
        let segments = split(path)?;
        if check_validity {
            if let Some(strategy) = strategy {
                let last = segments.len() - 1;
                for (i, seg) in segments.iter().enumerate() {
                    let ok = if i == last && is_item_path {
                        strategy.is_valid_item_name(seg)
                    } else {
                        strategy.is_valid_configuration_name(seg)
                    };
                    if !ok {
                        return Err(Error::invalid_argument(format!(
                            "segment '{seg}' is not a valid name for this persistence strategy"
                        )));
                    }
                }
            }
        }
        Ok(ConfigPath { segments })
    }

    /// Builds a path from already-unescaped segments, without validation.
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::invalid_argument("path has no segments"));
        }
        Ok(ConfigPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn leaf(&self) -> &str {
        self.segments.last().expect("at least one segment")
    }

    /// All but the last segment.
    pub fn parent_segments(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// The escaped, slash-separated absolute path string, e.g. `/a/b/c`.
    pub fn to_absolute_string(&self) -> String {
        combine("/", self.segments.iter().map(String::as_str))
    }

    pub fn child(&self, name: &str) -> ConfigPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        ConfigPath { segments }
    }
}

/// Escapes `\`, `/` and whitespace-delimiter collisions by backslash-prefixing
/// the two delimiter characters.
pub fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '\\' | '/' => {
                out.push('\\');
                out.push(ch);
            }
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape`]: removes one backslash before each escaped `\` or
/// `/`, leaving other backslashes untouched.
pub fn unescape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some('\\') | Some('/') => {
                    out.push(*chars.peek().unwrap());
                    chars.next();
                }
                _ => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// True if `s` contains a `/` or `\` that is not itself escaped (preceded by
/// an even number of backslashes).
pub fn contains_unescaped_separator(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' {
            // count run length of backslashes
            let mut run = 0;
            while i < bytes.len() && bytes[i] == b'\\' {
                run += 1;
                i += 1;
            }
            // a trailing delimiter right after an even-length run is unescaped
            if i < bytes.len() && (bytes[i] == b'/' || bytes[i] == b'\\') && run % 2 == 0 {
                return true;
            }
            continue;
        }
        if b == b'/' {
            return true;
        }
        i += 1;
    }
    false
}

/// Splits `path` on unescaped `/`/`\`, discarding empty segments, then
/// unescapes each resulting segment. Fails if no non-empty segment remains.
pub fn split(path: &str) -> Result<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut backslash_run = 0usize;

    for ch in path.chars() {
        match ch {
            '\\' => {
                backslash_run += 1;
                current.push(ch);
            }
            '/' if backslash_run % 2 == 0 => {
                push_segment(&mut segments, &current);
                current.clear();
                backslash_run = 0;
            }
            _ => {
                backslash_run = 0;
                current.push(ch);
            }
        }
    }
    push_segment(&mut segments, &current);

    if segments.is_empty() {
        return Err(Error::invalid_argument(format!(
            "path '{path}' has no non-empty segments"
        )));
    }
    Ok(segments)
}

fn push_segment(out: &mut Vec<String>, raw: &str) {
    if raw.trim().is_empty() {
        return;
    }
    out.push(unescape(raw));
}

/// `base + "/" + join(escape(segments), "/")`. The special base `"/"` omits
/// the separator between base and the first segment.
pub fn combine<'a>(base: &str, segments: impl IntoIterator<Item = &'a str>) -> String {
    let joined = segments
        .into_iter()
        .map(escape)
        .collect::<Vec<_>>()
        .join("/");
    if base == "/" {
        format!("/{joined}")
    } else {
        format!("{base}/{joined}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_unescape_roundtrip() {
        for raw in ["a", "a/b", r"a\b", "a/b\\c", "plain"] {
            let escaped = escape(raw);
            assert!(!contains_unescaped_separator(&escaped) || raw.is_empty());
            assert_eq!(unescape(&escaped), raw);
        }
    }

    #[test]
    fn split_discards_empty_segments() {
        let segs = split("//a//b/ /c//").unwrap();
        assert_eq!(segs, vec!["a", "b", "c"]);
    }

    #[test]
    fn split_respects_escaped_separator() {
        let escaped_slash = escape("a/b");
        let full = format!("{escaped_slash}/c");
        let segs = split(&full).unwrap();
        assert_eq!(segs, vec!["a/b", "c"]);
    }

    #[test]
    fn split_rejects_empty_path() {
        assert!(split("   ").is_err());
        assert!(split("///").is_err());
    }

    #[test]
    fn combine_root_omits_extra_slash() {
        assert_eq!(combine("/", ["a", "b"]), "/a/b");
        assert_eq!(combine("/x", ["y"]), "/x/y");
    }

    #[test]
    fn combine_escapes_segments() {
        assert_eq!(combine("/", ["a/b"]), r"/a\/b");
    }
}
