//! Key Pattern Module
//!
//! Redis-style glob patterns used for bulk invalidation.
//!
//! Supported syntax: `*` (any run), `?` (one character), `[abc]`, `[a-z]`,
//! `[^x]` / `[!x]` (negated class) and `\` to escape the next character.

use crate::error::{CacheError, Result};

// == Key Pattern ==
/// A compiled key pattern.
///
/// Patterns without metacharacters compile to an exact comparison, and
/// patterns whose only metacharacter is a single trailing `*` compile to a
/// prefix test, so the common `user:*` case never runs the glob matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(String),
    Prefix(String),
    Glob(Vec<char>),
}

impl KeyPattern {
    // == Compile ==
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(CacheError::invalid("pattern must not be empty"));
        }

        let is_meta = |c: char| matches!(c, '*' | '?' | '[' | '\\');

        if !pattern.contains(is_meta) {
            return Ok(KeyPattern::Exact(pattern.to_string()));
        }

        if let Some(prefix) = pattern.strip_suffix('*') {
            if !prefix.contains(is_meta) {
                return Ok(KeyPattern::Prefix(prefix.to_string()));
            }
        }

        Ok(KeyPattern::Glob(pattern.chars().collect()))
    }

    // == Matches ==
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(exact) => key == exact,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Glob(pattern) => {
                let key: Vec<char> = key.chars().collect();
                glob_match(pattern, &key)
            }
        }
    }
}

/// Iterative glob matcher with single-star backtracking.
fn glob_match(pattern: &[char], key: &[char]) -> bool {
    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ki < key.len() {
        match pattern.get(pi) {
            Some('\\') if pi + 1 < pattern.len() => {
                if pattern[pi + 1] == key[ki] {
                    pi += 2;
                    ki += 1;
                    continue;
                }
            }
            Some('*') => {
                star = Some((pi, ki));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ki += 1;
                continue;
            }
            Some('[') => {
                if let Some((true, end)) = match_class(pattern, pi, key[ki]) {
                    pi = end;
                    ki += 1;
                    continue;
                }
            }
            Some(&c) if c == key[ki] => {
                pi += 1;
                ki += 1;
                continue;
            }
            _ => {}
        }

        // Backtrack: let the last star swallow one more character
        match star {
            Some((star_pi, star_ki)) => {
                pi = star_pi + 1;
                ki = star_ki + 1;
                star = Some((star_pi, star_ki + 1));
            }
            None => return false,
        }
    }

    while pattern.get(pi) == Some(&'*') {
        pi += 1;
    }
    pi == pattern.len()
}

/// Matches `c` against the class opening at `pattern[start]`.
///
/// Returns `(matched, index after ']')`, or None for an unterminated class.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(pattern.get(i), Some('^') | Some('!'));
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let current = *pattern.get(i)?;
        if current == ']' && !first {
            break;
        }
        first = false;

        if current == '\\' {
            let escaped = *pattern.get(i + 1)?;
            matched |= escaped == c;
            i += 2;
            continue;
        }

        if pattern.get(i + 1) == Some(&'-') && matches!(pattern.get(i + 2), Some(&end) if end != ']')
        {
            let (lo, hi) = (current, pattern[i + 2]);
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            matched |= (lo..=hi).contains(&c);
            i += 3;
            continue;
        }

        matched |= current == c;
        i += 1;
    }

    Some((matched != negate, i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(pattern: &str, key: &str) -> bool {
        KeyPattern::compile(pattern).unwrap().matches(key)
    }

    #[test]
    fn test_compile_fast_paths() {
        assert_eq!(
            KeyPattern::compile("user:1").unwrap(),
            KeyPattern::Exact("user:1".to_string())
        );
        assert_eq!(
            KeyPattern::compile("user:*").unwrap(),
            KeyPattern::Prefix("user:".to_string())
        );
        assert!(matches!(KeyPattern::compile("*:1").unwrap(), KeyPattern::Glob(_)));
        assert!(matches!(KeyPattern::compile("u?er:*").unwrap(), KeyPattern::Glob(_)));
    }

    #[test]
    fn test_compile_empty_rejected() {
        assert!(matches!(
            KeyPattern::compile(""),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_prefix_and_exact() {
        assert!(glob("user:*", "user:1"));
        assert!(glob("user:*", "user:"));
        assert!(!glob("user:*", "order:1"));
        assert!(glob("order:1", "order:1"));
        assert!(!glob("order:1", "order:10"));
        assert!(glob("*", "anything"));
        assert!(glob("*", ""));
    }

    #[test]
    fn test_glob_wildcards() {
        assert!(glob("h?llo", "hello"));
        assert!(!glob("h?llo", "hllo"));
        assert!(glob("foo*bar", "fooXYZbar"));
        assert!(glob("foo*bar", "foobar"));
        assert!(!glob("foo*bar", "foobaz"));
        assert!(glob("*:1", "user:1"));
        assert!(glob("a*b*c", "aXbYbZc"));
        assert!(glob("**x", "x"));
    }

    #[test]
    fn test_glob_classes() {
        assert!(glob("h[ae]llo", "hello"));
        assert!(glob("h[ae]llo", "hallo"));
        assert!(!glob("h[ae]llo", "hillo"));
        assert!(glob("h[^e]llo", "hallo"));
        assert!(!glob("h[^e]llo", "hello"));
        assert!(glob("h[!e]llo", "hallo"));
        assert!(glob("h[a-e]llo", "hcllo"));
        assert!(!glob("h[a-e]llo", "hzllo"));
        assert!(glob("[z-a]", "m"));
        assert!(glob("[a-]", "-"));
        assert!(glob("[]]", "]"));
    }

    #[test]
    fn test_unterminated_class_never_matches() {
        assert!(!glob("[abc", "a"));
    }

    #[test]
    fn test_escapes() {
        assert!(glob("\\*literal", "*literal"));
        assert!(!glob("\\*literal", "xliteral"));
        assert!(glob("a\\?", "a?"));
        assert!(!glob("a\\?", "ab"));
        assert!(glob("[\\]]", "]"));
    }

    #[test]
    fn test_unicode_keys() {
        assert!(glob("caf?:*", "café:1"));
        assert!(glob("naïve*", "naïve-key"));
    }
}
