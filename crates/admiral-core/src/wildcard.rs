//! Glob-style wildcards: `*` matches any run of characters, `?` exactly one.
//! Everything else matches literally.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Compiled patterns are kept until the cache reaches this many entries,
/// then it starts over.
const CACHE_LIMIT: usize = 1024;

fn cache() -> &'static RwLock<HashMap<String, Option<Regex>>> {
    static CACHE: OnceLock<RwLock<HashMap<String, Option<Regex>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Whether `pattern` contains a wildcard character.
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Match `text` against a wildcard `pattern`.
pub fn matches(pattern: &str, text: &str) -> bool {
    if !has_wildcard(pattern) {
        return pattern == text;
    }
    if pattern == "*" {
        return true;
    }
    compiled(pattern).is_some_and(|re| re.is_match(text))
}

/// Anchored regex for `pattern`, compiled once per distinct pattern.
/// `None` if compilation failed; the failure is cached too.
fn compiled(pattern: &str) -> Option<Regex> {
    if let Ok(cached) = cache().read() {
        if let Some(entry) = cached.get(pattern) {
            return entry.clone();
        }
    }

    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    // Built from escaped literals, so compilation only fails on
    // pathological sizes.
    let entry = Regex::new(&expr).ok();
    if let Ok(mut cached) = cache().write() {
        if cached.len() >= CACHE_LIMIT {
            cached.clear();
        }
        cached.insert(pattern.to_string(), entry.clone());
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_patterns() {
        assert!(matches("nginx", "nginx"));
        assert!(!matches("nginx", "nginx2"));
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "axb"));
    }

    #[test]
    fn test_star_and_question_mark() {
        assert!(matches("*", ""));
        assert!(matches("prod-*", "prod-eu"));
        assert!(!matches("prod-*", "dev-eu"));
        assert!(matches("web-?", "web-1"));
        assert!(!matches("web-?", "web-12"));
        assert!(matches("*:latest", "nginx:latest"));
        assert!(matches("a?c*", "abcdef"));
    }

    #[test]
    fn test_compiled_patterns_are_reused() {
        assert!(matches("cached-?-*", "cached-a-b"));
        assert!(!matches("cached-?-*", "cached-ab"));

        let first = compiled("cached-?-*").unwrap();
        assert!(cache().read().unwrap().contains_key("cached-?-*"));
        let second = compiled("cached-?-*").unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("(x)+*", "(x)+y"));
        assert!(!matches("[ab]*", "a"));
    }
}
