//! `fnmatch`-style glob translation for `masks` patterns (§6, §4.3).
//!
//! `original_source/opm/ircpresence.py` builds its mask table with Python's
//! `fnmatch.translate`; this is a minimal reimplementation covering `*`,
//! `?`, and `[seq]`/`[!seq]` character classes, which is all the masks in
//! practice ever use (hostmask patterns, not full shell globs).

use regex::Regex;

/// Translate a glob pattern into an anchored, case-insensitive [`Regex`]
/// suitable for matching a full `nick!user@host` string.
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i)^{}$", translate(pattern)))
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                if let Some(end) = find_class_end(&chars, i) {
                    let mut inner: String = chars[i + 1..end].iter().collect();
                    if let Some(rest) = inner.strip_prefix('!') {
                        inner = format!("^{rest}");
                    }
                    out.push('[');
                    out.push_str(&inner);
                    out.push(']');
                    i = end;
                } else {
                    out.push_str(&regex::escape("["));
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out
}

/// Find the index of the `]` closing a `[...]` class starting at `open`,
/// honoring a leading `!`/`]` the way `fnmatch` does (a `]` right after the
/// opening bracket, or after a negating `!`, is a literal member).
fn find_class_end(chars: &[char], open: usize) -> Option<usize> {
    let mut j = open + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    if j < chars.len() {
        Some(j)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_anything() {
        let re = compile("*!*@1.2.3.*").unwrap();
        assert!(re.is_match("nick!user@1.2.3.4"));
        assert!(!re.is_match("nick!user@1.2.4.4"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let re = compile("nick?!user@host").unwrap();
        assert!(re.is_match("nickA!user@host"));
        assert!(!re.is_match("nickAB!user@host"));
    }

    #[test]
    fn character_class_and_negation() {
        let re = compile("nick!user@10.0.0.[0-9]").unwrap();
        assert!(re.is_match("nick!user@10.0.0.5"));
        assert!(!re.is_match("nick!user@10.0.0.a"));

        let re = compile("nick!user@10.0.0.[!0-4]").unwrap();
        assert!(re.is_match("nick!user@10.0.0.9"));
        assert!(!re.is_match("nick!user@10.0.0.2"));
    }

    #[test]
    fn is_case_insensitive_and_anchored() {
        let re = compile("Nick!*@Host").unwrap();
        assert!(re.is_match("nick!u@host"));
        assert!(!re.is_match("xnick!u@hostx"));
    }

    #[test]
    fn literal_dots_are_escaped() {
        let re = compile("*!*@1.2.3.4").unwrap();
        assert!(!re.is_match("a!b@1x2x3x4"));
    }
}
