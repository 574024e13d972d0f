//! Weight extraction from scale lines.
//!
//! Patterns have the form `<prefix>(<placeholder>)`, e.g. `W:(#)` or
//! `GS,(x)`. The text inside the parentheses is ignored; what is captured
//! is always a decimal number:
//!
//! ```text
//! line:     "ST,GS,   12.50 kg"
//! pattern:  "GS,(#)"
//!               ^^^ prefix
//! result:   "12.50"
//! ```
//!
//! Blanks (space, tab) between prefix and number are skipped. An empty
//! prefix starts the search at column 0.

/// Split `pattern` into its prefix, or `None` if it has no `(` ... `)` group.
fn pattern_prefix(pattern: &str) -> Option<&str> {
    let open = pattern.find('(')?;
    pattern[open + 1..].find(')')?;
    Some(&pattern[..open])
}

/// Number captured from `line` by `pattern`, or `""` when nothing matches.
pub fn extract_weight<'a>(pattern: &str, line: &'a str) -> &'a str {
    let Some(prefix) = pattern_prefix(pattern) else {
        return "";
    };

    let start = if prefix.is_empty() {
        0
    } else {
        match line.find(prefix) {
            Some(pos) => pos + prefix.len(),
            None => return "",
        }
    };

    let bytes = line.as_bytes();
    let mut i = start;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }

    let begin = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == begin {
        return "";
    }

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }

    &line[begin..i]
}
