//! Final whitespace pass over serialised document text.
//!
//! Serialisation already produces the canonical layout; what remains are
//! artefacts carried inside block text by the backend: Windows or old-Mac
//! line breaks, trailing spaces, zero-width characters and BOMs copied out
//! of the PDF. The pass is line-oriented and idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters that render as nothing and only confuse diffing and search.
const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n?").unwrap());

/// Clean serialised text.
///
/// Every line loses invisible characters and trailing whitespace. Runs of
/// blank lines become a single blank line, leading and trailing blank lines
/// are dropped, and non-empty output ends with exactly one `\n`. Text with
/// nothing visible in it cleans to the empty string.
pub fn clean_text(input: &str) -> String {
    let unified = RE_LINE_BREAK.replace_all(input, "\n");
    let mut out = String::with_capacity(unified.len() + 1);
    let mut pending_blank = false;

    for raw in unified.split('\n') {
        let visible: String = raw.chars().filter(|c| !INVISIBLE.contains(c)).collect();
        let line = visible.trim_end();
        if line.is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        pending_blank = false;
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}
