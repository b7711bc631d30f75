//! Post-processing: deterministic cleanup of generated page text.
//!
//! Chat models wrap short answers in artefacts that look fine in a chat
//! window but print badly: code fences around the whole answer, Windows
//! line endings, runs of blank lines, zero-width characters
//! that render as tofu in the PDF font. Each rule below is a pure
//! `&str → String` pass.
//!
//! ## Rule Order
//!
//! Fences are stripped on the trimmed input first so the
//! line-based rules see the real content; the invisible-character pass runs
//! before the final trim so a trailing BOM does not survive.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw completion.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim the result
///
/// Anything else, quotation marks included, is content and kept.
pub fn clean_text(input: &str) -> String {
    let s = strip_outer_fences(input.trim());
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*)\r?\n```$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(clean_text("Once upon a time."), "Once upon a time.");
    }

    #[test]
    fn fences_stripped() {
        assert_eq!(clean_text("```\nA story.\n```"), "A story.");
        assert_eq!(clean_text("```markdown\n# Title\nBody\n```"), "# Title\nBody");
    }

    #[test]
    fn quotation_marks_are_content() {
        assert_eq!(clean_text("  \"Dream big.\"\n"), "\"Dream big.\"");
        assert_eq!(clean_text("\u{201C}Be kind.\u{201D}"), "\u{201C}Be kind.\u{201D}");
        let attributed = "\"Be kind.\" — Anonymous";
        assert_eq!(clean_text(attributed), attributed);
    }

    #[test]
    fn crlf_and_blank_runs_normalised() {
        assert_eq!(clean_text("a  \r\n\r\n\r\n\r\nb\r\n"), "a\n\nb");
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(clean_text("\u{FEFF}Hel\u{200B}lo\u{00AD}"), "Hello");
    }
}
