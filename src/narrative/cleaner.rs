//! Removal of JSON artifacts that leak into narration text

use once_cell::sync::Lazy;
use regex::Regex;

/// Narration shorter than this is rejected
pub const MIN_NARRATIVE_CHARS: usize = 50;

/// A cleaned narration replaces the original only when longer than this
pub const MIN_CLEANED_CHARS: usize = 100;

const PLACEHOLDER_NARRATIVE: &str = "The story continues...";

static FIELD_OPENER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(response|narration)"\s*:\s*""#).expect("field opener pattern is valid")
});

static TRAILING_FIELDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["suggested_actions", "memory_updates", "world_state"]
        .iter()
        .map(|field| {
            Regex::new(&format!(r#"(?i)",?\s*"{}"[\s\S]*"#, field)).expect("trailing field pattern is valid")
        })
        .collect()
});

static TRAILING_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,}]*\s*$").expect("trailing punctuation pattern is valid"));
static LEADING_QUOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[\s"{]*"#).expect("leading quote pattern is valid"));

fn has_json_artifacts(text: &str) -> bool {
    text.contains("\"response\"") || text.contains("suggested_actions") || text.contains("\"narration\"")
}

/// Strip JSON field names and trailing structure from narration
///
/// Text without obvious artifacts is only trimmed.
pub fn clean_narrative_text(text: &str) -> String {
    if !has_json_artifacts(text) {
        return text.trim().to_string();
    }

    let mut cleaned = FIELD_OPENER.replace_all(text, "").into_owned();
    for pattern in TRAILING_FIELDS.iter() {
        cleaned = pattern.replace(&cleaned, "").into_owned();
    }
    cleaned = TRAILING_PUNCTUATION.replace(&cleaned, "").into_owned();
    cleaned = LEADING_QUOTES.replace(&cleaned, "").into_owned();

    decode_escapes(trim_closing_quotes(cleaned.trim()))
}

/// Strip trailing whitespace and unescaped quotes; an escaped `\"` belongs to the text
fn trim_closing_quotes(text: &str) -> &str {
    let mut rest = text.trim_end();
    while let Some(stripped) = rest.strip_suffix('"') {
        if stripped.ends_with('\\') {
            break;
        }
        rest = stripped.trim_end();
    }
    rest
}

/// Decode the JSON string escapes left in text cut out of a raw document
fn decode_escapes(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => {}
            Some(escaped @ ('"' | '\\' | '/')) => decoded.push(escaped),
            Some(other) => {
                decoded.push('\\');
                decoded.push(other);
            }
            None => decoded.push('\\'),
        }
    }
    decoded
}

/// Clean `text`, keeping the original unless cleaning changed it and left enough behind
pub fn clean_if_improved(text: &str) -> String {
    let cleaned = clean_narrative_text(text);
    if cleaned != text && cleaned.chars().count() > MIN_CLEANED_CHARS {
        cleaned
    } else {
        text.to_string()
    }
}

/// Whether narration is fit to show the player
pub fn is_narrative_valid(text: &str) -> bool {
    if text.chars().count() < MIN_NARRATIVE_CHARS {
        return false;
    }
    if text.trim() == PLACEHOLDER_NARRATIVE {
        return false;
    }
    !(text.contains("\"response\"") || text.contains("suggested_actions"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROSE: &str = "Elizabeth stepped into the drawing room, where the fire crackled and \
        Mrs. Bennet was already deep in conversation about the new tenant of Netherfield.";

    #[test]
    fn test_plain_text_only_trimmed() {
        assert_eq!(clean_narrative_text("  Hello there.  "), "Hello there.");
    }

    #[test]
    fn test_strips_leaked_json_object() {
        let leaked = format!(
            r#"{{"response": "{}", "suggested_actions": [{{"id": "a", "text": "Go"}}]}}"#,
            PROSE
        );
        assert_eq!(clean_narrative_text(&leaked), PROSE);
    }

    #[test]
    fn test_strips_narration_field() {
        let leaked = format!(r#""narration": "{}", "memory_updates": []"#, PROSE);
        assert_eq!(clean_narrative_text(&leaked), PROSE);
    }

    #[test]
    fn test_trailing_field_match_is_case_insensitive() {
        let leaked = format!(r#""response": "{}", "SUGGESTED_ACTIONS": []"#, PROSE);
        assert_eq!(clean_narrative_text(&leaked), PROSE);
    }

    #[test]
    fn test_truncated_document_escapes_decoded() {
        let leaked = r#"{"response": "Jane smiled.\n\n\"Lizzy,\" she said, \"he is just what a young man ought to be.\"", "suggested_actions": [{"id": "#;
        assert_eq!(
            clean_narrative_text(leaked),
            "Jane smiled.\n\n\"Lizzy,\" she said, \"he is just what a young man ought to be.\""
        );
    }

    #[test]
    fn test_plain_text_backslashes_untouched() {
        assert_eq!(clean_narrative_text(r"C:\path \n stays"), r"C:\path \n stays");
    }

    #[test]
    fn test_clean_if_improved_keeps_short_results() {
        let leaked = r#""response": "Too short", "suggested_actions": []"#;
        assert_eq!(clean_if_improved(leaked), leaked);

        let long = format!(r#""response": "{}", "suggested_actions": []"#, PROSE);
        assert_eq!(clean_if_improved(&long), PROSE);
    }

    #[test]
    fn test_validity() {
        assert!(is_narrative_valid(PROSE));
        assert!(!is_narrative_valid("Too short."));
        assert!(!is_narrative_valid(""));
        assert!(!is_narrative_valid(&format!("{} suggested_actions", PROSE)));
        assert!(!is_narrative_valid("The story continues..."));
    }
}
