//! Input validation for entries, tags and search text.

use crate::error::{ChronicleError, Result};

pub const MAX_TAG_BYTES: usize = 128;
pub const MAX_TAGS_PER_ENTRY: usize = 100;
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Reject empty (after trim) or oversized messages.
pub fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(ChronicleError::Validation(
            "Message must not be empty".to_string(),
        ));
    }
    if message.len() > MAX_MESSAGE_BYTES {
        return Err(ChronicleError::Validation(format!(
            "Message too large (max {} bytes)",
            MAX_MESSAGE_BYTES
        )));
    }
    Ok(())
}

/// Trim, deduplicate and sort tags.
///
/// Tags are compared byte-for-byte: no case folding, so non-ASCII tags are
/// stored exactly as given.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(ChronicleError::Validation(
                "Empty tag is not allowed".to_string(),
            ));
        }
        if trimmed.len() > MAX_TAG_BYTES {
            return Err(ChronicleError::Validation(format!(
                "Tag too long (max {} bytes)",
                MAX_TAG_BYTES
            )));
        }
        normalized.push(trimmed.to_string());
    }

    normalized.sort();
    normalized.dedup();

    if normalized.len() > MAX_TAGS_PER_ENTRY {
        return Err(ChronicleError::Validation(format!(
            "Too many tags (max {})",
            MAX_TAGS_PER_ENTRY
        )));
    }

    Ok(normalized)
}

/// Sort and deduplicate tags without otherwise touching them.
pub fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut unique = tags.to_vec();
    unique.sort();
    unique.dedup();
    unique
}

/// Turn free text into an FTS5 query.
///
/// Every whitespace-separated word becomes a quoted phrase, so operators and
/// punctuation in user input are matched literally. Words are AND-ed.
/// Returns `None` when the text has no words.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_message() {
        assert!(validate_message("fixed the build").is_ok());
        assert!(validate_message("").is_err());
        assert!(validate_message(" \n\t ").is_err());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_BYTES + 1)).is_err());
    }

    #[test]
    fn test_normalize_tags_trims_dedups_and_sorts() {
        let tags = vec![
            " work ".to_string(),
            "deploy".to_string(),
            "work".to_string(),
            "Work".to_string(),
        ];
        let normalized = normalize_tags(&tags).unwrap();
        assert_eq!(normalized, vec!["Work", "deploy", "work"]);
    }

    #[test]
    fn test_normalize_tags_keeps_unicode() {
        let tags = vec!["日本語".to_string(), "🚀".to_string(), "café".to_string()];
        let normalized = normalize_tags(&tags).unwrap();
        assert_eq!(normalized, vec!["café", "日本語", "🚀"]);
    }

    #[test]
    fn test_normalize_tags_rejects_bad_input() {
        assert!(normalize_tags(&["  ".to_string()]).is_err());
        assert!(normalize_tags(&["x".repeat(MAX_TAG_BYTES + 1)]).is_err());

        let many: Vec<String> = (0..=MAX_TAGS_PER_ENTRY).map(|i| format!("t{}", i)).collect();
        assert!(normalize_tags(&many).is_err());
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("bug fix").as_deref(), Some("\"bug\" \"fix\""));
        assert_eq!(fts_query("say \"hi\"").as_deref(), Some("\"say\" \"\"\"hi\"\"\""));
        assert_eq!(fts_query("NOT OR*").as_deref(), Some("\"NOT\" \"OR*\""));
        assert_eq!(fts_query("   "), None);
    }
}
