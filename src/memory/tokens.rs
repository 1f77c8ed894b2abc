//! Token counting for context budgets.
//!
//! Uses a `tokenizers` definition file when one is configured; otherwise
//! falls back to a chars/4 approximation. The approximation is a valid
//! budget measure, not an error path.

use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{info, warn};

/// Marker appended whenever text is cut to fit a budget
pub const TRUNCATION_MARKER: &str = "...[truncated]";

const CHARS_PER_TOKEN: usize = 4;

/// Budget-oriented token counter
pub struct TokenCounter {
    tokenizer: Option<Tokenizer>,
}

impl TokenCounter {
    /// Load the tokenizer file if given; degrade to approximation when
    /// loading fails.
    pub fn new(tokenizer_file: Option<&Path>) -> Self {
        let tokenizer = tokenizer_file.and_then(|path| match Tokenizer::from_file(path) {
            Ok(tokenizer) => {
                info!(path = %path.display(), "loaded tokenizer");
                Some(tokenizer)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load tokenizer, using approximation");
                None
            }
        });
        Self { tokenizer }
    }

    /// Approximation-only counter
    pub fn approximate() -> Self {
        Self { tokenizer: None }
    }

    /// Count tokens in `text`
    pub fn count(&self, text: &str) -> usize {
        if let Some(tokenizer) = &self.tokenizer {
            if let Ok(encoding) = tokenizer.encode(text, false) {
                return encoding.get_ids().len();
            }
        }
        text.chars().count() / CHARS_PER_TOKEN
    }

    /// Cut `text` to at most `max_tokens`, appending the truncation
    /// marker when anything was dropped.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        if let Some(tokenizer) = &self.tokenizer {
            if let Ok(encoding) = tokenizer.encode(text, false) {
                let ids = encoding.get_ids();
                if ids.len() <= max_tokens {
                    return text.to_string();
                }
                if let Ok(decoded) = tokenizer.decode(&ids[..max_tokens], true) {
                    return format!("{decoded}{TRUNCATION_MARKER}");
                }
            }
        }

        let max_chars = max_tokens * CHARS_PER_TOKEN;
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}{TRUNCATION_MARKER}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approximate_count() {
        let counter = TokenCounter::approximate();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcdefgh"), 2);
    }

    #[test]
    fn test_truncate_appends_marker_only_when_cut() {
        let counter = TokenCounter::approximate();
        let short = "brief";
        assert_eq!(counter.truncate(short, 10), short);

        let long = "x".repeat(100);
        let truncated = counter.truncate(&long, 5);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncated.chars().count(), 20 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_missing_tokenizer_file_degrades() {
        let counter = TokenCounter::new(Some(Path::new("/nonexistent/tokenizer.json")));
        assert_eq!(counter.count("abcdefgh"), 2);
    }
}
