//! Case-insensitive keyword and phrase matching.
//!
//! A [`KeywordSet`] compiles a list of words or multi-word phrases into a
//! single regex anchored on word boundaries, so `"deal"` matches
//! `"any deals today?"` but not `"ideal"`. Whitespace inside a phrase
//! matches any run of whitespace or hyphens (`"custom design"` also
//! matches `"custom-design"`).

use anyhow::{bail, Context, Result};
use regex::Regex;

/// A compiled, immutable set of trigger keywords.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<String>,
    regex: Regex,
}

impl KeywordSet {
    /// Compile a keyword set.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or every keyword is blank.
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            bail!("keyword set must contain at least one non-empty keyword");
        }

        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| {
                k.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"[\s\-]+")
            })
            .collect();

        let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
        let regex = Regex::new(&pattern)
            .with_context(|| format!("Failed to compile keyword set: {:?}", keywords))?;

        Ok(Self { keywords, regex })
    }

    /// Returns true if any keyword occurs in `text` on word boundaries.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The normalized (lowercased, trimmed) keywords.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundaries() {
        let set = KeywordSet::new(["deal", "deals"]).unwrap();
        assert!(set.matches("Any DEALS this week?"));
        assert!(set.matches("is that a good deal"));
        assert!(!set.matches("the ideal ring"));
    }

    #[test]
    fn test_phrase_with_flexible_separator() {
        let set = KeywordSet::new(["custom design"]).unwrap();
        assert!(set.matches("I want a Custom  Design"));
        assert!(set.matches("a custom-design pendant"));
        assert!(!set.matches("custom ring design"));
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let set = KeywordSet::new(["4c's", "14k"]).unwrap();
        assert!(set.matches("what are the 4C's?"));
        assert!(set.matches("14k gold"));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(KeywordSet::new(Vec::<String>::new()).is_err());
        assert!(KeywordSet::new(["  "]).is_err());
    }
}
