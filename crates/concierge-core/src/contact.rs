//! Contact extraction from free-form conversation turns.
//!
//! Scans the user side of a conversation for an email address, a North
//! American phone number, and a self-introduced name, and condenses the
//! most recent user turns into a bounded summary for the remote note.
//!
//! Extraction never fails: fields that cannot be found are left `None`.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::models::{ContactRecord, ConversationTurn, PhoneNumber, Role};

/// Number of trailing user turns folded into the summary.
pub const DEFAULT_SUMMARY_TURNS: usize = 5;
/// Character budget of the summary.
pub const DEFAULT_SUMMARY_CHARS: usize = 500;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b")
            .expect("Invalid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+?1[\-.\s]?)?\(?\b(\d{3})\)?[\-.\s]?(\d{3})[\-.\s]?(\d{4})\b")
            .expect("Invalid phone regex")
    })
}

/// "my name is jane doe", any casing, up to two words.
fn stated_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bmy\s+name\s+is\s+([a-z][a-z'\-]+)(?:\s+([a-z][a-z'\-]+))?")
            .expect("Invalid stated-name regex")
    })
}

/// "I'm Jane Doe" / "this is Jane". The name itself must be capitalized,
/// otherwise "I'm looking for a ring" would yield a name.
fn introduced_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:[Ii]['’]m|[Ii]\s+am|[Tt]his\s+is|[Cc]all\s+me)\s+([A-Z][a-z'\-]+)(?:\s+([A-Z][a-z'\-]+))?",
        )
        .expect("Invalid introduced-name regex")
    })
}

const NOT_A_NAME: &[&str] = &[
    "and", "but", "or", "i", "im", "my", "the", "a", "an", "here", "looking", "interested",
    "just", "not", "so", "very", "from", "with", "at", "in", "on", "to", "also", "calling",
];

/// Validate and normalize an email address. Returns `None` unless the
/// whole input is a single address.
pub fn validate_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let m = email_regex().find(trimmed)?;
    (m.start() == 0 && m.end() == trimmed.len()).then(|| trimmed.to_string())
}

/// Validate a phone number given on its own (any separators).
pub fn validate_phone(raw: &str) -> Option<PhoneNumber> {
    let caps = phone_regex().captures(raw.trim())?;
    phone_from_captures(&caps)
}

fn phone_from_captures(caps: &Captures<'_>) -> Option<PhoneNumber> {
    let digits: String = (1..=3)
        .filter_map(|i| caps.get(i).map(|m| m.as_str()))
        .collect();
    PhoneNumber::from_digits(&digits)
}

/// First email address in `text`.
pub fn find_email(text: &str) -> Option<String> {
    email_regex().find(text).map(|m| m.as_str().to_string())
}

/// First phone number in `text`, digits only. Digits inside an email
/// address never count.
pub fn find_phone(text: &str) -> Option<PhoneNumber> {
    let emails: Vec<_> = email_regex().find_iter(text).map(|m| m.range()).collect();
    phone_regex()
        .captures_iter(text)
        .filter(|caps| {
            let Some(m) = caps.get(0) else {
                return false;
            };
            // Reject matches glued to a preceding digit (e.g. a longer account number).
            !text[..m.start()].ends_with(|c: char| c.is_ascii_digit())
                && !emails.iter().any(|e| m.start() < e.end && e.start < m.end())
        })
        .find_map(|caps| phone_from_captures(&caps))
}

/// First self-introduced name in `text`, title-cased.
pub fn find_name(text: &str) -> Option<String> {
    let stated = stated_name_regex().captures(text);
    let introduced = introduced_name_regex().captures(text);

    // Prefer whichever phrasing appears first in the text.
    let caps = match (stated, introduced) {
        (Some(a), Some(b)) => {
            if a.get(0)?.start() <= b.get(0)?.start() {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    let parts: Vec<String> = (1..=2)
        .filter_map(|i| caps.get(i).map(|m| m.as_str()))
        .take_while(|w| !NOT_A_NAME.contains(&w.to_lowercase().as_str()))
        .map(title_case)
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Truncate `text` to at most `max_chars` characters at a word boundary.
///
/// A single token longer than the whole budget is cut at the budget, since
/// there is no earlier boundary to fall back to.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());

    // If the cut lands exactly on whitespace the prefix ends on a word.
    let window = &text[..cut];
    if text[cut..].starts_with(char::is_whitespace) {
        return window.trim_end().to_string();
    }

    match window.rfind(char::is_whitespace) {
        Some(idx) => window[..idx].trim_end().to_string(),
        None => window.to_string(),
    }
}

/// Extracts [`ContactRecord`]s from conversations.
#[derive(Debug, Clone, Copy)]
pub struct ContactExtractor {
    summary_turns: usize,
    summary_chars: usize,
}

impl Default for ContactExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_TURNS, DEFAULT_SUMMARY_CHARS)
    }
}

impl ContactExtractor {
    pub fn new(summary_turns: usize, summary_chars: usize) -> Self {
        Self {
            summary_turns: summary_turns.max(1),
            summary_chars: summary_chars.max(1),
        }
    }

    /// Extract contact details from the user turns of a conversation.
    pub fn extract(&self, turns: &[ConversationTurn]) -> ContactRecord {
        let user_text = user_turns(turns)
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        ContactRecord {
            name: find_name(&user_text),
            email: find_email(&user_text),
            phone: find_phone(&user_text),
            summary: self.summarize(turns),
        }
    }

    /// Join the last N user turns and truncate to the character budget.
    pub fn summarize(&self, turns: &[ConversationTurn]) -> String {
        let recent: Vec<&str> = user_turns(turns).map(|t| t.text.trim()).collect();
        let skip = recent.len().saturating_sub(self.summary_turns);
        let joined = recent[skip..]
            .iter()
            .filter(|t| !t.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
        truncate_at_word(&collapsed, self.summary_chars)
    }
}

fn user_turns(turns: &[ConversationTurn]) -> impl Iterator<Item = &ConversationTurn> {
    turns.iter().filter(|t| t.role == Role::User)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> Vec<ConversationTurn> {
        vec![ConversationTurn::user(text)]
    }

    #[test]
    fn test_email_and_phone() {
        let rec = ContactExtractor::default()
            .extract(&one("you can reach me at jane@example.com or 314-555-0199"));
        assert_eq!(rec.email.as_deref(), Some("jane@example.com"));
        assert_eq!(rec.phone.as_ref().map(|p| p.digits()), Some("3145550199"));
        assert_eq!(rec.phone.unwrap().to_string(), "(314) 555-0199");
    }

    #[test]
    fn test_phone_formats() {
        for raw in [
            "(555) 123-4567",
            "555.123.4567",
            "5551234567",
            "+1 555 123 4567",
            "1-555-123-4567",
        ] {
            assert_eq!(
                find_phone(&format!("call {} anytime", raw)).map(|p| p.digits().to_string()),
                Some("5551234567".to_string()),
                "failed on {}",
                raw
            );
        }
        assert!(find_phone("order 9876543210123").is_none());
        assert!(find_phone("only 555-1234").is_none());
        assert!(find_phone("text me at 3145550199@txt.att.net").is_none());
        assert_eq!(
            find_phone("3145550199@txt.att.net or 314-555-0123").map(|p| p.digits().to_string()),
            Some("3145550123".to_string())
        );
    }

    #[test]
    fn test_first_match_wins() {
        let rec = ContactExtractor::default().extract(&[
            ConversationTurn::user("first: a@one.com"),
            ConversationTurn::user("second: b@two.com"),
        ]);
        assert_eq!(rec.email.as_deref(), Some("a@one.com"));
    }

    #[test]
    fn test_assistant_turns_ignored() {
        let rec = ContactExtractor::default().extract(&[
            ConversationTurn::assistant("Email us at help@store.com or 800-555-0100"),
            ConversationTurn::user("thanks!"),
        ]);
        assert!(rec.email.is_none());
        assert!(rec.phone.is_none());
    }

    #[test]
    fn test_names() {
        assert_eq!(
            find_name("Hi, I'm John Smith. You can reach me at john.smith@email.com").as_deref(),
            Some("John Smith")
        );
        assert_eq!(find_name("my name is jane and I love opals").as_deref(), Some("Jane"));
        assert_eq!(find_name("My name is Ana Lopez").as_deref(), Some("Ana Lopez"));
        assert_eq!(find_name("I'm looking for an engagement ring"), None);
        assert_eq!(find_name("Emily wants a bracelet"), None);
    }

    #[test]
    fn test_no_contact_info() {
        let rec = ContactExtractor::default().extract(&one("No contact info here, just asking about diamonds"));
        assert!(rec.name.is_none());
        assert!(!rec.has_channel());
        assert_eq!(rec.summary, "No contact info here, just asking about diamonds");
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate_email(" a.b@c.io ").as_deref(), Some("a.b@c.io"));
        assert!(validate_email("not an email").is_none());
        assert!(validate_email("a@b.com and more").is_none());
        assert_eq!(validate_phone("(314) 555-0199").unwrap().digits(), "3145550199");
        assert!(validate_phone("12345").is_none());
    }

    #[test]
    fn test_truncate_never_mid_word() {
        let text = "alpha beta gamma delta";
        assert_eq!(truncate_at_word(text, 100), text);
        assert_eq!(truncate_at_word(text, 13), "alpha beta");
        assert_eq!(truncate_at_word(text, 10), "alpha beta");
        assert_eq!(truncate_at_word(text, 11), "alpha beta");
        assert_eq!(truncate_at_word("supercalifragilistic", 5), "super");
    }

    #[test]
    fn test_summary_uses_last_user_turns_within_budget() {
        let mut turns = Vec::new();
        for i in 0..8 {
            turns.push(ConversationTurn::user(format!("message{}", i)));
            turns.push(ConversationTurn::assistant("ok"));
        }
        let ex = ContactExtractor::new(5, 500);
        assert_eq!(
            ex.summarize(&turns),
            "message3 message4 message5 message6 message7"
        );

        let long: Vec<ConversationTurn> = (0..5)
            .map(|_| ConversationTurn::user("word ".repeat(60)))
            .collect();
        let summary = ContactExtractor::default().summarize(&long);
        assert!(summary.chars().count() <= DEFAULT_SUMMARY_CHARS);
        assert!(summary.ends_with("word"));
    }
}
