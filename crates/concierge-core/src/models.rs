//! Core data models shared by the router and the scheduling pipeline.
//!
//! These types are the only structured outputs handed to the
//! reply-assembly collaborator: [`MatchResult`] from routing and
//! [`SchedulingOutcome`] from scheduling.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference document categories, one vector index per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Faqs,
    Products,
    Services,
    Design,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Faqs,
        Category::Products,
        Category::Services,
        Category::Design,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Faqs => "faqs",
            Category::Products => "products",
            Category::Services => "services",
            Category::Design => "design",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faq" | "faqs" => Ok(Category::Faqs),
            "product" | "products" => Ok(Category::Products),
            "service" | "services" => Ok(Category::Services),
            "design" => Ok(Category::Design),
            other => anyhow::bail!(
                "Unknown category: '{}'. Must be faqs, products, services, or design.",
                other
            ),
        }
    }
}

/// Which resolver produced a [`MatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Semantic,
    Pattern,
    None,
}

/// The routing decision for a single query.
///
/// Construct through [`MatchResult::semantic`], [`MatchResult::pattern`]
/// or [`MatchResult::none`] so that `confidence` is only ever present on
/// semantic matches and at most one URL is carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub category: Option<Category>,
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub source: MatchSource,
}

impl MatchResult {
    pub fn semantic(category: Category, url: impl Into<String>, confidence: f32) -> Self {
        Self {
            category: Some(category),
            url: Some(url.into()),
            confidence: Some(confidence.clamp(0.0, 1.0)),
            source: MatchSource::Semantic,
        }
    }

    pub fn pattern(category: Category, url: impl Into<String>) -> Self {
        Self {
            category: Some(category),
            url: Some(url.into()),
            confidence: None,
            source: MatchSource::Pattern,
        }
    }

    pub fn none() -> Self {
        Self {
            category: None,
            url: None,
            confidence: None,
            source: MatchSource::None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.source != MatchSource::None
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
    System,
}

/// One message in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(alias = "content")]
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// A ten-digit North American phone number stored as digits only.
///
/// `Display` renders `(314) 555-0199`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Build from any string holding exactly ten digits, or eleven with a
    /// leading country code `1`. Separators are ignored.
    pub fn from_digits(raw: &str) -> Option<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.len() {
            10 => Some(Self(digits)),
            11 if digits.starts_with('1') => Some(Self(digits[1..].to_string())),
            _ => None,
        }
    }

    pub fn digits(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.0;
        write!(f, "({}) {}-{}", &d[..3], &d[3..6], &d[6..])
    }
}

/// Extracted, partially-filled customer contact data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<PhoneNumber>,
    pub summary: String,
}

impl ContactRecord {
    /// At least one reachable channel is required before scheduling.
    pub fn has_channel(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }
}

/// The four fixed scheduling calendars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarKind {
    Demo,
    CustomDesign,
    Appraisal,
    Campaign,
}

impl CalendarKind {
    pub const ALL: [CalendarKind; 4] = [
        CalendarKind::Demo,
        CalendarKind::CustomDesign,
        CalendarKind::Appraisal,
        CalendarKind::Campaign,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarKind::Demo => "demo",
            CalendarKind::CustomDesign => "custom_design",
            CalendarKind::Appraisal => "appraisal",
            CalendarKind::Campaign => "campaign",
        }
    }

    /// Human label used in confirmation messages.
    pub fn label(&self) -> &'static str {
        match self {
            CalendarKind::Demo => "consultation",
            CalendarKind::CustomDesign => "custom design consultation",
            CalendarKind::Appraisal => "appraisal appointment",
            CalendarKind::Campaign => "promotion consultation",
        }
    }
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque remote identifier of one configured calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarId(String);

impl CalendarId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CalendarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested appointment slot, local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// A scheduling attempt, constructed by the orchestrator and sent once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingRequest {
    pub contact: ContactRecord,
    pub calendar: CalendarKind,
    pub calendar_id: CalendarId,
    pub window: TimeWindow,
}

/// Status of a scheduling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStatus {
    Success,
    GatewayUnavailable,
    InvalidContact,
    RemoteError,
}

impl SchedulingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingStatus::Success => "success",
            SchedulingStatus::GatewayUnavailable => "gateway_unavailable",
            SchedulingStatus::InvalidContact => "invalid_contact",
            SchedulingStatus::RemoteError => "remote_error",
        }
    }
}

/// Result of a scheduling attempt.
///
/// `Succeeded` always carries both remote ids; every failure class is a
/// `Degraded` value with a user-presentable message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SchedulingOutcome {
    Succeeded {
        contact_id: String,
        appointment_id: String,
        calendar: CalendarKind,
        start: NaiveDateTime,
        message: String,
    },
    Degraded {
        status: SchedulingStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        contact_id: Option<String>,
        message: String,
    },
}

impl SchedulingOutcome {
    pub fn status(&self) -> SchedulingStatus {
        match self {
            SchedulingOutcome::Succeeded { .. } => SchedulingStatus::Success,
            SchedulingOutcome::Degraded { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SchedulingOutcome::Succeeded { message, .. }
            | SchedulingOutcome::Degraded { message, .. } => message,
        }
    }
}
