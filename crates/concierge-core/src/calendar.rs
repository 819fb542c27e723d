//! Deterministic calendar selection from conversation text.
//!
//! A fixed decision list evaluated in priority order:
//!
//! | Priority | Trigger vocabulary | Calendar |
//! |----------|--------------------|----------|
//! | 1 | appraisal, evaluation, assessment, value, worth | [`CalendarKind::Appraisal`] |
//! | 2 | custom, design, bespoke, personalized, unique | [`CalendarKind::CustomDesign`] |
//! | 3 | campaign, promotion, special offer, deal | [`CalendarKind::Campaign`] |
//! | 4 | anything else | [`CalendarKind::Demo`] |
//!
//! Appraisal and custom-design vocabulary frequently co-occur ("what is my
//! custom ring worth?"); appraisal wins because it implies a different
//! service workflow.

use anyhow::Result;
use serde::Deserialize;

use crate::keywords::KeywordSet;
use crate::models::{CalendarId, CalendarKind};

const APPRAISAL: &[&str] = &[
    "appraisal",
    "appraisals",
    "appraise",
    "appraised",
    "audit",
    "evaluation",
    "evaluate",
    "assessment",
    "assess",
    "value",
    "valuation",
    "worth",
];

const CUSTOM_DESIGN: &[&str] = &[
    "custom",
    "customize",
    "customized",
    "design",
    "designs",
    "bespoke",
    "personalized",
    "personalised",
    "unique",
    "one of a kind",
];

const CAMPAIGN: &[&str] = &[
    "campaign",
    "promotion",
    "promotions",
    "promo",
    "special offer",
    "special offers",
    "deal",
    "deals",
    "sale",
];

/// Pure, total mapping from conversation text to one of four calendars.
#[derive(Debug, Clone)]
pub struct CalendarSelector {
    rules: Vec<(KeywordSet, CalendarKind)>,
}

impl CalendarSelector {
    pub fn new() -> Result<Self> {
        let rules = [
            (APPRAISAL, CalendarKind::Appraisal),
            (CUSTOM_DESIGN, CalendarKind::CustomDesign),
            (CAMPAIGN, CalendarKind::Campaign),
        ]
        .into_iter()
        .map(|(words, kind)| KeywordSet::new(words).map(|set| (set, kind)))
        .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Select the calendar for `text`. Never fails.
    pub fn select(&self, text: &str) -> CalendarKind {
        self.rules
            .iter()
            .find(|(set, _)| set.matches(text))
            .map(|(_, kind)| *kind)
            .unwrap_or(CalendarKind::Demo)
    }
}

/// Remote calendar ids for each [`CalendarKind`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarDirectory {
    #[serde(default = "default_demo")]
    pub demo: String,
    #[serde(default = "default_custom_design")]
    pub custom_design: String,
    #[serde(default = "default_appraisal")]
    pub appraisal: String,
    #[serde(default = "default_campaign")]
    pub campaign: String,
}

fn default_demo() -> String {
    "1a2FZj1zqXPbPnrElQD1".to_string()
}
fn default_custom_design() -> String {
    "CuOcD0x88h7NPvfub9".to_string()
}
fn default_appraisal() -> String {
    "GHPSw9oQ8DDQJaJVVQbE".to_string()
}
fn default_campaign() -> String {
    "IRCCTTBGxfhK8pRbNfT".to_string()
}

impl Default for CalendarDirectory {
    fn default() -> Self {
        Self {
            demo: default_demo(),
            custom_design: default_custom_design(),
            appraisal: default_appraisal(),
            campaign: default_campaign(),
        }
    }
}

impl CalendarDirectory {
    pub fn id_for(&self, kind: CalendarKind) -> CalendarId {
        let id = match kind {
            CalendarKind::Demo => &self.demo,
            CalendarKind::CustomDesign => &self.custom_design,
            CalendarKind::Appraisal => &self.appraisal,
            CalendarKind::Campaign => &self.campaign,
        };
        CalendarId::new(id.clone())
    }

    /// Reverse lookup; `None` for ids outside the configured set.
    pub fn kind_of(&self, id: &str) -> Option<CalendarKind> {
        CalendarKind::ALL
            .into_iter()
            .find(|k| self.id_for(*k).as_str() == id)
    }
}
