//! Static keyword rules mapping user queries to categories and URLs.
//!
//! The [`PatternMatcher`] is the always-available fallback behind semantic
//! routing. Rules are evaluated in declaration order and the first rule
//! whose keyword set matches wins, so more specific intents (appraisal,
//! custom design) are declared before broad ones (diamonds, FAQ).

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::keywords::KeywordSet;
use crate::models::{Category, MatchResult};

/// Uncompiled rule as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub keywords: Vec<String>,
    pub category: Category,
    pub url: String,
}

/// A compiled `(keywords, category, url)` rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub keywords: KeywordSet,
    pub category: Category,
    pub url: String,
}

impl PatternRule {
    pub fn compile(spec: &RuleSpec) -> Result<Self> {
        if spec.url.trim().is_empty() {
            bail!("pattern rule for {} has an empty url", spec.category);
        }
        Ok(Self {
            keywords: KeywordSet::new(&spec.keywords)?,
            category: spec.category,
            url: spec.url.trim().to_string(),
        })
    }
}

/// Ordered list of pattern rules; first match wins.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: Vec<PatternRule>,
}

const STORE: &str = "https://thediamondfamily.com";

/// Built-in rule table: `(keywords, category, path)`.
const BUILTIN_RULES: &[(&[&str], Category, &str)] = &[
    (
        &["appraisal", "appraisals", "appraise", "appraised", "insurance valuation"],
        Category::Services,
        "/appraisals",
    ),
    (
        &["custom design", "custom ring", "custom jewelry", "design my own", "bespoke", "cad"],
        Category::Design,
        "/custom-jewelry",
    ),
    (
        &["engagement ring", "engagement rings", "proposal", "propose"],
        Category::Products,
        "/engagement-rings",
    ),
    (
        &["wedding band", "wedding bands", "wedding ring", "wedding rings"],
        Category::Products,
        "/wedding-bands",
    ),
    (
        &["lab diamond", "lab diamonds", "lab-grown", "lab grown", "diamond", "diamonds", "loose stone"],
        Category::Products,
        "/diamonds",
    ),
    (
        &["repair", "resize", "resizing", "cleaning", "polish", "restoration"],
        Category::Services,
        "/jewelry-repair",
    ),
    (
        &["appointment", "book a visit", "consultation", "showroom", "visit the store"],
        Category::Services,
        "/book-appointment",
    ),
    (
        &["warranty", "return policy", "returns", "shipping", "financing", "4c's", "certification"],
        Category::Faqs,
        "/faq",
    ),
];

impl PatternMatcher {
    /// Compile a matcher from configured rule specs, keeping their order.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .map(PatternRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// The built-in storefront rule table.
    pub fn builtin() -> Result<Self> {
        let specs: Vec<RuleSpec> = BUILTIN_RULES
            .iter()
            .map(|(keywords, category, path)| RuleSpec {
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                category: *category,
                url: format!("{}{}", STORE, path),
            })
            .collect();
        Self::from_specs(&specs)
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Find the first rule matching `query`.
    pub fn find(&self, query: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.keywords.matches(query))
    }

    /// Resolve `query` to a pattern match, or [`MatchResult::none`].
    pub fn resolve(&self, query: &str) -> MatchResult {
        match self.find(query) {
            Some(rule) => MatchResult::pattern(rule.category, rule.url.clone()),
            None => MatchResult::none(),
        }
    }
}
