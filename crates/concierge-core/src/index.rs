//! In-memory, per-category nearest-neighbor index.
//!
//! Entries are embedded offline and loaded once at startup; the index is
//! immutable afterwards, so concurrent readers need no locking. Lookup is
//! brute-force cosine similarity, which is plenty for the few hundred
//! reference documents a storefront carries.
//!
//! # Serialized form
//!
//! One JSON object per line:
//!
//! ```json
//! {"category":"products","url":"https://…","text":"…","embedding":[0.1,…]}
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::embedding::{confidence, cosine_similarity};
use crate::models::Category;

/// One embedded reference document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub category: Category,
    pub url: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// The best entry for a query and its confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    pub entry: &'a IndexEntry,
    pub confidence: f32,
}

/// Immutable per-category vector index.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dims: usize,
    entries: BTreeMap<Category, Vec<IndexEntry>>,
}

impl VectorIndex {
    /// Build an index, enforcing non-empty URLs and a single dimensionality.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        let mut dims = 0usize;
        let mut by_category: BTreeMap<Category, Vec<IndexEntry>> = BTreeMap::new();

        for (i, entry) in entries.into_iter().enumerate() {
            if entry.url.trim().is_empty() {
                bail!("index entry {} ({}) has an empty url", i, entry.category);
            }
            if entry.embedding.is_empty() {
                bail!("index entry {} ({}) has an empty embedding", i, entry.category);
            }
            if dims == 0 {
                dims = entry.embedding.len();
            } else if entry.embedding.len() != dims {
                bail!(
                    "index entry {} has {} dimensions, expected {}",
                    i,
                    entry.embedding.len(),
                    dims
                );
            }
            by_category.entry(entry.category).or_default().push(entry);
        }

        Ok(Self {
            dims,
            entries: by_category,
        })
    }

    /// Parse JSON Lines content into entries. Blank lines are skipped.
    pub fn parse_jsonl(content: &str) -> Result<Vec<IndexEntry>> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<IndexEntry>(line)
                    .with_context(|| format!("Invalid index entry on line {}", n + 1))
            })
            .collect()
    }

    /// Serialize entries of one category as JSON Lines.
    pub fn to_jsonl(&self, category: Category) -> Result<String> {
        let mut out = String::new();
        for entry in self.entries_in(category) {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Categories with at least one entry.
    pub fn categories(&self) -> Vec<Category> {
        self.entries.keys().copied().collect()
    }

    pub fn entries_in(&self, category: Category) -> &[IndexEntry] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nearest entry to `query` across all categories, or within one.
    ///
    /// Ties keep the earlier entry (category order, then insertion order),
    /// so repeated lookups are deterministic. Returns `None` for an empty
    /// index or a query of the wrong dimensionality.
    pub fn nearest(&self, query: &[f32], within: Option<Category>) -> Option<Neighbor<'_>> {
        if query.len() != self.dims || self.dims == 0 {
            return None;
        }

        let mut best: Option<Neighbor<'_>> = None;
        let candidates = self
            .entries
            .iter()
            .filter(|(cat, _)| within.map_or(true, |w| w == **cat))
            .flat_map(|(_, entries)| entries.iter());

        for entry in candidates {
            let score = confidence(cosine_similarity(query, &entry.embedding));
            if best.map_or(true, |b| score > b.confidence) {
                best = Some(Neighbor {
                    entry,
                    confidence: score,
                });
            }
        }

        best
    }
}
