//! Loading and offline building of the per-category vector index.
//!
//! An index directory holds one JSON Lines file per category
//! (`faqs.jsonl`, `products.jsonl`, `services.jsonl`, `design.jsonl`).
//! Any subset may be present; a missing directory or a directory with no
//! entries yields no index, and routing runs pattern-only.

use anyhow::{bail, Context, Result};
use concierge_core::embedding::Embedder;
use concierge_core::index::{IndexEntry, VectorIndex};
use concierge_core::models::Category;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn category_file(dir: &Path, category: Category) -> PathBuf {
    dir.join(format!("{}.jsonl", category))
}

/// Load every category file found in `dir`.
///
/// Returns `Ok(None)` when the directory does not exist or holds no
/// entries. Malformed files are an error: a half-loaded index would
/// silently skew routing.
pub fn load_index(dir: &Path) -> Result<Option<VectorIndex>> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "index directory not found, semantic routing disabled");
        return Ok(None);
    }

    let mut entries = Vec::new();
    for category in Category::ALL {
        let path = category_file(dir, category);
        if !path.exists() {
            tracing::debug!(%category, "no index file for category");
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read index file: {}", path.display()))?;
        let parsed = VectorIndex::parse_jsonl(&content)
            .with_context(|| format!("Failed to parse index file: {}", path.display()))?;

        if let Some(stray) = parsed.iter().find(|e| e.category != category) {
            bail!(
                "{} contains an entry for category '{}'",
                path.display(),
                stray.category
            );
        }
        tracing::info!(%category, entries = parsed.len(), "loaded index file");
        entries.extend(parsed);
    }

    if entries.is_empty() {
        tracing::warn!(dir = %dir.display(), "index directory is empty, semantic routing disabled");
        return Ok(None);
    }

    let index = VectorIndex::from_entries(entries)?;
    Ok(Some(index))
}

/// One source document awaiting embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDocument {
    pub category: Category,
    pub url: String,
    #[serde(alias = "content")]
    pub text: String,
}

/// Summary of an index build.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub per_category: BTreeMap<Category, usize>,
    pub dims: usize,
}

impl BuildStats {
    pub fn total(&self) -> usize {
        self.per_category.values().sum()
    }
}

/// Parse source documents from JSON Lines, skipping blank lines and
/// documents with empty text.
pub fn parse_sources(content: &str) -> Result<Vec<SourceDocument>> {
    let mut docs = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let doc: SourceDocument = serde_json::from_str(line)
            .with_context(|| format!("Invalid source document on line {}", n + 1))?;
        if doc.text.trim().is_empty() {
            tracing::warn!(line = n + 1, "skipping source document with empty text");
            continue;
        }
        docs.push(doc);
    }
    Ok(docs)
}

/// Embed `docs` in batches and build an index from them.
pub async fn embed_documents(
    embedder: &dyn Embedder,
    docs: Vec<SourceDocument>,
    batch_size: usize,
) -> Result<VectorIndex> {
    let batch_size = batch_size.max(1);
    let mut entries: Vec<IndexEntry> = Vec::with_capacity(docs.len());

    for (batch_no, batch) in docs.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding batch {} failed", batch_no + 1))?;

        if vectors.len() != batch.len() {
            bail!(
                "Embedding batch {} returned {} vectors for {} documents",
                batch_no + 1,
                vectors.len(),
                batch.len()
            );
        }

        for (doc, vector) in batch.iter().zip(vectors) {
            if embedder.dims() > 0 && vector.len() != embedder.dims() {
                bail!(
                    "Embedding for {} has {} dimensions, model '{}' declares {}",
                    doc.url,
                    vector.len(),
                    embedder.model_name(),
                    embedder.dims()
                );
            }
            entries.push(IndexEntry {
                category: doc.category,
                url: doc.url.clone(),
                text: doc.text.clone(),
                embedding: vector,
            });
        }
        tracing::info!(batch = batch_no + 1, documents = batch.len(), "embedded batch");
    }

    VectorIndex::from_entries(entries)
}

/// Write one JSON Lines file per non-empty category into `dir`.
pub fn write_index(index: &VectorIndex, dir: &Path) -> Result<BuildStats> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    let mut stats = BuildStats {
        dims: index.dims(),
        ..Default::default()
    };
    for category in index.categories() {
        let path = category_file(dir, category);
        std::fs::write(&path, index.to_jsonl(category)?)
            .with_context(|| format!("Failed to write index file: {}", path.display()))?;
        stats
            .per_category
            .insert(category, index.entries_in(category).len());
    }
    Ok(stats)
}

/// Read sources from `input`, embed them, and write the index to `output`.
pub async fn build_index(
    embedder: &dyn Embedder,
    input: &Path,
    output: &Path,
    batch_size: usize,
) -> Result<BuildStats> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read source documents: {}", input.display()))?;
    let docs = parse_sources(&content)?;
    if docs.is_empty() {
        bail!("No source documents found in {}", input.display());
    }

    let index = embed_documents(embedder, docs, batch_size).await?;
    write_index(&index, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Embeds text as `[len, vowel count]`, counting batches.
    struct CountingEmbedder {
        batches: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    vec![t.len() as f32, vowels as f32]
                })
                .collect())
        }
    }

    const SOURCES: &str = r#"
{"category":"products","url":"https://x/rings","text":"engagement rings"}
{"category":"services","url":"https://x/repair","content":"ring resizing and repair"}
{"category":"faqs","url":"https://x/faq","text":"   "}
{"category":"products","url":"https://x/bands","text":"wedding bands"}
"#;

    #[tokio::test]
    async fn test_build_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("docs.jsonl");
        std::fs::write(&input, SOURCES).unwrap();
        let out = tmp.path().join("indexes");

        let embedder = CountingEmbedder {
            batches: AtomicUsize::new(0),
        };
        let stats = build_index(&embedder, &input, &out, 2).await.unwrap();

        assert_eq!(stats.total(), 3);
        assert_eq!(stats.per_category.get(&Category::Products), Some(&2));
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 2);
        assert!(out.join("products.jsonl").exists());
        assert!(!out.join("faqs.jsonl").exists());

        let index = load_index(&out).unwrap().unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dims(), 2);
    }

    #[test]
    fn test_missing_or_empty_dir_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_index(&tmp.path().join("nope")).unwrap().is_none());
        assert!(load_index(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_stray_category_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("design.jsonl"),
            r#"{"category":"faqs","url":"https://x","text":"t","embedding":[1.0]}"#,
        )
        .unwrap();
        assert!(load_index(tmp.path()).is_err());
    }
}
