//! Query routing: pick at most one authoritative link for a user message.
//!
//! The [`QueryRouter`] runs an ordered list of [`Resolver`]s and returns the
//! first match. The default chain is:
//!
//! ```text
//! query ──▶ SemanticResolver ──(miss / below threshold / error)──▶ PatternResolver ──▶ none
//! ```
//!
//! The semantic resolver is only installed when a vector index was loaded
//! and an embedding provider is enabled. Any retrieval failure (timeout,
//! auth error, malformed embedding) is logged and treated as "index
//! unavailable for this call"; [`QueryRouter::route`] always returns a
//! [`MatchResult`].

use async_trait::async_trait;
use concierge_core::embedding::{embed_one, Embedder};
use concierge_core::index::VectorIndex;
use concierge_core::models::{Category, MatchResult};
use concierge_core::patterns::PatternMatcher;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::index::load_index;

/// Why a semantic lookup could not produce an answer.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding provider failed: {0}")]
    Embedding(String),
    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),
    #[error("query embedding has {got} dimensions, index has {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// One strategy for resolving a query to a link.
///
/// `Ok(None)` means "no confident answer, try the next resolver";
/// `Err` means the resolver was unavailable for this call.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(
        &self,
        query: &str,
        within: Option<Category>,
    ) -> Result<Option<MatchResult>, RetrievalError>;
}

/// Nearest-neighbor lookup over the loaded vector index.
pub struct SemanticResolver {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    threshold: f32,
    timeout: Duration,
}

impl SemanticResolver {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        threshold: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            threshold,
            timeout,
        }
    }
}

#[async_trait]
impl Resolver for SemanticResolver {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn resolve(
        &self,
        query: &str,
        within: Option<Category>,
    ) -> Result<Option<MatchResult>, RetrievalError> {
        let vector = tokio::time::timeout(self.timeout, embed_one(self.embedder.as_ref(), query))
            .await
            .map_err(|_| RetrievalError::Timeout(self.timeout))?
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        if vector.len() != self.index.dims() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.index.dims(),
                got: vector.len(),
            });
        }

        let Some(best) = self.index.nearest(&vector, within) else {
            return Ok(None);
        };

        if best.confidence < self.threshold {
            tracing::debug!(
                confidence = best.confidence,
                threshold = self.threshold,
                url = %best.entry.url,
                "semantic match below threshold"
            );
            return Ok(None);
        }

        Ok(Some(MatchResult::semantic(
            best.entry.category,
            best.entry.url.clone(),
            best.confidence,
        )))
    }
}

/// Keyword rule lookup; never unavailable.
pub struct PatternResolver {
    matcher: PatternMatcher,
}

impl PatternResolver {
    pub fn new(matcher: PatternMatcher) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl Resolver for PatternResolver {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn resolve(
        &self,
        query: &str,
        _within: Option<Category>,
    ) -> Result<Option<MatchResult>, RetrievalError> {
        let result = self.matcher.resolve(query);
        Ok(result.is_match().then_some(result))
    }
}

/// Ordered chain of resolvers behind a single `route` call.
pub struct QueryRouter {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl QueryRouter {
    pub fn new(resolvers: Vec<Box<dyn Resolver>>) -> Self {
        Self { resolvers }
    }

    /// Pattern-only router using the built-in rule table.
    pub fn pattern_only() -> anyhow::Result<Self> {
        let matcher = PatternMatcher::builtin()?;
        Ok(Self::new(vec![Box::new(PatternResolver::new(matcher))]))
    }

    /// Load the index from `routing.index_dir`, create the configured
    /// embedding provider, and build the standard chain.
    ///
    /// A provider that cannot be created (e.g. a missing API key) disables
    /// semantic routing instead of failing startup. A malformed index file
    /// is still an error.
    pub fn load(config: &Config) -> anyhow::Result<Self> {
        let index = match &config.routing.index_dir {
            Some(dir) => load_index(dir)?,
            None => None,
        };

        let embedder: Option<Arc<dyn Embedder>> = match (&index, config.embedding.is_enabled()) {
            (Some(_), true) => match create_provider(&config.embedding) {
                Ok(provider) => Some(Arc::from(provider)),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding provider unavailable");
                    None
                }
            },
            _ => None,
        };

        Self::from_config(config, embedder, index)
    }

    /// Build the standard chain from configuration.
    ///
    /// The semantic resolver is added only when both `embedder` and a
    /// non-empty `index` are supplied.
    pub fn from_config(
        config: &Config,
        embedder: Option<Arc<dyn Embedder>>,
        index: Option<VectorIndex>,
    ) -> anyhow::Result<Self> {
        let mut resolvers: Vec<Box<dyn Resolver>> = Vec::new();

        match (embedder, index) {
            (Some(embedder), Some(index)) if !index.is_empty() => {
                tracing::info!(
                    entries = index.len(),
                    dims = index.dims(),
                    model = embedder.model_name(),
                    threshold = config.routing.confidence_threshold,
                    "semantic routing enabled"
                );
                resolvers.push(Box::new(SemanticResolver::new(
                    embedder,
                    Arc::new(index),
                    config.routing.confidence_threshold,
                    Duration::from_secs(config.routing.query_timeout_secs),
                )));
            }
            _ => tracing::info!("semantic routing disabled, using pattern rules only"),
        }

        let matcher = if config.routing.rules.is_empty() {
            PatternMatcher::builtin()?
        } else {
            PatternMatcher::from_specs(&config.routing.rules)?
        };
        resolvers.push(Box::new(PatternResolver::new(matcher)));

        Ok(Self::new(resolvers))
    }

    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Route a query across all categories.
    pub async fn route(&self, query: &str) -> MatchResult {
        self.route_in(query, None).await
    }

    /// Route a query, restricting semantic lookup to one category.
    pub async fn route_in(&self, query: &str, within: Option<Category>) -> MatchResult {
        if query.trim().is_empty() {
            return MatchResult::none();
        }

        for resolver in &self.resolvers {
            match resolver.resolve(query, within).await {
                Ok(Some(result)) => {
                    tracing::debug!(
                        resolver = resolver.name(),
                        category = ?result.category,
                        confidence = ?result.confidence,
                        "query routed"
                    );
                    return result;
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(resolver = resolver.name(), error = %e, "resolver unavailable, falling back");
                    continue;
                }
            }
        }

        MatchResult::none()
    }
}

/// Append the routed link to a generated reply.
///
/// At most one link is ever appended; a reply without a match is
/// returned unchanged.
pub fn append_link(reply: &str, result: &MatchResult) -> String {
    match &result.url {
        Some(url) => format!("{}\n\nYou can explore that here: {}", reply.trim_end(), url),
        None => reply.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::index::IndexEntry;
    use concierge_core::models::MatchSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps known queries to fixed vectors; unknown queries get `[0, 0, 1]`.
    struct TableEmbedder {
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    "show me sparkly rocks" => vec![1.0, 0.05, 0.0],
                    "fix my clasp" => vec![0.0, 1.0, 0.0],
                    // ~0.6 similarity to the rings entry: below threshold.
                    "something about diamonds maybe" => vec![0.6, 0.0, 0.8],
                    _ => vec![0.0, 0.0, 1.0],
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("401 Unauthorized")
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    struct WrongDimsEmbedder;

    #[async_trait]
    impl Embedder for WrongDimsEmbedder {
        fn model_name(&self) -> &str {
            "wrong"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn index() -> VectorIndex {
        VectorIndex::from_entries(vec![
            IndexEntry {
                category: Category::Products,
                url: "https://store/rings".into(),
                text: "rings".into(),
                embedding: vec![1.0, 0.0, 0.0],
            },
            IndexEntry {
                category: Category::Services,
                url: "https://store/repair".into(),
                text: "repair".into(),
                embedding: vec![0.0, 1.0, 0.0],
            },
        ])
        .unwrap()
    }

    fn router_with(embedder: Arc<dyn Embedder>, timeout: Duration) -> QueryRouter {
        QueryRouter::new(vec![
            Box::new(SemanticResolver::new(
                embedder,
                Arc::new(index()),
                crate::config::DEFAULT_CONFIDENCE_THRESHOLD,
                timeout,
            )),
            Box::new(PatternResolver::new(PatternMatcher::builtin().unwrap())),
        ])
    }

    #[tokio::test]
    async fn test_semantic_match_above_threshold() {
        let router = router_with(Arc::new(TableEmbedder::new()), Duration::from_secs(1));
        let r = router.route("show me sparkly rocks").await;
        assert_eq!(r.source, MatchSource::Semantic);
        assert_eq!(r.url.as_deref(), Some("https://store/rings"));
        assert!(r.confidence.unwrap() >= 0.75);
    }

    #[tokio::test]
    async fn test_below_threshold_falls_back_to_pattern() {
        let router = router_with(Arc::new(TableEmbedder::new()), Duration::from_secs(1));
        let r = router.route("something about diamonds maybe").await;
        assert_eq!(r.source, MatchSource::Pattern);
        assert_eq!(r.url.as_deref(), Some("https://thediamondfamily.com/diamonds"));
        assert!(r.confidence.is_none());
    }

    #[tokio::test]
    async fn test_below_threshold_without_pattern_is_none() {
        let router = router_with(Arc::new(TableEmbedder::new()), Duration::from_secs(1));
        let r = router.route("hello there").await;
        assert_eq!(r, MatchResult::none());
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back() {
        let router = router_with(Arc::new(FailingEmbedder), Duration::from_secs(1));
        let r = router.route("do you resize rings?").await;
        assert_eq!(r.source, MatchSource::Pattern);
        assert_eq!(r.category, Some(Category::Services));
    }

    #[tokio::test]
    async fn test_embedding_timeout_falls_back() {
        let router = router_with(Arc::new(SlowEmbedder), Duration::from_millis(50));
        let r = router.route("looking for a wedding band").await;
        assert_eq!(r.source, MatchSource::Pattern);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_falls_back() {
        let router = router_with(Arc::new(WrongDimsEmbedder), Duration::from_secs(1));
        assert_eq!(router.route("show me sparkly rocks").await, MatchResult::none());
    }

    #[tokio::test]
    async fn test_route_in_restricts_semantic_lookup() {
        let router = router_with(Arc::new(TableEmbedder::new()), Duration::from_secs(1));
        let r = router
            .route_in("fix my clasp", Some(Category::Products))
            .await;
        // Repair vector is orthogonal to every Products entry.
        assert_ne!(r.source, MatchSource::Semantic);
        let r = router.route_in("fix my clasp", Some(Category::Services)).await;
        assert_eq!(r.url.as_deref(), Some("https://store/repair"));
    }

    #[tokio::test]
    async fn test_route_is_idempotent() {
        let router = router_with(Arc::new(TableEmbedder::new()), Duration::from_secs(1));
        for q in ["show me sparkly rocks", "appraisal please", "nothing here"] {
            let a = router.route(q).await;
            let b = router.route(q).await;
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn test_empty_query_skips_resolvers() {
        let embedder = Arc::new(TableEmbedder::new());
        let router = router_with(embedder.clone(), Duration::from_secs(1));
        assert_eq!(router.route("   ").await, MatchResult::none());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_from_config_without_index_is_pattern_only() {
        let config = Config::default();
        let router =
            QueryRouter::from_config(&config, Some(Arc::new(TableEmbedder::new())), None).unwrap();
        assert_eq!(router.resolver_names(), vec!["pattern"]);

        let router = QueryRouter::from_config(
            &config,
            Some(Arc::new(TableEmbedder::new())),
            Some(index()),
        )
        .unwrap();
        assert_eq!(router.resolver_names(), vec!["semantic", "pattern"]);
    }

    #[test]
    fn test_append_link() {
        let m = MatchResult::pattern(Category::Faqs, "https://store/faq");
        assert_eq!(
            append_link("Happy to help.  ", &m),
            "Happy to help.\n\nYou can explore that here: https://store/faq"
        );
        assert_eq!(append_link("Hi!", &MatchResult::none()), "Hi!");
    }
}
