//! Classification engine.
//!
//! Evaluates the administrator-defined rule set against a message's
//! envelope, body, and headers. Rules are evaluated in priority order
//! (confidence breaks ties) and the first matching rule wins; there is no
//! merging or scoring across rules. When nothing matches, the message is
//! `unknown` with confidence 0.
//!
//! The active rule set is read-through cached with a fixed TTL. Every rule
//! mutation goes through this engine so it can invalidate the cache
//! immediately, independent of the TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::model::{Classification, ClassificationRule, EmailFields};
use super::repository::RuleRepository;
use crate::Result;

/// Default time-to-live of the cached rule set.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cached snapshot of the active rule set.
struct CachedRules {
    rules: Arc<Vec<ClassificationRule>>,
    loaded_at: Instant,
}

/// Rule-based message classifier with a TTL cache.
pub struct Classifier {
    repository: Arc<RuleRepository>,
    cache: RwLock<Option<CachedRules>>,
    ttl: Duration,
}

impl Classifier {
    /// Creates a classifier over a rule repository.
    #[must_use]
    pub fn new(repository: Arc<RuleRepository>) -> Self {
        Self::with_ttl(repository, DEFAULT_CACHE_TTL)
    }

    /// Creates a classifier with a custom cache TTL.
    #[must_use]
    pub fn with_ttl(repository: Arc<RuleRepository>, ttl: Duration) -> Self {
        Self {
            repository,
            cache: RwLock::new(None),
            ttl,
        }
    }

    /// Classifies a message; the first matching rule wins.
    ///
    /// A match bumps the rule's usage counters on a detached task so
    /// classification never waits on the bookkeeping write.
    ///
    /// # Errors
    ///
    /// Returns an error if loading the rule set fails.
    pub async fn classify(&self, fields: &EmailFields<'_>) -> Result<Classification> {
        let rules = self.active_rules().await?;

        for rule in rules.iter() {
            if rule.matches(fields) {
                if let Some(rule_id) = rule.id {
                    let repository = Arc::clone(&self.repository);
                    tokio::spawn(async move {
                        if let Err(e) = repository.record_match(rule_id).await {
                            warn!(rule_id, "failed to record rule match: {e}");
                        }
                    });
                }

                debug!(label = %rule.label, rule_id = ?rule.id, "message classified");
                return Ok(Classification {
                    label: rule.label.clone(),
                    confidence: rule.confidence,
                    rule_id: rule.id,
                });
            }
        }

        Ok(Classification::unknown())
    }

    /// Dry-run classification over raw fields, for the admin test entry
    /// point. No usage counters are touched.
    ///
    /// # Errors
    ///
    /// Returns an error if loading the rule set fails.
    pub async fn classify_fields(
        &self,
        from: &str,
        subject: &str,
        body: &str,
    ) -> Result<Classification> {
        let fields = EmailFields {
            from,
            subject,
            body,
            headers: "",
        };
        let rules = self.active_rules().await?;

        Ok(rules
            .iter()
            .find(|rule| rule.matches(&fields))
            .map_or_else(Classification::unknown, |rule| Classification {
                label: rule.label.clone(),
                confidence: rule.confidence,
                rule_id: rule.id,
            }))
    }

    /// Drops the cached rule set immediately.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        debug!("classification rule cache invalidated");
    }

    /// Creates a rule and invalidates the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_rule(&self, rule: &mut ClassificationRule) -> Result<()> {
        self.repository.create(rule).await?;
        self.invalidate().await;
        Ok(())
    }

    /// Updates a rule and invalidates the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_rule(&self, rule: &ClassificationRule) -> Result<()> {
        self.repository.update(rule).await?;
        self.invalidate().await;
        Ok(())
    }

    /// Deletes a rule and invalidates the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_rule(&self, id: i64) -> Result<()> {
        self.repository.delete(id).await?;
        self.invalidate().await;
        Ok(())
    }

    /// Returns the rule repository for read-only admin listings.
    #[must_use]
    pub fn rules(&self) -> &RuleRepository {
        &self.repository
    }

    /// Returns the active rule set, reloading it when the cache is cold or
    /// stale.
    async fn active_rules(&self) -> Result<Arc<Vec<ClassificationRule>>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.loaded_at.elapsed() < self.ttl
            {
                return Ok(Arc::clone(&cached.rules));
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have reloaded while we waited for the lock.
        if let Some(cached) = cache.as_ref()
            && cached.loaded_at.elapsed() < self.ttl
        {
            return Ok(Arc::clone(&cached.rules));
        }

        let rules = Arc::new(self.repository.list_active().await?);
        *cache = Some(CachedRules {
            rules: Arc::clone(&rules),
            loaded_at: Instant::now(),
        });
        debug!(count = rules.len(), "loaded classification rules");
        Ok(rules)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classify::model::{MatchMode, RuleType};

    async fn classifier() -> Classifier {
        Classifier::new(Arc::new(RuleRepository::in_memory().await.unwrap()))
    }

    fn fields<'a>() -> EmailFields<'a> {
        EmailFields {
            from: "ivan@bigclient.ru",
            subject: "Тендер №5",
            body: "Добрый день",
            headers: "",
        }
    }

    #[tokio::test]
    async fn test_no_rules_yields_unknown() {
        let classifier = classifier().await;
        let result = classifier.classify(&fields()).await.unwrap();
        assert_eq!(result, Classification::unknown());
    }

    #[tokio::test]
    async fn test_priority_beats_confidence() {
        // Scenario: a domain rule at priority 10 and a subject-keyword rule
        // at priority 5 both match; the domain rule must win.
        let classifier = classifier().await;

        let mut subject_rule = ClassificationRule::new(
            RuleType::SubjectKeyword,
            MatchMode::Contains,
            "тендер",
            "platform_tender",
        );
        subject_rule.priority = 5;
        subject_rule.confidence = 0.99;
        classifier.create_rule(&mut subject_rule).await.unwrap();

        let mut domain_rule = ClassificationRule::new(
            RuleType::Domain,
            MatchMode::Contains,
            "bigclient.ru",
            "direct_request",
        );
        domain_rule.priority = 10;
        domain_rule.confidence = 0.6;
        classifier.create_rule(&mut domain_rule).await.unwrap();

        let result = classifier.classify(&fields()).await.unwrap();
        assert_eq!(result.label, "direct_request");
        assert_eq!(result.rule_id, domain_rule.id);
    }

    #[tokio::test]
    async fn test_confidence_breaks_priority_tie() {
        let classifier = classifier().await;

        let mut low = ClassificationRule::new(
            RuleType::SubjectKeyword,
            MatchMode::Contains,
            "тендер",
            "low-confidence",
        );
        low.priority = 5;
        low.confidence = 0.3;
        classifier.create_rule(&mut low).await.unwrap();

        let mut high = ClassificationRule::new(
            RuleType::SubjectKeyword,
            MatchMode::Contains,
            "тендер",
            "high-confidence",
        );
        high.priority = 5;
        high.confidence = 0.9;
        classifier.create_rule(&mut high).await.unwrap();

        let result = classifier.classify(&fields()).await.unwrap();
        assert_eq!(result.label, "high-confidence");
    }

    #[tokio::test]
    async fn test_deterministic_classification() {
        let classifier = classifier().await;
        let mut rule = ClassificationRule::new(
            RuleType::Domain,
            MatchMode::Contains,
            "bigclient.ru",
            "direct_request",
        );
        classifier.create_rule(&mut rule).await.unwrap();

        let first = classifier.classify(&fields()).await.unwrap();
        for _ in 0..5 {
            assert_eq!(classifier.classify(&fields()).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_mutation_invalidates_cache_before_ttl() {
        // Long TTL: only explicit invalidation can refresh the set.
        let repository = Arc::new(RuleRepository::in_memory().await.unwrap());
        let classifier = Classifier::with_ttl(Arc::clone(&repository), Duration::from_secs(3600));

        let mut rule = ClassificationRule::new(
            RuleType::SubjectKeyword,
            MatchMode::Contains,
            "тендер",
            "platform_tender",
        );
        classifier.create_rule(&mut rule).await.unwrap();
        assert_eq!(
            classifier.classify(&fields()).await.unwrap().label,
            "platform_tender"
        );

        // Deactivate through the engine; the very next call must see it.
        let mut deactivated = rule.clone();
        deactivated.active = false;
        classifier.update_rule(&deactivated).await.unwrap();

        let result = classifier.classify(&fields()).await.unwrap();
        assert_eq!(result.label, "unknown");
    }

    #[tokio::test]
    async fn test_dry_run_does_not_touch_counters() {
        let repository = Arc::new(RuleRepository::in_memory().await.unwrap());
        let classifier = Classifier::new(Arc::clone(&repository));

        let mut rule = ClassificationRule::new(
            RuleType::SubjectKeyword,
            MatchMode::Contains,
            "тендер",
            "platform_tender",
        );
        classifier.create_rule(&mut rule).await.unwrap();

        let result = classifier
            .classify_fields("x@y.ru", "Тендер №9", "body")
            .await
            .unwrap();
        assert_eq!(result.label, "platform_tender");

        let loaded = repository.get(rule.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded.times_matched, 0);
    }

    #[tokio::test]
    async fn test_match_records_usage() {
        let repository = Arc::new(RuleRepository::in_memory().await.unwrap());
        let classifier = Classifier::new(Arc::clone(&repository));

        let mut rule = ClassificationRule::new(
            RuleType::SubjectKeyword,
            MatchMode::Contains,
            "тендер",
            "platform_tender",
        );
        classifier.create_rule(&mut rule).await.unwrap();

        classifier.classify(&fields()).await.unwrap();

        // The counter write runs on a detached task; yield until it lands.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            let loaded = repository.get(rule.id.unwrap()).await.unwrap().unwrap();
            if loaded.times_matched == 1 {
                return;
            }
        }
        panic!("usage counter was never recorded");
    }
}
