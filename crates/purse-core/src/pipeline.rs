//! Message pipeline: access checks, extraction, categorization.
//!
//! [`TransactionPipeline::process`] turns one user message into a
//! [`PendingBatch`] the confirmation flow can edit and confirm. All
//! fragments of a message are categorized concurrently and come back in
//! the order the extractor produced them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use purse_llm::ProviderError;
use purse_types::config::AccessConfig;
use purse_types::{CategoryCatalog, CategorySource, Config, ConfirmedTransaction, TransactionCandidate};
use rust_decimal::Decimal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::categorizer::{AiCategorizer, AiOutcome};
use crate::classifier::FallbackClassifier;
use crate::error::PipelineError;
use crate::extract::extract;
use crate::metrics::PipelineMetrics;
use crate::resilience::Resilience;
use crate::throttle::MessageThrottle;

/// Orchestrates one message from text to pending batch.
pub struct TransactionPipeline {
    catalog: Arc<CategoryCatalog>,
    classifier: FallbackClassifier,
    categorizer: Option<AiCategorizer>,
    access: AccessConfig,
    throttle: MessageThrottle,
    metrics: Arc<PipelineMetrics>,
}

impl TransactionPipeline {
    /// Pipeline without AI categorization; every candidate uses the
    /// keyword fallback.
    pub fn new(catalog: Arc<CategoryCatalog>, access: AccessConfig) -> Self {
        let throttle = MessageThrottle::per_minute(access.messages_per_minute);
        Self {
            classifier: FallbackClassifier::new(Arc::clone(&catalog)),
            catalog,
            categorizer: None,
            access,
            throttle,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Attach an AI categorizer.
    pub fn with_categorizer(mut self, categorizer: AiCategorizer) -> Self {
        self.categorizer = Some(categorizer);
        self
    }

    /// Build the pipeline described by `config`.
    ///
    /// A missing API key is not an error: the pipeline runs on the keyword
    /// fallback alone.
    pub fn from_config(config: &Config, resilience: &Resilience) -> purse_types::Result<Self> {
        let catalog = Arc::new(config.catalog()?);
        let mut pipeline = Self::new(Arc::clone(&catalog), config.access.clone());

        match purse_llm::provider_from_config(&config.ai) {
            Ok(provider) => {
                info!(provider = provider.name(), model = %config.ai.model, "AI categorization enabled");
                let categorizer = AiCategorizer::new(provider, catalog, resilience)
                    .with_model(config.ai.model.clone(), config.ai.temperature);
                pipeline = pipeline.with_categorizer(categorizer);
            }
            Err(ProviderError::NotConfigured(hint)) => {
                info!(%hint, "AI categorization disabled, using keyword fallback");
            }
            Err(err) => {
                warn!(error = %err, "AI provider could not be built, using keyword fallback");
            }
        }
        Ok(pipeline)
    }

    /// The category catalog.
    pub fn catalog(&self) -> &Arc<CategoryCatalog> {
        &self.catalog
    }

    /// The AI categorizer, if configured.
    pub fn categorizer(&self) -> Option<&AiCategorizer> {
        self.categorizer.as_ref()
    }

    /// Shared request counters and latencies.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process one message.
    pub async fn process(&self, user_id: i64, text: &str) -> Result<PendingBatch, PipelineError> {
        self.process_with_cancel(user_id, text, CancellationToken::new()).await
    }

    /// Process one message, giving up when `cancel` fires.
    ///
    /// In-flight AI calls keep running in the background and still update
    /// breaker and limiter state.
    pub async fn process_with_cancel(
        &self,
        user_id: i64,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<PendingBatch, PipelineError> {
        let started = Instant::now();
        self.metrics.record_message();

        let result = self.run(user_id, text, &cancel).await;

        if let Err(err) = &result {
            self.metrics.record_failure();
            debug!(user_id, error = %err, "message rejected");
        }
        self.metrics.record_latency(started.elapsed());
        result
    }

    async fn run(&self, user_id: i64, text: &str, cancel: &CancellationToken) -> Result<PendingBatch, PipelineError> {
        if !self.access.is_user_allowed(user_id) {
            warn!(user_id, "message from user outside the allowlist");
            return Err(PipelineError::Unauthorized { user_id });
        }
        if !self.throttle.check(user_id) {
            warn!(user_id, "user throttled");
            return Err(PipelineError::Throttled { user_id });
        }

        let mut candidates = extract(text)?;

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            outcomes = self.categorize_all(&candidates) => outcomes,
        };

        let mut ai = 0u64;
        let mut fallback = 0u64;
        for (candidate, outcome) in candidates.iter_mut().zip(outcomes) {
            if self.apply_outcome(candidate, outcome) {
                ai += 1;
            } else {
                fallback += 1;
            }
        }
        self.metrics.record_candidates(ai, fallback);

        info!(user_id, candidates = candidates.len(), ai, fallback, "message processed");
        Ok(PendingBatch::new(user_id, candidates, Arc::clone(&self.catalog)))
    }

    async fn categorize_all(&self, candidates: &[TransactionCandidate]) -> Vec<Option<AiOutcome>> {
        match &self.categorizer {
            Some(categorizer) => {
                let calls = candidates
                    .iter()
                    .map(|c| categorizer.categorize(c.classification_text(), c.amount));
                join_all(calls).await.into_iter().map(Some).collect()
            }
            None => vec![None; candidates.len()],
        }
    }

    /// Returns `true` when the AI category was used.
    fn apply_outcome(&self, candidate: &mut TransactionCandidate, outcome: Option<AiOutcome>) -> bool {
        match outcome {
            Some(AiOutcome::Categorized(ai)) => {
                candidate.category = Some(ai.category);
                candidate.kind = ai.kind;
                candidate.category_source = CategorySource::Ai;
                candidate.confidence = Some(ai.confidence);
                if !ai.normalized_description.is_empty() {
                    candidate.description = ai.normalized_description;
                }
                true
            }
            other => {
                if let Some(AiOutcome::Unavailable(reason)) = &other {
                    debug!(?reason, "AI category unavailable, using fallback");
                }
                let classification = self.classifier.classify(candidate.classification_text());
                debug!(
                    category = %classification.category,
                    keyword = classification.matched_keyword.as_deref().unwrap_or("-"),
                    "fallback classification"
                );
                candidate.category = Some(classification.category);
                candidate.kind = classification.kind;
                candidate.category_source = CategorySource::Fallback;
                candidate.confidence = None;
                false
            }
        }
    }
}

// ── PendingBatch ─────────────────────────────────────────────────────────

/// A user correction to one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateEdit {
    /// Move the candidate to another category.
    Category(String),
    /// Replace the description.
    Description(String),
    /// Replace the amount; must be positive.
    Amount(Decimal),
}

/// Candidates awaiting the user's confirmation.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    id: Uuid,
    user_id: i64,
    created_at: DateTime<Utc>,
    candidates: Vec<TransactionCandidate>,
    catalog: Arc<CategoryCatalog>,
}

impl PendingBatch {
    /// Wrap categorized candidates.
    pub fn new(user_id: i64, candidates: Vec<TransactionCandidate>, catalog: Arc<CategoryCatalog>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
            candidates,
            catalog,
        }
    }

    /// Batch id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Submitting user.
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// When the batch was produced.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Candidates in message order.
    pub fn candidates(&self) -> &[TransactionCandidate] {
        &self.candidates
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Always `false` for batches produced by the pipeline.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Apply a correction to the candidate at `index` (0-based).
    pub fn edit(&mut self, index: usize, edit: CandidateEdit) -> Result<(), PipelineError> {
        let len = self.candidates.len();
        let catalog = Arc::clone(&self.catalog);
        let candidate = self.candidates.get_mut(index).ok_or_else(|| PipelineError::InvalidEdit {
            reason: format!("no transaction #{} (batch has {len})", index + 1),
        })?;

        match edit {
            CandidateEdit::Category(name) => {
                let resolved = catalog.resolve(&name).ok_or_else(|| PipelineError::InvalidEdit {
                    reason: format!("unknown category '{}'", name.trim()),
                })?;
                candidate.kind = catalog.kind_of(resolved);
                candidate.category = Some(resolved.to_string());
                candidate.category_source = CategorySource::Manual;
                candidate.confidence = None;
            }
            CandidateEdit::Description(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(PipelineError::InvalidEdit {
                        reason: "description must not be empty".into(),
                    });
                }
                candidate.description = text.to_string();
            }
            CandidateEdit::Amount(amount) => {
                if amount <= Decimal::ZERO {
                    return Err(PipelineError::InvalidEdit {
                        reason: "amount must be positive".into(),
                    });
                }
                candidate.amount = amount;
            }
        }
        Ok(())
    }

    /// Render the numbered confirmation prompt.
    pub fn format_for_user(&self) -> String {
        self.candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("#{}\n{}", i + 1, c.format_for_user()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Accept the batch now.
    pub fn confirm(self) -> Vec<ConfirmedTransaction> {
        self.confirm_at(Utc::now())
    }

    /// Accept the batch with an explicit timestamp.
    pub fn confirm_at(self, recorded_at: DateTime<Utc>) -> Vec<ConfirmedTransaction> {
        let user_id = self.user_id;
        self.candidates
            .into_iter()
            .map(|c| ConfirmedTransaction::from_candidate(c, user_id, recorded_at))
            .collect()
    }
}
