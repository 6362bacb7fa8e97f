//! AI categorization client.
//!
//! Wraps a [`Provider`] in the full resilience shell:
//!
//! ```text
//! rate limiter acquire -> breaker acquire -> retry(provider.complete) -> resolve permit
//! ```
//!
//! Nothing here returns an error. Every way the service can be unusable
//! (no token in time, open circuit, exhausted retries, terminal rejection,
//! a reply that does not name a known category) becomes
//! [`AiOutcome::Unavailable`], and the pipeline falls back to keywords.
//!
//! The guarded call runs on its own task so that a caller who stops
//! waiting does not cut the breaker bookkeeping short.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use purse_llm::{ChatMessage, ChatRequest, Provider, RetryError, RetryPolicy};
use purse_types::health::DependencyRetries;
use purse_types::{CategoryCatalog, OTHER_CATEGORY, TransactionKind};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::CategorizeError;
use crate::resilience::{CircuitBreakerRegistry, RateLimiterRegistry, Resilience};

/// Dependency name used for the categorization service's breaker,
/// bucket and retry policy.
pub const AI_DEPENDENCY: &str = "ai-categorizer";

const DEFAULT_MODEL: &str = "yandexgpt-lite";
const DEFAULT_TEMPERATURE: f64 = 0.3;
const MAX_REPLY_TOKENS: u32 = 200;

/// Confidence used when the reply omits one.
const DEFAULT_CONFIDENCE: f64 = 0.6;

/// A category assigned by the AI service.
#[derive(Debug, Clone, PartialEq)]
pub struct AiCategorization {
    /// Canonical catalog name (or "Other").
    pub category: String,
    /// Expense or income.
    pub kind: TransactionKind,
    /// Cleaned-up description suggested by the service.
    pub normalized_description: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Why no AI category is available.
#[derive(Debug, Clone, PartialEq)]
pub enum UnavailableReason {
    /// The resilience shell refused or gave up.
    Service(CategorizeError),
    /// The service answered, but not with a known category.
    Unrecognized,
    /// The background task died before producing an outcome.
    Aborted,
}

/// Result of one categorization attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AiOutcome {
    /// The service picked a category.
    Categorized(AiCategorization),
    /// Use the fallback classifier.
    Unavailable(UnavailableReason),
}

struct Inner {
    provider: Arc<dyn Provider>,
    catalog: Arc<CategoryCatalog>,
    limiter: Arc<RateLimiterRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryPolicy,
    model: String,
    temperature: f64,
    terminal_logged: AtomicBool,
}

/// Resilient client for the AI categorization service.
///
/// Cheap to clone; clones share the retry counters and the terminal-error
/// latch.
#[derive(Clone)]
pub struct AiCategorizer {
    inner: Arc<Inner>,
}

impl AiCategorizer {
    /// Create a categorizer over `provider`, using the shared registries.
    pub fn new(provider: Arc<dyn Provider>, catalog: Arc<CategoryCatalog>, resilience: &Resilience) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                catalog,
                limiter: Arc::clone(&resilience.limiter),
                breakers: Arc::clone(&resilience.breakers),
                retry: RetryPolicy::new(AI_DEPENDENCY, resilience.retry.clone()),
                model: DEFAULT_MODEL.to_string(),
                temperature: DEFAULT_TEMPERATURE,
                terminal_logged: AtomicBool::new(false),
            }),
        }
    }

    /// Override model and temperature.
    ///
    /// Must be called before the categorizer is cloned.
    pub fn with_model(mut self, model: impl Into<String>, temperature: f64) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.model = model.into();
            inner.temperature = temperature;
        }
        self
    }

    /// Provider name, for status output.
    pub fn provider_name(&self) -> &str {
        self.inner.provider.name()
    }

    /// Retry counters for this dependency.
    pub fn retry_counters(&self) -> DependencyRetries {
        DependencyRetries {
            name: AI_DEPENDENCY.to_string(),
            counters: self.inner.retry.counters(),
        }
    }

    /// Categorize one transaction. Never fails.
    pub async fn categorize(&self, description: &str, amount: Decimal) -> AiOutcome {
        let inner = Arc::clone(&self.inner);
        let description = description.to_string();
        let handle = tokio::spawn(async move { inner.guarded_call(&description, amount).await });

        match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(dependency = AI_DEPENDENCY, error = %err, "categorization task failed");
                AiOutcome::Unavailable(UnavailableReason::Aborted)
            }
        }
    }
}

impl std::fmt::Debug for AiCategorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiCategorizer")
            .field("provider", &self.inner.provider.name())
            .field("model", &self.inner.model)
            .finish()
    }
}

impl Inner {
    async fn guarded_call(&self, description: &str, amount: Decimal) -> AiOutcome {
        let started = Instant::now();

        if let Err(err) = self.limiter.acquire(AI_DEPENDENCY).await {
            debug!(dependency = AI_DEPENDENCY, error = %err, "skipping AI call");
            return AiOutcome::Unavailable(UnavailableReason::Service(err));
        }
        let permit = match self.breakers.acquire(AI_DEPENDENCY) {
            Ok(permit) => permit,
            Err(err) => {
                debug!(dependency = AI_DEPENDENCY, error = %err, "skipping AI call");
                return AiOutcome::Unavailable(UnavailableReason::Service(err));
            }
        };

        let request = build_request(&self.model, self.temperature, &self.catalog, description, amount);
        let call_started = Instant::now();
        let result = self.retry.run(|_| self.provider.complete(&request)).await;
        let response_time = call_started.elapsed();

        let outcome = match result {
            Ok(response) => {
                permit.success_in(response_time);
                self.terminal_logged.store(false, Ordering::Relaxed);
                match response.text().and_then(|text| parse_reply(text, &self.catalog, description)) {
                    Some(categorization) => AiOutcome::Categorized(categorization),
                    None => {
                        debug!(
                            dependency = AI_DEPENDENCY,
                            reply = response.text().unwrap_or_default(),
                            "reply does not name a known category"
                        );
                        AiOutcome::Unavailable(UnavailableReason::Unrecognized)
                    }
                }
            }
            Err(err) => {
                let err = self.absorb(err);
                permit.failure_with(response_time, err.to_string());
                AiOutcome::Unavailable(UnavailableReason::Service(err))
            }
        };

        debug!(
            dependency = AI_DEPENDENCY,
            elapsed_ms = started.elapsed().as_millis() as u64,
            categorized = matches!(outcome, AiOutcome::Categorized(_)),
            "categorization finished"
        );
        outcome
    }

    fn absorb(&self, err: RetryError) -> CategorizeError {
        match err {
            RetryError::Exhausted { attempts, last } => CategorizeError::RetryExhausted {
                dependency: AI_DEPENDENCY.to_string(),
                attempts,
                last: last.to_string(),
            },
            RetryError::Terminal { attempt, source } => {
                if !self.terminal_logged.swap(true, Ordering::Relaxed) {
                    error!(
                        dependency = AI_DEPENDENCY,
                        provider = self.provider.name(),
                        attempt,
                        error = %source,
                        "AI service rejected the call; using keyword fallback until it recovers"
                    );
                } else {
                    debug!(dependency = AI_DEPENDENCY, error = %source, "terminal error (already reported)");
                }
                CategorizeError::TerminalService {
                    dependency: AI_DEPENDENCY.to_string(),
                    reason: source.to_string(),
                }
            }
        }
    }
}

// ── Prompt and reply ─────────────────────────────────────────────────────

fn build_request(
    model: &str,
    temperature: f64,
    catalog: &CategoryCatalog,
    description: &str,
    amount: Decimal,
) -> ChatRequest {
    let mut names = catalog.names();
    names.push(OTHER_CATEGORY);

    let prompt = format!(
        "Categorize this personal finance transaction.\n\
         Transaction: \"{description}\"\n\
         Amount: {amount}\n\n\
         Allowed categories: {}\n\n\
         Reply with a single JSON object and nothing else:\n\
         {{\"type\": \"expense\" or \"income\", \"category\": \"<one allowed category>\", \
         \"description\": \"<short cleaned description>\", \"confidence\": <0.0 to 1.0>}}",
        names.join(", "),
    );

    ChatRequest::new(
        model,
        vec![
            ChatMessage::system("You are a personal finance assistant. Answer with JSON only."),
            ChatMessage::user(prompt),
        ],
    )
    .with_temperature(temperature)
    .with_max_tokens(MAX_REPLY_TOKENS)
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
}

/// Map a model reply onto the catalog.
///
/// Tolerates code fences and prose around the JSON object. Returns `None`
/// when no object can be parsed or its category is not in the catalog.
pub fn parse_reply(text: &str, catalog: &CategoryCatalog, original: &str) -> Option<AiCategorization> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawReply = serde_json::from_str(&text[start..=end]).ok()?;

    let category = catalog.resolve(raw.category.as_deref()?)?.to_string();
    let kind = if catalog.get(&category).is_some() {
        catalog.kind_of(&category)
    } else {
        raw.kind
            .as_deref()
            .and_then(TransactionKind::parse_loose)
            .unwrap_or(TransactionKind::Expense)
    };
    let normalized_description = raw
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| original.trim().to_string());
    let confidence = raw
        .confidence
        .as_ref()
        .and_then(parse_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    Some(AiCategorization {
        category,
        kind,
        normalized_description,
        confidence,
    })
}

fn parse_confidence(value: &serde_json::Value) -> Option<f64> {
    let numeric = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "high" | "высокая" => Some(0.9),
            "medium" | "средняя" => Some(0.6),
            "low" | "низкая" => Some(0.3),
            other => other.parse::<f64>().ok(),
        },
        _ => None,
    }?;
    numeric.is_finite().then(|| numeric.clamp(0.0, 1.0))
}
