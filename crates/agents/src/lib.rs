mod flow;
mod matching;
mod retry;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use occacia_core::{
    build_contextual_query, normalize_flow_response, AiAnalysis, ChatTurn, Package, PlanRequest,
    PlanResponse,
};
use occacia_observability::AppMetrics;
use occacia_storage::{CatalogRepository, ChatHistoryRepository};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub use flow::{
    flow_payload, AiFlow, FlowConfig, FlowError, LangflowClient, MAX_FLOW_TIMEOUT,
    MIN_FLOW_TIMEOUT,
};
pub use matching::find_matches;
pub use retry::{retry_with_backoff, RetryPolicy};

pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Runs one planning turn end to end: history, AI flow, normalization, intent gate,
/// catalog matching and persistence.
#[derive(Clone)]
pub struct PlanningAgent<S, F>
where
    S: CatalogRepository + ChatHistoryRepository,
    F: AiFlow,
{
    store: Arc<S>,
    flow: Arc<F>,
    retry: RetryPolicy,
    history_limit: usize,
    metrics: Arc<AppMetrics>,
}

impl<S, F> PlanningAgent<S, F>
where
    S: CatalogRepository + ChatHistoryRepository,
    F: AiFlow,
{
    pub fn new(store: Arc<S>, flow: F, metrics: Arc<AppMetrics>) -> Self {
        Self {
            store,
            flow: Arc::new(flow),
            retry: RetryPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            metrics,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self, request), fields(session_id = tracing::field::Empty))]
    pub async fn generate_plan(&self, request: PlanRequest) -> Result<PlanResponse> {
        let started = Instant::now();
        self.metrics.inc_request();

        let query = request.user_query.trim().to_string();
        if query.is_empty() {
            anyhow::bail!("user_query must not be empty");
        }

        let session_id = request
            .session_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::Span::current().record("session_id", session_id.as_str());

        let history = match self.store.recent_turns(&session_id, self.history_limit).await {
            Ok(history) => history,
            Err(err) => {
                warn!(error = %err, "failed loading session history, continuing without it");
                Vec::new()
            }
        };
        let prompt = build_contextual_query(&history, &query);

        let mut analysis = self.analyze(&prompt).await;

        let matches = if analysis.is_planning() {
            self.metrics.inc_planning();
            match find_matches(&analysis, self.store.as_ref()).await {
                Ok(matches) => matches,
                Err(err) => {
                    error!(error = %err, "catalog query failed, answering with fallback");
                    self.metrics.inc_fallback();
                    analysis = AiAnalysis::service_fallback();
                    Vec::new()
                }
            }
        } else {
            self.metrics.inc_chat();
            Vec::new()
        };
        self.metrics.add_matches(matches.len());

        self.persist_turn(&session_id, &query, analysis.assistant_text())
            .await;

        let intent = analysis.intent;
        let response = PlanResponse::assemble(session_id, analysis, &matches);

        self.metrics.observe_latency(started.elapsed());
        info!(
            intent = intent.as_str(),
            history = history.len(),
            matches = matches.len(),
            "planning turn handled"
        );

        Ok(response)
    }

    /// Calls the AI flow with retries and normalizes its reply. Never fails.
    pub async fn analyze(&self, prompt: &str) -> AiAnalysis {
        let flow = self.flow.as_ref();
        let outcome = retry_with_backoff(&self.retry, FlowError::is_retryable, move |attempt| {
            debug!(attempt, "calling ai flow");
            flow.run(prompt)
        })
        .await;

        match outcome {
            Ok(envelope) => normalize_flow_response(&envelope),
            Err(err) => {
                error!(error = %err, "ai flow unavailable, answering with fallback");
                self.metrics.inc_fallback();
                AiAnalysis::service_fallback()
            }
        }
    }

    pub async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        self.store.recent_turns(session_id, limit).await
    }

    pub async fn list_packages(&self, limit: usize) -> Result<Vec<Package>> {
        self.store.list_packages(limit).await
    }

    async fn persist_turn(&self, session_id: &str, user_message: &str, ai_message: Option<&str>) {
        let turn = ChatTurn {
            session_id: session_id.to_string(),
            user_message: user_message.to_string(),
            ai_message: ai_message.map(ToString::to_string),
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.save_turn(&turn).await {
            warn!(error = %err, "failed to save chat history");
        }
    }
}
