use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    planning_total: AtomicU64,
    chat_total: AtomicU64,
    fallback_total: AtomicU64,
    matches_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub planning_total: u64,
    pub chat_total: u64,
    pub fallback_total: u64,
    pub matches_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("occacia_requests_total").increment(1);
    }

    pub fn inc_planning(&self) {
        self.planning_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("occacia_turns_total", "intent" => "planning").increment(1);
    }

    pub fn inc_chat(&self) {
        self.chat_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("occacia_turns_total", "intent" => "chat").increment(1);
    }

    pub fn inc_fallback(&self) {
        self.fallback_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("occacia_fallback_total").increment(1);
    }

    pub fn add_matches(&self, matches: usize) {
        self.matches_total
            .fetch_add(matches as u64, Ordering::Relaxed);
        metrics::counter!("occacia_matches_total").increment(matches as u64);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            planning_total: self.planning_total.load(Ordering::Relaxed),
            chat_total: self.chat_total.load(Ordering::Relaxed),
            fallback_total: self.fallback_total.load(Ordering::Relaxed),
            matches_total: self.matches_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,occacia_agents=info,occacia_core=info,occacia_storage=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_latency_per_request() {
        let metrics = AppMetrics::default();
        assert_eq!(metrics.snapshot().avg_latency_millis, 0.0);

        metrics.inc_request();
        metrics.inc_request();
        metrics.inc_planning();
        metrics.add_matches(3);
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(10));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.planning_total, 1);
        assert_eq!(snapshot.matches_total, 3);
        assert_eq!(snapshot.avg_latency_millis, 20.0);
    }
}
