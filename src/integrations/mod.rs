//! Outbound integrations: CRM lead submission and analytics.
//!
//! The engine talks to both through ports (`LeadSink`, `AnalyticsSink`).
//! Calls are fire-and-forget: real implementations spawn their HTTP request
//! and only log the outcome.

pub mod analytics;
pub mod lead;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::warn;

pub use analytics::{
    AnalyticsEvent, AnalyticsSink, NoopAnalytics, PixelClient, PixelConfig, QualifiedLead,
    QualifiedLeadData,
};
pub use lead::{Lead, LeadSink, WasellerClient, WasellerConfig};

/// Background requests spawned by the HTTP clients.
///
/// Clones share one set, so the binary can wait for outstanding requests
/// before the runtime goes away.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl InFlight {
    /// Spawn `future` on the current runtime. Dropped with a warning when
    /// there is no runtime.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No async runtime available, request dropped");
            return;
        }
        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.spawn(future);
            }
            Err(_) => warn!("In-flight set poisoned, request dropped"),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait up to `limit` for outstanding requests. Returns how many were
    /// still running when the limit hit; those are aborted.
    pub async fn drain(&self, limit: Duration) -> usize {
        let mut tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return 0,
        };
        let finished = tokio::time::timeout(limit, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if finished.is_ok() {
            0
        } else {
            let left = tasks.len();
            tasks.abort_all();
            left
        }
    }
}

/// The ports the engine calls at the defined points of the funnel.
#[derive(Clone)]
pub struct Integrations {
    pub lead: Arc<dyn LeadSink>,
    pub analytics: Arc<dyn AnalyticsSink>,
    /// `origin` stamped on every submitted lead.
    pub lead_origin: String,
    pub in_flight: InFlight,
}

impl Integrations {
    pub fn new(lead: Arc<dyn LeadSink>, analytics: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            lead,
            analytics,
            lead_origin: WasellerConfig::default().origin,
            in_flight: InFlight::default(),
        }
    }

    pub fn with_lead_origin(mut self, origin: impl Into<String>) -> Self {
        self.lead_origin = origin.into();
        self
    }

    /// Real HTTP clients. Analytics falls back to `NoopAnalytics` when no
    /// pixel id is configured.
    pub fn from_config(waseller: WasellerConfig, pixel: PixelConfig) -> Self {
        let in_flight = InFlight::default();
        let origin = waseller.origin.clone();
        let analytics: Arc<dyn AnalyticsSink> = if pixel.is_enabled() {
            tracing::info!(pixel_id = %pixel.pixel_id, "Analytics: Meta pixel");
            Arc::new(PixelClient::new(pixel).with_in_flight(in_flight.clone()))
        } else {
            tracing::info!("Analytics: disabled (no pixel id)");
            Arc::new(NoopAnalytics)
        };
        let lead = Arc::new(WasellerClient::new(waseller).with_in_flight(in_flight.clone()));
        Self {
            lead,
            analytics,
            lead_origin: origin,
            in_flight,
        }
    }

    /// Wait for outstanding lead and pixel requests.
    pub async fn drain(&self, limit: Duration) {
        let left = self.in_flight.drain(limit).await;
        if left > 0 {
            warn!(left, "Gave up waiting for outbound requests");
        }
    }
}

impl std::fmt::Debug for Integrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integrations")
            .field("lead_origin", &self.lead_origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn drain_waits_for_spawned_work() {
        let in_flight = InFlight::default();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = Arc::clone(&done);
            in_flight.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(in_flight.len(), 3);
        assert_eq!(in_flight.drain(Duration::from_secs(5)).await, 0);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn drain_gives_up_after_limit() {
        let in_flight = InFlight::default();
        in_flight.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert_eq!(in_flight.drain(Duration::from_millis(10)).await, 1);
    }

    #[test]
    fn spawn_without_runtime_is_dropped() {
        let in_flight = InFlight::default();
        in_flight.spawn(async {});
        assert!(in_flight.is_empty());
    }

    #[test]
    fn from_config_without_pixel_uses_noop() {
        let integrations = Integrations::from_config(
            WasellerConfig {
                origin: "Test_Origin".into(),
                ..Default::default()
            },
            PixelConfig::default(),
        );
        assert_eq!(integrations.lead_origin, "Test_Origin");
        // NoopAnalytics accepts calls outside a runtime.
        integrations.analytics.track_page_view();
    }
}
