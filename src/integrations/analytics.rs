//! Marketing analytics events sent to a Meta pixel.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::IntegrationError;
use crate::funnel::AnswerMap;

use super::InFlight;

const SERVICE: &str = "meta_pixel";

/// Pixel id shipped in the sample configuration; treated as unset.
pub const PLACEHOLDER_PIXEL_ID: &str = "SEU_ID_DO_PIXEL_AQUI";

/// Extra attributes of a qualified lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualifiedLeadData {
    pub objective: String,
    pub budget: String,
}

/// Conversion payload fired when a lead reaches the terminal step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualifiedLead {
    pub name: String,
    pub custom_data: QualifiedLeadData,
}

impl QualifiedLead {
    pub fn from_answers(answers: &AnswerMap) -> Self {
        let field = |key: &str| answers.get(key).unwrap_or_default().to_string();
        Self {
            name: field("name"),
            custom_data: QualifiedLeadData {
                objective: field("objective"),
                budget: field("budget"),
            },
        }
    }
}

/// Events the funnel emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    PageView,
    FunnelInteraction { step: String, response: String },
    QualifiedLead(QualifiedLead),
}

impl AnalyticsEvent {
    /// Event name on the pixel side.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PageView => "PageView",
            Self::FunnelInteraction { .. } => "FunnelInteraction",
            Self::QualifiedLead(_) => "Lead",
        }
    }

    pub fn custom_data(&self) -> serde_json::Value {
        match self {
            Self::PageView => json!({}),
            Self::FunnelInteraction { step, response } => {
                json!({ "step": step, "response": response })
            }
            Self::QualifiedLead(lead) => json!(lead),
        }
    }
}

/// Port for analytics. Fire-and-forget like `LeadSink`.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: AnalyticsEvent);

    fn track_page_view(&self) {
        self.track(AnalyticsEvent::PageView);
    }

    fn track_step_interaction(&self, step: &str, response: &str) {
        self.track(AnalyticsEvent::FunnelInteraction {
            step: step.to_string(),
            response: response.to_string(),
        });
    }

    fn track_qualified_lead(&self, lead: QualifiedLead) {
        self.track(AnalyticsEvent::QualifiedLead(lead));
    }
}

/// Sink used when no pixel is configured. Accepts every call.
#[derive(Debug, Clone, Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        debug!(event = event.name(), "Analytics disabled, event dropped");
    }
}

/// Pixel connection settings.
#[derive(Debug, Clone)]
pub struct PixelConfig {
    pub pixel_id: String,
    pub access_token: Option<SecretString>,
    pub base_url: String,
}

impl Default for PixelConfig {
    fn default() -> Self {
        Self {
            pixel_id: String::new(),
            access_token: None,
            base_url: "https://graph.facebook.com/v18.0".to_string(),
        }
    }
}

impl PixelConfig {
    /// Whether a real pixel id is set.
    pub fn is_enabled(&self) -> bool {
        let id = self.pixel_id.trim();
        !id.is_empty() && id != PLACEHOLDER_PIXEL_ID
    }
}

/// Conversions-API client for the pixel.
#[derive(Debug, Clone)]
pub struct PixelClient {
    client: reqwest::Client,
    config: PixelConfig,
    in_flight: InFlight,
}

impl PixelClient {
    pub fn new(config: PixelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            in_flight: InFlight::default(),
        }
    }

    /// Track spawned events in `in_flight`.
    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}/events",
            self.config.base_url.trim_end_matches('/'),
            self.config.pixel_id.trim()
        )
    }

    /// Build the request body for one event.
    pub fn payload(event: &AnalyticsEvent) -> serde_json::Value {
        json!({
            "data": [{
                "event_name": event.name(),
                "event_time": Utc::now().timestamp(),
                "event_id": uuid::Uuid::new_v4().to_string(),
                "action_source": "website",
                "custom_data": event.custom_data(),
            }]
        })
    }

    pub async fn send_event(&self, event: &AnalyticsEvent) -> Result<(), IntegrationError> {
        let token = self
            .config
            .access_token
            .as_ref()
            .map(|t| t.expose_secret())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IntegrationError::MissingCredentials {
                service: SERVICE.to_string(),
            })?;

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("access_token", token)])
            .json(&Self::payload(event))
            .send()
            .await
            .map_err(|e| IntegrationError::Http {
                service: SERVICE.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

impl AnalyticsSink for PixelClient {
    fn track(&self, event: AnalyticsEvent) {
        let client = self.clone();
        self.in_flight.spawn(async move {
            match client.send_event(&event).await {
                Ok(()) => debug!(event = event.name(), "Pixel event sent"),
                Err(e) => warn!(event = event.name(), "Pixel event failed: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_lead_from_answers() {
        let mut answers = AnswerMap::new();
        answers.insert("name", "Ana").unwrap();
        answers.insert("objective", "Moradia").unwrap();
        answers.insert("budget", "De R$ 650mil +").unwrap();
        let lead = QualifiedLead::from_answers(&answers);
        assert_eq!(
            serde_json::to_value(&lead).unwrap(),
            json!({
                "name": "Ana",
                "custom_data": {"objective": "Moradia", "budget": "De R$ 650mil +"}
            })
        );
    }

    #[test]
    fn event_names() {
        assert_eq!(AnalyticsEvent::PageView.name(), "PageView");
        let interaction = AnalyticsEvent::FunnelInteraction {
            step: "name".into(),
            response: "Ana".into(),
        };
        assert_eq!(interaction.name(), "FunnelInteraction");
        assert_eq!(
            interaction.custom_data(),
            json!({"step": "name", "response": "Ana"})
        );
    }

    #[test]
    fn placeholder_pixel_is_disabled() {
        let mut config = PixelConfig::default();
        assert!(!config.is_enabled());
        config.pixel_id = PLACEHOLDER_PIXEL_ID.into();
        assert!(!config.is_enabled());
        config.pixel_id = "1357041429488419".into();
        assert!(config.is_enabled());
    }

    #[test]
    fn payload_shape() {
        let payload = PixelClient::payload(&AnalyticsEvent::PageView);
        let event = &payload["data"][0];
        assert_eq!(event["event_name"], "PageView");
        assert_eq!(event["action_source"], "website");
        assert!(event["event_time"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn missing_access_token_is_reported() {
        let client = PixelClient::new(PixelConfig {
            pixel_id: "123".into(),
            ..Default::default()
        });
        let err = client
            .send_event(&AnalyticsEvent::PageView)
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::MissingCredentials { .. }));
    }

    #[test]
    fn noop_accepts_all_events() {
        let sink = NoopAnalytics;
        sink.track_page_view();
        sink.track_step_interaction("name", "Ana");
        sink.track_qualified_lead(QualifiedLead::from_answers(&AnswerMap::new()));
    }
}
