//! Lead submission to the CRM.

use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::IntegrationError;
use crate::funnel::AnswerMap;

use super::InFlight;

const SERVICE: &str = "waseller";

/// Payload fields written next to the answers. Step keys may not use them.
pub const RESERVED_LEAD_FIELDS: [&str; 2] = ["origin", "timestamp"];

/// A completed answer map, ready to post.
#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    #[serde(flatten)]
    pub answers: AnswerMap,
    pub origin: String,
    /// ISO-8601 UTC, millisecond precision.
    pub timestamp: String,
}

impl Lead {
    pub fn new(answers: AnswerMap, origin: impl Into<String>) -> Self {
        Self {
            answers,
            origin: origin.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Port for lead submission. Fire-and-forget: implementations must not
/// block the caller and must swallow their own failures.
pub trait LeadSink: Send + Sync {
    fn submit_lead(&self, lead: Lead);
}

/// Connection settings for the WaSeller lead API.
#[derive(Debug, Clone)]
pub struct WasellerConfig {
    pub base_url: String,
    pub token: SecretString,
    pub origin: String,
}

impl Default for WasellerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-whatsapp.wascript.com.br".to_string(),
            token: SecretString::from(String::new()),
            origin: "Chat_Funnel_Site".to_string(),
        }
    }
}

/// HTTP client for the WaSeller lead endpoint.
#[derive(Debug, Clone)]
pub struct WasellerClient {
    client: reqwest::Client,
    config: WasellerConfig,
    in_flight: InFlight,
}

impl WasellerClient {
    pub fn new(config: WasellerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            in_flight: InFlight::default(),
        }
    }

    /// Track spawned submissions in `in_flight`.
    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub fn origin(&self) -> &str {
        &self.config.origin
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/v1/leads", self.config.base_url.trim_end_matches('/'))
    }

    /// POST the lead. Returns the response body (or `{}` when it is not JSON).
    pub async fn send_lead(&self, lead: &Lead) -> Result<serde_json::Value, IntegrationError> {
        let token = self.config.token.expose_secret();
        if token.is_empty() {
            return Err(IntegrationError::MissingCredentials {
                service: SERVICE.to_string(),
            });
        }

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .header("apikey", token)
            .json(lead)
            .send()
            .await
            .map_err(|e| IntegrationError::Http {
                service: SERVICE.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({})))
    }
}

impl LeadSink for WasellerClient {
    fn submit_lead(&self, lead: Lead) {
        let client = self.clone();
        self.in_flight.spawn(async move {
            info!(endpoint = %client.endpoint(), "Submitting lead");
            match client.send_lead(&lead).await {
                Ok(body) => info!(response = %body, "Lead submitted"),
                Err(e) => warn!("Lead submission failed: {}", e),
            }
        });
    }
}
