//! HTTP contract tests for the lead and pixel clients.
//!
//! Each test spins up an Axum server on a random port that records what it
//! receives, then points a real client at it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use lead_funnel::error::IntegrationError;
use lead_funnel::funnel::AnswerMap;
use lead_funnel::integrations::{
    AnalyticsEvent, AnalyticsSink, InFlight, Lead, LeadSink, PixelClient, PixelConfig,
    QualifiedLead, WasellerClient, WasellerConfig,
};

/// One request as the server saw it.
#[derive(Debug, Clone)]
struct Recorded {
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Value,
}

#[derive(Clone)]
struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
    status: StatusCode,
    reply: String,
}

impl Recorder {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(
    State(recorder): State<Recorder>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let body = serde_json::from_str(&body).unwrap_or(Value::Null);
    recorder.requests.lock().unwrap().push(Recorded {
        headers,
        query,
        body,
    });
    (recorder.status, recorder.reply)
}

/// Start an Axum server on a random port, return (base url, recorder).
async fn start_server(status: StatusCode, reply: &str) -> (String, Recorder) {
    let recorder = Recorder {
        requests: Arc::new(Mutex::new(Vec::new())),
        status,
        reply: reply.to_string(),
    };
    let app = Router::new()
        .route("/api/v1/leads", post(record))
        .route("/{pixel}/events", post(record))
        .with_state(recorder.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), recorder)
}

fn answers() -> AnswerMap {
    let mut answers = AnswerMap::new();
    answers.insert("name", "Ana").unwrap();
    answers.insert("objective", "Investimento").unwrap();
    answers.insert("budget", "De R$ 650mil +").unwrap();
    answers
}

fn waseller(base_url: &str, token: &str) -> WasellerClient {
    WasellerClient::new(WasellerConfig {
        base_url: base_url.to_string(),
        token: SecretString::from(token.to_string()),
        ..Default::default()
    })
}

fn pixel(base_url: &str) -> PixelConfig {
    PixelConfig {
        pixel_id: "1357041429488419".into(),
        access_token: Some(SecretString::from("pixel-token".to_string())),
        base_url: base_url.to_string(),
    }
}

#[tokio::test]
async fn lead_is_posted_with_both_auth_headers() {
    let (base, recorder) = start_server(StatusCode::OK, r#"{"id": "lead-1"}"#).await;
    let client = waseller(&base, "crm-token");

    let reply = client
        .send_lead(&Lead::new(answers(), client.origin()))
        .await
        .unwrap();
    assert_eq!(reply, json!({"id": "lead-1"}));

    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.headers["authorization"], "Bearer crm-token");
    assert_eq!(req.headers["apikey"], "crm-token");
    assert!(
        req.headers["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );

    assert_eq!(req.body["name"], "Ana");
    assert_eq!(req.body["objective"], "Investimento");
    assert_eq!(req.body["budget"], "De R$ 650mil +");
    assert_eq!(req.body["origin"], "Chat_Funnel_Site");
    let ts = req.body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
}

#[tokio::test]
async fn non_json_reply_is_treated_as_empty() {
    let (base, _recorder) = start_server(StatusCode::OK, "ok").await;
    let client = waseller(&base, "crm-token");
    let reply = client
        .send_lead(&Lead::new(answers(), "Chat_Funnel_Site"))
        .await
        .unwrap();
    assert_eq!(reply, json!({}));
}

#[tokio::test]
async fn rejected_lead_reports_status() {
    let (base, recorder) =
        start_server(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error": "boom"}"#).await;
    let client = waseller(&base, "crm-token");

    let err = client
        .send_lead(&Lead::new(answers(), "Chat_Funnel_Site"))
        .await
        .unwrap_err();
    match err {
        IntegrationError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert!(body.contains("boom"));
        }
        other => panic!("Expected Status error, got {other:?}"),
    }
    assert_eq!(recorder.requests().len(), 1);
}

#[tokio::test]
async fn unreachable_crm_reports_http_error() {
    // Bind and drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = waseller(&format!("http://127.0.0.1:{port}"), "crm-token");
    let err = client
        .send_lead(&Lead::new(answers(), "Chat_Funnel_Site"))
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::Http { .. }));
}

#[tokio::test]
async fn submit_lead_runs_in_the_background() {
    let (base, recorder) = start_server(StatusCode::CREATED, "{}").await;
    let in_flight = InFlight::default();
    let client = waseller(&base, "crm-token").with_in_flight(in_flight.clone());

    client.submit_lead(Lead::new(answers(), "Chat_Funnel_Site"));
    assert_eq!(in_flight.drain(Duration::from_secs(5)).await, 0);

    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body["name"], "Ana");
}

#[tokio::test]
async fn failed_background_submission_is_swallowed() {
    let (base, recorder) = start_server(StatusCode::BAD_GATEWAY, "{}").await;
    let in_flight = InFlight::default();
    let client = waseller(&base, "crm-token").with_in_flight(in_flight.clone());

    client.submit_lead(Lead::new(answers(), "Chat_Funnel_Site"));
    assert_eq!(in_flight.drain(Duration::from_secs(5)).await, 0);
    assert_eq!(recorder.requests().len(), 1);
}

#[tokio::test]
async fn pixel_event_is_posted_with_access_token() {
    let (base, recorder) = start_server(StatusCode::OK, r#"{"events_received": 1}"#).await;
    let client = PixelClient::new(pixel(&base));

    client
        .send_event(&AnalyticsEvent::FunnelInteraction {
            step: "name".into(),
            response: "Ana".into(),
        })
        .await
        .unwrap();

    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.query["access_token"], "pixel-token");

    let event = &req.body["data"][0];
    assert_eq!(event["event_name"], "FunnelInteraction");
    assert_eq!(event["action_source"], "website");
    assert_eq!(event["custom_data"], json!({"step": "name", "response": "Ana"}));
    assert!(event["event_id"].as_str().is_some());
}

#[tokio::test]
async fn pixel_tracks_qualified_lead_in_the_background() {
    let (base, recorder) = start_server(StatusCode::OK, "{}").await;
    let in_flight = InFlight::default();
    let client = PixelClient::new(pixel(&base)).with_in_flight(in_flight.clone());

    client.track_qualified_lead(QualifiedLead::from_answers(&answers()));
    assert_eq!(in_flight.drain(Duration::from_secs(5)).await, 0);

    let requests = recorder.requests();
    assert_eq!(requests.len(), 1);
    let event = &requests[0].body["data"][0];
    assert_eq!(event["event_name"], "Lead");
    assert_eq!(
        event["custom_data"],
        json!({
            "name": "Ana",
            "custom_data": {"objective": "Investimento", "budget": "De R$ 650mil +"}
        })
    );
}

#[tokio::test]
async fn rejected_pixel_event_reports_status() {
    let (base, _recorder) = start_server(StatusCode::BAD_REQUEST, r#"{"error": "bad"}"#).await;
    let client = PixelClient::new(pixel(&base));
    let err = client
        .send_event(&AnalyticsEvent::PageView)
        .await
        .unwrap_err();
    assert!(matches!(err, IntegrationError::Status { status: 400, .. }));
}
