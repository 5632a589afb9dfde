// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP gate in front of the policy evaluator.
//!
//! The upstream auth layer forwards the authenticated actor in
//! `X-Actor-Id`. The client address is the socket peer; forwarding
//! headers are honoured only when that peer is a configured trusted
//! proxy. Each check endpoint extracts identity, asks the
//! evaluator, and either answers `200` (queueing the activity record) or
//! short-circuits with `429`/`400` and a structured body.

use crate::config::Config;
use crate::evaluator::PolicyEvaluator;
use crate::metrics::Metrics;
use crate::models::{ActionType, ActivityRecord, ActorId, ContentFingerprint, Penalty, PolicyVerdict};
use crate::recorder::Recorder;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Header carrying the authenticated actor.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Shared application state.
pub struct AppState {
    pub evaluator: PolicyEvaluator,
    pub recorder: Recorder,
    pub metrics: Arc<Metrics>,
    pub config: Config,
}

/// Error response body for denied or rejected requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_human: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub penalties: Vec<Penalty>,
}

/// Body of an allowed check.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub penalties: Vec<Penalty>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub content: String,
}

/// Body for the generic action endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub target_id: Option<Uuid>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Who is asking, as seen by the gate.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub actor: Option<ActorId>,
    pub ip: IpAddr,
    pub user_agent: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestIdentity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let actor = match parts.headers.get(ACTOR_HEADER) {
            None => None,
            Some(value) => {
                let parsed = value
                    .to_str()
                    .ok()
                    .and_then(|s| s.trim().parse::<Uuid>().ok());
                match parsed {
                    Some(actor) => Some(actor),
                    None => {
                        warn!("Malformed actor header");
                        return Err(plain_error(StatusCode::BAD_REQUEST, "Invalid actor identity"));
                    }
                }
            }
        };

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or_else(|| plain_error(StatusCode::BAD_REQUEST, "Unable to determine client address"))?;
        let ip = client_ip(peer, &parts.headers, &state.config.trusted_proxies);

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self {
            actor,
            ip,
            user_agent,
        })
    }
}

/// The socket peer, unless it is a trusted proxy that names the client.
fn client_ip(peer: IpAddr, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> IpAddr {
    if !trusted_proxies.contains(&peer) {
        return peer;
    }
    forwarded_ip(headers).unwrap_or(peer)
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };
    from("x-forwarded-for").or_else(|| from("x-real-ip"))
}

/// Human-readable rendering of a retry hint.
pub fn humanize(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        return "less than a minute".to_string();
    }
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    if secs < 3600 {
        plural(secs / 60, "minute")
    } else if secs < 86_400 {
        plural(secs / 3600, "hour")
    } else {
        plural(secs / 86_400, "day")
    }
}

/// Whole seconds, rounded up so clients never retry early.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}

fn plain_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            blocked: false,
            retry_after_seconds: None,
            retry_after_human: None,
            penalties: Vec::new(),
        }),
    )
        .into_response()
}

/// Map a denied verdict to its HTTP response.
pub fn denial_response(verdict: PolicyVerdict) -> Response {
    let status = match verdict.denial {
        Some(kind) if kind.is_permanent() => StatusCode::BAD_REQUEST,
        _ => StatusCode::TOO_MANY_REQUESTS,
    };
    let retry_secs = verdict.retry_after.map(ceil_secs);
    let body = ErrorResponse {
        error: verdict.reason.unwrap_or_else(|| "Request blocked".to_string()),
        blocked: true,
        retry_after_seconds: retry_secs,
        retry_after_human: verdict.retry_after.map(humanize),
        penalties: verdict.penalties_applied,
    };

    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = retry_secs {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

fn allowed_response(verdict: PolicyVerdict) -> Response {
    (
        StatusCode::OK,
        Json(CheckResponse {
            allowed: true,
            penalties: verdict.penalties_applied,
            metadata: verdict.metadata,
        }),
    )
        .into_response()
}

/// Queue the activity record for an allowed action and answer `200`.
async fn admit(
    state: &AppState,
    identity: &RequestIdentity,
    action: ActionType,
    target: Option<Uuid>,
    content_length: Option<usize>,
    verdict: PolicyVerdict,
) -> Response {
    let mut record = ActivityRecord::new(
        identity.actor,
        action,
        target,
        identity.ip,
        identity.user_agent.clone(),
        state.evaluator.now(),
    )
    .with_metadata("ip_address", identity.ip.to_string());
    if let Some(length) = content_length {
        record = record.with_metadata("content_length", length);
    }
    if let Some(target) = target {
        record = record.with_metadata("pitch_id", target.to_string());
    }

    if !state.recorder.record_activity(record).await {
        debug!(%action, "Activity record dropped");
    }
    allowed_response(verdict)
}

async fn gate_create(state: &AppState, identity: RequestIdentity, content: &str) -> Response {
    let verdict = state
        .evaluator
        .check_create(identity.actor, content, identity.ip, identity.user_agent.as_deref())
        .await;
    if verdict.is_denied() {
        return denial_response(verdict);
    }
    admit(state, &identity, ActionType::PitchCreate, None, Some(content.chars().count()), verdict).await
}

async fn gate_edit(state: &AppState, identity: RequestIdentity, target: Uuid, content: &str) -> Response {
    let Some(actor) = identity.actor else {
        return plain_error(StatusCode::UNAUTHORIZED, "Authentication required");
    };
    let verdict = state
        .evaluator
        .check_edit(actor, target, content, identity.ip, identity.user_agent.as_deref())
        .await;
    if verdict.is_denied() {
        return denial_response(verdict);
    }
    admit(state, &identity, ActionType::PitchEdit, Some(target), Some(content.chars().count()), verdict).await
}

async fn gate_vote(state: &AppState, identity: RequestIdentity, target: Uuid) -> Response {
    let verdict = state
        .evaluator
        .check_vote(identity.actor, target, identity.ip, identity.user_agent.as_deref())
        .await;
    if verdict.is_denied() {
        return denial_response(verdict);
    }
    admit(state, &identity, ActionType::Vote, Some(target), None, verdict).await
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pitch-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub async fn check_create(
    State(state): State<Arc<AppState>>,
    identity: RequestIdentity,
    Json(req): Json<ContentRequest>,
) -> Response {
    gate_create(&state, identity, &req.content).await
}

pub async fn check_edit(
    State(state): State<Arc<AppState>>,
    Path(pitch_id): Path<Uuid>,
    identity: RequestIdentity,
    Json(req): Json<ContentRequest>,
) -> Response {
    gate_edit(&state, identity, pitch_id, &req.content).await
}

pub async fn check_vote(
    State(state): State<Arc<AppState>>,
    Path(pitch_id): Path<Uuid>,
    identity: RequestIdentity,
) -> Response {
    gate_vote(&state, identity, pitch_id).await
}

/// Generic dispatch by action name, for callers that route on a string.
pub async fn check_action(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    identity: RequestIdentity,
    Json(req): Json<ActionRequest>,
) -> Response {
    let action = match action.parse::<ActionType>() {
        Ok(action) => action,
        Err(err) => {
            error!(error = %err, "Rejecting check for unknown action");
            if cfg!(debug_assertions) {
                panic!("{err}");
            }
            return plain_error(StatusCode::BAD_REQUEST, "Invalid request");
        }
    };

    match (action, req.target_id, req.content) {
        (ActionType::PitchCreate, _, Some(content)) => gate_create(&state, identity, &content).await,
        (ActionType::PitchEdit, Some(target), Some(content)) => {
            gate_edit(&state, identity, target, &content).await
        }
        (ActionType::Vote, Some(target), _) => gate_vote(&state, identity, target).await,
        (action, target, content) => {
            error!(
                %action,
                has_target = target.is_some(),
                has_content = content.is_some(),
                "Rejecting malformed action check"
            );
            plain_error(StatusCode::BAD_REQUEST, "Invalid request")
        }
    }
}

/// Record the fingerprint of a submission the host has just persisted.
pub async fn record_fingerprint(
    State(state): State<Arc<AppState>>,
    Path(pitch_id): Path<Uuid>,
    identity: RequestIdentity,
    Json(req): Json<ContentRequest>,
) -> Response {
    let Some(actor) = identity.actor else {
        return plain_error(StatusCode::UNAUTHORIZED, "Authentication required");
    };
    let fingerprint = ContentFingerprint::new(actor, &req.content, pitch_id, state.evaluator.now());
    if !state.recorder.record_fingerprint(fingerprint).await {
        debug!(%pitch_id, "Fingerprint dropped");
    }
    StatusCode::ACCEPTED.into_response()
}

/// Build the gate router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/v1/pitches/check", post(check_create))
        .route("/v1/pitches/:pitch_id/edit/check", post(check_edit))
        .route("/v1/pitches/:pitch_id/vote/check", post(check_vote))
        .route("/v1/pitches/:pitch_id/fingerprint", post(record_fingerprint))
        .route("/v1/actions/:action/check", post(check_action));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(TimeoutLayer::new(state.config.engine.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::from_secs(59)), "less than a minute");
        assert_eq!(humanize(Duration::from_secs(60)), "1 minute");
        assert_eq!(humanize(Duration::from_secs(150)), "2 minutes");
        assert_eq!(humanize(Duration::from_secs(3600)), "1 hour");
        assert_eq!(humanize(Duration::from_secs(5 * 3600 + 59)), "5 hours");
        assert_eq!(humanize(Duration::from_secs(86_400)), "1 day");
        assert_eq!(humanize(Duration::from_secs(3 * 86_400)), "3 days");
    }

    #[test]
    fn test_forwarded_ip_prefers_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(forwarded_ip(&headers), "203.0.113.9".parse().ok());

        headers.remove("x-forwarded-for");
        assert_eq!(forwarded_ip(&headers), "198.51.100.2".parse().ok());
    }

    #[test]
    fn test_client_ip_ignores_forwarding_from_untrusted_peer() {
        let peer: IpAddr = "198.51.100.40".parse().unwrap();
        let proxy: IpAddr = "10.0.0.2".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

        assert_eq!(client_ip(peer, &headers, &[]), peer);
        assert_eq!(client_ip(peer, &headers, &[proxy]), peer);
        assert_eq!(client_ip(proxy, &headers, &[proxy]), "203.0.113.9".parse::<IpAddr>().unwrap());
        assert_eq!(client_ip(proxy, &HeaderMap::new(), &[proxy]), proxy);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(ceil_secs(Duration::from_secs(60)), 60);
        assert_eq!(ceil_secs(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_denial_near_duration_max_keeps_a_retry_header() {
        let verdict = PolicyVerdict {
            allowed: false,
            retry_after: Some(Duration::MAX - Duration::from_millis(300)),
            ..Default::default()
        };
        let response = denial_response(verdict);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], u64::MAX.to_string());
    }
}
