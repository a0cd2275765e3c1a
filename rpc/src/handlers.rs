//! Debug method dispatch and the HTTP handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use prometheus::{Encoder, TextEncoder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::DebugBackend;
use crate::jsonrpc::{JsonError, JsonRequest, JsonResponse};
use crate::routes::RpcState;

#[derive(Deserialize)]
struct SetDelayParams {
    delay: u64,
}

#[derive(Deserialize)]
struct SetDropRateParams {
    #[serde(alias = "drop_rate")]
    droprate: u32,
}

#[derive(Deserialize)]
struct SimCtrlParams {
    commands: Vec<String>,
}

#[derive(Deserialize)]
struct MessageFilterParams {
    #[serde(rename = "output-regex", default)]
    output: String,
    #[serde(rename = "input-regex", default)]
    input: String,
}

fn params<T: DeserializeOwned>(value: &Value) -> Result<T, JsonError> {
    serde_json::from_value(value.clone())
        .map_err(|e| JsonError::invalid_params().with_data(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, JsonError> {
    serde_json::to_value(value).map_err(|e| JsonError::internal().with_data(e.to_string()))
}

/// Run one debug method against the backend.
pub fn dispatch(backend: &dyn DebugBackend, req: &JsonRequest) -> Result<Value, JsonError> {
    let result = match req.method.as_str() {
        "audit-servers" => json!({ "audit_servers": to_value(backend.audit_servers())? }),
        "federated-servers" => {
            json!({ "federated_servers": to_value(backend.federated_servers())? })
        }
        "authorities" => json!({ "authorities": to_value(backend.authorities())? }),
        "configuration" => backend.configuration(),
        "reload-configuration" => backend
            .reload_configuration()
            .map_err(|e| JsonError::internal().with_data(e))?,
        "current-minute" => json!({ "minute": backend.current_minute() }),
        "delay" => json!({ "delay": backend.delay() }),
        "set-delay" => {
            let p: SetDelayParams = params(&req.params)?;
            json!({ "delay": backend.set_delay(p.delay) })
        }
        "drop-rate" => json!({ "drop_rate": backend.drop_rate() }),
        "set-drop-rate" => {
            let p: SetDropRateParams = params(&req.params)?;
            json!({ "drop_rate": backend.set_drop_rate(p.droprate) })
        }
        "holding-queue" => json!({ "messages": backend.holding_queue() }),
        "messages" => json!({ "messages": backend.messages() }),
        "network-info" => to_value(backend.network_info())?,
        "summary" => json!({ "summary": backend.summary() }),
        "predictive-fer" => json!({ "predictive_fer": backend.predictive_fer() }),
        "process-list" => json!({ "process_list": backend.process_list() }),
        "sim-ctrl" => {
            let p: SimCtrlParams = params(&req.params)?;
            let queued = backend
                .sim_ctrl(p.commands)
                .map_err(|e| JsonError::internal().with_data(e))?;
            json!({ "status": "success", "queued": queued })
        }
        "message-filter" => {
            let p: MessageFilterParams = params(&req.params)?;
            let filters = backend
                .message_filter(&p.output, &p.input)
                .map_err(|e| JsonError::invalid_params().with_data(e))?;
            json!({ "params": "success", "filters": to_value(filters)? })
        }
        _ => return Err(JsonError::method_not_found()),
    };
    Ok(result)
}

fn authorized(state: &RpcState, headers: &HeaderMap) -> bool {
    let Some((user, pass)) = &state.credentials else {
        return true;
    };
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    match STANDARD.decode(encoded.trim()) {
        Ok(decoded) => decoded == format!("{user}:{pass}").as_bytes(),
        Err(_) => false,
    }
}

/// Handler for `POST /debug`.
pub async fn debug_handler(
    State(state): State<RpcState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&state, &headers) {
        tracing::warn!("unauthorized debug request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"meridian\"")],
            Json(JsonResponse::error(Value::Null, JsonError::unauthorized())),
        )
            .into_response();
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            return Json(JsonResponse::error(Value::Null, JsonError::parse_error()))
                .into_response()
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let req: JsonRequest = match serde_json::from_value(raw) {
        Ok(req) => req,
        Err(_) => {
            return Json(JsonResponse::error(id, JsonError::invalid_request())).into_response()
        }
    };

    let span = tracing::debug_span!("debug_rpc", method = %req.method);
    let _enter = span.enter();
    let response = match dispatch(state.backend.as_ref(), &req) {
        Ok(result) => JsonResponse::result(req.id, result),
        Err(error) => {
            tracing::debug!(code = error.code, "debug request failed");
            JsonResponse::error(req.id, error)
        }
    };
    Json(response).into_response()
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler(State(state): State<RpcState>) -> Response {
    let Some(registry) = &state.registry else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}
