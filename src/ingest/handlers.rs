use super::IngestState;
use super::error::IngestError;
use super::payload::{CustomParserRequest, LogRecordPayload, ParseRequest};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// POST /logs
pub async fn ingest_log(
    State(state): State<Arc<IngestState>>,
    Json(payload): Json<LogRecordPayload>,
) -> Result<impl IntoResponse, IngestError> {
    let record = payload.into_record()?;
    let message_id = state.producer.enqueue(&record).await?;
    debug!("Queued log {} from {}", message_id, record.source);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "queued",
            "message_id": message_id,
            "message": "Log queued for processing",
        })),
    ))
}

/// POST /logs/batch
pub async fn ingest_batch(
    State(state): State<Arc<IngestState>>,
    Json(payloads): Json<Vec<LogRecordPayload>>,
) -> Result<impl IntoResponse, IngestError> {
    if payloads.is_empty() || payloads.len() > state.max_batch {
        return Err(IngestError::BatchSize {
            max: state.max_batch,
            got: payloads.len(),
        });
    }

    let records = payloads
        .into_iter()
        .enumerate()
        .map(|(index, payload)| {
            payload.into_record().map_err(|e| match e {
                IngestError::Validation(reason) => {
                    IngestError::Validation(format!("record {index}: {reason}"))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let count = state.producer.enqueue_batch(&records).await?;
    info!("Queued batch of {} logs", count);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "queued",
            "count": count,
            "message": format!("Queued {count} logs"),
        })),
    ))
}

/// GET /queue/status
pub async fn queue_status(State(state): State<Arc<IngestState>>) -> Result<Json<Value>, IngestError> {
    let info = state.producer.stream_info().await?;
    Ok(Json(json!({
        "status": "healthy",
        "queue_length": info.length,
        "consumer_groups": info.groups,
        "first_entry_id": info.first_entry_id,
        "last_entry_id": info.last_entry_id,
        "messages_sent": state.producer.messages_sent(),
    })))
}

/// GET /health
pub async fn health(State(state): State<Arc<IngestState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "rask-log-pipeline",
        "version": crate::VERSION,
        "subscribers": state.broadcaster.subscriber_count(),
    }))
}

/// POST /parse/auto
pub async fn parse_auto(
    State(state): State<Arc<IngestState>>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<Value>, IngestError> {
    let (format, record) = match request.parser.as_deref() {
        Some(name) => {
            if !state.registry.has_parser(name) {
                return Err(IngestError::ParserNotFound(name.to_string()));
            }
            (name.to_string(), state.registry.parse(&request.raw_log, Some(name))?)
        }
        None => {
            let record = state.registry.parse(&request.raw_log, None)?;
            let format = record
                .metadata
                .get("parser")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            (format, record)
        }
    };

    Ok(Json(json!({
        "detected_format": format,
        "parsed": record,
    })))
}

/// GET /parse/formats
pub async fn parse_formats(State(state): State<Arc<IngestState>>) -> Json<Value> {
    Json(json!({ "formats": state.registry.list_parsers() }))
}

/// GET /parse/patterns
pub async fn parse_patterns(State(state): State<Arc<IngestState>>) -> Json<Value> {
    Json(json!({ "patterns": state.registry.predefined_patterns() }))
}

/// POST /parse/custom
pub async fn add_custom_parser(
    State(state): State<Arc<IngestState>>,
    Json(request): Json<CustomParserRequest>,
) -> Result<impl IntoResponse, IngestError> {
    if request.name.trim().is_empty() {
        return Err(IngestError::Validation("name must not be empty".to_string()));
    }
    let validation = state
        .registry
        .add_custom_parser(&request.name, &request.pattern)
        .map_err(|e| IngestError::Validation(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "registered",
            "name": format!("{}{}", crate::parser::CUSTOM_PREFIX, request.name),
            "groups": validation.groups,
            "warnings": validation.warnings,
        })),
    ))
}

/// DELETE /parse/custom/{name}
pub async fn remove_custom_parser(
    State(state): State<Arc<IngestState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, IngestError> {
    if state.registry.remove_custom_parser(&name) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(IngestError::ParserNotFound(name))
    }
}
