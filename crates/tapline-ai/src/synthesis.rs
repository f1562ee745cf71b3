//! Schema-constrained record generation.

use serde::Deserialize;
use serde_json::{Map, Value};
use tapline_core::{Column, Result, TaplineError};
use tracing::info;

use crate::client::{ChatRequest, CompletionModel};
use crate::prompt::build_messages;

/// One generated record: field name to JSON value.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub model_name: &'a str,
    pub prompt: &'a str,
    pub count: u32,
    pub columns: &'a [Column],
}

#[derive(Deserialize)]
struct DataEnvelope {
    data: Vec<Value>,
}

/// Ask `model` for `count` records shaped like `columns`.
///
/// A token-limit truncation or an empty candidate list is
/// `ResourceExhausted`; partial JSON is never salvaged.
pub async fn generate_records(
    model: &dyn CompletionModel,
    request: &GenerateRequest<'_>,
) -> Result<Vec<Record>> {
    if request.count == 0 {
        return Err(TaplineError::bad_request("record count must be positive"));
    }
    if request.model_name.trim().is_empty() {
        return Err(TaplineError::bad_request("model name is required"));
    }

    let chat = ChatRequest::json(
        request.model_name,
        build_messages(request.prompt, request.columns, request.count),
    );
    let response = model.complete(&chat).await?;

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        TaplineError::ResourceExhausted("received no choices back from the model".to_string())
    })?;
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(TaplineError::ResourceExhausted(
            "completion limit reached".to_string(),
        ));
    }

    let content = choice.message.content.unwrap_or_default();
    let envelope: DataEnvelope = serde_json::from_str(&content).map_err(|e| {
        TaplineError::decode(format!(
            "unable to decode model output into a data array: {}",
            e
        ))
    })?;

    let records = envelope
        .data
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Object(record) => Ok(record),
            other => Err(TaplineError::decode(format!(
                "record {} is not an object: {}",
                i, other
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Generated {} records (requested {}) with model '{}'",
        records.len(),
        request.count,
        request.model_name
    );
    Ok(records)
}
