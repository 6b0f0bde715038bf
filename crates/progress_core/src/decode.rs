use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::event::{Details, EventKind, EventPayload, Phase, ProgressEvent, Scalar};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Malformed(String),
    #[error("expected a json object")]
    NotAnObject,
    #[error("message has no `type` discriminant")]
    MissingKind,
    #[error("`{kind}` event is missing required field `{field}`")]
    MissingField { kind: String, field: &'static str },
    #[error("field `{field}` has an invalid value")]
    InvalidField { field: &'static str },
}

/// Decode one stream message into a typed event.
///
/// The discriminant is read from `type`, falling back to `kind`. Unknown kinds
/// decode to [`EventKind::Unclassified`]; missing required fields for a known
/// kind are an error. Explicit `null` fields count as absent.
pub fn decode_event(text: &str) -> Result<ProgressEvent, DecodeError> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = take_string(&mut fields, &["type", "kind"], "type")?
        .filter(|raw| !raw.is_empty())
        .map(|raw| EventKind::parse(&raw))
        .ok_or(DecodeError::MissingKind)?;

    let session_id = take_string(&mut fields, &["session_id", "sessionId"], "session_id")?;
    let phase = take_string(&mut fields, &["phase"], "phase")?
        .filter(|raw| !raw.is_empty())
        .map(|raw| Phase::parse(&raw));
    let occurred_at = take_timestamp(&mut fields)?;

    let payload = EventPayload {
        current_item: take_string(
            &mut fields,
            &["current_item", "currentItem", "current_file"],
            "current_item",
        )?,
        items_processed: take_count(
            &mut fields,
            &["items_processed", "itemsProcessed", "files_processed"],
            "items_processed",
        )?,
        items_total: take_count(
            &mut fields,
            &["items_total", "itemsTotal", "total_files"],
            "items_total",
        )?,
        progress: take_percentage(&mut fields)?,
        message: take_string(&mut fields, &["message"], "message")?,
        error: take_string(&mut fields, &["error"], "error")?,
        details: take_details(&mut fields)?,
    };

    let event = ProgressEvent {
        kind,
        session_id,
        phase,
        occurred_at,
        payload,
    };
    check_required(&event)?;
    Ok(event)
}

fn check_required(event: &ProgressEvent) -> Result<(), DecodeError> {
    let missing = |field| DecodeError::MissingField {
        kind: event.kind.to_string(),
        field,
    };
    match event.kind {
        EventKind::PhaseChange if event.phase.is_none() => Err(missing("phase")),
        EventKind::ItemExamined if event.payload.current_item.is_none() => {
            Err(missing("current_item"))
        }
        EventKind::Step if event.payload.message.is_none() => Err(missing("message")),
        EventKind::Error if event.failure_message().is_none() => Err(missing("error")),
        _ => Ok(()),
    }
}

fn take_first(fields: &mut Map<String, Value>, names: &[&str]) -> Option<Value> {
    names
        .iter()
        .filter_map(|name| fields.remove(*name))
        .find(|value| !value.is_null())
}

fn take_string(
    fields: &mut Map<String, Value>,
    names: &[&str],
    field: &'static str,
) -> Result<Option<String>, DecodeError> {
    match take_first(fields, names) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        // Numeric ids are common enough to accept.
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(_) => Err(DecodeError::InvalidField { field }),
    }
}

fn take_count(
    fields: &mut Map<String, Value>,
    names: &[&str],
    field: &'static str,
) -> Result<Option<u64>, DecodeError> {
    let Some(value) = take_first(fields, names) else {
        return Ok(None);
    };
    if let Some(count) = value.as_u64() {
        return Ok(Some(count));
    }
    match value.as_f64() {
        Some(count) if count.is_finite() && count >= 0.0 => Ok(Some(count.round() as u64)),
        _ => Err(DecodeError::InvalidField { field }),
    }
}

fn take_percentage(fields: &mut Map<String, Value>) -> Result<Option<f64>, DecodeError> {
    let Some(value) = take_first(fields, &["progress", "percentage"]) else {
        return Ok(None);
    };
    match value.as_f64() {
        Some(percent) if percent.is_finite() => Ok(Some(percent.clamp(0.0, 100.0))),
        _ => Err(DecodeError::InvalidField { field: "progress" }),
    }
}

/// RFC 3339 strings or integer epoch milliseconds.
fn take_timestamp(fields: &mut Map<String, Value>) -> Result<Option<DateTime<Utc>>, DecodeError> {
    let invalid = DecodeError::InvalidField { field: "timestamp" };
    match take_first(fields, &["timestamp", "occurred_at", "occurredAt"]) {
        None => Ok(None),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|stamp| Some(stamp.with_timezone(&Utc)))
            .map_err(|_| invalid),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(Some)
            .ok_or(invalid),
        Some(_) => Err(invalid),
    }
}

/// Flatten the `details` object into scalars. Nested values are kept as their
/// JSON text so fields added by newer servers are not lost.
fn take_details(fields: &mut Map<String, Value>) -> Result<Details, DecodeError> {
    let mut details = Details::new();
    let Some(value) = take_first(fields, &["details", "counters"]) else {
        return Ok(details);
    };
    let Value::Object(entries) = value else {
        return Err(DecodeError::InvalidField { field: "details" });
    };
    for (key, value) in entries {
        let scalar = match value {
            Value::Null => continue,
            Value::Bool(flag) => Scalar::Bool(flag),
            Value::Number(number) => match number.as_f64() {
                Some(number) => Scalar::Number(number),
                None => Scalar::Text(number.to_string()),
            },
            Value::String(text) => Scalar::Text(text),
            nested @ (Value::Array(_) | Value::Object(_)) => Scalar::Text(nested.to_string()),
        };
        details.insert(key, scalar);
    }
    Ok(details)
}
