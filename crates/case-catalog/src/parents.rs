//! Container-list transformation: intercepted container records → parent rows.

use crate::types::{id_from_value, CatalogParent, ObtainMethod};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{info, warn};

/// Integer timestamps above this are epoch milliseconds.
const MILLIS_THRESHOLD: i64 = 10_000_000_000;

/// Transform container records, stamping missing creation times with now.
pub fn transform_parents(records: &[Value]) -> Vec<CatalogParent> {
    transform_parents_at(records, Utc::now())
}

/// Transform container records with an explicit "now".
pub fn transform_parents_at(records: &[Value], now: DateTime<Utc>) -> Vec<CatalogParent> {
    let mut parents = Vec::with_capacity(records.len());

    for record in records {
        let Some(obj) = record.as_object() else {
            warn!("skipping non-object container record: {record}");
            continue;
        };

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if name.is_empty() {
            warn!("skipping container record without name: {record}");
            continue;
        }

        let Some(external_id) = obj.get("id").and_then(id_from_value) else {
            warn!("skipping container record without id: {name}");
            continue;
        };

        let obtain_method = obj
            .get("comment")
            .and_then(Value::as_str)
            .and_then(ObtainMethod::from_label);

        parents.push(CatalogParent {
            id: None,
            external_id,
            name: name.to_string(),
            obtain_method,
            created_at: Some(normalize_created_at(obj.get("created_at"), now)),
        });
    }

    info!("transformed {} container records", parents.len());
    parents
}

fn normalize_created_at(value: Option<&Value>, now: DateTime<Utc>) -> String {
    let parsed = match value {
        Some(Value::String(s)) if !s.trim().is_empty() => return s.clone(),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_epoch),
        _ => None,
    };
    if parsed.is_none() && value.is_some_and(|v| !v.is_null()) {
        warn!("unparsable created_at {value:?}, using current time");
    }
    parsed.unwrap_or(now).to_rfc3339()
}

fn from_epoch(ts: i64) -> Option<DateTime<Utc>> {
    if ts > MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(ts).single()
    } else {
        Utc.timestamp_opt(ts, 0).single()
    }
}
