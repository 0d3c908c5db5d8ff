//! Shapes of the JSON bodies the site returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object keys that may hold the record array in an intercepted body.
const LIST_KEYS: [&str; 4] = ["data", "list", "items", "results"];

/// Pull the record list out of an intercepted response body.
///
/// Arrays are returned as-is; objects yield the first array found under
/// `data|list|items|results`, or else the object itself as a single record.
/// Scalars and `null` carry no records.
pub fn extract_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in LIST_KEYS {
                if matches!(map.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return items;
                    }
                }
            }
            vec![Value::Object(map)]
        }
        _ => Vec::new(),
    }
}

/// Envelope of the authenticated detail endpoint: `{code, msg, data}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailEnvelope {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl DetailEnvelope {
    pub const SUCCESS_CODE: i64 = 200;

    pub fn is_success(&self) -> bool {
        self.code == Some(Self::SUCCESS_CODE)
    }

    /// The `data` array, or nothing when `data` is absent or not an array.
    pub fn into_records(self) -> Vec<Value> {
        match self.data {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }
}
