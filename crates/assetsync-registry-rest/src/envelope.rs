//! Response envelope and row extraction.
//!
//! Every call answers with
//!
//! ```text
//! { "@status": true|false,
//!   "state":  { "code": "...", "error": "..." },
//!   "params": { ... } }
//! ```
//!
//! Query results live under `params.rowData.row`, which the registry renders
//! as an object when exactly one row matches and as an array otherwise.

use assetsync_registry::error::{RegistryError, RegistryResult};
use serde::Deserialize;
use serde_json::{Map, Value};

pub(crate) type Row = Map<String, Value>;

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "@status")]
    pub status: bool,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct State {
    #[serde(default)]
    pub error: String,
}

impl Envelope {
    pub fn decode(method: &str, body: &str) -> RegistryResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| RegistryError::protocol(format!("{method}: undecodable response: {e}")))
    }

    /// Turn a failure status into a rejection carrying the registry's message.
    pub fn into_params(self, method: &str) -> RegistryResult<Value> {
        if self.status {
            Ok(self.params)
        } else {
            Err(RegistryError::rejected(method, self.state.error))
        }
    }
}

/// Rows of a `rowData` result, whether one or many.
pub(crate) fn rows(params: &Value) -> Vec<Row> {
    rows_at(params.pointer("/rowData/row"))
}

pub(crate) fn rows_at(value: Option<&Value>) -> Vec<Row> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
        Some(Value::Object(row)) => vec![row.clone()],
        _ => Vec::new(),
    }
}

/// Text of a scalar cell; numbers are rendered, anything else is empty.
pub(crate) fn cell(row: &Row, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Parse a count that may arrive as a string or a number.
pub(crate) fn parse_count(method: &str, value: Option<&Value>) -> RegistryResult<u64> {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| RegistryError::protocol(format!("{method}: invalid count {n}"))),
        Some(Value::String(s)) if s.is_empty() => Ok(0),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| RegistryError::protocol(format!("{method}: invalid count {s:?}"))),
        None | Some(Value::Null) => Ok(0),
        Some(other) => Err(RegistryError::protocol(format!(
            "{method}: invalid count {other}"
        ))),
    }
}

/// Count returned by a `queryExec` in count mode (`rowData.row[0].count`).
pub(crate) fn row_count(method: &str, params: &Value) -> RegistryResult<u64> {
    match rows(params).first() {
        Some(row) => parse_count(method, row.get("count")),
        None => Ok(0),
    }
}

/// Site lists are returned as a JSON document embedded in a string.
pub(crate) fn embedded_rows(method: &str, value: Option<&Value>) -> RegistryResult<Vec<Row>> {
    match value {
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => {
            let doc: Value = serde_json::from_str(s).map_err(|e| {
                RegistryError::protocol(format!("{method}: undecodable embedded rows: {e}"))
            })?;
            Ok(rows_at(doc.get("row")))
        }
        Some(doc @ Value::Object(_)) => Ok(rows_at(doc.get("row"))),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_success_and_failure() {
        let ok = Envelope::decode("m", r#"{"@status": true, "params": {"a": 1}}"#).unwrap();
        assert_eq!(ok.into_params("m").unwrap(), json!({"a": 1}));

        let failed = Envelope::decode(
            "entityUpdateRecord",
            r#"{"@status": false, "state": {"code": "0200", "error": "boom"}}"#,
        )
        .unwrap();
        let err = failed.into_params("entityUpdateRecord").unwrap_err();
        assert!(err.is_rejection());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_decode_garbage_is_protocol_error() {
        let err = Envelope::decode("m", "<html>").unwrap_err();
        assert!(matches!(err, RegistryError::Protocol { .. }));
    }

    #[test]
    fn test_rows_single_and_many() {
        let single = json!({"rowData": {"row": {"h_id": "1"}}});
        assert_eq!(rows(&single).len(), 1);

        let many = json!({"rowData": {"row": [{"h_id": "1"}, {"h_id": "2"}]}});
        assert_eq!(rows(&many).len(), 2);

        assert!(rows(&json!({})).is_empty());
    }

    #[test]
    fn test_cell_renders_numbers() {
        let row = json!({"h_pk_id": 42, "h_app_id": "A", "h_nothing": null});
        let row = row.as_object().unwrap();
        assert_eq!(cell(row, "h_pk_id"), "42");
        assert_eq!(cell(row, "h_app_id"), "A");
        assert_eq!(cell(row, "h_nothing"), "");
        assert_eq!(cell(row, "missing"), "");
    }

    #[test]
    fn test_row_count() {
        let params = json!({"rowData": {"row": [{"count": "17"}]}});
        assert_eq!(row_count("q", &params).unwrap(), 17);
        let params = json!({"rowData": {"row": {"count": 3}}});
        assert_eq!(row_count("q", &params).unwrap(), 3);
        assert_eq!(row_count("q", &json!({})).unwrap(), 0);
        let bad = json!({"rowData": {"row": [{"count": "many"}]}});
        assert!(row_count("q", &bad).is_err());
    }

    #[test]
    fn test_embedded_rows() {
        let embedded = json!(r#"{"row": [{"h_id": "1", "h_site_name": "HQ"}]}"#);
        let rows = embedded_rows("getSitesList", Some(&embedded)).unwrap();
        assert_eq!(cell(&rows[0], "h_site_name"), "HQ");

        let single = json!(r#"{"row": {"h_id": "2", "h_site_name": "Depot"}}"#);
        assert_eq!(embedded_rows("getSitesList", Some(&single)).unwrap().len(), 1);

        assert!(embedded_rows("getSitesList", None).unwrap().is_empty());
    }
}
