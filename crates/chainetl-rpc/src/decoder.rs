//! Maps a raw batched JSON-RPC response back onto the requests that
//! produced it.
//!
//! Only the envelope can fail the whole batch. A single item carrying an RPC
//! error or a `null` result comes back as a marker in its slot and the rest
//! of the batch decodes normally.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::BatchError;
use crate::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

/// How responses are re-associated with requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Match each response to the request with the same id. Providers are
    /// free to reorder batch responses, and may drop items; unmatched
    /// requests come back as [`BatchItem::Missing`].
    ById,
    /// Zip responses with requests by position. The response must contain
    /// exactly one item per request and ids must line up.
    Positional,
}

/// One decoded slot of a batch, in request order.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    /// A non-null `result`.
    Value(Value),
    /// `result` was `null` or absent.
    Null,
    /// The node returned an error object for this item.
    Error(JsonRpcError),
    /// No response carried this request's id.
    Missing,
}

impl BatchItem {
    /// Returns the payload if this item succeeded.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Consume the item, keeping only a successful payload.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Short description of a non-value item for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Value(_) => "value".into(),
            Self::Null => "null result".into(),
            Self::Error(e) => e.to_string(),
            Self::Missing => "no response".into(),
        }
    }
}

impl From<JsonRpcResponse> for BatchItem {
    fn from(resp: JsonRpcResponse) -> Self {
        match (resp.error, resp.result) {
            (Some(err), _) => Self::Error(err),
            (None, None) | (None, Some(Value::Null)) => Self::Null,
            (None, Some(v)) => Self::Value(v),
        }
    }
}

/// Decode `raw` against `requests`, returning one [`BatchItem`] per request
/// in request order.
pub fn decode_batch(
    raw: &str,
    requests: &[JsonRpcRequest],
    alignment: Alignment,
) -> Result<Vec<BatchItem>, BatchError> {
    let responses = parse_envelope(raw)?;
    match alignment {
        Alignment::ById => align_by_id(responses, requests),
        Alignment::Positional => align_positional(responses, requests),
    }
}

fn parse_envelope(raw: &str) -> Result<Vec<JsonRpcResponse>, BatchError> {
    let value: Value = serde_json::from_str(raw).map_err(BatchError::InvalidJson)?;
    let items = match value {
        Value::Array(items) => items,
        other => return Err(BatchError::NotAnArray(truncate(&other.to_string(), 200))),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(BatchError::InvalidItem {
                    index,
                    reason: format!("expected object, got {}", truncate(&item.to_string(), 80)),
                });
            }
            serde_json::from_value(item).map_err(|e| BatchError::InvalidItem {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

fn align_by_id(
    responses: Vec<JsonRpcResponse>,
    requests: &[JsonRpcRequest],
) -> Result<Vec<BatchItem>, BatchError> {
    let positions: HashMap<&RpcId, usize> = requests
        .iter()
        .enumerate()
        .map(|(idx, req)| (&req.id, idx))
        .collect();

    let mut slots: Vec<Option<BatchItem>> = vec![None; requests.len()];
    for resp in responses {
        let idx = *positions
            .get(&resp.id)
            .ok_or_else(|| BatchError::UnknownId(resp.id.clone()))?;
        if slots[idx].is_some() {
            return Err(BatchError::DuplicateId(resp.id));
        }
        slots[idx] = Some(BatchItem::from(resp));
    }

    Ok(slots
        .into_iter()
        .map(|slot| slot.unwrap_or(BatchItem::Missing))
        .collect())
}

fn align_positional(
    responses: Vec<JsonRpcResponse>,
    requests: &[JsonRpcRequest],
) -> Result<Vec<BatchItem>, BatchError> {
    if responses.len() != requests.len() {
        return Err(BatchError::LengthMismatch {
            expected: requests.len(),
            actual: responses.len(),
        });
    }

    responses
        .into_iter()
        .zip(requests)
        .enumerate()
        .map(|(index, (resp, req))| {
            if resp.id != req.id {
                return Err(BatchError::OutOfOrder {
                    index,
                    expected: req.id.clone(),
                    actual: resp.id,
                });
            }
            Ok(BatchItem::from(resp))
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{get_receipt_batch, get_uncle_count_batch};
    use serde_json::json;

    fn receipts(n: usize) -> Vec<JsonRpcRequest> {
        let hashes: Vec<String> = (0..n).map(|i| format!("0x{i:02x}")).collect();
        get_receipt_batch(&hashes).unwrap()
    }

    #[test]
    fn by_id_handles_reordered_responses() {
        let reqs = receipts(3);
        let raw = json!([
            {"jsonrpc": "2.0", "id": 2, "result": {"gasUsed": "0x3"}},
            {"jsonrpc": "2.0", "id": 0, "result": {"gasUsed": "0x1"}},
            {"jsonrpc": "2.0", "id": 1, "result": {"gasUsed": "0x2"}},
        ])
        .to_string();

        let items = decode_batch(&raw, &reqs, Alignment::ById).unwrap();
        let gas: Vec<_> = items
            .iter()
            .map(|i| i.value().unwrap()["gasUsed"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(gas, vec!["0x1", "0x2", "0x3"]);
    }

    #[test]
    fn by_id_tolerates_item_errors() {
        let reqs = receipts(4);
        let raw = json!([
            {"jsonrpc": "2.0", "id": 0, "result": {"gasUsed": "0x1"}},
            {"jsonrpc": "2.0", "id": 1, "result": null},
            {"jsonrpc": "2.0", "id": 2, "error": {"code": -32000, "message": "missing trie node"}},
        ])
        .to_string();

        let items = decode_batch(&raw, &reqs, Alignment::ById).unwrap();
        assert!(items[0].value().is_some());
        assert_eq!(items[1], BatchItem::Null);
        assert!(matches!(&items[2], BatchItem::Error(e) if e.code == -32000));
        assert_eq!(items[3], BatchItem::Missing);
    }

    #[test]
    fn by_id_rejects_unknown_id() {
        let reqs = receipts(1);
        let raw = json!([{"jsonrpc": "2.0", "id": 9, "result": "0x0"}]).to_string();
        let err = decode_batch(&raw, &reqs, Alignment::ById).unwrap_err();
        assert!(matches!(err, BatchError::UnknownId(RpcId::Number(9))));
    }

    #[test]
    fn by_id_rejects_duplicate_id() {
        let reqs = receipts(2);
        let raw = json!([
            {"jsonrpc": "2.0", "id": 0, "result": "0x0"},
            {"jsonrpc": "2.0", "id": 0, "result": "0x0"},
        ])
        .to_string();
        let err = decode_batch(&raw, &reqs, Alignment::ById).unwrap_err();
        assert!(matches!(err, BatchError::DuplicateId(_)));
    }

    #[test]
    fn positional_zips_in_order() {
        let reqs = get_uncle_count_batch(&[100, 101, 102]).unwrap();
        let raw = json!([
            {"jsonrpc": "2.0", "id": 0, "result": "0x0"},
            {"jsonrpc": "2.0", "id": 1, "result": "0x1"},
            {"jsonrpc": "2.0", "id": 2, "result": "0x0"},
        ])
        .to_string();
        let items = decode_batch(&raw, &reqs, Alignment::Positional).unwrap();
        assert_eq!(items[1], BatchItem::Value(json!("0x1")));
    }

    #[test]
    fn positional_rejects_short_response() {
        let reqs = get_uncle_count_batch(&[100, 101]).unwrap();
        let raw = json!([{"jsonrpc": "2.0", "id": 0, "result": "0x0"}]).to_string();
        let err = decode_batch(&raw, &reqs, Alignment::Positional).unwrap_err();
        assert!(matches!(err, BatchError::LengthMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn positional_rejects_reordered_response() {
        let reqs = get_uncle_count_batch(&[100, 101]).unwrap();
        let raw = json!([
            {"jsonrpc": "2.0", "id": 1, "result": "0x0"},
            {"jsonrpc": "2.0", "id": 0, "result": "0x0"},
        ])
        .to_string();
        let err = decode_batch(&raw, &reqs, Alignment::Positional).unwrap_err();
        assert!(matches!(err, BatchError::OutOfOrder { index: 0, .. }));
    }

    #[test]
    fn envelope_errors() {
        let reqs = receipts(1);
        assert!(matches!(
            decode_batch("not json", &reqs, Alignment::ById),
            Err(BatchError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_batch(r#"{"jsonrpc":"2.0","id":0,"error":{"code":-32600,"message":"batch too large"}}"#, &reqs, Alignment::ById),
            Err(BatchError::NotAnArray(_))
        ));
        assert!(matches!(
            decode_batch("[1]", &reqs, Alignment::ById),
            Err(BatchError::InvalidItem { index: 0, .. })
        ));
    }

    #[test]
    fn truncate_long_payloads() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
