//! JSON items returned by the receive and list endpoints.
//!
//! Each item is `{ "id": <integer>, "content": "<Base64(GZIP(unit))>" }`.
//! Items with missing fields or undecodable content are skipped.

use serde::Deserialize;
use serde_json::Value;
use shared_bus::{ReceivedUnit, Receipt};
use shared_types::codec;
use tracing::warn;

#[derive(Deserialize)]
struct MessageItem {
    id: Option<i64>,
    content: Option<String>,
}

/// Decode a response array into received units, skipping bad items.
#[must_use]
pub fn parse_items(items: Vec<Value>) -> Vec<ReceivedUnit> {
    items.into_iter().filter_map(parse_item).collect()
}

fn parse_item(value: Value) -> Option<ReceivedUnit> {
    let item: MessageItem = match serde_json::from_value(value) {
        Ok(item) => item,
        Err(e) => {
            warn!(error = %e, "Skipping malformed message item");
            return None;
        }
    };

    let (Some(id), Some(content)) = (item.id, item.content) else {
        warn!("Skipping message item without id or content");
        return None;
    };

    match codec::decode_unit(&content) {
        Ok(unit) => Some(ReceivedUnit::new(unit, Receipt::new(id.to_string()))),
        Err(e) => {
            warn!(item = id, error = %e, "Skipping undecodable message item");
            None
        }
    }
}
