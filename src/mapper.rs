//! JSON body -> record decoding.
//!
//! Bodies are parsed into `serde_json::Value` first (keeping number text, see
//! `arbitrary_precision`) and then decoded with `serde_path_to_error`, so a mismatch names
//! the offending field, e.g. `systems[1].devices[0].product.serialNumber`.

use std::iter::FusedIterator;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::myuplink::DevicePoint;

pub fn parse_body(body: &str) -> Result<Value, ApiError> {
    Ok(serde_json::from_str(body)?)
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    decode_at("", value)
}

fn decode_at<T: DeserializeOwned>(prefix: &str, value: Value) -> Result<T, ApiError> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        let inner = e.path().to_string();
        let path = match (prefix.is_empty(), inner.as_str()) {
            (true, _) => inner.clone(),
            (false, ".") => prefix.to_string(),
            (false, _) => format!("{}.{}", prefix, inner),
        };
        ApiError::Decode {
            path,
            message: e.into_inner().to_string(),
        }
    })
}

/// Take the array out of `{"<field>": [...]}`. A bare top-level array is accepted as well.
pub fn unwrap_list(value: Value, field: &str) -> Result<Vec<Value>, ApiError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(field) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(ApiError::Decode {
                path: field.to_string(),
                message: "expected an array".into(),
            }),
            None => Err(ApiError::Decode {
                path: field.to_string(),
                message: "missing field".into(),
            }),
        },
        _ => Err(ApiError::Decode {
            path: ".".into(),
            message: format!("expected an object holding `{}` or an array", field),
        }),
    }
}

pub fn decode_list<T: DeserializeOwned>(field: &str, items: Vec<Value>) -> Result<Vec<T>, ApiError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| decode_at(&format!("{}[{}]", field, i), item))
        .collect()
}

/// Rewrite top-level `sh-foo` keys to `sh_foo`.
pub fn underscore_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k.replace('-', "_"), v)).collect()),
        other => other,
    }
}

/// Device points decoded one at a time, in server order.
///
/// Single pass: once exhausted it keeps returning `None`, and it cannot be rewound.
#[derive(Debug)]
pub struct DevicePoints {
    items: std::vec::IntoIter<Value>,
    index: usize,
}

impl DevicePoints {
    pub(crate) fn new(items: Vec<Value>) -> Self {
        DevicePoints {
            items: items.into_iter(),
            index: 0,
        }
    }
}

impl Iterator for DevicePoints {
    type Item = Result<DevicePoint, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        let prefix = format!("[{}]", self.index);
        self.index += 1;
        Some(decode_at(&prefix, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for DevicePoints {}

impl FusedIterator for DevicePoints {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::myuplink::Product;
    use serde_json::json;

    #[test]
    fn decode_error_names_field() {
        let items = vec![
            json!({"serialNumber": "1", "name": "a"}),
            json!({"serialNumber": 2, "name": "b"}),
        ];
        let err = decode_list::<Product>("products", items).unwrap_err();
        match err {
            ApiError::Decode { path, .. } => assert_eq!(path, "products[1].serialNumber"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unwrap_list_variants() {
        assert_eq!(unwrap_list(json!({"systems": [1, 2]}), "systems").unwrap().len(), 2);
        assert_eq!(unwrap_list(json!([1]), "systems").unwrap().len(), 1);
        assert!(unwrap_list(json!({"other": []}), "systems").is_err());
        assert!(unwrap_list(json!({"systems": {}}), "systems").is_err());
        assert!(unwrap_list(json!("nope"), "systems").is_err());
    }

    #[test]
    fn underscore_keys_only_touches_keys() {
        let out = underscore_keys(json!({"sh-hwTemp": true, "plain": "a-b"}));
        assert_eq!(out, json!({"sh_hwTemp": true, "plain": "a-b"}));
    }
}
