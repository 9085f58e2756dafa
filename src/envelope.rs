//! The `{success, additional_data.pagination, data}` wrapper every endpoint returns.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub more_items_in_collection: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdditionalData {
    #[serde(default)]
    pub pagination: Pagination,
}

/// One page of results. `data` stays untyped until the caller decodes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageResponse<T = Value> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub additional_data: AdditionalData,
    pub data: T,
}

pub type GenericResponse = PageResponse<Value>;

impl<T> PageResponse<T> {
    pub fn pagination(&self) -> &Pagination {
        &self.additional_data.pagination
    }

    pub fn has_more(&self) -> bool {
        self.additional_data.pagination.more_items_in_collection
    }
}

impl GenericResponse {
    /// Decode a list payload; `null` counts as an empty page.
    pub fn decode_list<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if self.data.is_null() {
            return Ok(Vec::new());
        }
        self.decode()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data).map_err(|source| Error::Decode {
            source,
            body: self.data.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_keeps_pagination() {
        let page = GenericResponse {
            success: true,
            additional_data: AdditionalData {
                pagination: Pagination {
                    start: 0,
                    limit: 500,
                    more_items_in_collection: true,
                },
            },
            data: json!([{"id": 1}]),
        };
        let encoded = serde_json::to_string(&page).unwrap();
        let decoded: GenericResponse = serde_json::from_str(&encoded).unwrap();
        assert!(decoded.has_more());
        assert_eq!(decoded.pagination().limit, 500);
        assert_eq!(decoded, page);
    }

    #[test]
    fn single_object_response_has_no_more_items() {
        let page: GenericResponse =
            serde_json::from_str(r#"{"success": true, "data": {"id": 7}}"#).unwrap();
        assert!(!page.has_more());
        assert_eq!(page.pagination().limit, 0);
    }

    #[test]
    fn null_list_decodes_empty() {
        let page: GenericResponse =
            serde_json::from_str(r#"{"success": true, "data": null}"#).unwrap();
        let items: Vec<Value> = page.decode_list().unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn decode_error_keeps_payload() {
        let page: GenericResponse =
            serde_json::from_str(r#"{"success": true, "data": {"id": "x"}}"#).unwrap();
        #[derive(Debug, Deserialize)]
        struct Id {
            #[allow(dead_code)]
            id: u64,
        }
        match page.decode::<Id>().unwrap_err() {
            Error::Decode { body, .. } => assert!(body.contains("\"x\"")),
            other => panic!("wrong error: {other:?}"),
        }
    }
}
