use serde::{Deserialize, Serialize};

use super::aggregate::ReturnRecord;
use super::filter::FilterCriteria;

/// Фильтры в теле запроса к upstream-сервису
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

impl From<&FilterCriteria> for ListFilters {
    fn from(filters: &FilterCriteria) -> Self {
        let filters = filters.normalized();
        Self {
            search: filters.search,
            status: if filters.status.is_empty() {
                None
            } else {
                Some(filters.status)
            },
            date_from: filters.date_from,
            date_to: filters.date_to,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPagination {
    pub offset: usize,
    pub limit: usize,
}

/// Request для списка возвратов
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnsListRequest {
    pub account_ids: Vec<String>,
    pub filters: ListFilters,
    pub pagination: ListPagination,
}

/// Response для списка возвратов
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReturnsListResponse {
    #[serde(default)]
    pub returns: Vec<ReturnRecord>,
    #[serde(default)]
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let filters = FilterCriteria {
            search: Some("trk".into()),
            status: vec!["opened".into()],
            ..Default::default()
        };
        let request = ReturnsListRequest {
            account_ids: vec!["acc-1".into()],
            filters: ListFilters::from(&filters),
            pagination: ListPagination { offset: 50, limit: 50 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["accountIds"][0], "acc-1");
        assert_eq!(json["filters"]["search"], "trk");
        assert!(json["filters"].get("dateFrom").is_none());
        assert_eq!(json["pagination"]["offset"], 50);
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let response: ReturnsListResponse = serde_json::from_str("{}").unwrap();
        assert!(response.returns.is_empty());
        assert_eq!(response.total, 0);
    }
}
