//! Request payloads for the write operations and the few response records
//! the client reads itself.
//!
//! # Design
//! Most responses are returned to the caller as `serde_json::Value`; the API
//! owns their schema. Only the shapes the client has to produce (reading and
//! attribute bodies) or consume (sign-up pages for pagination) are typed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single register reading to submit for a meter point.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReading {
    pub meter_point_id: i64,
    pub register_id: i64,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Where the reading came from, e.g. `"SMART"` or `"CUSTOMER"`.
    pub source: Option<String>,
}

/// Wire body element for `POST /Accounts/{account_id}/Readings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSubmission {
    pub meter_point_id: i64,
    pub date_time: String,
    pub meter_reading_source: Option<String>,
    pub readings: Vec<RegisterValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterValue {
    pub register_id: i64,
    pub value: f64,
}

impl From<&MeterReading> for ReadingSubmission {
    fn from(reading: &MeterReading) -> Self {
        Self {
            meter_point_id: reading.meter_point_id,
            date_time: reading.timestamp.to_rfc3339(),
            meter_reading_source: reading.source.clone(),
            readings: vec![RegisterValue {
                register_id: reading.register_id,
                value: reading.value,
            }],
        }
    }
}

/// An account attribute as accepted by the attribute update endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountAttribute {
    pub account_id: i64,
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Wire body for `PUT /accounts/{account_id}/Attributes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeUpdate {
    pub updated_attributes: Vec<AccountAttribute>,
    pub deleted_attributes: Vec<AccountAttribute>,
}

/// One page of `GET /SignUps/Completed`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SignUpsPage {
    #[serde(default)]
    pub results: Vec<CompletedSignUp>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSignUp {
    pub account_id: u64,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn reading_submission_uses_wire_names() {
        let reading = MeterReading {
            meter_point_id: 1496,
            register_id: 1497,
            value: 2.0,
            timestamp: Utc.with_ymd_and_hms(2018, 5, 1, 12, 30, 0).unwrap(),
            source: Some("SMART".to_string()),
        };
        let json = serde_json::to_value(ReadingSubmission::from(&reading)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "meterPointId": 1496,
                "dateTime": "2018-05-01T12:30:00+00:00",
                "meterReadingSource": "SMART",
                "readings": [{"registerId": 1497, "value": 2.0}],
            })
        );
    }

    #[test]
    fn missing_source_serializes_as_null() {
        let reading = MeterReading {
            meter_point_id: 1,
            register_id: 2,
            value: 0.5,
            timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            source: None,
        };
        let json = serde_json::to_value(ReadingSubmission::from(&reading)).unwrap();
        assert!(json["meterReadingSource"].is_null());
    }

    #[test]
    fn attribute_kind_is_renamed_to_type() {
        let update = AttributeUpdate {
            updated_attributes: vec![AccountAttribute {
                account_id: 1507,
                name: "PSR".to_string(),
                value: "true".to_string(),
                kind: "Boolean".to_string(),
            }],
            deleted_attributes: Vec::new(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "updatedAttributes": [
                    {"accountId": 1507, "name": "PSR", "value": "true", "type": "Boolean"}
                ],
                "deletedAttributes": [],
            })
        );
    }

    #[test]
    fn sign_ups_page_tolerates_missing_meta() {
        let page: SignUpsPage =
            serde_json::from_str(r#"{"results":[{"accountId":5,"status":"Complete"}]}"#).unwrap();
        assert_eq!(page.results, vec![CompletedSignUp { account_id: 5 }]);
        assert!(page.meta.is_none());
    }
}
