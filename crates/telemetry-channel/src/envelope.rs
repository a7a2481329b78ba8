// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wraps a record and the current context into a single JSON object.
//!
//! ```json
//! {"name":"Microsoft.ApplicationInsights.Event","time":"2024-05-01T10:00:00.000Z",
//!  "tags":{"ai.session.id":"..."},"data":{"baseType":"EventData","baseData":{...}}}
//! ```

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::SerializationError;
use crate::record::TelemetryData;

#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub name: &'a str,
    /// UTC wall-clock time at serialization, RFC 3339 with a trailing `Z`.
    pub time: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    pub data: EnvelopeData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeData<'a> {
    pub base_type: &'a str,
    pub base_data: Map<String, Value>,
}

/// Renders `record` merged with `context` as one line of JSON.
pub fn serialize_record<R: TelemetryData>(
    record: &R,
    context: BTreeMap<String, String>,
) -> Result<String, SerializationError> {
    let base_data = match serde_json::to_value(record)? {
        Value::Object(fields) => fields,
        other => return Err(SerializationError::NotAnObject(json_kind(&other))),
    };

    let envelope = Envelope {
        name: record.envelope_type_name(),
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        tags: context,
        data: EnvelopeData {
            base_type: record.data_type_name(),
            base_data,
        },
    };

    Ok(serde_json::to_string(&envelope)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::keys;
    use crate::record::EventData;
    use serde::Serializer;

    #[derive(Serialize)]
    struct Counter(u32);

    impl TelemetryData for Counter {
        fn envelope_type_name(&self) -> &str {
            "Counter"
        }
        fn data_type_name(&self) -> &str {
            "CounterData"
        }
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unsupported value"))
        }
    }

    impl TelemetryData for Unserializable {
        fn envelope_type_name(&self) -> &str {
            "Broken"
        }
        fn data_type_name(&self) -> &str {
            "BrokenData"
        }
    }

    #[test]
    fn test_envelope_layout() {
        let context = BTreeMap::from([(keys::SESSION_ID.to_string(), "s-1".to_string())]);
        let line = serialize_record(&EventData::new("app_start"), context).unwrap();
        assert!(!line.contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["name"], "Microsoft.ApplicationInsights.Event");
        assert_eq!(value["tags"]["ai.session.id"], "s-1");
        assert_eq!(value["data"]["baseType"], "EventData");
        assert_eq!(value["data"]["baseData"]["name"], "app_start");

        let time = value["time"].as_str().unwrap();
        assert!(time.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(time).is_ok());
    }

    #[test]
    fn test_empty_context_omits_tags() {
        let line = serialize_record(&EventData::new("e"), BTreeMap::new()).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert!(value.get("tags").is_none());
    }

    #[test]
    fn test_non_object_record_is_rejected() {
        let err = serialize_record(&Counter(3), BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SerializationError::NotAnObject("number")));
    }

    #[test]
    fn test_serializer_failure_is_reported() {
        let err = serialize_record(&Unserializable, BTreeMap::new()).unwrap_err();
        assert!(matches!(err, SerializationError::Json(_)));
        assert!(err.to_string().contains("unsupported value"));
    }
}
