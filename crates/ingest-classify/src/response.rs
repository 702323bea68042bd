//! Classifies a raw cloud HTTP response into a [`CogniteError`], generalizing
//! `tower-resilience-circuitbreaker`'s `FailureClassifier` from a boolean
//! failure/success verdict into the write engine's closed error taxonomy.

use ingest_core::{CogniteError, ErrorKey, ErrorType, Identity, ResourceType};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct CloudErrorEnvelope {
    error: CloudErrorBody,
}

#[derive(Debug, Deserialize, Default)]
struct CloudErrorBody {
    #[serde(default)]
    message: String,
    /// Present on a 400 naming items the request referenced but the cloud
    /// does not have, e.g. `[{"externalId": "a"}, {"id": 3}]`.
    missing: Option<Vec<Value>>,
    /// Present on a 409 naming items that collided with an existing one.
    duplicated: Option<Vec<Value>>,
}

/// Parses one `missing`/`duplicated` array entry into an [`ErrorKey`]:
/// `{"externalId": "a"}` → `Identity::External("a")`, `{"id": 3}` →
/// `Identity::Internal(3)`, a bare string → `ErrorKey::Text`.
fn key_from_value(value: &Value) -> Option<ErrorKey> {
    match value {
        Value::String(s) => Some(ErrorKey::Text(s.clone())),
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("externalId") {
                return Some(ErrorKey::Identity(Identity::External(id.clone())));
            }
            if let Some(id) = map.get("id").and_then(Value::as_i64) {
                return Some(ErrorKey::Identity(Identity::Internal(id)));
            }
            None
        }
        _ => None,
    }
}

/// Classifies an HTTP `status` and response `body` into a [`CogniteError`],
/// with no resource-dimension hint from the calling endpoint. Equivalent to
/// `classify_response_with_hint(status, body, None)`.
pub fn classify_response<T>(status: u16, body: &str) -> CogniteError<T> {
    classify_response_with_hint(status, body, None)
}

/// Classifies an HTTP `status` and response `body` into a [`CogniteError`].
///
/// `status == 0` denotes a connection-level failure (no response was ever
/// received), which is treated identically to a `5xx`.
///
/// `resource_hint` disambiguates a `missing` array whose member shape alone
/// doesn't say which dimension it names (e.g. a time-series-create's
/// `missing` array of asset references should classify as `AssetId`, not
/// the default `ExternalId`) — pass the dimension the calling endpoint is
/// known to report missing references against.
///
/// Message-pattern matches (no structured array in the body) set
/// `complete = false` except where the message itself enumerates the full
/// offender list (a comma-separated id list), which sets `complete = true`.
pub fn classify_response_with_hint<T>(status: u16, body: &str, resource_hint: Option<ResourceType>) -> CogniteError<T> {
    let parsed = serde_json::from_str::<CloudErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .unwrap_or_else(|| body.to_string());
    let lower = message.to_lowercase();

    if status == 400 {
        if let Some(missing) = parsed.as_ref().and_then(|e| e.error.missing.as_ref()) {
            if !missing.is_empty() {
                let values: std::collections::HashSet<ErrorKey> = missing.iter().filter_map(key_from_value).collect();
                let resource = resource_hint.unwrap_or(ResourceType::ExternalId);
                return CogniteError::new(ErrorType::ItemMissing, message)
                    .with_status(status)
                    .with_resource(resource)
                    .with_values(values)
                    .with_complete(true);
            }
        }
    }
    if status == 409 {
        if let Some(duplicated) = parsed.as_ref().and_then(|e| e.error.duplicated.as_ref()) {
            if !duplicated.is_empty() {
                let values: std::collections::HashSet<ErrorKey> = duplicated.iter().filter_map(key_from_value).collect();
                let resource = resource_hint.unwrap_or(ResourceType::ExternalId);
                return CogniteError::new(ErrorType::ItemExists, message)
                    .with_status(status)
                    .with_resource(resource)
                    .with_values(values)
                    .with_complete(true);
            }
        }
    }

    if status == 400 {
        if let Some((resource, ids)) = parse_id_list_message(&message) {
            return CogniteError::new(ErrorType::ItemMissing, message.clone())
                .with_status(status)
                .with_resource(resource)
                .with_values(ids.into_iter().map(ErrorKey::Text).collect())
                .with_complete(true);
        }
        if let Some((resource, id)) = parse_single_reference_message(&lower, &message) {
            let mut values = std::collections::HashSet::new();
            values.insert(ErrorKey::Text(id));
            return CogniteError::new(ErrorType::ItemMissing, message)
                .with_status(status)
                .with_resource(resource)
                .with_values(values)
                .with_complete(false);
        }
    }

    let (error_type, resource) = match status {
        401 | 403 => (ErrorType::Fatal, None),
        409 if lower.contains("duplicat") => (ErrorType::ItemExists, resource_from_message(&lower)),
        400 | 404
            if lower.contains("not found") || lower.contains("missing") || lower.contains("does not exist") =>
        {
            (ErrorType::ItemMissing, resource_from_message(&lower).or(resource_hint))
        }
        400 if lower.contains("expected string value")
            || lower.contains("expected numeric value")
            || lower.contains("wrong type")
            || lower.contains("mismatched type")
            || lower.contains("type mismatch") =>
        {
            (ErrorType::MismatchedType, Some(ResourceType::DataPointValue))
        }
        s if s >= 500 || s == 0 => (ErrorType::TransientFatal, None),
        _ => (ErrorType::Fatal, None),
    };

    let mut error = CogniteError::new(error_type, message)
        .with_status(status)
        .with_complete(false);
    if let Some(resource) = resource {
        error = error.with_resource(resource);
    }
    error
}

/// Matches `"Invalid dataSetIds: 1,2,3"` and `"The given parent ids do not
/// exist: a,b,c"` style messages that enumerate the complete offender list
/// inline, returning `(resource, ids)`.
fn parse_id_list_message(message: &str) -> Option<(ResourceType, Vec<String>)> {
    const PATTERNS: &[(&str, ResourceType)] = &[
        ("invalid datasetids:", ResourceType::DataSetId),
        ("the given parent ids do not exist:", ResourceType::ParentId),
        ("the given parentids do not exist:", ResourceType::ParentId),
    ];
    let lower = message.to_lowercase();
    for (pattern, resource) in PATTERNS {
        if let Some(idx) = lower.find(pattern) {
            let rest = &message[idx + pattern.len()..];
            let ids: Vec<String> = rest
                .split(',')
                .map(|s| s.trim().trim_end_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !ids.is_empty() {
                return Some((*resource, ids));
            }
        }
    }
    None
}

/// Matches `"Reference to unknown parent with externalId X"` style
/// single-offender messages, returning `(resource, id)`. Unlike
/// [`parse_id_list_message`], the cloud names exactly one offender per
/// response even if more than one item referenced it, so `complete` stays
/// `false`.
fn parse_single_reference_message(lower: &str, original: &str) -> Option<(ResourceType, String)> {
    let marker = "unknown parent with externalid";
    let idx = lower.find(marker)?;
    let rest = original[idx + marker.len()..].trim_start_matches([' ', ':']).trim();
    let id = rest.split_whitespace().next()?.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
    if id.is_empty() {
        None
    } else {
        Some((ResourceType::ParentExternalId, id.to_string()))
    }
}

fn resource_from_message(lower: &str) -> Option<ResourceType> {
    const CANDIDATES: &[(&str, ResourceType)] = &[
        ("parentexternalid", ResourceType::ParentExternalId),
        ("parent external id", ResourceType::ParentExternalId),
        ("parentid", ResourceType::ParentId),
        ("parent id", ResourceType::ParentId),
        ("assetid", ResourceType::AssetId),
        ("asset id", ResourceType::AssetId),
        ("datasetid", ResourceType::DataSetId),
        ("data set id", ResourceType::DataSetId),
        ("legacyname", ResourceType::LegacyName),
        ("legacy name", ResourceType::LegacyName),
        ("externalid", ResourceType::ExternalId),
        ("external id", ResourceType::ExternalId),
    ];
    CANDIDATES
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, resource)| *resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_failures_as_fatal() {
        let error: CogniteError<()> = classify_response(401, r#"{"error":{"message":"invalid credentials"}}"#);
        assert_eq!(error.error_type, ErrorType::Fatal);
    }

    #[test]
    fn classifies_missing_parent_external_id_references() {
        let error: CogniteError<()> = classify_response(
            400,
            r#"{"error":{"message":"Reference to unknown parent with externalId foo"}}"#,
        );
        assert_eq!(error.error_type, ErrorType::ItemMissing);
        assert_eq!(error.resource, Some(ResourceType::ParentExternalId));
        assert!(!error.complete);
        assert!(error.values.contains(&ErrorKey::Text("foo".into())));
    }

    #[test]
    fn classifies_duplicates_on_409() {
        let error: CogniteError<()> = classify_response(
            409,
            r#"{"error":{"message":"Resource duplicated, externalId already exists"}}"#,
        );
        assert_eq!(error.error_type, ErrorType::ItemExists);
        assert_eq!(error.resource, Some(ResourceType::ExternalId));
    }

    #[test]
    fn classifies_structured_duplicated_array_as_complete() {
        let body = r#"{"error":{"message":"duplicated","duplicated":[{"externalId":"a"},{"externalId":"b"}]}}"#;
        let error: CogniteError<()> = classify_response(409, body);
        assert_eq!(error.error_type, ErrorType::ItemExists);
        assert!(error.complete);
        assert_eq!(error.values.len(), 2);
    }

    #[test]
    fn classifies_structured_missing_array_with_resource_hint() {
        let body = r#"{"error":{"message":"missing","missing":[{"id":1},{"id":2}]}}"#;
        let error: CogniteError<()> = classify_response_with_hint(400, body, Some(ResourceType::AssetId));
        assert_eq!(error.error_type, ErrorType::ItemMissing);
        assert_eq!(error.resource, Some(ResourceType::AssetId));
        assert!(error.complete);
        assert!(error.values.contains(&ErrorKey::Identity(Identity::Internal(1))));
    }

    #[test]
    fn classifies_invalid_data_set_ids_as_a_complete_id_list() {
        let error: CogniteError<()> = classify_response(
            400,
            r#"{"error":{"message":"Invalid dataSetIds: 10,20,30"}}"#,
        );
        assert_eq!(error.error_type, ErrorType::ItemMissing);
        assert_eq!(error.resource, Some(ResourceType::DataSetId));
        assert!(error.complete);
        assert_eq!(error.values.len(), 3);
    }

    #[test]
    fn classifies_missing_parent_ids_as_a_complete_id_list() {
        let error: CogniteError<()> = classify_response(
            400,
            r#"{"error":{"message":"The given parent ids do not exist: a,b,c"}}"#,
        );
        assert_eq!(error.error_type, ErrorType::ItemMissing);
        assert_eq!(error.resource, Some(ResourceType::ParentId));
        assert!(error.complete);
        assert_eq!(error.values.len(), 3);
    }

    #[test]
    fn classifies_server_errors_as_transient() {
        let error: CogniteError<()> = classify_response(503, "service unavailable");
        assert_eq!(error.error_type, ErrorType::TransientFatal);
    }

    #[test]
    fn classifies_connection_failures_as_transient() {
        let error: CogniteError<()> = classify_response(0, "connection reset");
        assert_eq!(error.error_type, ErrorType::TransientFatal);
    }

    #[test]
    fn classifies_type_mismatches_on_data_points() {
        let error: CogniteError<()> = classify_response(
            400,
            r#"{"error":{"message":"Expected numeric value, got string"}}"#,
        );
        assert_eq!(error.error_type, ErrorType::MismatchedType);
        assert_eq!(error.resource, Some(ResourceType::DataPointValue));
    }

    #[test]
    fn falls_back_to_the_raw_body_when_not_json() {
        let error: CogniteError<()> = classify_response(418, "teapot");
        assert_eq!(error.message, "teapot");
        assert_eq!(error.error_type, ErrorType::Fatal);
    }
}
