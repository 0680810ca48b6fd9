//! Result processors: one decoder per reply shape.

use serde_json::Value;

use crate::error::DecodeError;
use crate::protocol::scalar_to_string;

/// Turns the `result` payload of a reply into a typed value.
pub trait ResultProcessor {
    type Output;

    fn decode(result: Option<&Value>) -> Result<Self::Output, DecodeError>;
}

/// `server.getVersion` → `{"version": "<string>"}`.
pub struct VersionProcessor;

impl ResultProcessor for VersionProcessor {
    type Output = String;

    fn decode(result: Option<&Value>) -> Result<String, DecodeError> {
        let object = object(result)?;
        match object.get("version") {
            None | Some(Value::Null) => Err(DecodeError::MissingField("version")),
            Some(value) => scalar_to_string(value).ok_or(DecodeError::WrongType {
                field: "version",
                expected: "a string",
            }),
        }
    }
}

/// `search.find*` → `{"id": "<search id>"}`. A missing or null `id` means
/// the worker could not start a search and decodes to `None`.
pub struct SearchIdProcessor;

impl ResultProcessor for SearchIdProcessor {
    type Output = Option<String>;

    fn decode(result: Option<&Value>) -> Result<Option<String>, DecodeError> {
        let object = object(result)?;
        match object.get("id") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => scalar_to_string(value).map(Some).ok_or(DecodeError::WrongType {
                field: "id",
                expected: "a string",
            }),
        }
    }
}

fn object(result: Option<&Value>) -> Result<&serde_json::Map<String, Value>, DecodeError> {
    result
        .ok_or(DecodeError::MissingResult)?
        .as_object()
        .ok_or(DecodeError::NotAnObject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_is_read_from_result() {
        let result = json!({ "version": "1.2.3" });
        assert_eq!(VersionProcessor::decode(Some(&result)), Ok("1.2.3".to_string()));
    }

    #[test]
    fn version_failures_are_classified() {
        assert_eq!(
            VersionProcessor::decode(None),
            Err(DecodeError::MissingResult)
        );
        assert_eq!(
            VersionProcessor::decode(Some(&json!([]))),
            Err(DecodeError::NotAnObject)
        );
        assert_eq!(
            VersionProcessor::decode(Some(&json!({}))),
            Err(DecodeError::MissingField("version"))
        );
        assert_eq!(
            VersionProcessor::decode(Some(&json!({ "version": { "major": 1 } }))),
            Err(DecodeError::WrongType {
                field: "version",
                expected: "a string"
            })
        );
    }

    #[test]
    fn search_id_may_be_absent() {
        assert_eq!(
            SearchIdProcessor::decode(Some(&json!({ "id": "search-42" }))),
            Ok(Some("search-42".to_string()))
        );
        assert_eq!(SearchIdProcessor::decode(Some(&json!({}))), Ok(None));
        assert_eq!(SearchIdProcessor::decode(Some(&json!({ "id": null }))), Ok(None));
        assert_eq!(
            SearchIdProcessor::decode(Some(&json!({ "id": 9 }))),
            Ok(Some("9".to_string()))
        );
    }
}
