//! Request builders, one per worker method.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::id::RequestId;
use crate::protocol::{methods, RequestEnvelope};

pub fn server_get_version(id: &RequestId) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::SERVER_GET_VERSION)
}

pub fn server_shutdown(id: &RequestId) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::SERVER_SHUTDOWN)
}

/// References to the element at `offset` in `file`.
pub fn search_find_element_references(
    id: &RequestId,
    file: &str,
    offset: u64,
    include_potential: bool,
) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::SEARCH_FIND_ELEMENT_REFERENCES).with_params(json!({
        "file": file,
        "offset": offset,
        "includePotential": include_potential,
    }))
}

pub fn search_find_member_declarations(id: &RequestId, name: &str) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::SEARCH_FIND_MEMBER_DECLARATIONS)
        .with_params(json!({ "name": name }))
}

pub fn search_find_member_references(id: &RequestId, name: &str) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::SEARCH_FIND_MEMBER_REFERENCES)
        .with_params(json!({ "name": name }))
}

/// Top-level declarations whose names match the regular expression `pattern`.
pub fn search_find_top_level_declarations(id: &RequestId, pattern: &str) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::SEARCH_FIND_TOP_LEVEL_DECLARATIONS)
        .with_params(json!({ "pattern": pattern }))
}

/// Analysis options for a context. Unset fields are left unchanged by the
/// worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze_angular: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze_polymer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_async: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_deferred_loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_enums: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_dart2js_hints: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_hints: Option<bool>,
}

pub fn context_set_options(
    id: &RequestId,
    context_id: &str,
    options: &AnalysisOptions,
) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::CONTEXT_SET_OPTIONS).with_params(json!({
        "contextId": context_id,
        "options": options,
    }))
}

pub fn context_set_priority_sources(
    id: &RequestId,
    context_id: &str,
    sources: &[String],
) -> RequestEnvelope {
    RequestEnvelope::new(id, methods::CONTEXT_SET_PRIORITY_SOURCES).with_params(json!({
        "contextId": context_id,
        "sources": sources,
    }))
}
