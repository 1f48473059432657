use serde::{Deserialize, Serialize};

use super::client::EnrichmentError;

/// Metadata proposed by the model for a bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSuggestion {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Decodes a completion into a suggestion.
///
/// Models often wrap JSON in a Markdown code fence despite being asked not
/// to; a leading ```` ```json ```` or ```` ``` ```` and a trailing ```` ``` ````
/// are removed first.
pub fn parse_suggestion(content: &str) -> Result<AiSuggestion, EnrichmentError> {
    let mut body = content.trim();
    body = body.strip_prefix("```json").unwrap_or(body);
    body = body.strip_prefix("```").unwrap_or(body);
    body = body.strip_suffix("```").unwrap_or(body);

    serde_json::from_str(body.trim())
        .map_err(|e| EnrichmentError::Parse(format!("suggestion JSON: {e}")))
}
