//! services/api/src/adapters/suggest_llm.rs
//!
//! This module contains the adapter for the competency suggestion LLM.
//! It implements the `CompetencySuggestionService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use intern_tracker_core::{
    catalog::Competency,
    ports::{CompetencySuggestionService, PortError, PortResult},
};
use regex::Regex;
use std::sync::OnceLock;

const SYSTEM_INSTRUCTIONS: &str = "You map internship activity descriptions for school administrator candidates onto a fixed list of licensure competencies. Respond with ONLY a JSON array of competency id strings, for example [\"A1\",\"F\"]. Use only ids from the list you are given. Respond with [] when none apply.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompetencySuggestionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSuggestAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSuggestAdapter {
    /// Creates a new `OpenAiSuggestAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn build_prompt(activity: &str, catalog: &[Competency]) -> String {
    let listing = catalog
        .iter()
        .map(|c| format!("{}: {} - {}", c.id, c.title, c.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Activity: \"{}\"\n\nAvailable Competencies:\n{}",
        activity.trim(),
        listing
    )
}

/// Pulls the id array out of a model reply, tolerating code fences and prose.
pub(crate) fn parse_id_array(reply: &str) -> PortResult<Vec<String>> {
    static ARRAY: OnceLock<Regex> = OnceLock::new();
    let array = ARRAY.get_or_init(|| Regex::new(r"(?s)\[.*?\]").expect("static regex"));

    // Prose may carry its own brackets; the first span that parses wins.
    let mut last_error = None;
    for candidate in array.find_iter(reply) {
        match serde_json::from_str::<Vec<String>>(candidate.as_str()) {
            Ok(ids) => return Ok(ids),
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => PortError::Unexpected(format!("Malformed suggestion array: {}", e)),
        None => PortError::Unexpected(format!("No JSON array in reply: {}", reply)),
    })
}

//=========================================================================================
// `CompetencySuggestionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompetencySuggestionService for OpenAiSuggestAdapter {
    async fn suggest_competencies(
        &self,
        activity: &str,
        catalog: &[Competency],
    ) -> PortResult<Vec<String>> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(build_prompt(activity, catalog))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .temperature(0.0)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Suggestion LLM response contained no text content.".to_string())
            })?;

        parse_id_array(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intern_tracker_core::catalog::ALL_COMPETENCIES;

    #[test]
    fn parses_plain_and_fenced_arrays() {
        assert_eq!(parse_id_array("[\"A1\", \"F\"]").unwrap(), vec!["A1", "F"]);
        let fenced = "```json\n[\"B5\"]\n```";
        assert_eq!(parse_id_array(fenced).unwrap(), vec!["B5"]);
        assert!(parse_id_array("[]").unwrap().is_empty());
    }

    #[test]
    fn bracketed_prose_before_the_array_is_skipped() {
        assert_eq!(parse_id_array("Note [draft]: [\"A1\"]").unwrap(), vec!["A1"]);
        let reply = "Matches [see list] below:\n```json\n[\"C2\", \"F\"]\n```";
        assert_eq!(parse_id_array(reply).unwrap(), vec!["C2", "F"]);
    }

    #[test]
    fn malformed_replies_are_errors() {
        assert!(parse_id_array("I think A1 applies").is_err());
        assert!(parse_id_array("[1, 2]").is_err());
    }

    #[test]
    fn prompt_lists_the_catalog() {
        let prompt = build_prompt("  Led PLC data meeting ", ALL_COMPETENCIES);
        assert!(prompt.starts_with("Activity: \"Led PLC data meeting\""));
        assert!(prompt.contains("B2: Data Processes - "));
        assert_eq!(prompt.lines().filter(|l| l.contains(": ")).count(), 31);
    }
}
