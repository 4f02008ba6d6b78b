//! Request assembly for one exchange

use serde_json::Value;

use crate::config::modes::ModeId;
use crate::config::prompts;
use crate::conversation::{Message, PayloadKind, Sender};

/// One role-tagged turn of prior history.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: &'static str,
    pub text: String,
}

/// How the model is asked to answer. Structured output and open-web
/// retrieval are mutually exclusive; a request never carries both.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseMode {
    /// Free text with the retrieval tool enabled (citation-bearing).
    OpenText,
    /// Strict JSON conforming to the mode's schema; retrieval suppressed.
    StructuredJson { kind: PayloadKind, schema: Value },
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub turns: Vec<Turn>,
    pub system_instruction: String,
    pub response: ResponseMode,
    pub interactive: bool,
}

/// Map history plus the new user text into a model request for the active
/// mode. The new text is always the final user turn.
pub fn build_request(
    model: &str,
    history: &[Message],
    text: &str,
    mode: ModeId,
    language: &str,
) -> ModelRequest {
    let mut turns: Vec<Turn> = history
        .iter()
        .map(|m| Turn {
            role: match m.sender {
                Sender::User => "user",
                Sender::Ai => "model",
            },
            text: m.text.clone(),
        })
        .collect();
    turns.push(Turn {
        role: "user",
        text: text.to_string(),
    });

    let response = match (mode.payload_kind(), mode.response_schema()) {
        (Some(kind), Some(schema)) => ResponseMode::StructuredJson { kind, schema },
        _ => ResponseMode::OpenText,
    };

    ModelRequest {
        model: model.to_string(),
        turns,
        system_instruction: prompts::system_instruction(mode, language),
        response,
        interactive: mode.is_interactive(),
    }
}
