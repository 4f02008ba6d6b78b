//! Conversation transcript types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::modes::ModeId;

/// Placeholder title every conversation starts with. The first user message
/// replaces it, once.
pub const DEFAULT_TITLE: &str = "New Case Analysis";

const TITLE_MAX_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sender {
    User,
    Ai,
}

/// A grounding citation. Both fields are required; candidates lacking either
/// are discarded at the provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "Strong Match")]
    StrongMatch,
    #[serde(rename = "Good Match")]
    GoodMatch,
    #[serde(rename = "Possible Match")]
    PossibleMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemedyItem {
    pub remedy: String,
    pub potency_suggestion: String,
    pub keynotes: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriageLevel {
    Emergency,
    Urgent,
    Routine,
    #[serde(rename = "Self-care")]
    SelfCare,
}

/// Which structured shape a schema-constrained mode parses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Homeopathy,
    Soap,
    Symptom,
}

/// Schema-validated payload returned in place of free-form text for
/// structured modes. Every variant carries a `summary` used as the message's
/// display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructuredPayload {
    #[serde(rename_all = "camelCase")]
    Homeopathy {
        summary: String,
        remedies: Vec<RemedyItem>,
    },
    Soap {
        summary: String,
        subjective: String,
        objective: String,
        assessment: String,
        plan: String,
    },
    #[serde(rename_all = "camelCase")]
    Symptom {
        summary: String,
        triage_level: TriageLevel,
        triage_advice: String,
        possible_conditions: Vec<String>,
    },
}

impl StructuredPayload {
    pub fn summary(&self) -> &str {
        match self {
            StructuredPayload::Homeopathy { summary, .. } => summary,
            StructuredPayload::Soap { summary, .. } => summary,
            StructuredPayload::Symptom { summary, .. } => summary,
        }
    }

    /// Parse the raw JSON text a structured exchange produced. The model
    /// response carries no variant tag, so the kind comes from the mode.
    pub fn from_json(kind: PayloadKind, raw: &str) -> Result<Self, serde_json::Error> {
        match kind {
            PayloadKind::Homeopathy => {
                #[derive(Deserialize)]
                struct Raw {
                    summary: String,
                    remedies: Vec<RemedyItem>,
                }
                let raw: Raw = serde_json::from_str(raw)?;
                Ok(StructuredPayload::Homeopathy {
                    summary: raw.summary,
                    remedies: raw.remedies,
                })
            }
            PayloadKind::Soap => {
                #[derive(Deserialize)]
                struct Raw {
                    summary: String,
                    subjective: String,
                    objective: String,
                    assessment: String,
                    plan: String,
                }
                let raw: Raw = serde_json::from_str(raw)?;
                Ok(StructuredPayload::Soap {
                    summary: raw.summary,
                    subjective: raw.subjective,
                    objective: raw.objective,
                    assessment: raw.assessment,
                    plan: raw.plan,
                })
            }
            PayloadKind::Symptom => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Raw {
                    summary: String,
                    triage_level: TriageLevel,
                    triage_advice: String,
                    possible_conditions: Vec<String>,
                }
                let raw: Raw = serde_json::from_str(raw)?;
                Ok(StructuredPayload::Symptom {
                    summary: raw.summary,
                    triage_level: raw.triage_level,
                    triage_advice: raw.triage_advice,
                    possible_conditions: raw.possible_conditions,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredPayload>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            citations: None,
            structured: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Sender::Ai, text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub mode: ModeId,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(mode: ModeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_TITLE.to_string(),
            mode,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// True until the first user message replaces the placeholder title.
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }
}

/// Title derived from the first user message: the first 40 characters, with
/// an ellipsis marker only when the text was longer.
pub fn derive_title(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_at_boundary_is_unchanged() {
        let text = "a".repeat(40);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn test_title_past_boundary_is_truncated_with_ellipsis() {
        let text = "a".repeat(41);
        let title = derive_title(&text);
        assert_eq!(title, format!("{}...", "a".repeat(40)));
        assert_eq!(title.chars().count(), 43);
    }

    #[test]
    fn test_title_counts_chars_not_bytes() {
        // 41 multi-byte characters must still truncate at 40 chars.
        let text = "é".repeat(41);
        assert_eq!(derive_title(&text), format!("{}...", "é".repeat(40)));
    }

    #[test]
    fn test_new_conversation_has_placeholder_title() {
        let conversation = Conversation::new(ModeId::HomeopathyAnalysis);
        assert!(conversation.has_default_title());
        assert!(conversation.messages.is_empty());
    }

    #[test]
    fn test_homeopathy_payload_from_json() {
        let raw = r#"{
            "summary": "Arsenicum Album is the leading remedy.",
            "remedies": [{
                "remedy": "Arsenicum Album",
                "potencySuggestion": "30C, 200C",
                "keynotes": "Restlessness with exhaustion, worse after midnight.",
                "confidence": "Strong Match"
            }]
        }"#;
        let payload = StructuredPayload::from_json(PayloadKind::Homeopathy, raw).unwrap();
        assert_eq!(payload.summary(), "Arsenicum Album is the leading remedy.");
        match payload {
            StructuredPayload::Homeopathy { remedies, .. } => {
                assert_eq!(remedies.len(), 1);
                assert_eq!(remedies[0].confidence, Confidence::StrongMatch);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_symptom_payload_from_json() {
        let raw = r#"{
            "summary": "Seek urgent care.",
            "triageLevel": "Urgent",
            "triageAdvice": "Visit an emergency department within hours.",
            "possibleConditions": ["Appendicitis"]
        }"#;
        let payload = StructuredPayload::from_json(PayloadKind::Symptom, raw).unwrap();
        match payload {
            StructuredPayload::Symptom { triage_level, .. } => {
                assert_eq!(triage_level, TriageLevel::Urgent);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_an_error_not_a_panic() {
        let result = StructuredPayload::from_json(PayloadKind::Soap, "{ not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_required_field_is_an_error() {
        // Missing "plan"
        let raw = r#"{"summary": "s", "subjective": "s", "objective": "o", "assessment": "a"}"#;
        assert!(StructuredPayload::from_json(PayloadKind::Soap, raw).is_err());
    }
}
