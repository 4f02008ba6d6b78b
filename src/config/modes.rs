//! Interaction modes
//!
//! A mode is a pre-configured conversational behavior profile: a title and
//! description folded into the system instruction, optionally a JSON response
//! schema (structured modes), and optionally an interactive-persona flag.
//! The set is closed and known at build time, so it is an enum-keyed table
//! rather than anything loaded from files.
//!
//! Structured modes and citation-bearing (open-web retrieval) modes are
//! mutually exclusive: a mode with a schema never requests retrieval tooling.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::conversation::PayloadKind;

/// Default mode for a new conversation.
pub const DEFAULT_MODE: ModeId = ModeId::HomeopathyAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeId {
    HomeopathyAnalysis,
    GeneralSymptom,
    StudentNotes,
    StudentSim,
}

/// Static descriptor for one mode.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InteractionMode {
    pub id: ModeId,
    pub title: &'static str,
    pub description: &'static str,
    /// Role-play persona mode: the model stays in character and answers
    /// interactively instead of producing a one-shot analysis.
    pub interactive: bool,
}

const HOMEOPATHY_ANALYSIS: InteractionMode = InteractionMode {
    id: ModeId::HomeopathyAnalysis,
    title: "Repertory Analysis",
    description: "Input patient symptoms, modalities, and constitution to receive a structured list of potential remedies with their keynotes and suggested potencies.",
    interactive: false,
};

const GENERAL_SYMPTOM: InteractionMode = InteractionMode {
    id: ModeId::GeneralSymptom,
    title: "Symptom Checker",
    description: "Describe symptoms in plain language to receive a triage level, triage advice, and a list of possible conditions to discuss with a clinician.",
    interactive: false,
};

const STUDENT_NOTES: InteractionMode = InteractionMode {
    id: ModeId::StudentNotes,
    title: "SOAP Note Generator",
    description: "Paste raw case-taking notes to generate a structured SOAP note with subjective, objective, assessment, and plan sections.",
    interactive: false,
};

const STUDENT_SIM: InteractionMode = InteractionMode {
    id: ModeId::StudentSim,
    title: "Virtual Patient Simulator",
    description: "Practice case taking against a simulated patient who presents with a hidden condition and answers your questions in character.",
    interactive: true,
};

impl ModeId {
    pub const ALL: [ModeId; 4] = [
        ModeId::HomeopathyAnalysis,
        ModeId::GeneralSymptom,
        ModeId::StudentNotes,
        ModeId::StudentSim,
    ];

    pub fn descriptor(self) -> &'static InteractionMode {
        match self {
            ModeId::HomeopathyAnalysis => &HOMEOPATHY_ANALYSIS,
            ModeId::GeneralSymptom => &GENERAL_SYMPTOM,
            ModeId::StudentNotes => &STUDENT_NOTES,
            ModeId::StudentSim => &STUDENT_SIM,
        }
    }

    /// Which structured payload this mode parses into, if any.
    pub fn payload_kind(self) -> Option<PayloadKind> {
        match self {
            ModeId::HomeopathyAnalysis => Some(PayloadKind::Homeopathy),
            ModeId::GeneralSymptom => Some(PayloadKind::Symptom),
            ModeId::StudentNotes => Some(PayloadKind::Soap),
            ModeId::StudentSim => None,
        }
    }

    pub fn is_interactive(self) -> bool {
        self.descriptor().interactive
    }

    /// Gemini response schema for structured modes.
    pub fn response_schema(self) -> Option<Value> {
        match self {
            ModeId::HomeopathyAnalysis => Some(json!({
                "type": "OBJECT",
                "properties": {
                    "summary": {
                        "type": "STRING",
                        "description": "A natural language summary of the repertory analysis and remedy suggestions."
                    },
                    "remedies": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "remedy": {
                                    "type": "STRING",
                                    "description": "The name of the homeopathic remedy, e.g., 'Arsenicum Album'."
                                },
                                "potencySuggestion": {
                                    "type": "STRING",
                                    "description": "Suggested potency, e.g., '30C, 200C'."
                                },
                                "keynotes": {
                                    "type": "STRING",
                                    "description": "The key symptoms and modalities from the patient's case that match this remedy."
                                },
                                "confidence": {
                                    "type": "STRING",
                                    "enum": ["Strong Match", "Good Match", "Possible Match"]
                                }
                            },
                            "required": ["remedy", "potencySuggestion", "keynotes", "confidence"]
                        }
                    }
                },
                "required": ["summary", "remedies"]
            })),
            ModeId::GeneralSymptom => Some(json!({
                "type": "OBJECT",
                "properties": {
                    "summary": {
                        "type": "STRING",
                        "description": "A natural language summary of the triage advice."
                    },
                    "triageLevel": {
                        "type": "STRING",
                        "enum": ["Emergency", "Urgent", "Routine", "Self-care"]
                    },
                    "triageAdvice": { "type": "STRING" },
                    "possibleConditions": {
                        "type": "ARRAY",
                        "items": { "type": "STRING" }
                    }
                },
                "required": ["summary", "triageLevel", "triageAdvice", "possibleConditions"]
            })),
            ModeId::StudentNotes => Some(json!({
                "type": "OBJECT",
                "properties": {
                    "summary": {
                        "type": "STRING",
                        "description": "A summary of the generated SOAP note."
                    },
                    "subjective": { "type": "STRING" },
                    "objective": { "type": "STRING" },
                    "assessment": { "type": "STRING" },
                    "plan": { "type": "STRING" }
                },
                "required": ["summary", "subjective", "objective", "assessment", "plan"]
            })),
            ModeId::StudentSim => None,
        }
    }
}
