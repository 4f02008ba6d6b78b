//! System instruction assembly and fixed user-facing strings
//!
//! The system instruction is built from a fixed persona preamble, the
//! practitioner directive, the active mode's context, a trusted-sources
//! knowledge block, and a language directive. Everything here is static; no
//! prompt content is loaded from files.

use crate::config::modes::ModeId;

/// Built-in prompt fragments.
pub mod builtin {
    pub const PERSONA_PREAMBLE: &str = "You are Medanna, a helpful AI healthcare assistant operating in India. Be empathetic, clear, and professional. Format your answers using Markdown for clarity, including lists, bold text, and headings where appropriate. ";

    pub const PRACTITIONER_DIRECTIVE: &str = "You are assisting a qualified, verified homeopathic practitioner. Your tone should be professional and concise. Your primary goal is to perform repertory analysis based on the provided case details. Analyze symptoms, modalities (what makes them better or worse), and the patient's constitution. Reference classical homeopathic materia medica and repertories in your reasoning. Always remind the practitioner to use their own judgment and to conduct a full case taking. ";

    pub const INTERACTIVE_DIRECTIVE: &str = "You should now act as a virtual patient. Do not break character unless explicitly asked to. Be interactive and respond to questions naturally. ";

    pub const JSON_DIRECTIVE: &str = "Your response must be a single JSON object that strictly conforms to the provided schema. Include a natural language summary of your findings in the 'summary' field.";

    /// Injected into every system instruction as the primary knowledge base.
    pub const TRUSTED_DATA_SOURCES: &str = r#"

---
**Knowledge Base: Trusted Indian & Global Health Data Sources**
When answering questions about statistics, guidelines, or public health, you MUST prioritize and reference information from the following trusted sources. This is your primary knowledge base.

**General Public & National Health Info:**
*   **MoHFW India (https://mohfw.gov.in):** The official Ministry of Health and Family Welfare site for portals, dashboards, and national health advisories.
*   **Data.gov.in MoHFW (https://www.data.gov.in/ministrydepartment/Ministry%20of%20Health%20and%20Family%20Welfare):** Open government data with state/indicator level health datasets.
*   **NHM HMIS Portal (https://www.india.gov.in/nhm-health-statistics-information-portal):** For state and district level health statistics and HMIS indicators.

**Emergency Care & First Aid:**
*   **WHO Emergency Care Toolkit (https://www.who.int/teams/integrated-health-services/clinical-services-and-systems/emergency-and-critical-care/emergency-care-toolkit):** Provides protocols, tools, and training for triage and red flags.
*   **WHO Emergency Care Dataset (https://cdn.who.int/media/docs/default-source/integrated-health-services-(ihs)/csy/dataset-for-emergency-care.pdf):** Defines data standards and fields for emergency care.
*   **First Aid Intents Dataset (https://www.kaggle.com/datasets/mahmoudahmed6/first-aid-intents-dataset):** A dataset for understanding first aid related questions and utterances.
*   **AIDER (Zenodo - https://zenodo.org/records/3888300):** A dataset of annotated aerial images for disaster response.
---
"#;
}

/// Fixed user-facing message strings written into the transcript.
pub mod messages {
    /// Initial text of an in-flight AI message before the first chunk lands.
    pub const LOADING_MARKER: &str = "...";

    /// Pre-flight fallback when a restricted message reaches dispatch unverified.
    pub const VERIFICATION_REQUIRED: &str = "Access to this information requires license verification. Please complete the verification step.";

    /// Structured-mode response text was not valid JSON for the expected shape.
    pub const PARSE_FAILURE: &str = "Failed to parse the structured response from the AI.";

    /// The model call could not be completed (network, auth, quota).
    pub const TRANSPORT_FAILURE: &str = "Failed to get response from Gemini API. Please check your connection and API key.";

    /// Last-resort fallback for any fault outside the stream's own error channel.
    pub const GENERIC_APOLOGY: &str = "Sorry, I encountered a critical error. Please try again.";
}

/// Assemble the system instruction for one exchange.
pub fn system_instruction(mode: ModeId, language: &str) -> String {
    let descriptor = mode.descriptor();

    let mut instruction = String::from(builtin::PERSONA_PREAMBLE);
    instruction.push_str(builtin::PRACTITIONER_DIRECTIVE);

    instruction.push_str(&format!(
        "\n\nCONTEXT: The user has selected the '{}' mode. {} Tailor your responses to this specific context. ",
        descriptor.title, descriptor.description
    ));
    if descriptor.interactive {
        instruction.push_str(builtin::INTERACTIVE_DIRECTIVE);
    }
    if mode.response_schema().is_some() {
        instruction.push_str(builtin::JSON_DIRECTIVE);
    }

    instruction.push_str(builtin::TRUSTED_DATA_SOURCES);
    instruction.push_str(&format!("All your responses must be in {}.", language));

    instruction
}
