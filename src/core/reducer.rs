//! Stream reducer: folds partial results into the in-flight AI message
//!
//! One exchange produces a lazy, finite, non-restartable sequence of
//! [`PartialResult`] elements. The reducer is an explicit fold over that
//! sequence: every element may produce a [`MessagePatch`] for the in-flight
//! message, and an `Error` element terminates the fold immediately so that
//! remaining elements are never consumed. The caller owns the transcript; the
//! reducer only decides what the message should say after each element.
//!
//! States: idle -> awaiting-first-chunk -> streaming-text ->
//! (finalizing-structured | finalized | errored).

use crate::conversation::{Citation, StructuredPayload};

/// One incremental element of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialResult {
    TextChunk(String),
    Citations(Vec<Citation>),
    StructuredData(StructuredPayload),
    Error(String),
}

/// Replacement state for the in-flight message. Patches replace the message
/// body wholesale: `citations: None` clears any previously written list, and
/// the final write after clean exhaustion restores it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePatch {
    pub text: String,
    pub structured: Option<StructuredPayload>,
    pub citations: Option<Vec<Citation>>,
}

/// Outcome of folding one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub patch: MessagePatch,
    /// Terminal element: stop consuming the stream.
    pub done: bool,
}

#[derive(Debug, Default)]
pub struct StreamReducer {
    text: String,
    structured: Option<StructuredPayload>,
    citations: Vec<Citation>,
    errored: bool,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one partial result. Returns `None` only if called again after a
    /// terminal step, which callers honoring `done` never do.
    pub fn apply(&mut self, result: PartialResult) -> Option<Step> {
        if self.errored {
            return None;
        }

        match result {
            PartialResult::TextChunk(chunk) => {
                // Chunk order is preserved exactly as received.
                self.text.push_str(&chunk);
                Some(Step {
                    patch: self.patch(None),
                    done: false,
                })
            }
            PartialResult::StructuredData(payload) => {
                // The payload's summary becomes the display text.
                self.text = payload.summary().to_string();
                self.structured = Some(payload);
                Some(Step {
                    patch: self.patch(None),
                    done: false,
                })
            }
            PartialResult::Citations(citations) => {
                // Last-wins when emitted more than once.
                self.citations = citations.clone();
                Some(Step {
                    patch: self.patch(Some(citations)),
                    done: false,
                })
            }
            PartialResult::Error(message) => {
                // The error string replaces everything accumulated so far.
                self.errored = true;
                self.text = message.clone();
                self.structured = None;
                self.citations.clear();
                Some(Step {
                    patch: MessagePatch {
                        text: message,
                        structured: None,
                        citations: None,
                    },
                    done: true,
                })
            }
        }
    }

    /// Final write after the stream is exhausted without error. Carries the
    /// citation list together with text and payload so citations that arrived
    /// after the last text update are not dropped. `None` when there is
    /// nothing to add.
    pub fn finish(self) -> Option<MessagePatch> {
        if self.errored || self.citations.is_empty() {
            return None;
        }
        Some(MessagePatch {
            text: self.text,
            structured: self.structured,
            citations: Some(self.citations),
        })
    }

    fn patch(&self, citations: Option<Vec<Citation>>) -> MessagePatch {
        MessagePatch {
            text: self.text.clone(),
            structured: self.structured.clone(),
            citations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> PartialResult {
        PartialResult::TextChunk(text.to_string())
    }

    fn citation(uri: &str, title: &str) -> Citation {
        Citation {
            uri: uri.to_string(),
            title: title.to_string(),
        }
    }

    fn soap(summary: &str) -> StructuredPayload {
        StructuredPayload::Soap {
            summary: summary.to_string(),
            subjective: "s".into(),
            objective: "o".into(),
            assessment: "a".into(),
            plan: "p".into(),
        }
    }

    #[test]
    fn test_chunks_accumulate_in_order() {
        let mut reducer = StreamReducer::new();
        let mut texts = Vec::new();
        for part in ["Hel", "lo", " world"] {
            let step = reducer.apply(chunk(part)).unwrap();
            assert!(!step.done);
            texts.push(step.patch.text);
        }
        // Monotonic growth, one patch per chunk, no reordering.
        assert_eq!(texts, vec!["Hel", "Hello", "Hello world"]);
        assert!(reducer.finish().is_none());
    }

    #[test]
    fn test_structured_payload_replaces_text_with_summary() {
        let mut reducer = StreamReducer::new();
        let payload = soap("X");
        let step = reducer.apply(PartialResult::StructuredData(payload.clone())).unwrap();
        assert_eq!(step.patch.text, "X");
        assert_eq!(step.patch.structured, Some(payload));
        assert!(!step.done);
    }

    #[test]
    fn test_error_replaces_accumulation_and_terminates() {
        let mut reducer = StreamReducer::new();
        reducer.apply(chunk("partial ")).unwrap();
        reducer.apply(chunk("answer")).unwrap();

        let step = reducer.apply(PartialResult::Error("backend exploded".into())).unwrap();
        assert!(step.done);
        // The error string exactly, not a concatenation with prior chunks.
        assert_eq!(step.patch.text, "backend exploded");
        assert_eq!(step.patch.structured, None);

        // Further elements are not processed.
        assert!(reducer.apply(chunk("late")).is_none());
        assert!(reducer.finish().is_none());
    }

    #[test]
    fn test_citations_after_final_text_survive_in_final_write() {
        let mut reducer = StreamReducer::new();
        reducer.apply(chunk("Answer")).unwrap();
        let sources = vec![citation("https://mohfw.gov.in", "MoHFW")];
        reducer.apply(PartialResult::Citations(sources.clone())).unwrap();

        let final_patch = reducer.finish().unwrap();
        assert_eq!(final_patch.text, "Answer");
        assert_eq!(final_patch.citations, Some(sources));
    }

    #[test]
    fn test_citation_patch_is_produced_at_arrival() {
        let mut reducer = StreamReducer::new();
        reducer.apply(chunk("so far")).unwrap();
        let step = reducer
            .apply(PartialResult::Citations(vec![citation("u", "t")]))
            .unwrap();
        assert_eq!(step.patch.text, "so far");
        assert!(step.patch.citations.is_some());
    }

    #[test]
    fn test_citations_last_wins() {
        let mut reducer = StreamReducer::new();
        reducer
            .apply(PartialResult::Citations(vec![citation("first", "a")]))
            .unwrap();
        reducer
            .apply(PartialResult::Citations(vec![
                citation("second", "b"),
                citation("third", "c"),
            ]))
            .unwrap();

        let final_patch = reducer.finish().unwrap();
        let citations = final_patch.citations.unwrap();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].uri, "second");
    }

    #[test]
    fn test_text_chunk_after_structured_keeps_payload_attached() {
        let mut reducer = StreamReducer::new();
        reducer.apply(PartialResult::StructuredData(soap("summary"))).unwrap();
        let step = reducer.apply(chunk(" extra")).unwrap();
        assert_eq!(step.patch.text, "summary extra");
        assert!(step.patch.structured.is_some());
    }

    #[test]
    fn test_no_final_write_without_citations() {
        let mut reducer = StreamReducer::new();
        reducer.apply(chunk("done")).unwrap();
        assert!(reducer.finish().is_none());
    }
}
