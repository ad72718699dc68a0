//! Groups finalized transcript segments into whole user utterances.

use super::base::TranscriptEvent;

/// Collects `is_final` segments until the provider reports `speech_final`.
#[derive(Debug, Default)]
pub struct UtteranceAssembler {
    segments: Vec<String>,
}

impl UtteranceAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event; returns the completed utterance when one ends.
    pub fn push(&mut self, event: &TranscriptEvent) -> Option<String> {
        let text = event.text.trim();
        if event.is_final && !text.is_empty() {
            self.segments.push(text.to_string());
        }

        if !event.speech_final {
            return None;
        }

        let utterance = self.segments.join(" ");
        self.segments.clear();
        (!utterance.is_empty()).then_some(utterance)
    }

    pub fn has_pending(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}
