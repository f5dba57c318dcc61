use std::collections::HashMap;

use super::call_log::Speaker;

/// Per-speaker buffers for the turn currently being streamed.
///
/// At most one open buffer exists per speaker; fragments are concatenated in
/// arrival order without separators.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    buffers: HashMap<Speaker, String>,
}

impl TranscriptAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.buffers.entry(speaker).or_default().push_str(fragment);
    }

    /// Close the current turn, returning its trimmed text if any is left.
    pub fn flush(&mut self, speaker: Speaker) -> Option<String> {
        self.buffers.remove(&speaker).and_then(|text| non_blank(&text))
    }
}

/// Trimmed text, or `None` when nothing but whitespace remains.
#[must_use]
pub fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
