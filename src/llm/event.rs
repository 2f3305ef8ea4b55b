//! Backend-neutral stream events.

/// Token counts reported by a backend. Any field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl Usage {
    pub fn total(total: u64) -> Self {
        Self {
            total_tokens: Some(total),
            ..Default::default()
        }
    }

    pub fn input(input: u64) -> Self {
        Self {
            input_tokens: Some(input),
            ..Default::default()
        }
    }

    pub fn output(output: u64) -> Self {
        Self {
            output_tokens: Some(output),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none() && self.total_tokens.is_none()
    }
}

/// One decoded unit of a model response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text explicitly tagged as reasoning by the backend.
    ReasoningDelta(String),
    /// Answer text. For inline-reasoning backends this is the single text
    /// channel that still has to be split.
    AnswerDelta(String),
    UsageUpdate(Usage),
    StreamDone,
}
