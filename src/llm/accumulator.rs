//! Response accumulation: turns a stream of [`StreamEvent`]s into one
//! [`NormalizedResult`].

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{StreamError, TransportError};
use crate::llm::event::{StreamEvent, Usage};
use crate::llm::split::split_reasoning;

/// How answer deltas are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Reasoning and answer arrive in distinct fields.
    Separated,
    /// Reasoning is embedded in the answer text behind markers.
    Inline,
}

/// Accumulator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reasoning,
    Answering,
    Done,
}

/// Receives user-facing progress while a response streams in.
///
/// Passed explicitly into the accumulator so display is decided by the caller.
pub trait ProgressSink: Send {
    fn reasoning_started(&mut self) {}
    fn answer_started(&mut self) {}
    fn reasoning_delta(&mut self, _text: &str) {}
    fn answer_delta(&mut self, _text: &str) {}
}

/// Sink that discards all progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Final outcome of one model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedResult {
    pub content: String,
    pub reasoning: String,
    /// `None` when the backend never reported usage.
    pub tokens_used: Option<u64>,
}

/// Running state for a single in-flight response.
pub struct Accumulator<'s> {
    mode: DecodeMode,
    phase: Phase,
    is_reasoning: bool,
    is_answering: bool,
    /// Reasoning from an explicit reasoning channel.
    reasoning: String,
    /// Reasoning recovered from the inline buffer by the splitter.
    inline_reasoning: String,
    answer: String,
    /// Cumulative inline text, re-split on every delta.
    buffer: String,
    usage: Usage,
    sink: &'s mut dyn ProgressSink,
}

impl<'s> Accumulator<'s> {
    pub fn new(mode: DecodeMode, sink: &'s mut dyn ProgressSink) -> Self {
        Self {
            mode,
            phase: Phase::Idle,
            is_reasoning: false,
            is_answering: false,
            reasoning: String::new(),
            inline_reasoning: String::new(),
            answer: String::new(),
            buffer: String::new(),
            usage: Usage::default(),
            sink,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_reasoning(&self) -> bool {
        self.is_reasoning
    }

    pub fn is_answering(&self) -> bool {
        self.is_answering
    }

    pub fn answer_text(&self) -> &str {
        &self.answer
    }

    pub fn reasoning_text(&self) -> String {
        format!("{}{}", self.reasoning, self.inline_reasoning)
    }

    /// Apply one event. Events after termination are ignored.
    pub fn apply(&mut self, event: StreamEvent) {
        if self.phase == Phase::Done {
            debug!("Ignoring event after stream termination: {:?}", event);
            return;
        }

        match event {
            StreamEvent::ReasoningDelta(text) => {
                if text.is_empty() {
                    return;
                }
                self.enter_reasoning();
                self.sink.reasoning_delta(&text);
                self.reasoning.push_str(&text);
            }
            StreamEvent::AnswerDelta(text) => match self.mode {
                DecodeMode::Separated => {
                    if text.is_empty() {
                        return;
                    }
                    self.enter_answer();
                    self.sink.answer_delta(&text);
                    self.answer.push_str(&text);
                }
                DecodeMode::Inline => self.apply_inline(&text),
            },
            StreamEvent::UsageUpdate(usage) => self.record_usage(usage),
            StreamEvent::StreamDone => {
                debug!("Stream done");
                self.phase = Phase::Done;
            }
        }
    }

    fn apply_inline(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.buffer.push_str(delta);

        // Re-derive from the whole buffer; never patch forward.
        let split = split_reasoning(&self.buffer);
        self.inline_reasoning = split.reasoning;
        self.answer = split.answer;

        if !self.answer.is_empty() {
            self.enter_answer();
            self.sink.answer_delta(delta);
        } else if split.marked {
            self.enter_reasoning();
            self.sink.reasoning_delta(delta);
        }
    }

    fn enter_reasoning(&mut self) {
        if !self.is_reasoning {
            info!("Detected reasoning content, please wait...");
            self.is_reasoning = true;
            self.sink.reasoning_started();
        }
        if self.phase == Phase::Idle {
            self.phase = Phase::Reasoning;
        }
    }

    fn enter_answer(&mut self) {
        if !self.is_answering {
            debug!("Starting to answer...");
            self.is_answering = true;
            self.sink.answer_started();
        }
        if matches!(self.phase, Phase::Idle | Phase::Reasoning) {
            self.phase = Phase::Answering;
        }
    }

    fn record_usage(&mut self, usage: Usage) {
        debug!("Received usage info: {:?}", usage);
        if usage.input_tokens.is_some() {
            self.usage.input_tokens = usage.input_tokens;
        }
        if usage.output_tokens.is_some() {
            self.usage.output_tokens = usage.output_tokens;
        }
        if usage.total_tokens.is_some() {
            self.usage.total_tokens = usage.total_tokens;
        }
    }

    /// Token total: the last cumulative total if one was reported, otherwise
    /// the sum of the last input and output counts.
    pub fn tokens_used(&self) -> Option<u64> {
        if let Some(total) = self.usage.total_tokens {
            return Some(total);
        }
        match (self.usage.input_tokens, self.usage.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
        }
    }

    /// Close the accumulator and produce the result.
    pub fn finish(mut self) -> NormalizedResult {
        self.phase = Phase::Done;

        if self.mode == DecodeMode::Inline && !self.buffer.is_empty() && self.answer.is_empty() {
            let split = split_reasoning(&self.buffer);
            self.answer = if split.answer.is_empty() {
                debug!("No answer separated from reasoning, using the full response");
                self.buffer.clone()
            } else {
                split.answer
            };
        }

        let tokens_used = self.tokens_used();
        if tokens_used.is_none() {
            warn!("No token usage information received");
        }

        let content = self.answer.trim().to_string();
        let reasoning = self.reasoning_text().trim().to_string();
        info!("Final normalized commit message: {}", content);
        if !reasoning.is_empty() {
            debug!("Reasoning process: {}", reasoning);
        }

        NormalizedResult {
            content,
            reasoning,
            tokens_used,
        }
    }
}

/// Consume an event stream to completion.
///
/// Stops at the first [`StreamEvent::StreamDone`] or when the stream ends. A
/// transport error aborts with [`StreamError::Interrupted`] carrying the
/// answer text received so far.
pub async fn accumulate<S>(
    mut events: S,
    mode: DecodeMode,
    sink: &mut dyn ProgressSink,
) -> Result<NormalizedResult, StreamError>
where
    S: Stream<Item = Result<StreamEvent, TransportError>> + Unpin,
{
    let mut acc = Accumulator::new(mode, sink);

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                acc.apply(event);
                if acc.phase() == Phase::Done {
                    break;
                }
            }
            Err(e) => {
                warn!("Model stream failed: {}", e);
                return Err(StreamError::Interrupted {
                    partial: acc.answer_text().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(acc.finish())
}
