//! Reasoning/answer splitting for backends that inline "thinking" text in the
//! answer channel.
//!
//! The splitter is always applied to the cumulative text received so far, not
//! to the latest delta. Re-running it on a longer buffer may reclassify text
//! that an earlier run reported as answer (a close tag arriving late demotes
//! it back into reasoning), which is what makes the result independent of how
//! the stream was chunked.

use std::sync::LazyLock;

use regex_lite::Regex;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Start/end marker pairs, checked in order after the `<think>` tags.
pub const REASONING_MARKERS: &[(&str, &str)] = &[
    ("**思考过程:**", "**答案:**"),
    ("**Thinking:**", "**Answer:**"),
    ("## 思考", "## 答案"),
    ("## Thinking", "## Answer"),
    ("[思考]", "[答案]"),
    ("[Thinking]", "[Answer]"),
];

static THINK_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("Invalid regex"));

/// Result of classifying a text buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub reasoning: String,
    pub answer: String,
    /// Whether a reasoning marker was recognized at all.
    pub marked: bool,
}

impl Split {
    fn plain(text: &str) -> Self {
        Self {
            reasoning: String::new(),
            answer: text.to_string(),
            marked: false,
        }
    }

    fn marked(reasoning: &str, answer: &str) -> Self {
        Self {
            reasoning: reasoning.to_string(),
            answer: answer.to_string(),
            marked: true,
        }
    }

    /// Reasoning started but its end marker has not arrived yet.
    pub fn is_provisional(&self) -> bool {
        self.marked && self.answer.is_empty()
    }
}

/// Split cumulative model output into reasoning and answer text.
///
/// Precedence:
/// 1. complete `<think>...</think>` spans (all of them, concatenated)
/// 2. a lone `<think>`: everything after it is provisional reasoning
/// 3. the first present start marker of [`REASONING_MARKERS`]
/// 4. no marker: the whole text is answer
pub fn split_reasoning(text: &str) -> Split {
    if text.contains(THINK_OPEN) && text.contains(THINK_CLOSE) {
        let spans: Vec<&str> = THINK_SPAN
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();
        if !spans.is_empty() {
            let reasoning = spans.concat();
            let answer = THINK_SPAN.replace_all(text, "");
            return Split::marked(&reasoning, answer.trim());
        }
        // Both tags present but never as open-then-close: try the markers.
    } else if let Some((_, rest)) = text.split_once(THINK_OPEN) {
        return Split::marked(rest.trim(), "");
    }

    for (start, end) in REASONING_MARKERS {
        if !text.contains(start) {
            continue;
        }
        return match text.split_once(end) {
            Some((before, after)) => {
                let reasoning = before.split_once(start).map_or(before, |(_, r)| r);
                Split::marked(reasoning.trim(), after.trim())
            }
            None => {
                let reasoning = text.split_once(start).map_or("", |(_, r)| r);
                Split::marked(reasoning.trim(), "")
            }
        };
    }

    Split::plain(text)
}
