//! Prompt assembly for commit message normalization.

/// Built-in template. Placeholders: `{user_input}`, `{diff_content}`, `{language}`.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Based on the user's description {user_input}, \
generate a normalized commit message. Keep it concise and clear and follow common commit \
conventions.\n\
The changes are: {diff_content}. Reply with the normalized commit message only, nothing else.\n\
Answer in {language} and do not include any other language or commentary.\n";

/// Fill the template's placeholders in a single left-to-right pass.
///
/// Substituted values are never scanned again, so placeholder text inside the
/// diff or the user input stays literal. Other `{...}` sequences are copied
/// unchanged.
pub fn assemble_prompt(template: &str, user_input: &str, diff: &str, language: &str) -> String {
    let placeholders = [
        ("{user_input}", user_input),
        ("{diff_content}", diff),
        ("{language}", language),
    ];

    let mut out = String::with_capacity(template.len() + user_input.len() + diff.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match placeholders
            .iter()
            .find(|(token, _)| tail.starts_with(token))
        {
            Some((token, value)) => {
                out.push_str(value);
                rest = &tail[token.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Text that stands in for the diff when a prompt is logged.
pub fn hidden_diff_note(diff: &str) -> String {
    format!("[Diff content hidden, length: {}]", diff.chars().count())
}

/// Turn literal `\n` sequences from a one-line settings value into newlines.
pub fn unescape_template(raw: &str) -> String {
    raw.replace("\\n", "\n")
}
