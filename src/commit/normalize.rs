//! Top-level normalization: staged diff to commit message.

use std::path::Path;

use tracing::{debug, info};

use crate::commit::diff::{DiffOptions, aggregate};
use crate::commit::prompt::{DEFAULT_PROMPT_TEMPLATE, assemble_prompt, hidden_diff_note};
use crate::error::NormalizeError;
use crate::git::{GitCli, StagedSource};
use crate::llm::accumulator::{NormalizedResult, ProgressSink, accumulate};
use crate::llm::decode::decode_stream;
use crate::llm::provider::ProviderConfig;
use crate::llm::transport::ChatTransport;

/// Inputs of one normalization call.
#[derive(Debug, Clone)]
pub struct NormalizeRequest {
    /// Informal description of the change.
    pub user_input: String,
    pub language: String,
    pub template: String,
    pub diff: DiffOptions,
}

impl NormalizeRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            language: "English".to_string(),
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            diff: DiffOptions::default(),
        }
    }
}

/// Normalize the staged changes of the repository at `repo_path`.
pub async fn normalize_commit(
    repo_path: &Path,
    request: &NormalizeRequest,
    provider: &ProviderConfig,
    transport: &dyn ChatTransport,
    sink: &mut dyn ProgressSink,
) -> Result<NormalizedResult, NormalizeError> {
    let git = GitCli::open(repo_path)?;
    normalize_staged(&git, request, provider, transport, sink).await
}

/// Normalize using an arbitrary staged-change source.
///
/// The model is never contacted when nothing is staged.
pub async fn normalize_staged<S>(
    source: &S,
    request: &NormalizeRequest,
    provider: &ProviderConfig,
    transport: &dyn ChatTransport,
    sink: &mut dyn ProgressSink,
) -> Result<NormalizedResult, NormalizeError>
where
    S: StagedSource + ?Sized,
{
    info!("Normalizing commit message: {}", request.user_input);

    let bundle = aggregate(source, &request.diff)?.ok_or(NormalizeError::NoStagedChanges)?;
    let diff = bundle.render();

    let prompt = assemble_prompt(&request.template, &request.user_input, &diff, &request.language);
    debug!(
        "Prompt: {}",
        assemble_prompt(
            &request.template,
            &request.user_input,
            &hidden_diff_note(&diff),
            &request.language
        )
    );

    let backend = provider.backend();
    info!("Using provider {} with model {}", provider.provider, provider.model);

    let lines = transport.open(&provider.build_request(&prompt)).await?;
    let events = decode_stream(lines, backend);
    let result = accumulate(events, backend.decode_mode(), sink).await?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DiffError, TransportError};
    use crate::git::staged::MockStagedSource;
    use crate::llm::accumulator::NoProgress;
    use crate::llm::provider::Provider;
    use crate::llm::transport::{LineStream, MockChatTransport};
    use futures::stream::{self, StreamExt};

    fn staged(files: &'static [(&'static str, &'static str)]) -> MockStagedSource {
        let mut mock = MockStagedSource::new();
        mock.expect_staged_paths()
            .returning(move || Ok(files.iter().map(|(p, _)| p.to_string()).collect()));
        mock.expect_file_diff().returning(move |path| {
            files
                .iter()
                .find(|(p, _)| *p == path)
                .map(|(_, d)| d.to_string())
                .ok_or_else(|| DiffError::Command {
                    operation: "diff".to_string(),
                    reason: "missing".to_string(),
                })
        });
        mock
    }

    fn lines(raw: &[&str]) -> LineStream {
        let owned: Vec<Result<String, TransportError>> =
            raw.iter().map(|l| Ok(l.to_string())).collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn test_ollama_think_stream_produces_answer() {
        let source = staged(&[("src/auth.rs", "+fn login() {}")]);
        let mut transport = MockChatTransport::new();
        transport
            .expect_open()
            .withf(|req| {
                let content = req.body["messages"][0]["content"].as_str().unwrap_or_default();
                content.contains("src/auth.rs:\n+fn login() {}") && content.contains("add login")
            })
            .times(1)
            .returning(|_| {
                Ok(lines(&[
                    r#"{"message":{"content":"<think>foo"},"done":false}"#,
                    r#"{"message":{"content":"</think>feat(auth): add login"},"done":false}"#,
                    r#"{"message":{"content":""},"done":true,"prompt_eval_count":40,"eval_count":8}"#,
                ]))
            });

        let provider = ProviderConfig::new(Provider::Ollama);
        let request = NormalizeRequest::new("add login");
        let result = normalize_staged(&source, &request, &provider, &transport, &mut NoProgress)
            .await
            .unwrap();

        assert_eq!(result.content, "feat(auth): add login");
        assert_eq!(result.reasoning, "foo");
        assert_eq!(result.tokens_used, Some(48));
    }

    #[tokio::test]
    async fn test_nothing_staged_never_calls_model() {
        let source = staged(&[("Cargo.lock", "+x")]);
        let mut transport = MockChatTransport::new();
        transport.expect_open().never();

        let provider = ProviderConfig::new(Provider::OpenAi);
        let err = normalize_staged(
            &source,
            &NormalizeRequest::new("bump deps"),
            &provider,
            &transport,
            &mut NoProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NormalizeError::NoStagedChanges));
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let source = staged(&[("a.txt", "+a")]);
        let mut transport = MockChatTransport::new();
        transport
            .expect_open()
            .returning(|_| Err(TransportError::NotInstalled));

        let provider = ProviderConfig::new(Provider::DeepSeek);
        let err = normalize_staged(
            &source,
            &NormalizeRequest::new("x"),
            &provider,
            &transport,
            &mut NoProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NormalizeError::Transport(TransportError::NotInstalled)));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_answer() {
        let source = staged(&[("a.txt", "+a")]);
        let mut transport = MockChatTransport::new();
        transport.expect_open().returning(|_| {
            let items: Vec<Result<String, TransportError>> = vec![
                Ok(r#"data: {"choices":[{"delta":{"content":"fix: han"}}]}"#.to_string()),
                Err(TransportError::Timeout(300)),
            ];
            Ok(stream::iter(items).boxed())
        });

        let provider = ProviderConfig::new(Provider::Qwen);
        let err = normalize_staged(
            &source,
            &NormalizeRequest::new("x"),
            &provider,
            &transport,
            &mut NoProgress,
        )
        .await
        .unwrap_err();
        match err {
            NormalizeError::Stream(stream_err) => assert_eq!(stream_err.partial(), "fix: han"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_repository_is_diff_error() {
        let transport = MockChatTransport::new();
        let provider = ProviderConfig::new(Provider::OpenAi);
        let err = normalize_commit(
            Path::new("/definitely/not/a/repo"),
            &NormalizeRequest::new("x"),
            &provider,
            &transport,
            &mut NoProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NormalizeError::Diff(DiffError::RepoAccess { .. })));
    }
}
