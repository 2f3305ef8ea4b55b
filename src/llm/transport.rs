//! Transport that carries a streaming request to the model backend.
//!
//! The request is executed by a `curl` child process; its stdout is read line
//! by line and handed to the decoders. The crate itself holds no HTTP client.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::timeout;
use tracing::debug;

use crate::error::TransportError;
use crate::llm::provider::ChatRequest;

/// Raw lines of a backend response, in arrival order.
pub type LineStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens a streaming request and yields its raw lines.
///
/// This abstraction allows substituting scripted streams in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<LineStream, TransportError>;
}

/// Transport backed by the system `curl` binary.
pub struct CurlTransport {
    idle_timeout: Duration,
}

impl CurlTransport {
    /// `idle_timeout` bounds the wait for each line, not the whole response.
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }
}

/// Check that curl is installed and accessible.
pub fn check_curl_installed() -> Result<(), TransportError> {
    which::which("curl")
        .map(|_| ())
        .map_err(|_| TransportError::NotInstalled)
}

/// Write request headers to a temp file so they stay off the command line.
fn write_header_file(request: &ChatRequest) -> Result<NamedTempFile, TransportError> {
    let mut file = NamedTempFile::new()
        .map_err(|e| TransportError::RequestFailed(format!("header file: {}", e)))?;
    for (name, value) in &request.headers {
        writeln!(file, "{}: {}", name, value)
            .map_err(|e| TransportError::RequestFailed(format!("header file: {}", e)))?;
    }
    file.flush()
        .map_err(|e| TransportError::RequestFailed(format!("header file: {}", e)))?;
    Ok(file)
}

#[async_trait]
impl ChatTransport for CurlTransport {
    async fn open(&self, request: &ChatRequest) -> Result<LineStream, TransportError> {
        check_curl_installed()?;

        let headers = write_header_file(request)?;
        let body = serde_json::to_vec(&request.body)
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        debug!("POST {} ({} byte body)", request.url, body.len());

        let mut child = Command::new("curl")
            .arg("--silent")
            .arg("--show-error")
            .arg("--no-buffer")
            .arg("--fail")
            .arg("-X")
            .arg("POST")
            .arg("-H")
            .arg(format!("@{}", headers.path().display()))
            .arg("--data-binary")
            .arg("@-")
            .arg(&request.url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TransportError::SpawnFailed)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::RequestFailed("curl stdin unavailable".into()))?;
        stdin.write_all(&body).await.map_err(TransportError::Io)?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::RequestFailed("curl stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        let state = CurlStream {
            lines: BufReader::new(stdout).lines(),
            stderr,
            child,
            idle_timeout: self.idle_timeout,
            _headers: headers,
            finished: false,
        };

        Ok(stream::unfold(state, next_line).boxed())
    }
}

/// State threaded through the line stream. Dropping it kills curl.
struct CurlStream {
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<ChildStderr>,
    child: Child,
    idle_timeout: Duration,
    // Must outlive curl's read of the header file.
    _headers: NamedTempFile,
    finished: bool,
}

async fn next_line(mut st: CurlStream) -> Option<(Result<String, TransportError>, CurlStream)> {
    if st.finished {
        return None;
    }

    match timeout(st.idle_timeout, st.lines.next_line()).await {
        Err(_) => {
            st.finished = true;
            Some((Err(TransportError::Timeout(st.idle_timeout.as_secs())), st))
        }
        Ok(Err(e)) => {
            st.finished = true;
            Some((Err(TransportError::Io(e)), st))
        }
        Ok(Ok(Some(line))) => Some((Ok(line), st)),
        Ok(Ok(None)) => {
            st.finished = true;
            match st.child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => {
                    let mut stderr = String::new();
                    if let Some(mut pipe) = st.stderr.take() {
                        let _ = pipe.read_to_string(&mut stderr).await;
                    }
                    let code = status.code().unwrap_or(-1);
                    Some((
                        Err(TransportError::NonZeroExit {
                            code,
                            stderr: stderr.trim().to_string(),
                        }),
                        st,
                    ))
                }
                Err(e) => Some((Err(TransportError::Io(e)), st)),
            }
        }
    }
}
