//! cmai - CLI entry point.

use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::{Input, Select};
use tracing::{debug, warn};

use cmai::commit::{NormalizeRequest, normalize_commit};
use cmai::config::Settings;
use cmai::git::commit_staged;
use cmai::llm::{CurlTransport, ProgressSink};
use cmai::logging::init_logging;

/// Normalize an informal commit description using the staged diff.
#[derive(Parser, Debug)]
#[command(name = "cmai")]
#[command(about = "Turn an informal change description into a normalized commit message")]
#[command(version)]
struct Cli {
    /// Informal description of the staged change
    message: String,

    /// Settings file with KEY=VALUE lines
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Path to the git repository
    #[arg(short = 'r', long, default_value = ".")]
    repo: PathBuf,

    /// Provider name (openai, qwen, deepseek, zai, anthropic, ollama, ...)
    #[arg(long)]
    provider: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Language of the commit message
    #[arg(long)]
    language: Option<String>,

    /// Character budget for the staged diff
    #[arg(long)]
    max_diff_chars: Option<usize>,

    /// Commit without asking
    #[arg(short = 'y', long, conflicts_with = "dry_run")]
    yes: bool,

    /// Print the message without committing
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Streams model output to the terminal as it arrives.
struct TerminalProgress<W: Write = Stdout> {
    out: W,
}

impl TerminalProgress {
    fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalProgress<W> {
    fn emit(&mut self, text: &str) {
        if let Err(e) = write!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            debug!("Could not write progress to stdout: {}", e);
        }
    }
}

impl<W: Write + Send> ProgressSink for TerminalProgress<W> {
    fn reasoning_started(&mut self) {
        self.emit("Thinking...\n");
    }

    fn answer_started(&mut self) {
        self.emit("\n");
    }

    fn reasoning_delta(&mut self, text: &str) {
        self.emit(text);
    }

    fn answer_delta(&mut self, text: &str) {
        self.emit(text);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Step 1: Settings, with CLI flags taking precedence
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(provider) = &cli.provider {
        settings.provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        settings.model = Some(model.clone());
    }
    if let Some(language) = &cli.language {
        settings.response_language = language.clone();
    }
    if let Some(max) = cli.max_diff_chars {
        settings.max_diff_chars = max;
    }

    // Step 2: Logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        settings.log_level.clone()
    };
    if let Err(e) = init_logging(&level, settings.log_file_path.as_deref()) {
        eprintln!("Warning: Could not open log file: {}. Logging to stderr only.", e);
        let _ = init_logging(&level, None);
    }
    for warning in settings.warnings.drain(..) {
        warn!("{}", warning);
    }
    debug!(
        "Using configuration: {}",
        serde_json::to_string_pretty(&settings).unwrap_or_default()
    );

    // Step 3: Normalize
    let provider = settings.provider_config();
    let request = NormalizeRequest {
        user_input: cli.message.clone(),
        language: settings.response_language.clone(),
        template: settings.prompt_template.clone(),
        diff: settings.diff_options(),
    };
    let transport = CurlTransport::new(settings.timeout);
    let mut progress = TerminalProgress::new();

    let start = Instant::now();
    let result = normalize_commit(&cli.repo, &request, &provider, &transport, &mut progress)
        .await
        .context("Failed to normalize commit message")?;
    let elapsed = start.elapsed();

    println!();
    println!("Commit message: {}", result.content);
    println!(
        "Tokens used: {}",
        result
            .tokens_used
            .map(|n| n.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("Elapsed time: {:.2} seconds", elapsed.as_secs_f64());

    if cli.dry_run {
        println!();
        println!("Dry run complete. Nothing committed.");
        return Ok(());
    }

    if result.content.is_empty() {
        bail!("The model returned an empty commit message");
    }

    // Step 4: Confirm and commit
    let message = if cli.yes {
        Some(result.content)
    } else {
        confirm_message(result.content)?
    };

    match message {
        Some(message) => {
            let oid = commit_staged(&cli.repo, &message).context("Failed to create commit")?;
            let id = oid.to_string();
            println!("Committed {}", &id[..7]);
        }
        None => println!("Commit aborted."),
    }

    Ok(())
}

/// Ask whether to commit, edit or abort. `None` means abort.
fn confirm_message(message: String) -> Result<Option<String>> {
    println!();
    let choice = Select::new()
        .with_prompt("Commit with this message?")
        .items(&["Commit", "Edit", "Abort"])
        .default(0)
        .interact()
        .context("Prompt cancelled")?;

    match choice {
        0 => Ok(Some(message)),
        1 => {
            let edited: String = Input::new()
                .with_prompt("Commit message")
                .with_initial_text(message)
                .interact_text()
                .context("Prompt cancelled")?;
            Ok(Some(edited))
        }
        _ => Ok(None),
    }
}
