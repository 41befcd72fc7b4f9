//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kbchat_core::{
    ChatManage, EventManager, EventType, PipelineKind, PipelineSummary, ProgressReporter,
    RequestContext, default_event_manager, run_pipeline,
};
use kbchat_context::{PromptField, placeholders_for};
use kbchat_model::{OpenAiCompatChat, StreamEvent};
use kbchat_retrieval::{HttpSearchSource, SourceRegistry, render_retrieval_report};
use kbchat_shared::{AppConfig, init_config, load_config, load_config_from, validate_api_key};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbchat: answer questions from your knowledge bases.
#[derive(Parser)]
#[command(
    name = "kbchat",
    version,
    about = "Retrieve from several knowledge sources at once and answer with a chat model.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.kbchat/kbchat.toml.
    #[arg(long, global = true, env = "KBCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a question and print the model's answer.
    Ask {
        /// The question.
        query: String,

        /// Knowledge source IDs to search (repeatable). Defaults to every
        /// configured source.
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Wait for the full answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,

        /// Session identifier attached to logs.
        #[arg(long)]
        session: Option<String>,
    },

    /// Show what would be sent to the model, without calling it.
    Context {
        /// The question.
        query: String,

        /// Knowledge source IDs to search (repeatable). Defaults to every
        /// configured source.
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },

    /// List configured knowledge sources.
    Sources,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
    /// List the placeholders each prompt field accepts.
    Placeholders,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so answers on
/// stdout stay clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbchat=warn",
        1 => "kbchat=info",
        2 => "kbchat=debug",
        _ => "kbchat=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Ask {
            query,
            sources,
            no_stream,
            session,
        } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_ask(&config, &query, sources, !no_stream, session).await
        }
        Command::Context { query, sources } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_context(&config, &query, sources).await
        }
        Command::Sources => cmd_sources(&resolve_config(config_path.as_ref())?),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&resolve_config(config_path.as_ref())?),
            ConfigAction::Placeholders => cmd_config_placeholders(),
        },
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Wire the HTTP sources and the chat model into the default stages.
fn build_manager(
    config: &AppConfig,
    registry: SourceRegistry,
    api_key: Option<String>,
) -> Result<EventManager> {
    let searcher = HttpSearchSource::new(
        registry,
        Duration::from_secs(config.pipeline.search_timeout_secs),
    )?;
    let model = OpenAiCompatChat::new(&config.model, api_key)?;
    Ok(default_event_manager(
        Arc::new(searcher),
        config.pipeline.max_sources,
        Arc::new(model),
    ))
}

/// Requested ids as given, or every configured id when none were requested.
/// Unknown ids are kept so the search reports them as missing configuration.
fn target_sources(registry: &SourceRegistry, requested: Vec<String>) -> Result<Vec<String>> {
    if !requested.is_empty() {
        let known = registry.configured(&requested);
        for id in requested.iter().filter(|id| !known.contains(&id.as_str())) {
            warn!(source_id = %id, "source is not configured");
        }
        return Ok(requested);
    }
    let all = registry.ids();
    if all.is_empty() {
        return Err(eyre!(
            "no knowledge sources configured. Add [[sources]] entries to your config or pass --source."
        ));
    }
    Ok(all)
}

/// A request context whose token is cancelled on Ctrl-C.
fn cancellable_request() -> RequestContext {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling request");
            on_signal.cancel();
        }
    });
    RequestContext::with_cancel(cancel)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config: &AppConfig,
    query: &str,
    sources: Vec<String>,
    stream: bool,
    session: Option<String>,
) -> Result<()> {
    // Validate API key before doing anything
    let api_key = validate_api_key(config)?;
    let registry = SourceRegistry::from_config(&config.sources);
    let sources = target_sources(&registry, sources)?;
    let manager = build_manager(config, registry, Some(api_key))?;

    let ctx = cancellable_request();
    let session_id = session.unwrap_or_else(|| ctx.request_id.clone());
    let mut chat = ChatManage::from_config(config, session_id, query, sources);

    info!(
        session_id = %chat.session_id,
        sources = chat.knowledge_source_ids.len(),
        stream,
        "asking"
    );

    let reporter = CliProgress::new()?;

    if !stream {
        run_pipeline(&manager, PipelineKind::Rag, &ctx, &mut chat, &reporter).await?;
        println!("{}", chat.answer().unwrap_or_default());
        print_source_warnings(&chat);
        return Ok(());
    }

    let (tx, rx) = mpsc::channel(64);
    chat = chat.with_stream_sink(tx);
    let printer = tokio::spawn(print_stream(rx));

    let result = run_pipeline(&manager, PipelineKind::RagStream, &ctx, &mut chat, &reporter).await;
    // Dropping the sink ends the printer.
    chat.stream_sink = None;
    printer.await?;

    result?;
    print_source_warnings(&chat);
    Ok(())
}

async fn print_stream(mut rx: mpsc::Receiver<StreamEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Answer(text) => {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
            StreamEvent::ToolCall(call) => {
                info!(tool = %call.name, "model requested a tool call");
            }
            StreamEvent::Error(message) => {
                eprintln!("\nstream error: {message}");
            }
            StreamEvent::Done { .. } => {
                let _ = writeln!(stdout);
            }
        }
    }
}

fn print_source_warnings(chat: &ChatManage) {
    for error in &chat.source_errors {
        eprintln!("warning: {error}");
    }
}

async fn cmd_context(config: &AppConfig, query: &str, sources: Vec<String>) -> Result<()> {
    let registry = SourceRegistry::from_config(&config.sources);
    let sources = target_sources(&registry, sources)?;
    let manager = build_manager(config, registry, None)?;

    let ctx = cancellable_request();
    let mut chat = ChatManage::from_config(config, ctx.request_id.clone(), query, sources);

    let reporter = CliProgress::new()?;
    run_pipeline(&manager, PipelineKind::ContextOnly, &ctx, &mut chat, &reporter).await?;

    println!(
        "{}",
        render_retrieval_report(&chat.query, &chat.merge_result, &chat.source_errors)
    );
    println!("=== Prompt ===");
    println!("{}", chat.user_content);
    Ok(())
}

fn cmd_sources(config: &AppConfig) -> Result<()> {
    let registry = SourceRegistry::from_config(&config.sources);
    if registry.is_empty() {
        println!("No knowledge sources configured.");
        return Ok(());
    }
    for source in registry.iter() {
        println!(
            "  {:<20} {:<30} {}",
            source.id,
            source.display_name(),
            source.endpoint
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn cmd_config_placeholders() -> Result<()> {
    for field in PromptField::ALL {
        println!("{}:", field.config_key());
        for placeholder in placeholders_for(field) {
            println!(
                "  {:<18} {:<20} {}",
                placeholder.name, placeholder.label, placeholder.description
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, event: EventType) {
        match event {
            EventType::ChunkSearch => self.spinner.set_message("Searching knowledge sources"),
            EventType::ChunkMerge => self.spinner.set_message("Merging results"),
            EventType::FilterTopK => self.spinner.set_message("Selecting top results"),
            EventType::IntoChatMessage => self.spinner.set_message("Assembling prompt"),
            EventType::ChatCompletion => self.spinner.set_message("Waiting for the model"),
            // Streamed tokens go to stdout from here on.
            EventType::ChatCompletionStream => self.spinner.finish_and_clear(),
        }
    }

    fn done(&self, _summary: &PipelineSummary) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
