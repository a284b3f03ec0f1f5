//! Canvas CLI - interactive driver for a copilot session.
//!
//! # Architecture
//!
//! The binary wires [`canvas_engine::SessionController`] to an
//! [`HttpTransport`](canvas_transport::HttpTransport) built from
//! `~/.canvas/config.toml`, and stands in for the editor UI:
//!
//! ```text
//! stdin line -> commands::parse -> SessionController
//!                                       |
//!            bridge subscriptions <-----+-----> ReplyPrinter -> stdout
//! ```
//!
//! # Event Loop
//!
//! One `select!` loop multiplexes stdin lines, session activity (stream events
//! and grace timers) and Ctrl-C. Input stays live while a reply streams, so
//! `/cancel` and `/status` work mid-stream.

mod commands;
mod render;

use anyhow::{Context, Result, bail};
use std::{
    fs::{self, OpenOptions},
    io::{Write, stdout},
    path::PathBuf,
    sync::Arc,
    sync::Mutex,
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use canvas_config::{BACKEND_URL_ENV, BackendConfig, CanvasConfig};
use canvas_engine::{SendOutcome, SendRejection, SessionController, SessionSettings, UiCommand};
use canvas_transport::{HttpTransport, TransportConfig, catalog, http_client_for};

use commands::{Command, HELP};
use render::ReplyPrinter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_canvas_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Without a log file, prefer no logs over interleaving them with replies.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_canvas_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in canvas_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn canvas_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.canvas/logs/canvas.log
    if let Some(config_path) = CanvasConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("canvas.log"));
    }

    // Fallback: ./.canvas/logs/canvas.log
    candidates.push(PathBuf::from(".canvas").join("logs").join("canvas.log"));

    candidates
}

/// Everything the driver needs besides the session itself.
struct Driver {
    session: SessionController,
    printer: ReplyPrinter,
    catalog_url: Option<String>,
}

enum Flow {
    Continue,
    Quit,
}

fn build_session(config: Option<&CanvasConfig>) -> Result<(SessionController, Option<String>)> {
    let fallback = BackendConfig::default();
    let backend = config
        .and_then(|c| c.backend.as_ref())
        .unwrap_or(&fallback);

    let Some(url) = backend.resolved_url() else {
        let path = CanvasConfig::path().map_or_else(
            || "~/.canvas/config.toml".to_string(),
            |p| p.display().to_string(),
        );
        bail!("no backend URL configured: set [backend] url in {path} or {BACKEND_URL_ENV}");
    };

    let transport_config = TransportConfig::new(url)
        .with_api_key(backend.resolved_api_key())
        .with_idle_timeout(backend.idle_timeout_secs.map(Duration::from_secs));
    tracing::info!(config = ?transport_config, "Creating transport");
    let transport = HttpTransport::new(transport_config).context("invalid backend configuration")?;

    let settings = SessionSettings::from_config(config.and_then(|c| c.session.as_ref()));
    let session = SessionController::new(Arc::new(transport), settings);
    Ok((session, backend.resolved_catalog_url()))
}

fn describe_command(command: &UiCommand) -> String {
    match command {
        UiCommand::StartBlockLoading { block_ids } | UiCommand::StopBlockLoading { block_ids } => {
            if block_ids.is_empty() {
                format!("{} (all blocks)", command.name())
            } else {
                format!("{} {}", command.name(), block_ids.join(", "))
            }
        }
        UiCommand::UpdateBlocks { blocks, selective } => {
            let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
            let scope = if *selective { "selective" } else { "full" };
            format!("{} [{scope}] {}", command.name(), ids.join(", "))
        }
        UiCommand::UpdateField { field, value } => format!("{} {field} = {value}", command.name()),
        UiCommand::Custom { name, fields } => {
            format!("{name} {}", serde_json::Value::Object(fields.clone()))
        }
    }
}

fn report_send(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Started(_) | SendOutcome::Rejected(SendRejection::EmptyMessage) => {}
        SendOutcome::Rejected(SendRejection::Busy) => {
            println!("(busy: wait for the reply or /cancel)");
        }
    }
}

impl Driver {
    async fn handle(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Send(text) => {
                let outcome = self.session.start_message(&text, None);
                report_send(outcome);
            }
            Command::Element { key, label } => {
                self.session.select_element(Some(&key), label.as_deref());
                println!("selected element {key}");
            }
            Command::Block(id) => {
                self.session.toggle_block(&id, None);
                let selected = self
                    .session
                    .selection()
                    .map(|s| s.block_ids().join(", "))
                    .unwrap_or_default();
                println!("selected blocks: [{selected}]");
            }
            Command::ClearSelection => {
                self.session.clear_selection();
                println!("selection cleared");
            }
            Command::Option { id, label } => match self.session.select_option(&id, &label) {
                Ok(applied) => println!("applied option {} to {}", applied.position, applied.element),
                Err(e) => println!("{e}"),
            },
            Command::Init { ad_id, account_id } => {
                let brief = self.fetch_brief(&ad_id).await;
                let outcome = self.session.start_initialize(ad_id, account_id, brief);
                report_send(outcome);
            }
            Command::Cancel => {
                if !self.session.cancel_stream() {
                    println!("nothing to cancel");
                }
            }
            Command::Reset => {
                self.session.reset_session();
                self.printer = ReplyPrinter::default();
                println!("session reset");
            }
            Command::Status => self.print_status(),
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Brief seed for `/init`, when a catalog is configured and reachable.
    async fn fetch_brief(&self, ad_id: &str) -> Option<serde_json::Value> {
        let base = self.catalog_url.as_deref()?;
        let client = match http_client_for(base) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(%e, "Catalog client unavailable");
                return None;
            }
        };
        match catalog::fetch_ad_detail(&client, base, ad_id).await {
            Ok(ad) => Some(ad.brief_data()),
            Err(e) => {
                println!("(could not load ad {ad_id}: {e:#})");
                tracing::warn!(error = %format!("{e:#}"), ad_id, "Ad lookup failed");
                None
            }
        }
    }

    fn print_status(&self) {
        let session = &self.session;
        println!("status:    {}", session.status());
        println!("thread:    {}", session.identity().thread_id());
        println!("session:   {}", session.identity().session_id());
        if let Some(ad) = &session.ad_context().audit_ad_id {
            println!("ad:        {ad}");
        }
        println!("messages:  {}", session.messages().len());
        match session.selection() {
            Some(selection) => println!("selection: {selection:?}"),
            None => println!("selection: none"),
        }
        let loading: Vec<&str> = session
            .loading_targets()
            .iter()
            .map(|target| target.as_str())
            .collect();
        println!("loading:   [{}]", loading.join(", "));
    }

    fn render(&mut self) {
        let mut out = stdout().lock();
        if let Err(e) = self.printer.render(&self.session, &mut out) {
            tracing::warn!(%e, "Failed to write reply");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = match CanvasConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {e}");
            tracing::warn!(path = %e.path().display(), "Ignoring unreadable config");
            None
        }
    };
    let (session, catalog_url) = build_session(config.as_ref())?;

    session
        .subscribe_commands(|command| println!("\n  [ui] {}", describe_command(command)))
        .detach();
    session
        .subscribe_applied_options(|applied| {
            println!("\n  [ui] {} <- {}", applied.element, applied.value);
        })
        .detach();

    let mut driver = Driver {
        session,
        printer: ReplyPrinter::default(),
        catalog_url,
    };

    println!("canvas copilot. Type a message, or /help.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        driver.render();
        let _ = stdout().flush();
        let settled = driver.session.is_settled();

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match commands::parse(&line) {
                    Ok(Some(command)) => {
                        if matches!(driver.handle(command).await?, Flow::Quit) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                }
            }
            _ = driver.session.wait_for_activity(), if !settled => {}
            _ = tokio::signal::ctrl_c() => {
                if !driver.session.cancel_stream() {
                    break;
                }
                println!("\n(cancelled)");
            }
        }
    }

    driver.session.reset_session();
    tracing::info!("Exiting");
    Ok(())
}
