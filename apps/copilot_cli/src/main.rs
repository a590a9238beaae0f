mod render;
mod session;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    load_settings, CopilotClient, HttpBackend, IngestKind, IngestOutcome, SubmitOutcome,
};
use shared::domain::SourceType;
use tracing_subscriber::EnvFilter;

use crate::render::{format_ingest_outcome, format_message, format_sources};

#[derive(Parser, Debug)]
#[command(name = "copilot", about = "Terminal client for the knowledge copilot backend")]
struct Cli {
    /// Overrides `api_base` from copilot.toml and the environment.
    #[arg(long, global = true)]
    api_base: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Checks that the backend answers /health.
    Health,
    /// Lists indexed sources in the order the backend reports them.
    Sources {
        #[arg(long)]
        json: bool,
    },
    /// Uploads files for chunking and embedding.
    IngestFiles {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ingests URLs separated by commas or newlines.
    IngestUrls { text: String },
    /// Asks a single question and prints the answer with its citations.
    Ask {
        message: String,
        #[command(flatten)]
        controls: ControlArgs,
    },
    /// Interactive session on stdin.
    Chat {
        #[command(flatten)]
        controls: ControlArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ControlArgs {
    /// all, file, url or mcp-github.
    #[arg(long)]
    source_type: Option<String>,
    #[arg(long)]
    top_k: Option<i64>,
    /// Refresh the MCP GitHub mirror before answering.
    #[arg(long)]
    mcp: bool,
}

impl ControlArgs {
    async fn apply(&self, client: &CopilotClient) {
        if let Some(raw) = &self.source_type {
            client.set_source_filter(SourceType::parse_filter(raw)).await;
        }
        if let Some(top_k) = self.top_k {
            client.set_top_k(top_k).await;
        }
        client.set_enable_mcp(self.mcp).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(api_base) = cli.api_base {
        settings.api_base = api_base;
    }

    match cli.command {
        Command::Health => {
            let backend = HttpBackend::from_settings(&settings)?;
            let health = backend.health().await?;
            println!("{} {}", backend.base_url(), health.status);
        }
        Command::Sources { json } => {
            let client = CopilotClient::new(settings)?;
            client.refresh_sources().await?;
            let state = client.snapshot().await;
            if json {
                println!("{}", serde_json::to_string_pretty(state.registry.items())?);
            } else {
                println!("{}", format_sources(state.registry.items()));
            }
        }
        Command::IngestFiles { paths } => {
            let client = CopilotClient::new(settings)?;
            let blobs = session::read_file_blobs(&paths).await?;
            client.select_files(blobs).await;
            let outcome = client.ingest_selected_files().await;
            report_ingestion(&client, IngestKind::Files, outcome).await?;
        }
        Command::IngestUrls { text } => {
            let client = CopilotClient::new(settings)?;
            client.set_url_input(text).await;
            let outcome = client.ingest_url_input().await;
            report_ingestion(&client, IngestKind::Urls, outcome).await?;
        }
        Command::Ask { message, controls } => {
            let client = CopilotClient::new(settings)?;
            controls.apply(&client).await;
            let outcome = client.send_message(message).await;
            if let SubmitOutcome::Rejected(reason) = outcome {
                bail!("question not sent: {reason:?}");
            }
            if let Some(answer) = client.snapshot().await.conversation.last() {
                println!("{}", format_message(answer));
            }
            if outcome == SubmitOutcome::Failed {
                bail!("chat request failed");
            }
        }
        Command::Chat { controls } => {
            let client = CopilotClient::new(settings)?;
            controls.apply(&client).await;
            session::run(Arc::clone(&client)).await?;
        }
    }

    Ok(())
}

async fn report_ingestion(
    client: &CopilotClient,
    kind: IngestKind,
    outcome: IngestOutcome,
) -> Result<()> {
    println!("{}", format_ingest_outcome(kind, outcome));
    if outcome == IngestOutcome::Failed {
        bail!("ingestion failed");
    }
    println!("{}", format_sources(client.snapshot().await.registry.items()));
    Ok(())
}
