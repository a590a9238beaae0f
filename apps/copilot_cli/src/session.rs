//! Interactive chat session on stdin.
//!
//! Plain lines are chat utterances; lines starting with `/` edit controls or
//! run ingestion. Turns run in the background so controls stay editable while
//! an answer is pending.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use client_core::{
    ChatPhase, ClientEvent, CopilotClient, FileBlob, IngestKind, SubmitOutcome, SubmitRejection,
};
use shared::{domain::Role, domain::SourceType};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::render::{format_ingest_outcome, format_message, format_sources};

const HELP: &str = "\
commands:
  /filter <all|file|url|mcp-github>   restrict retrieval to one source type
  /topk <n>                           passages to retrieve (1-10)
  /mcp <on|off>                       sync the MCP mirror before answering
  /files <path>...                    upload and embed files
  /urls <url>[, <url>...]             ingest web pages
  /sources                            list indexed sources
  /quit                               leave the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Say(String),
    Filter(Option<SourceType>),
    TopK(i64),
    Mcp(bool),
    Files(Vec<PathBuf>),
    Urls(String),
    Sources,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<SessionCommand, String> {
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(SessionCommand::Say(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest.trim(), ""),
    };

    match name {
        "filter" => Ok(SessionCommand::Filter(SourceType::parse_filter(arg))),
        "topk" => arg
            .parse::<i64>()
            .map(SessionCommand::TopK)
            .map_err(|_| format!("not a number: {arg}")),
        "mcp" => match arg {
            "on" | "true" | "1" => Ok(SessionCommand::Mcp(true)),
            "off" | "false" | "0" => Ok(SessionCommand::Mcp(false)),
            other => Err(format!("expected on/off, got: {other}")),
        },
        "files" if arg.is_empty() => Err("usage: /files <path>...".to_string()),
        "files" => Ok(SessionCommand::Files(
            arg.split_whitespace().map(PathBuf::from).collect(),
        )),
        "urls" => Ok(SessionCommand::Urls(arg.to_string())),
        "sources" => Ok(SessionCommand::Sources),
        "help" => Ok(SessionCommand::Help),
        "quit" | "exit" => Ok(SessionCommand::Quit),
        other => Err(format!("unknown command /{other}; try /help")),
    }
}

/// Reads every path into memory, guessing the MIME type from the extension.
pub async fn read_file_blobs(paths: &[PathBuf]) -> Result<Vec<FileBlob>> {
    let mut blobs = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        blobs.push(FileBlob {
            file_name,
            mime_type,
            bytes,
        });
    }
    Ok(blobs)
}

pub async fn run(client: Arc<CopilotClient>) -> Result<()> {
    let printer = tokio::spawn(print_events(client.clone()));

    client.bootstrap().await;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            SessionCommand::Say(text) if text.trim().is_empty() => {}
            SessionCommand::Say(text) => {
                spawn_turn(client.clone(), text);
            }
            SessionCommand::Filter(filter) => client.set_source_filter(filter).await,
            SessionCommand::TopK(top_k) => client.set_top_k(top_k).await,
            SessionCommand::Mcp(enabled) => client.set_enable_mcp(enabled).await,
            SessionCommand::Files(paths) => match read_file_blobs(&paths).await {
                Ok(blobs) => {
                    client.select_files(blobs).await;
                    let outcome = client.ingest_selected_files().await;
                    println!("{}", format_ingest_outcome(IngestKind::Files, outcome));
                }
                Err(err) => println!("{err:#}"),
            },
            SessionCommand::Urls(text) => {
                client.set_url_input(text).await;
                let outcome = client.ingest_url_input().await;
                println!("{}", format_ingest_outcome(IngestKind::Urls, outcome));
            }
            SessionCommand::Sources => {
                let state = client.snapshot().await;
                println!("{}", format_sources(state.registry.items()));
            }
            SessionCommand::Help => println!("{HELP}"),
            SessionCommand::Quit => break,
        }
    }

    printer.abort();
    Ok(())
}

/// Sends `text` as one turn in the background and reports rejections.
///
/// The text travels with the task, so a line typed before an earlier task
/// reaches the client cannot replace it.
fn spawn_turn(client: Arc<CopilotClient>, text: String) -> JoinHandle<SubmitOutcome> {
    tokio::spawn(async move {
        let outcome = client.send_message(text).await;
        match outcome {
            SubmitOutcome::Rejected(SubmitRejection::Busy) => {
                println!("still waiting for the previous answer");
            }
            SubmitOutcome::Rejected(SubmitRejection::Blank) => println!("nothing to send"),
            SubmitOutcome::Rejected(SubmitRejection::TopKOutOfRange(top_k)) => {
                println!("top k {top_k} is outside 1-10; change it with /topk");
            }
            SubmitOutcome::Answered | SubmitOutcome::Failed => {
                debug!(?outcome, "turn finished");
            }
        }
        outcome
    })
}

/// Next event for the printer, skipping over any the receiver lagged behind on.
async fn next_event(events: &mut broadcast::Receiver<ClientEvent>) -> Option<ClientEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer fell behind"),
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn print_events(client: Arc<CopilotClient>) {
    let mut events = client.subscribe_events();
    while let Some(event) = next_event(&mut events).await {
        match event {
            ClientEvent::MessageAppended(message) if message.role == Role::Assistant => {
                println!("{}", format_message(&message));
            }
            ClientEvent::PhaseChanged(ChatPhase::AwaitingAnswer) => println!("Thinking..."),
            ClientEvent::SourcesRefreshed(items) => {
                println!("{} indexed sources", items.len());
            }
            _ => {}
        }
    }
}
