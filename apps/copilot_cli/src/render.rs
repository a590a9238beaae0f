//! Plain-text rendering of client state for the terminal.

use client_core::{IngestKind, IngestOutcome, Message};
use shared::{domain::Role, protocol::SourceItem};

const SNIPPET_PREVIEW_CHARS: usize = 160;

pub fn format_message(message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "You",
        Role::Assistant => "Copilot",
    };
    let mut out = format!("{speaker}: {}", message.content);
    for (idx, citation) in message.sources.iter().flatten().enumerate() {
        out.push_str(&format!(
            "\n  [{}] {} ({}): {}",
            idx + 1,
            citation.name,
            citation.source_type,
            preview(&citation.snippet)
        ));
    }
    out
}

pub fn format_sources(items: &[SourceItem]) -> String {
    if items.is_empty() {
        return "No sources ingested yet.".to_string();
    }
    items
        .iter()
        .map(|item| {
            format!(
                "{}\t{}\t{}",
                item.name,
                item.source_type,
                item.created_at.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_ingest_outcome(kind: IngestKind, outcome: IngestOutcome) -> String {
    let what = match kind {
        IngestKind::Files => "files",
        IngestKind::Urls => "urls",
    };
    match outcome {
        IngestOutcome::Skipped => format!("nothing to ingest ({what})"),
        IngestOutcome::Busy => format!("{what} ingestion already in progress"),
        IngestOutcome::Completed { inserted } => format!("ingested {inserted} {what}"),
        IngestOutcome::Failed => format!("{what} ingestion failed; see logs"),
    }
}

fn preview(snippet: &str) -> String {
    let flattened = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= SNIPPET_PREVIEW_CHARS {
        return flattened;
    }
    let cut: String = flattened.chars().take(SNIPPET_PREVIEW_CHARS).collect();
    format!("{cut}...")
}
