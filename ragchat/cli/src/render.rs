//! Plain-text rendering for terminal output
//!
//! Pure functions only; callers decide where the text goes.

use std::fmt::Write;

use unicode_width::UnicodeWidthStr;

use ragchat_core::{ChatMessage, DocumentInfo, DomainId, DomainInfo, MessageRole, SourceChunk};

/// Longest excerpt shown under a citation
const EXCERPT_CHARS: usize = 100;

/// Column at which citation excerpts wrap
const WRAP_COLUMNS: usize = 78;

/// Help text for the interactive chat
pub const CHAT_HELP: &str = "\
Type a question and press Enter. Commands:
  /use a,b      select exactly these domains
  /add NAME     add a domain to the selection
  /drop NAME    remove a domain from the selection
  /domains      show the selection and the server's domains
  /history      show this conversation
  /clear        forget the conversation
  /help         show this help
  /quit         leave";

/// One citation line: `[1] lease.pdf, p. 12 (0.87)`
pub fn format_source(index: usize, source: &SourceChunk) -> String {
    let mut line = format!("[{index}] {}", source.filename);
    if let Some(ref page) = source.page_label {
        let _ = write!(line, ", p. {page}");
    }
    if let Some(score) = source.score {
        let _ = write!(line, " ({score:.2})");
    }
    line
}

/// Citation block printed under an answer; empty when there are none
pub fn format_sources(sources: &[SourceChunk]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let mut out = String::from("Sources:\n");
    for (i, source) in sources.iter().enumerate() {
        let _ = writeln!(out, "  {}", format_source(i + 1, source));
        let snippet = excerpt(&source.text, EXCERPT_CHARS);
        if !snippet.is_empty() {
            let options = textwrap::Options::new(WRAP_COLUMNS)
                .initial_indent("      \"")
                .subsequent_indent("       ");
            let _ = writeln!(out, "{}", textwrap::fill(&format!("{snippet}\""), options));
        }
    }
    out
}

/// Collapse whitespace and cut to `max_chars`, marking the cut with an ellipsis
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

/// Domain listing as an aligned table
pub fn format_domains(domains: &[DomainInfo]) -> String {
    if domains.is_empty() {
        return "No domains yet.\n".to_string();
    }
    let width = domains
        .iter()
        .map(|d| d.name.width())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!("{}  {:>5}  {:<10}  DESCRIPTION\n", pad("NAME", width), "DOCS", "CREATED");
    for domain in domains {
        let created = domain.created_at.get(..10).unwrap_or(&domain.created_at);
        let _ = writeln!(
            out,
            "{}  {:>5}  {:<10}  {}",
            pad(&domain.name, width),
            domain.doc_count,
            created,
            domain.description
        );
    }
    out
}

/// Document listing as an aligned table
pub fn format_documents(domain: &DomainId, documents: &[DocumentInfo]) -> String {
    if documents.is_empty() {
        return format!("No documents in '{domain}'.\n");
    }
    let width = documents
        .iter()
        .map(|d| d.filename.width())
        .max()
        .unwrap_or(0)
        .max("FILENAME".len());

    let mut out = format!("{}  {:>6}  ID\n", pad("FILENAME", width), "CHUNKS");
    for doc in documents {
        let _ = writeln!(
            out,
            "{}  {:>6}  {}",
            pad(&doc.filename, width),
            doc.num_chunks,
            doc.doc_id
        );
    }
    out
}

/// Left-align `text` in a column `width` terminal cells wide
fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

/// Conversation transcript
pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "(no messages)\n".to_string();
    }
    let mut out = String::new();
    for message in history {
        match message.role {
            MessageRole::User => {
                let _ = writeln!(out, "you> {}", message.content);
            }
            MessageRole::Assistant => {
                let _ = write!(out, "{}", message.content);
                match message.source_count() {
                    0 => out.push('\n'),
                    1 => out.push_str("  [1 source]\n"),
                    n => {
                        let _ = writeln!(out, "  [{n} sources]");
                    }
                }
            }
        }
    }
    out
}

/// Current selection, comma separated
pub fn format_selection(domains: &[DomainId]) -> String {
    if domains.is_empty() {
        return "(none)".to_string();
    }
    domains
        .iter()
        .map(DomainId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
