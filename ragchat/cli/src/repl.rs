//! Interactive chat loop and the shared turn renderer

use std::future::Future;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use ragchat_core::config::parse_domain_list;
use ragchat_core::{ChatSession, DomainId, QueryBackend, SessionPhase, StreamEvent, SubmitRejected};

use crate::render;

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    /// Blank line
    Empty,
    /// A question to submit
    Question(String),
    /// A slash command
    Command(SlashCommand),
}

/// Chat commands
#[derive(Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Use(Vec<DomainId>),
    Add(DomainId),
    Drop(DomainId),
    Domains,
    History,
    Clear,
    Help,
    Quit,
    /// Unrecognized or missing its argument
    Invalid(String),
}

/// Classify a raw input line
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Input::Question(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match (name, arg) {
        ("use", "") | ("add", "") | ("drop", "") => {
            SlashCommand::Invalid(format!("/{name} needs a domain name"))
        }
        ("use", list) => SlashCommand::Use(parse_domain_list(list)),
        ("add", domain) => SlashCommand::Add(DomainId::from(domain)),
        ("drop", domain) => SlashCommand::Drop(DomainId::from(domain)),
        ("domains", _) => SlashCommand::Domains,
        ("history", _) => SlashCommand::History,
        ("clear", _) => SlashCommand::Clear,
        ("help", _) => SlashCommand::Help,
        ("quit" | "exit", _) => SlashCommand::Quit,
        _ => SlashCommand::Invalid(format!("Unknown command /{name}, try /help")),
    };
    Input::Command(command)
}

/// How a streamed turn ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The answer was added to history
    Answered,
    /// The server or the transport failed; see `last_error`
    Failed,
    /// The user interrupted; the conversation was cleared
    Interrupted,
}

/// Drive the session's active turn, echoing tokens to `out` as they arrive
///
/// Prints the citation block after a completed answer. When `interrupt`
/// resolves first the turn is abandoned through [`ChatSession::clear`].
pub async fn stream_turn<B, W, I>(
    session: &mut ChatSession<B>,
    out: &mut W,
    interrupt: I,
) -> Result<TurnOutcome>
where
    B: QueryBackend,
    W: AsyncWrite + Unpin,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);

    loop {
        let next = tokio::select! {
            event = session.next_event() => Some(event),
            () = &mut interrupt => None,
        };
        match next {
            Some(Some(StreamEvent::Token(text))) => {
                out.write_all(text.as_bytes()).await?;
                out.flush().await?;
            }
            Some(Some(_)) => {}
            Some(None) => break,
            None => {
                session.clear();
                write_str(out, "\ninterrupted, conversation cleared\n").await?;
                return Ok(TurnOutcome::Interrupted);
            }
        }
    }

    out.write_all(b"\n").await?;
    let outcome = if session.phase() == SessionPhase::Error {
        let message = session.last_error().unwrap_or("unknown error");
        out.write_all(format!("error: {message}\n").as_bytes()).await?;
        TurnOutcome::Failed
    } else {
        if let Some(answer) = session.history().last() {
            let sources = render::format_sources(answer.sources.as_deref().unwrap_or_default());
            out.write_all(sources.as_bytes()).await?;
        }
        TurnOutcome::Answered
    };
    out.flush().await?;
    Ok(outcome)
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}

/// Run the interactive loop until `/quit`, end of input or Ctrl-C
pub async fn run_chat<B: QueryBackend>(session: &mut ChatSession<B>) -> Result<()> {
    let mut out = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    write_str(
        &mut out,
        &format!(
            "Connected via {}. Domains: {}. /help for commands.\n",
            session.backend().name(),
            render::format_selection(session.selected_domains())
        ),
    )
    .await?;

    loop {
        write_str(&mut out, "> ").await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            () = ctrl_c() => None,
        };
        let Some(line) = line else {
            write_str(&mut out, "\n").await?;
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Question(question) => match session.submit(&question).await {
                Ok(_) => {
                    stream_turn(session, &mut out, ctrl_c()).await?;
                }
                Err(SubmitRejected::NoDomainSelected) => {
                    write_str(&mut out, "Select a domain first, e.g. /use legal\n").await?;
                }
                Err(rejected) => {
                    write_str(&mut out, &format!("{rejected}\n")).await?;
                }
            },
            Input::Command(SlashCommand::Quit) => break,
            Input::Command(command) => handle_command(session, command, &mut out).await?,
        }
    }

    Ok(())
}

async fn handle_command<B, W>(
    session: &mut ChatSession<B>,
    command: SlashCommand,
    out: &mut W,
) -> Result<()>
where
    B: QueryBackend,
    W: AsyncWrite + Unpin,
{
    let text = match command {
        SlashCommand::Use(domains) => {
            session.set_selected_domains(domains);
            format!(
                "Selected: {}\n",
                render::format_selection(session.selected_domains())
            )
        }
        SlashCommand::Add(domain) => {
            let known = session.backend().has_domain(&domain).await.unwrap_or(true);
            let mut text = if known {
                String::new()
            } else {
                format!("note: the server does not list '{domain}'\n")
            };
            session.select_domain(domain);
            text.push_str(&format!(
                "Selected: {}\n",
                render::format_selection(session.selected_domains())
            ));
            text
        }
        SlashCommand::Drop(domain) => {
            session.deselect_domain(&domain);
            format!(
                "Selected: {}\n",
                render::format_selection(session.selected_domains())
            )
        }
        SlashCommand::Domains => {
            let mut text = format!(
                "Selected: {}\n",
                render::format_selection(session.selected_domains())
            );
            match session.backend().list_domains().await {
                Ok(domains) => text.push_str(&render::format_domains(&domains)),
                Err(e) => text.push_str(&format!("Could not list domains: {e}\n")),
            }
            text
        }
        SlashCommand::History => render::format_history(session.history()),
        SlashCommand::Clear => {
            session.clear();
            "Conversation cleared.\n".to_string()
        }
        SlashCommand::Help => format!("{}\n", render::CHAT_HELP),
        SlashCommand::Invalid(message) => format!("{message}\n"),
        SlashCommand::Quit => String::new(),
    };
    write_str(out, &text).await
}

async fn write_str<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
