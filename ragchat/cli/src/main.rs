//! ragchat - Terminal Client for a Domain RAG Service
//!
//! Ask questions against one or more knowledge domains and watch the answer
//! stream in, with its source citations listed underneath.
//!
//! # Usage
//!
//! ```bash
//! # One question against one domain
//! ragchat -d legal ask "When does the lease end?"
//!
//! # Several domains, interactive
//! ragchat -d legal -d finance chat
//!
//! # Catalog
//! ragchat domains
//! ragchat documents legal
//!
//! # Another server, verbose logging on stderr
//! ragchat --base-url http://rag.internal:8000 --log-level debug health
//! ```

mod render;
mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::info;

use ragchat_core::config::{self, ConfigOverrides};
use ragchat_core::{ChatSession, DomainId, HttpBackend, QueryBackend, QueryRequest, SubmitRejected};

use repl::TurnOutcome;

/// ragchat - Streaming client for a multi-domain RAG service
#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "RAGCHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base URL of the RAG service
    #[arg(short = 'u', long, value_name = "URL")]
    base_url: Option<String>,

    /// Domain to query (repeat or comma separate for several)
    #[arg(short = 'd', long = "domain", value_name = "DOMAIN", value_delimiter = ',')]
    domains: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "RAGCHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question and print the answer
    Ask {
        /// The question (words are joined with spaces)
        #[arg(required = true)]
        question: Vec<String>,

        /// Wait for the complete answer instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// Print the complete answer as JSON (implies --no-stream)
        #[arg(long)]
        json: bool,
    },
    /// Interactive chat
    Chat,
    /// List domains
    Domains {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the documents in a domain
    Documents {
        /// Domain name
        domain: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check that the service is reachable
    Health,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so stdout only carries answers.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("ragchat={level},ragchat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: file, then environment, then flags
fn resolve_config(args: &Args) -> Result<config::ClientConfig> {
    let mut cfg = match args.config {
        Some(ref path) => config::load_config_from_path(Some(path.clone())),
        None => config::load_config(),
    }
    .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.base_url {
        overrides = overrides.with_base_url(url.clone());
    }
    if !args.domains.is_empty() {
        overrides = overrides.with_domains(config::parse_domain_list(&args.domains.join(",")));
    }
    overrides.apply(&mut cfg);

    cfg.validate().context("Invalid configuration")?;

    info!(
        base_url = %cfg.base_url,
        source = %cfg.source(),
        domains = ?cfg.default_domains,
        "Configuration resolved"
    );
    Ok(cfg)
}

async fn print(text: &str) -> Result<()> {
    let mut out = tokio::io::stdout();
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn ask(
    backend: HttpBackend,
    domains: Vec<DomainId>,
    question: &str,
    stream: bool,
    json: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!(SubmitRejected::EmptyQuestion);
    }

    if !stream || json {
        let request = QueryRequest::new(question, domains);
        let answer = backend
            .query(&request)
            .await
            .context("Query failed")?;
        if json {
            print(&format!("{}\n", serde_json::to_string_pretty(&answer)?)).await?;
        } else {
            print(&format!(
                "{}\n{}",
                answer.answer,
                render::format_sources(&answer.sources)
            ))
            .await?;
        }
        return Ok(());
    }

    let mut session = ChatSession::new(backend);
    session.set_selected_domains(domains);
    session
        .submit(question)
        .await
        .context("Question not accepted")?;

    let mut out = tokio::io::stdout();
    match repl::stream_turn(&mut session, &mut out, repl::ctrl_c()).await? {
        TurnOutcome::Answered => Ok(()),
        TurnOutcome::Failed => anyhow::bail!(
            "Answer failed: {}",
            session.last_error().unwrap_or("unknown error")
        ),
        TurnOutcome::Interrupted => anyhow::bail!("Interrupted"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let cfg = resolve_config(&args)?;
    let backend = HttpBackend::from_config(&cfg).context("Failed to create HTTP client")?;

    match args.command {
        Command::Ask {
            ref question,
            no_stream,
            json,
        } => {
            ask(
                backend,
                cfg.default_domains.clone(),
                &question.join(" "),
                !no_stream,
                json,
            )
            .await
        }
        Command::Chat => {
            let mut session = ChatSession::new(backend);
            session.set_selected_domains(cfg.default_domains.clone());
            repl::run_chat(&mut session).await
        }
        Command::Domains { json } => {
            let domains = backend
                .list_domains()
                .await
                .context("Failed to list domains")?;
            if json {
                print(&format!("{}\n", serde_json::to_string_pretty(&domains)?)).await
            } else {
                print(&render::format_domains(&domains)).await
            }
        }
        Command::Documents { ref domain, json } => {
            let domain = DomainId::from(domain.trim());
            let documents = backend
                .list_documents(&domain)
                .await
                .with_context(|| format!("Failed to list documents in '{domain}'"))?;
            if json {
                print(&format!("{}\n", serde_json::to_string_pretty(&documents)?)).await
            } else {
                print(&render::format_documents(&domain, &documents)).await
            }
        }
        Command::Health => {
            if backend.health_check().await {
                print(&format!("ok: {}\n", cfg.base_url)).await
            } else {
                anyhow::bail!("Server at {} is not reachable", cfg.base_url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_domains_and_command() {
        let args = Args::try_parse_from([
            "ragchat", "-d", "legal,finance", "-d", "hr", "ask", "what", "is", "due?",
        ])
        .unwrap();
        assert_eq!(args.domains, vec!["legal", "finance", "hr"]);
        let Command::Ask { question, no_stream, json } = args.command else {
            panic!("expected ask");
        };
        assert_eq!(question.join(" "), "what is due?");
        assert!(!no_stream);
        assert!(!json);
    }

    #[test]
    fn test_ask_requires_question() {
        assert!(Args::try_parse_from(["ragchat", "ask"]).is_err());
    }

    #[test]
    fn test_documents_takes_domain() {
        let args = Args::try_parse_from(["ragchat", "documents", "legal", "--json"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Documents { ref domain, json: true } if domain == "legal"
        ));
    }

    #[tokio::test]
    async fn test_blank_question_never_dispatches() {
        let backend = HttpBackend::new(
            "http://127.0.0.1:9",
            std::time::Duration::from_millis(100),
            std::time::Duration::from_millis(100),
            4,
        )
        .unwrap();
        for stream in [true, false] {
            let err = ask(backend.clone(), vec![DomainId::from("legal")], "  ", stream, false)
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Question is empty");
        }
    }

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
