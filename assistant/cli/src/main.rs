//! QuickPlan - Command-Line Assistant Client
//!
//! Talks to the QuickPlan assistant service: chat with streamed replies,
//! turn a photo of a note into a schedule request, browse and delete stored
//! conversations and summarize upcoming schedules by urgency.
//!
//! # Usage
//!
//! ```bash
//! # Ask the assistant to plan something
//! quickplan chat Buy milk tomorrow
//!
//! # Continue a stored conversation
//! quickplan chat --session 42 And eggs too
//!
//! # Scan a note with Tesseract and schedule what it says
//! quickplan scan ~/Pictures/note.png
//!
//! # Conversations
//! quickplan conversations
//! quickplan history 42
//! quickplan delete 42
//!
//! # Schedule urgency for a date range
//! quickplan urgency --from 2026-10-01 --to 2026-12-31
//!
//! # Verbose logging
//! RUST_LOG=debug quickplan chat hello
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl+C): cancel the streaming reply; the partial text is kept

mod printer;

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use assistant_core::{
    load_config_from_path, parse_schedules, user_notice, AppState, AssistantApi, ChatService,
    ChatSettings, ChatState, CommandRecognizer, ConfigOverrides, HttpAssistantApi, ImageSource,
    MessageRole, SendOutcome, UrgencySummary, UserProfile,
};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use printer::ReplyPrinter;

/// QuickPlan - plan your days by chatting with an assistant
#[derive(Parser, Debug)]
#[command(name = "quickplan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, env = "QUICKPLAN_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Assistant service base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// User to act as
    #[arg(short = 'u', long, value_name = "ID")]
    user_id: Option<String>,

    /// Seconds a reply stream may stay silent
    #[arg(long, value_name = "SECS")]
    read_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "QUICKPLAN_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the reply
    Chat {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Continue a stored conversation
        #[arg(short = 's', long, value_name = "ID")]
        session: Option<String>,
    },

    /// Recognize the text in an image and ask for a schedule
    Scan {
        /// Image file
        image: PathBuf,

        /// OCR program
        #[arg(long, default_value = "tesseract", value_name = "PROGRAM")]
        ocr_program: String,

        /// OCR program argument, `{image}` marks the image (repeatable)
        #[arg(long = "ocr-arg", value_name = "ARG", allow_hyphen_values = true)]
        ocr_args: Vec<String>,
    },

    /// List stored conversations
    Conversations,

    /// Print the messages of a stored conversation
    History {
        /// Conversation ID
        id: String,
    },

    /// Delete a stored conversation
    Delete {
        /// Conversation ID
        id: String,
    },

    /// Count schedules per urgency window
    Urgency {
        /// First day to include (defaults to all schedules)
        #[arg(long, value_name = "YYYY-MM-DD", requires = "to")]
        from: Option<NaiveDate>,

        /// Last day to include
        #[arg(long, value_name = "YYYY-MM-DD", requires = "from")]
        to: Option<NaiveDate>,
    },
}

/// Initialize logging to stderr so replies on stdout stay clean
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("assistant_core={level},quickplan={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = load_config_from_path(cli.config.clone()).context("Failed to load configuration")?;
    let overrides = ConfigOverrides {
        base_url: cli.base_url.clone(),
        user_id: cli.user_id.clone(),
        read_timeout_secs: cli.read_timeout,
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    info!(
        base_url = %config.base_url,
        user = %config.user_id,
        source = %config.source(),
        "Configuration loaded"
    );

    let app = AppState::new();
    app.sign_in(UserProfile::new(config.user_id.clone()));

    let api = Arc::new(
        HttpAssistantApi::from_config(&config).context("Failed to build the HTTP client")?,
    );
    let service = Arc::new(ChatService::new(
        Arc::clone(&api),
        Arc::clone(app.chat()),
        ChatSettings::from_config(&config),
    ));

    match cli.command {
        Command::Chat { message, session } => chat(&service, &message.join(" "), session).await,
        Command::Scan {
            image,
            ocr_program,
            ocr_args,
        } => {
            let mut recognizer = CommandRecognizer::new(ocr_program);
            if !ocr_args.is_empty() {
                recognizer = recognizer.with_args(ocr_args);
            }
            scan(&service, &recognizer, image).await
        }
        Command::Conversations => conversations(&service).await,
        Command::History { id } => history(&service, &id).await,
        Command::Delete { id } => {
            service.sessions().delete_conversation(&id).await?;
            println!("Deleted conversation {id}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Urgency { from, to } => urgency(api.as_ref(), &config.user_id, from.zip(to)).await,
    }
}

// ============================================
// Commands
// ============================================

async fn chat(
    service: &Arc<ChatService<HttpAssistantApi>>,
    message: &str,
    session: Option<String>,
) -> Result<ExitCode> {
    if let Some(id) = session {
        service
            .sessions()
            .load_conversation(&id)
            .await
            .with_context(|| format!("Failed to open conversation {id}"))?;
    }

    let handle = service.spawn_send(message);
    let control = handle.control();
    let outcome = follow(service.state(), handle.outcome(), move || {
        control.cancel();
    })
    .await?;
    Ok(exit_code(report(&outcome)))
}

async fn scan(
    service: &Arc<ChatService<HttpAssistantApi>>,
    recognizer: &CommandRecognizer,
    image: PathBuf,
) -> Result<ExitCode> {
    let is_file = tokio::fs::metadata(&image).await.is_ok_and(|m| m.is_file());
    if !is_file {
        anyhow::bail!("Image not found: {}", image.display());
    }
    let image = ImageSource::Path(image);
    let send = service.send_recognized_image(recognizer, &image);
    let outcome = follow(service.state(), send, || service.cancel_all()).await?;
    Ok(exit_code(report(&outcome)))
}

async fn conversations(service: &ChatService<HttpAssistantApi>) -> Result<ExitCode> {
    service.sessions().refresh_conversations().await?;
    let conversations = service.state().conversations();
    if conversations.is_empty() {
        println!("No conversations yet");
    }
    for conversation in conversations {
        println!(
            "{}\t{}\t{} messages",
            conversation.id, conversation.title, conversation.message_count
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn history(service: &ChatService<HttpAssistantApi>, id: &str) -> Result<ExitCode> {
    service.sessions().load_conversation(id).await?;
    for message in service.state().messages().iter() {
        let who = match message.role {
            MessageRole::User => "you",
            MessageRole::Assistant => "assistant",
        };
        println!("{who}: {}", message.content);
    }
    Ok(ExitCode::SUCCESS)
}

async fn urgency<A: AssistantApi>(
    api: &A,
    user_id: &str,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<ExitCode> {
    let dtos = match range {
        Some((from, to)) => api.schedules_in_range(user_id, from, to).await?,
        None => api.list_schedules(user_id).await?,
    };
    let schedules = parse_schedules(dtos);
    let summary = UrgencySummary::tally(&schedules, Local::now().naive_local());

    for (bucket, count) in summary.iter() {
        println!(
            "{:<16}{count:>4}  {:>5.1}%",
            bucket.label(),
            summary.proportion(bucket) * 100.0
        );
    }
    println!("{:<16}{:>4}", "Total", summary.total());
    Ok(ExitCode::SUCCESS)
}

// ============================================
// Streaming Output
// ============================================

/// Drive a send to completion, printing the reply as it streams
///
/// Ctrl+C calls `cancel`; the send then settles with its partial reply.
async fn follow<F>(state: &ChatState, send: F, cancel: impl Fn()) -> Result<SendOutcome>
where
    F: Future<Output = SendOutcome>,
{
    let mut updates = state.subscribe_messages();
    let mut printer = ReplyPrinter::new(tokio::io::stdout(), &state.messages());
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            changed = updates.changed() => {
                if changed.is_ok() {
                    let snapshot = updates.borrow_and_update().clone();
                    printer.show(&snapshot).await?;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                warn!("Cancelling reply");
                cancel();
            }
        }
    };

    printer.show(&state.messages()).await?;
    printer.finish().await?;
    Ok(outcome)
}

/// Print problems to stderr, returning whether the send succeeded
fn report(outcome: &SendOutcome) -> bool {
    match outcome {
        SendOutcome::Skipped => {
            eprintln!("Nothing to send");
            false
        }
        SendOutcome::Completed {
            warning: Some(warning),
            ..
        } => {
            eprintln!("{}", user_notice(warning));
            true
        }
        SendOutcome::Completed { .. } => true,
        SendOutcome::Failed { error, .. } => {
            eprintln!("{}", user_notice(error));
            false
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::{ChatError, MessageId};

    #[test]
    fn test_chat_joins_words() {
        let cli = Cli::try_parse_from(["quickplan", "chat", "Buy", "milk", "tomorrow"]).unwrap();
        match cli.command {
            Command::Chat { message, session } => {
                assert_eq!(message.join(" "), "Buy milk tomorrow");
                assert_eq!(session, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_urgency_range_needs_both_ends() {
        assert!(Cli::try_parse_from(["quickplan", "urgency", "--from", "2026-10-01"]).is_err());

        let cli = Cli::try_parse_from([
            "quickplan",
            "urgency",
            "--from",
            "2026-10-01",
            "--to",
            "2026-10-31",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Urgency {
                from: Some(_),
                to: Some(_)
            }
        ));
    }

    #[test]
    fn test_scan_ocr_args() {
        let cli = Cli::try_parse_from([
            "quickplan",
            "scan",
            "note.png",
            "--ocr-arg",
            "{image}",
            "--ocr-arg",
            "-",
        ])
        .unwrap();
        match cli.command {
            Command::Scan {
                ocr_program,
                ocr_args,
                ..
            } => {
                assert_eq!(ocr_program, "tesseract");
                assert_eq!(ocr_args, vec!["{image}".to_string(), "-".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_report_success() {
        let failed = SendOutcome::Failed {
            error: ChatError::Cancelled,
            message_id: None,
        };
        assert!(!report(&failed));
        assert!(!report(&SendOutcome::Skipped));

        let degraded = SendOutcome::Completed {
            message_id: MessageId::new(),
            content: String::new(),
            warning: Some(ChatError::EmptyResponse),
        };
        assert!(report(&degraded));
    }
}
