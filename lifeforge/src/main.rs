//! lifeforge - personal assistant CLI
//!
//! Runs chat turns through the LLM, creating calendar events and updating the
//! stored context, lists the events it proposed, and keeps a simple mood
//! journal.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use lifeforge_core::calendar::create_calendar;
use lifeforge_core::config::ChatMode;
use lifeforge_core::llm::create_llm_client;
use lifeforge_core::{
    ChatDeps, ChatRequest, ChatService, Config, Context, Database, NewJournalEntry,
};

#[derive(Parser)]
#[command(name = "lifeforge")]
#[command(about = "Personal assistant: chat, calendar events and context tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one message to the assistant
    Chat {
        /// Message text
        message: String,

        /// Print the HTML fragment instead of JSON
        #[arg(long)]
        html: bool,

        /// Override the configured mode: context, calendar or both
        #[arg(long)]
        mode: Option<ChatMode>,
    },

    /// Print the stored context as JSON
    Context {
        /// Context id (defaults to chat.context_id)
        #[arg(long)]
        id: Option<i64>,
    },

    /// List events the assistant proposed, newest first
    Events {
        /// Maximum number of events
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Mood journal
    Journal {
        #[command(subcommand)]
        command: JournalCommand,
    },
}

#[derive(Subcommand)]
enum JournalCommand {
    /// Add an entry
    Add {
        /// Entry text
        text: String,

        /// Mood score
        #[arg(long, default_value_t = 5)]
        mood: i32,
    },

    /// List the newest entries
    List {
        /// Maximum number of entries
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        lifeforge_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db = Database::open(&Config::database_path()).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    match cli.command {
        Command::Chat {
            message,
            html,
            mode,
        } => {
            if let Some(mode) = mode {
                config.chat.mode = mode;
            }
            run_chat(config, Arc::new(db), &message, html)
        }
        Command::Context { id } => {
            let id = id.unwrap_or(config.chat.context_id);
            let context = db.get_context(id)?.unwrap_or_else(|| Context::empty(id));
            println!("{}", serde_json::to_string_pretty(&context)?);
            Ok(())
        }
        Command::Events { limit, json } => run_events(&db, limit, json),
        Command::Journal { command } => run_journal(&db, command),
    }
}

fn run_events(db: &Database, limit: usize, json: bool) -> Result<()> {
    let events = db.list_events(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }
    if events.is_empty() {
        println!("No archived events.");
        return Ok(());
    }

    for archived in events {
        let start = archived
            .event
            .start_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unscheduled".to_string());
        println!(
            "{}  {:<16}  {}  [{}]",
            archived.recorded_at.format("%Y-%m-%d %H:%M"),
            start,
            archived.event.title,
            archived.external_id.as_deref().unwrap_or("not created")
        );
    }
    Ok(())
}

fn run_chat(config: Config, db: Arc<Database>, message: &str, html: bool) -> Result<()> {
    let llm_config = config
        .llm
        .as_ref()
        .context("no [llm] section in config; chat needs an LLM provider")?;
    let llm = create_llm_client(llm_config).context("failed to create LLM client")?;
    let calendar = create_calendar(&config.calendar).context("failed to create calendar")?;

    let service = ChatService::new(
        ChatDeps {
            llm: Arc::from(llm),
            contexts: db.clone(),
            calendar: Arc::from(calendar),
            archive: Some(db),
        },
        config.chat,
        config.calendar.preview_days,
    );

    let response = service.handle(&ChatRequest::json_text(message, html));
    if !response.is_success() {
        anyhow::bail!("chat failed ({}): {}", response.status, response.body);
    }

    println!("{}", response.body);
    Ok(())
}

fn run_journal(db: &Database, command: JournalCommand) -> Result<()> {
    match command {
        JournalCommand::Add { text, mood } => {
            let text = text.trim();
            if text.is_empty() {
                anyhow::bail!("journal entry text is empty");
            }
            let id = db.create_journal_entry(&NewJournalEntry {
                entry_text: text,
                mood_score: mood,
                created_at: Utc::now(),
            })?;
            tracing::info!(id, mood, "Journal entry created");
            println!("Created journal entry {}", id);
        }
        JournalCommand::List { limit, json } => {
            let entries = db.list_journal_entries(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No journal entries.");
            } else {
                for entry in entries {
                    println!(
                        "{}  mood {:>2}  {}",
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.mood_score,
                        entry.entry_text
                    );
                }
            }
        }
    }
    Ok(())
}
