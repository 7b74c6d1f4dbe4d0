//! Chat with Sunny or Bacchus in the terminal, and manage the surf
//! knowledge base.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::pin::pin;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use pier::core::TranscriptSource;
use pier::{Persona, Role, Session, SessionBuilder, Settings, is_exit_word};
use pier_openai_model::OpenAIProvider;
use pier_rag::DEFAULT_RESULTS;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Parser)]
#[command(version, about = "Sunny the surf forecaster and Bacchus the sommelier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask Sunny about the weather and the waves.
    Sunny {
        /// Let Sunny search the surf spots and gear knowledge base.
        #[arg(long)]
        knowledge: bool,
    },
    /// Ask Bacchus for wine pairings and prices.
    Bacchus,
    /// Index documents into the knowledge base.
    Ingest {
        /// `.txt`, `.md` or `.pdf` files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search the knowledge base without a model.
    Ask {
        /// What to look for.
        query: String,
        /// Number of passages.
        #[arg(short, default_value_t = DEFAULT_RESULTS)]
        n: usize,
    },
}

enum SessionEvent {
    Transcript(String, TranscriptSource),
}

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Command::Sunny { knowledge: false } => chat(&settings, Persona::Sunny).await,
        Command::Sunny { knowledge: true } => chat(&settings, Persona::SunnyKnowledge).await,
        Command::Bacchus => chat(&settings, Persona::Bacchus).await,
        Command::Ingest { files } => {
            let knowledge = settings.open_knowledge_base()?;
            for file in files {
                let chunks = knowledge
                    .ingest(&file)
                    .await
                    .with_context(|| format!("cannot index {}", file.display()))?;
                println!("{} : {chunks} morceaux indexés", file.display());
            }
            Ok(())
        }
        Command::Ask { query, n } => {
            let knowledge = settings.open_knowledge_base()?;
            println!("{}", knowledge.ask(&query, n).await?);
            Ok(())
        }
    }
}

async fn chat(settings: &Settings, persona: Persona) -> anyhow::Result<()> {
    let provider = OpenAIProvider::new(settings.provider_config(persona)?);

    let mut toolbox = settings.toolbox();
    if persona.needs_knowledge_base() {
        let knowledge = settings.open_knowledge_base()?;
        let indexed = knowledge.initialize(&settings.knowledge_files).await?;
        if indexed > 0 {
            info!("indexed {indexed} documents");
        }
        if knowledge.collection().count()? == 0 {
            warn!("the knowledge base is empty, set PIER_KNOWLEDGE or run `pier ingest`");
        }
        toolbox = toolbox.with_knowledge_base(knowledge);
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::new(persona, provider)
        .with_user_id(settings.user_id.clone())
        .with_toolbox(toolbox)
        .on_transcript(move |transcript, source| {
            event_tx
                .send(SessionEvent::Transcript(transcript.to_owned(), source))
                .ok();
        })
        .build()?;

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let [title, hint] = persona.banner();
    println!("{}", title.bright_white().bold());
    println!("{}\n", hint.dimmed());

    let mut stdin = BufReader::new(io::stdin()).lines();
    let name = persona.display_name();

    loop {
        print!("{}", "Toi : ".bright_green());
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_word(line) {
            println!("{} : {}", name.bright_cyan(), session.farewell());
            break;
        }
        match line {
            "/new" => {
                session.reset().await;
                println!("{}\n", "Nouvelle conversation.".dimmed());
                continue;
            }
            "/history" => {
                print_history(&session);
                continue;
            }
            _ => {}
        }

        let mut reply = pin!(session.send(line));
        let mut progress_bar = None;
        let mut streamed = String::new();

        let reply = loop {
            // The spinner stays away once the reply is being printed.
            if streamed.is_empty() {
                progress_bar
                    .get_or_insert_with(|| {
                        let progress_bar = ProgressBar::new_spinner();
                        progress_bar.set_style(progress_style.clone());
                        progress_bar.set_message("🤔 Réflexion...");
                        progress_bar
                    })
                    .inc(1);
            }

            let event = select! {
                reply = &mut reply => break reply,
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        continue;
                    };
                    event
                },
                _ = sleep(Duration::from_millis(100)) => {
                    continue;
                }
            };

            match event {
                SessionEvent::Transcript(tool, TranscriptSource::ToolCall) => {
                    if let Some(progress_bar) = &progress_bar {
                        progress_bar.set_message(format!("🔧 {tool}..."));
                    }
                }
                SessionEvent::Transcript(delta, TranscriptSource::Assistant) => {
                    // Finish the progress bar before printing anything else.
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    if streamed.is_empty() {
                        print!("{}{} : ", BAR_CHAR.bright_cyan(), name.bright_cyan());
                    }
                    print!("{}", delta.bright_white());
                    std::io::stdout().flush().ok();
                    streamed.push_str(&delta);
                }
            }
        };

        if let Some(progress_bar) = progress_bar.take() {
            progress_bar.finish_and_clear();
        }
        // Deltas sent right before the reply completed.
        while let Ok(SessionEvent::Transcript(delta, source)) = event_rx.try_recv() {
            if source == TranscriptSource::Assistant && !streamed.is_empty() {
                print!("{}", delta.bright_white());
                streamed.push_str(&delta);
            }
        }
        match streamed_remainder(&streamed, &reply) {
            Some(rest) if streamed.is_empty() => println!(
                "{}{} : {}\n",
                BAR_CHAR.bright_cyan(),
                name.bright_cyan(),
                rest.bright_white()
            ),
            Some(rest) => println!(
                "\n{}{} : {}\n",
                BAR_CHAR.bright_cyan(),
                name.bright_cyan(),
                rest.bright_white()
            ),
            None => println!("\n"),
        }
    }

    Ok(())
}

/// What is left to print of `reply` once `streamed` is on screen.
///
/// A turn streams every model round, so the reply is the tail of the
/// streamed text. Anything else, such as an error raised after a tool
/// round, is printed in full.
fn streamed_remainder<'a>(streamed: &str, reply: &'a str) -> Option<&'a str> {
    if !streamed.is_empty() && streamed.trim_end().ends_with(reply.trim_end()) {
        None
    } else {
        Some(reply)
    }
}

fn print_history(session: &Session) {
    if session.history().is_empty() {
        println!("{}\n", "Rien à afficher.".dimmed());
        return;
    }
    for entry in session.history() {
        match entry.role {
            Role::User => println!("{} {}", "Toi :".bright_green(), entry.content),
            Role::Assistant => println!(
                "{} {}",
                format!("{} :", session.persona().display_name()).bright_cyan(),
                entry.content
            ),
        }
    }
    println!();
}

async fn read_line(stdin: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match stdin.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streamed_remainder() {
        assert_eq!(streamed_remainder("", "Bonne session."), Some("Bonne session."));
        assert_eq!(streamed_remainder("", ""), Some(""));
        assert_eq!(streamed_remainder("Bonne session.", "Bonne session."), None);
        assert_eq!(streamed_remainder("Bonne session.\n", "Bonne session."), None);
        assert_eq!(
            streamed_remainder("Je regarde la houle... 1.5m à 12s.", "1.5m à 12s."),
            None
        );
        assert_eq!(
            streamed_remainder("Je regarde la houle...", "Erreur : model request timed out"),
            Some("Erreur : model request timed out")
        );
    }
}
