//! Interactive play loop: load a story, configure a provider, read
//! player actions, render engine events to the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use tw_domain::config::{GatewayConfig, ProviderKind};
use tw_domain::events::{EngineEvent, EventSink};
use tw_domain::story::Story;
use tw_engine::{SaveData, Session};

#[derive(Parser)]
#[command(name = "taleweave", about = "Play an LLM-driven interactive story")]
struct Args {
    /// Story YAML file.
    story: PathBuf,

    /// Provider configuration JSON file
    /// ({"provider":"anthropic","model":"...","api_key":"","cost_model":"..."}).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Provider, when no config file is given.
    #[arg(long, default_value = "anthropic")]
    provider: String,

    /// Director model, when no config file is given.
    #[arg(long)]
    model: Option<String>,

    /// Cheap model for classification and memory work.
    #[arg(long)]
    cost_model: Option<String>,
}

/// Renders engine events to stdout.
struct TerminalSink;

impl EventSink for TerminalSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::NarrativeEmitted { text } => println!("\n{text}\n"),
            EngineEvent::SystemEmitted { text } => println!("[{text}]"),
            EngineEvent::EndingGenerated { text } => println!("\n*** {text}\n"),
            EngineEvent::Error { message } => eprintln!("! {message}"),
            EngineEvent::TypingStarted | EngineEvent::TypingEnded => {}
        }
    }
}

fn resolve_gateway_config(args: &Args) -> anyhow::Result<Option<GatewayConfig>> {
    if let Some(path) = &args.config {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading provider config {}", path.display()))?;
        let config: GatewayConfig =
            serde_json::from_str(&raw).context("parsing provider config JSON")?;
        return Ok(Some(config));
    }

    let Some(model) = args.model.clone() else {
        return Ok(None);
    };
    let provider = match args.provider.as_str() {
        "anthropic" => ProviderKind::Anthropic,
        "openai" => ProviderKind::Openai,
        "google" => ProviderKind::Google,
        other => anyhow::bail!("unknown provider '{other}' (anthropic|openai|google)"),
    };
    Ok(Some(GatewayConfig {
        provider,
        model,
        api_key: String::new(), // resolved from the provider's env var
        cost_model: args.cost_model.clone(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let yaml = std::fs::read_to_string(&args.story)
        .with_context(|| format!("reading story {}", args.story.display()))?;
    let story = Story::from_yaml_str(&yaml).context("parsing story")?;
    if story.blurb.is_empty() {
        println!("{}", story.title);
    } else {
        println!("{}: {}", story.title, story.blurb);
    }

    let session = Session::new(story, Arc::new(TerminalSink));

    match resolve_gateway_config(&args)? {
        Some(config) => session
            .configure_provider(config)
            .context("configuring provider")?,
        None => eprintln!(
            "warning: no provider configured (pass --model or --config); \
             turns will fail until one is set"
        ),
    }

    println!("Type your actions. Commands: :save <file>, :load <file>, :quit\n");

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        if let Some(rest) = input.strip_prefix(':') {
            let mut parts = rest.splitn(2, ' ');
            match (parts.next(), parts.next()) {
                (Some("quit"), _) => break,
                (Some("save"), Some(path)) => {
                    let save = session.engine().save();
                    match save.to_json().and_then(|json| {
                        std::fs::write(path.trim(), json).map_err(Into::into)
                    }) {
                        Ok(()) => println!("[saved to {}]", path.trim()),
                        Err(e) => eprintln!("! save failed: {e}"),
                    }
                }
                (Some("load"), Some(path)) => match load_save(&session, path.trim()) {
                    Ok(()) => {}
                    Err(e) => eprintln!("! load failed: {e}"),
                },
                _ => eprintln!("! unknown command (:save <file>, :load <file>, :quit)"),
            }
            continue;
        }

        let response = session.engine().process_input(input).await;
        // Narrative and errors arrive through the sink; only silent
        // degradations (busy, cancelled) need an inline note.
        if let Some(kind) = &response.error {
            if kind == "busy" || kind == "cancelled" {
                println!("[{}]", response.text);
            }
        }
    }

    session.dispose();
    Ok(())
}

fn load_save(session: &Session, path: &str) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let save = SaveData::from_json(&raw)?;
    let transcript = session.engine().load(save)?;

    // Rebuild the visible transcript from the restored ring.
    for interaction in transcript {
        println!("> {}", interaction.player_input);
        println!("\n{}\n", interaction.director_response);
    }
    Ok(())
}
