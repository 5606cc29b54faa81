//! Headless mode for the chat novel.
//!
//! A simple line-oriented protocol over stdin/stdout:
//! - A number picks the matching choice
//! - Lines starting with `#` are commands (status, history, continue, ...)
//! - Everything the engine does is printed as tagged lines as it happens

use anyhow::{bail, Context};
use chatnovel_core::persist::PROGRESS_KEY;
use chatnovel_core::script::MessageKind;
use chatnovel_core::state::PendingChoice;
use chatnovel_core::{
    ChatMessage, ChoiceOutcome, DialogueEngine, DirectoryScriptSource, EngineConfig, EngineEvent,
    FileSaveStore, Halt, Indicator, SaveStore, SavedProgress, Sender, ThresholdInterrupt,
    TracingCues,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// Variable watched by the blocked-by-NPC interrupt.
pub const BLOCK_VARIABLE: &str = "valeria_affection";

/// Script played when the NPC blocks the player.
pub const BLOCK_SCRIPT: &str = "blocked";

/// Configuration of a headless session.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessConfig {
    pub scripts_dir: PathBuf,
    pub saves_dir: PathBuf,
    pub time_scale: f64,
    pub name: Option<String>,
    pub chapter: u32,
    pub part: u32,
    pub fresh: bool,
    pub interrupts: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/scripts")),
            saves_dir: PathBuf::from(".chatnovel"),
            time_scale: 1.0,
            name: None,
            chapter: 1,
            part: 1,
            fresh: false,
            interrupts: true,
        }
    }
}

impl HeadlessConfig {
    /// Defaults overridden by `CHATNOVEL_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("CHATNOVEL_SCRIPTS") {
            config.scripts_dir = dir.into();
        }
        if let Ok(dir) = std::env::var("CHATNOVEL_SAVES") {
            config.saves_dir = dir.into();
        }
        if let Ok(scale) = std::env::var("CHATNOVEL_TIME_SCALE") {
            config.time_scale = parse_time_scale(&scale).context("Invalid CHATNOVEL_TIME_SCALE")?;
        }

        Ok(config)
    }
}

/// Parse configuration from the environment and command line arguments.
pub fn parse_config_from_args(args: &[String]) -> anyhow::Result<HeadlessConfig> {
    let mut config = HeadlessConfig::from_env()?;
    apply_args(&mut config, args)?;
    Ok(config)
}

/// Apply command line flags on top of `config`. Flags win over env vars.
pub fn apply_args(config: &mut HeadlessConfig, args: &[String]) -> anyhow::Result<()> {
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--scripts" | "--saves" | "--time-scale" | "--name" | "--chapter" | "--part" => {
                let Some(value) = args.get(i + 1) else {
                    bail!("{flag} needs a value");
                };
                match flag {
                    "--scripts" => config.scripts_dir = value.into(),
                    "--saves" => config.saves_dir = value.into(),
                    "--time-scale" => config.time_scale = parse_time_scale(value)?,
                    "--name" => config.name = Some(value.clone()),
                    "--chapter" => {
                        config.chapter = value.parse().with_context(|| format!("Invalid chapter '{value}'"))?
                    }
                    _ => config.part = value.parse().with_context(|| format!("Invalid part '{value}'"))?,
                }
                i += 1;
            }
            "--fresh" => config.fresh = true,
            "--no-interrupts" => config.interrupts = false,
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

fn parse_time_scale(value: &str) -> anyhow::Result<f64> {
    let scale: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid time scale '{value}'"))?;
    if !scale.is_finite() || scale < 0.0 {
        bail!("Time scale must be a non-negative number, got {value}");
    }
    Ok(scale)
}

/// Run the story in headless mode.
pub async fn run_headless(config: HeadlessConfig) -> anyhow::Result<()> {
    info!(
        scripts = %config.scripts_dir.display(),
        saves = %config.saves_dir.display(),
        time_scale = config.time_scale,
        "starting headless session"
    );
    let saves = Arc::new(FileSaveStore::new(&config.saves_dir));
    let mut engine = DialogueEngine::new(
        EngineConfig::new().with_time_scale(config.time_scale),
        Arc::new(DirectoryScriptSource::new(&config.scripts_dir)),
        saves.clone(),
    )
    .with_cues(Arc::new(TracingCues));
    if config.interrupts {
        engine = engine.with_interrupt(ThresholdInterrupt::new(BLOCK_VARIABLE, 0.0, BLOCK_SCRIPT));
    }

    let events = engine.subscribe();
    let printer = tokio::spawn(print_events(events));

    if config.fresh {
        engine.reset_game().await?;
    }

    println!("=== Chat Novel ===");
    println!("Type the number of a choice to answer, #help for commands.");
    println!();

    // Show the conversation so far before the engine continues it
    if let Some(json) = saves.get(PROGRESS_KEY).await? {
        if let Ok(saved) = SavedProgress::from_json(&json) {
            if !saved.chat_history.is_empty() {
                println!("[RESUMED] Chapter {}, part {}", saved.current_chapter, saved.current_part);
                print_transcript(&saved.chat_history);
            }
        }
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    match resume_session(&mut engine).await {
        Resume::Continued => {}
        Resume::PendingPart => {
            announce_part(&engine);
            engine.begin_pending_part().await;
        }
        Resume::Ended => println!("[END] This story has ended. Type #reset to start over."),
        Resume::NewGame => start_new_game(&mut engine, &config, &mut lines).await?,
    }

    while let Some(line) = lines.next() {
        let line = line.context("Failed to read input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("status") => print_status(&engine),
                Some("history") => print_transcript(engine.store().chat_history()),
                Some("choices") => {
                    if engine.is_waiting_for_choice() {
                        println!("{}", render_choices(engine.choices()));
                    } else {
                        println!("[WAIT] No choice pending.");
                    }
                }
                Some("continue") => {
                    if engine.store().part_intro_pending() {
                        announce_part(&engine);
                        engine.begin_pending_part().await;
                    } else {
                        println!("[ERROR] No part is waiting to begin.");
                    }
                }
                Some("name") => {
                    let name = parts[1..].join(" ");
                    if name.is_empty() {
                        println!("[ERROR] Usage: #name <name>");
                    } else {
                        match engine.store_mut().set_player_name(&name).await {
                            Ok(()) => println!("[NAME] You are now {}", engine.store().player_name()),
                            Err(e) => println!("[ERROR] Could not save name: {e}"),
                        }
                    }
                }
                Some("reset") => {
                    engine.reset_game().await?;
                    println!("[RESET] Progress wiped.");
                    start_new_game(&mut engine, &config, &mut lines).await?;
                }
                Some("help") => print_commands(),
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            io::stdout().flush().ok();
            continue;
        }

        if !engine.is_waiting_for_choice() {
            println!("[WAIT] Nothing to answer yet.");
            continue;
        }
        match line.parse::<usize>() {
            Ok(n) if n >= 1 => {
                if let ChoiceOutcome::InvalidIndex(_) = engine.submit_choice(n - 1).await {
                    println!("[ERROR] Pick a number between 1 and {}.", engine.choices().len());
                }
            }
            _ => println!("[ERROR] Enter the number of a choice."),
        }
    }

    drop(engine);
    printer.await.ok();
    Ok(())
}

/// Where a session picks up after reading the save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// The saved conversation continued.
    Continued,
    /// A part is waiting to begin.
    PendingPart,
    /// The story already ended.
    Ended,
    /// Nothing usable was saved.
    NewGame,
}

/// Continue the saved game if possible.
///
/// A save whose script can no longer be loaded is cleared so a new game can
/// start in its place.
pub async fn resume_session(engine: &mut DialogueEngine) -> Resume {
    match engine.resume_saved().await {
        Ok(Some(_)) => Resume::Continued,
        Ok(None) if engine.store().part_intro_pending() => Resume::PendingPart,
        Ok(None) if engine.store().game_started() && !engine.store().chat_history().is_empty() => {
            Resume::Ended
        }
        Ok(None) => Resume::NewGame,
        Err(e) => {
            warn!(error = %e, "saved game could not be resumed, starting over");
            println!("[ERROR] The saved game could not be resumed. Starting a new one.");
            if let Err(e) = engine.reset_game().await {
                warn!(error = %e, "failed to clear unusable save");
            }
            Resume::NewGame
        }
    }
}

async fn start_new_game<I>(
    engine: &mut DialogueEngine,
    config: &HeadlessConfig,
    lines: &mut I,
) -> anyhow::Result<()>
where
    I: Iterator<Item = io::Result<String>>,
{
    let name = match &config.name {
        Some(name) => name.clone(),
        None => {
            println!("[NAME] What's your name?");
            io::stdout().flush().ok();
            loop {
                let Some(line) = lines.next() else {
                    bail!("Input closed before a name was entered");
                };
                let line = line.context("Failed to read input")?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
        }
    };

    engine.store_mut().set_player_name(&name).await?;
    engine.start_chapter(config.chapter, config.part).await?;
    Ok(())
}

async fn print_events(mut events: UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        if let Some(text) = render_event(&event) {
            println!("{text}");
            io::stdout().flush().ok();
        }
    }
}

/// Text printed for an engine event, if any.
pub fn render_event(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::Indicator(Indicator::Typing(sender)) => Some(format!("[{sender} is typing...]")),
        EngineEvent::Indicator(Indicator::Recording(sender)) => {
            Some(format!("[{sender} is recording audio...]"))
        }
        EngineEvent::Indicator(_) => None,
        EngineEvent::MessageDelivered(message) => Some(render_message(message)),
        EngineEvent::MessageRead { .. } => Some("[SEEN]".to_string()),
        EngineEvent::ChoicesPresented(choices) => Some(render_choices(choices)),
        EngineEvent::PartEnded { title, .. } => Some(match title {
            Some(title) => format!("[PART END] Up next: {title}. Type #continue to begin."),
            None => "[PART END]".to_string(),
        }),
        EngineEvent::WalkHalted(Halt::MissingNode(id)) => {
            Some(format!("[ERROR] The story is missing node '{id}'."))
        }
        EngineEvent::WalkHalted(Halt::EndOfScript) => Some("[END]".to_string()),
        EngineEvent::WalkHalted(_) => None,
    }
}

/// One chat message as a tagged line.
pub fn render_message(message: &ChatMessage) -> String {
    let tag = match &message.sender {
        Sender::Player => "YOU".to_string(),
        Sender::System => "SYSTEM".to_string(),
        Sender::Npc(name) => name.clone(),
    };
    let attachment = match message.kind {
        MessageKind::Audio => "(voice message) ",
        MessageKind::Image => "(image) ",
        MessageKind::Text => "",
    };
    format!("[{tag}] {attachment}{}", message.content)
}

/// Pending choices, numbered from 1.
pub fn render_choices(choices: &[PendingChoice]) -> String {
    let mut out = String::from("[CHOICES]");
    for (i, choice) in choices.iter().enumerate() {
        out.push_str(&format!("\n  {}) {}", i + 1, choice.text));
    }
    out
}

fn print_transcript(history: &[ChatMessage]) {
    for message in history {
        println!("{}", render_message(message));
    }
    println!();
}

fn announce_part(engine: &DialogueEngine) {
    let store = engine.store();
    match store.part_title() {
        Some(title) => println!("=== Part {}: {title} ===", store.part()),
        None => println!("=== Part {} ===", store.part()),
    }
}

fn print_status(engine: &DialogueEngine) {
    let store = engine.store();
    println!("[STATUS]");
    println!("  Player: {}", store.player_name());
    println!("  Chapter {}, part {}", store.chapter(), store.part());
    if let Some(title) = store.part_title() {
        println!("  Title: {title}");
    }
    if let Some(script) = store.active_script() {
        println!("  Script: {script}");
    }
    println!("  Messages: {}", store.chat_history().len());
    println!("  NPC online: {}", store.npc_connected());
    println!("  Blocked: {}", store.blocked());
    for (name, value) in store.variables().values() {
        println!("  {name}: {value}");
    }
}

fn print_commands() {
    println!("[HELP]");
    println!("  <number>     - Pick a choice");
    println!("  #choices     - Show the pending choices");
    println!("  #continue    - Begin the next part");
    println!("  #history     - Show the conversation so far");
    println!("  #status      - Show story status");
    println!("  #name <name> - Change your name");
    println!("  #reset       - Wipe progress and start over");
    println!("  #quit        - Exit");
}
