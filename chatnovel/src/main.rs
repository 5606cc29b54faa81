//! Chat novel terminal player.
//!
//! Plays a chat novel over stdin/stdout: NPC messages appear with simulated
//! typing, choices are picked by number, and progress is saved after every
//! message so the story resumes where it stopped.
//!
//! ```bash
//! cargo run -p chatnovel -- --name "Ava" --time-scale 0.2
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

mod headless;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatnovel=warn,chatnovel_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = headless::parse_config_from_args(&args)?;
    headless::run_headless(config).await
}

fn print_help() {
    println!("chatnovel - play a chat novel in the terminal");
    println!();
    println!("USAGE:");
    println!("  chatnovel [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --scripts <dir>       Script directory   [env: CHATNOVEL_SCRIPTS]");
    println!("  --saves <dir>         Save directory     [env: CHATNOVEL_SAVES]");
    println!("  --time-scale <f>      Pause multiplier, 0 disables pauses [env: CHATNOVEL_TIME_SCALE]");
    println!("  --name <name>         Player name for a new game");
    println!("  --chapter <n>         Chapter of a new game (default 1)");
    println!("  --part <n>            Part of a new game (default 1)");
    println!("  --fresh               Wipe the save and start over");
    println!("  --no-interrupts       Disable the blocked-by-NPC interrupt");
    println!("  -h, --help            Show this help");
}
