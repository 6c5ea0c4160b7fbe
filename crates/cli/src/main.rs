use clap::{Parser, Subcommand};
use lib::session::{ChatError, ChatSession};
use lib::transcript::Message;
use std::io::{self, Write};

#[derive(Parser)]
#[command(name = "marka")]
#[command(about = "Marka chat CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, workspace with SYSTEM.md).
    Init {
        /// Config file path (default: MARKA_CONFIG_PATH or ~/.marka/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Print the scripted reply for one message (no typing delay).
    Ask {
        /// The visitor's message.
        message: String,

        /// Print the reply as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Chat with the configured responder in the terminal. `/new` resets, `/exit` quits.
    Chat {
        /// Config file path (default: MARKA_CONFIG_PATH or ~/.marka/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Override the typing delay in milliseconds.
        #[arg(long, value_name = "MS")]
        delay: Option<u64>,
    },

    /// Run the gateway (HTTP + WebSocket chat sessions and contact form).
    Gateway {
        /// Config file path (default: MARKA_CONFIG_PATH or ~/.marka/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP and WebSocket port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("marka {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { message, json }) => {
            if let Err(e) = run_ask(&message, json) {
                log::error!("ask failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, delay }) => {
            if let Err(e) = run_chat(config, delay).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn run_ask(message: &str, json: bool) -> anyhow::Result<()> {
    let reply = lib::responder::respond(message);
    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply);
    }
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config, path).await
}

const NEW_SESSION_TRIGGER: &str = "/new";

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    delay_ms: Option<u64>,
) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let responder = lib::agent::build_responder(&config, &path);
    let delay = delay_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| config.chat.typing_delay());
    let session = ChatSession::new(responder, delay);

    for msg in session.transcript().await {
        print_reply(&msg);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\r', '\n']);
        let command = input.trim();
        if command.eq_ignore_ascii_case("/exit") || command.eq_ignore_ascii_case("/quit") {
            break;
        }
        if command.eq_ignore_ascii_case(NEW_SESSION_TRIGGER) {
            session.reset().await;
            for msg in session.transcript().await {
                print_reply(&msg);
            }
            continue;
        }

        match session.submit(input).await {
            Ok(pending) => {
                if session.is_typing() {
                    println!("  (digitando...)");
                }
                if let Some(reply) = pending.wait().await {
                    print_reply(&reply);
                }
            }
            Err(ChatError::EmptyMessage) => continue,
            Err(e) => {
                eprintln!("chat error: {}", e);
                break;
            }
        }
    }

    session.close();
    Ok(())
}

fn print_reply(msg: &Message) {
    println!("< {}", msg.text());
    if let Some(action) = msg.action() {
        println!("  [{}] {}", action.label, action.url);
    }
}
