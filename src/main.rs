use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use concierge_agent::{spawn_sweeper, AgentDeps, Supervisor, SupervisorOutput, Workflow};
use concierge_core::config::{AppConfig, ModelConfig};
use concierge_core::types::{Domain, Role, SessionId};

#[derive(Parser)]
#[command(name = "concierge", version, about = "Italian voice-assistant style multi-agent router")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "concierge.toml")]
    config: PathBuf,

    /// Session ID (the shared default session if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL mode
    Repl,
    /// Route a single request and exit
    Run {
        /// The request text
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Print a workflow as a Mermaid flowchart
    Graph {
        /// Agent domain (weather, horoscope, ...); the supervisor if omitted
        agent: Option<String>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("concierge=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        let home_config = dirs_home().map(|h| h.join(".concierge").join("config.toml"));
        match home_config {
            Some(ref path) if path.exists() => {
                info!(path = %path.display(), "Loading config from home directory");
                AppConfig::load(path)?
            }
            _ => {
                eprintln!("Warning: No config file found. Set OPENAI_API_KEY or create concierge.toml");
                create_env_config()
            }
        }
    };

    if let Some(Commands::Config) = &cli.command {
        println!("{}", toml::to_string_pretty(&redacted(&config))?);
        return Ok(());
    }

    let llm = concierge_llm::build_client(&config);
    let deps = AgentDeps::from_config(llm, &config);
    let supervisor = Supervisor::new(deps, &config.router)?;

    if let Some(Commands::Graph { agent }) = &cli.command {
        let graph = select_graph(&supervisor, agent.as_deref())?;
        print!("{}", graph.to_mermaid());
        return Ok(());
    }

    let session_id = cli
        .session
        .as_deref()
        .map(SessionId::from_string)
        .unwrap_or_default();

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        supervisor.store().clone(),
        config.session.sweep_interval(),
        cancel.clone(),
    );

    let outcome = match cli.command {
        Some(Commands::Run { text }) => {
            let text = if text.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                text.join(" ")
            };
            let out = supervisor.run(&session_id, text.trim()).await;
            print_turn(&out, false);
            Ok(())
        }
        _ => run_repl(&supervisor, &session_id).await,
    };

    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    outcome
}

async fn run_repl(supervisor: &Supervisor, session_id: &SessionId) -> anyhow::Result<()> {
    println!("Concierge v{}", env!("CARGO_PKG_VERSION"));
    println!("Session: {}", session_id);
    println!("Type /help for commands, /quit to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut verbose = false;

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts[0] {
            "/quit" | "/exit" | "/q" => {
                println!("Arrivederci!");
                break;
            }
            "/new" => {
                supervisor.reset(session_id);
                println!("Nuova conversazione: richieste in sospeso cancellate.");
                continue;
            }
            "/session" => {
                println!("Session ID: {}", session_id);
                match supervisor.store().get_pending(session_id) {
                    Some(p) => println!(
                        "Pending: {} waiting for {} (\"{}\")",
                        p.domain, p.missing_slot, p.original_query
                    ),
                    None => println!("Pending: none"),
                }
                continue;
            }
            "/graph" => {
                match select_graph(supervisor, parts.get(1).copied()) {
                    Ok(graph) => print!("{}", graph.to_mermaid()),
                    Err(e) => println!("{}", e),
                }
                continue;
            }
            "/verbose" => {
                verbose = !verbose;
                println!("Verbose: {}", if verbose { "on" } else { "off" });
                continue;
            }
            "/help" => {
                println!("Commands:");
                println!("  /new             Start a new conversation (clears pending requests)");
                println!("  /session         Show session id and pending request");
                println!("  /graph [agent]   Print a workflow as Mermaid");
                println!("  /verbose         Toggle routing and progress messages");
                println!("  /quit            Exit");
                continue;
            }
            _ => {}
        }

        let out = supervisor.run(session_id, input).await;
        print_turn(&out, verbose);
    }

    Ok(())
}

fn print_turn(out: &SupervisorOutput, verbose: bool) {
    let reply = out
        .final_reply()
        .unwrap_or("Mi dispiace, non ho potuto elaborare la tua richiesta.");

    if verbose {
        for msg in out.messages.iter().filter(|m| m.role == Role::Assistant) {
            if msg.content != reply {
                println!("  · {}", msg.content);
            }
        }
    }
    println!("{}\n", reply);
}

fn select_graph<'a>(supervisor: &'a Supervisor, name: Option<&str>) -> anyhow::Result<&'a Workflow> {
    let Some(name) = name.filter(|n| !n.eq_ignore_ascii_case("supervisor")) else {
        return Ok(supervisor.graph());
    };
    let domain: Domain = name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    supervisor
        .agent_graph(domain)
        .ok_or_else(|| anyhow::anyhow!("The {} agent has no workflow yet", domain))
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    for model in std::iter::once(&mut config.model).chain(config.fallback_models.iter_mut()) {
        if model.api_key.is_some() {
            model.api_key = Some("***".to_string());
        }
    }
    config
}

fn create_env_config() -> AppConfig {
    let model = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => ModelConfig {
            provider: "openai".to_string(),
            model_id: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_key: Some(key),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.0,
            retry: None,
            extra_headers: Default::default(),
        },
        // Default to a local OpenAI-compatible server
        Err(_) => ModelConfig {
            provider: "ollama".to_string(),
            model_id: "llama3.2".to_string(),
            api_key: None,
            base_url: Some("http://localhost:11434/v1/chat/completions".to_string()),
            max_tokens: 1024,
            temperature: 0.0,
            retry: None,
            extra_headers: Default::default(),
        },
    };
    AppConfig::with_model(model)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
