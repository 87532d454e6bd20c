//! Nirava - command-line entry point

use clap::{Parser, Subcommand};
use nirava::config::{ConfigError, NiravaConfig};
use nirava::error::sanitize_error_message;
use nirava::evaluation::AgentEvaluator;
use nirava::llm::{GeminiConfig, GeminiProvider, LlmProvider, OpenAiConfig, OpenAiProvider};
use nirava::observability::{init_default_logging, metrics};
use nirava::orchestrator::{is_exit_command, NiravaSystem, GOODBYE};
use nirava::session::SessionStore;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_USER: &str = "default_user";

/// Wellness companion for the six pillars of preventative health
#[derive(Parser)]
#[command(name = "nirava")]
#[command(about = "Wellness companion for the six pillars of preventative health")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Chat {
        /// User the session belongs to
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,
        /// Resume (or create) a session with this id
        #[arg(long)]
        session: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Inspect stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Run the built-in evaluation suite
    Eval,
    /// List the registered agents
    Agents,
    /// Check that the configured LLM provider is reachable
    HealthCheck,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions, oldest first
    List {
        #[arg(long)]
        user: Option<String>,
    },
    /// Print a session as JSON
    Show { id: String },
    /// Delete a session and its checkpoints
    Delete { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {e}");
        }
    }

    init_default_logging(cli.verbose);

    info!("Starting Nirava v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Commands::Chat {
        user: DEFAULT_USER.to_string(),
        session: None,
    });

    let result = match command {
        Commands::Chat { user, session } => run_chat(config, &user, session.as_deref()).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Sessions { action } => handle_sessions_command(&config, action),
        Commands::Eval => run_evaluation(config).await,
        Commands::Agents => list_agents(config),
        Commands::HealthCheck => run_health_check(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", sanitize_error_message(&e.to_string()));
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(path: Option<&std::path::Path>) -> Result<NiravaConfig, ConfigError> {
    let (config, source) = NiravaConfig::load(path)?;
    match source {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }
    Ok(config)
}

/// Provider factory for creating LLM providers from configuration
struct LlmProviderFactory;

impl LlmProviderFactory {
    /// `None` when no API key is set: the system then runs in fallback mode
    fn create_provider(
        config: &NiravaConfig,
    ) -> Result<Option<Arc<dyn LlmProvider>>, Box<dyn std::error::Error>> {
        let api_key = match config.get_llm_api_key() {
            Ok(key) => key,
            Err(ConfigError::EnvVarNotFound(var)) => {
                warn!(env_var = %var, "No API key found, running in fallback mode");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let timeout = Duration::from_secs(config.llm.timeout_secs);

        match config.llm.provider.as_str() {
            "gemini" => {
                let defaults = GeminiConfig::default();
                let provider = GeminiProvider::new(GeminiConfig {
                    api_key,
                    base_url: config.llm.base_url.clone().unwrap_or(defaults.base_url),
                    timeout,
                })?;
                Ok(Some(Arc::new(provider)))
            }
            "openai" => {
                let defaults = OpenAiConfig::default();
                let provider = OpenAiProvider::new(OpenAiConfig {
                    api_key,
                    base_url: config.llm.base_url.clone().unwrap_or(defaults.base_url),
                    timeout,
                })?;
                Ok(Some(Arc::new(provider)))
            }
            provider => Err(ConfigError::UnsupportedProvider(provider.to_string()).into()),
        }
    }
}

async fn run_chat(
    config: NiravaConfig,
    user_id: &str,
    session_id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = LlmProviderFactory::create_provider(&config)?;
    let store = SessionStore::from_config(&config.session)?;
    let companion = config.companion.name.clone();
    let mut system = NiravaSystem::new(config, provider, store, user_id, session_id)?;

    if system.is_fallback_mode() {
        println!("(No API key configured: running with built-in guidance only.)\n");
    }
    println!("Session: {}\n", system.session_id());
    println!("{companion}: {}\n", system.greeting());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\n{companion}: {GOODBYE}");
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit_command(input) {
            println!("{companion}: {GOODBYE}");
            break;
        }

        match input.split_once(' ').map_or((input, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("/checkpoint", _) => match system.create_checkpoint() {
                Ok(id) => println!("Checkpoint saved: {id}\n"),
                Err(e) => println!("Could not save checkpoint: {}\n", e.user_message()),
            },
            ("/resume", id) if !id.is_empty() => match system.resume_from_checkpoint(id) {
                Ok(()) => println!("Resumed from {id} (phase: {})\n", system.phase()),
                Err(e) => println!("Could not resume: {}\n", e.user_message()),
            },
            ("/resume", _) => println!("Usage: /resume <checkpoint_id>\n"),
            ("/metrics", _) => {
                println!("{}", serde_json::to_string_pretty(&system.metrics_summary())?);
                println!("{}\n", serde_json::to_string_pretty(&metrics().get_metrics())?);
            }
            _ => {
                let reply = system.process(input).await;
                println!("\n{companion}: {reply}\n");
            }
        }
    }

    Ok(())
}

fn handle_config_command(config: &NiravaConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }
    match config.get_llm_api_key() {
        Ok(_) => println!("LLM: {} ({})", config.llm.provider, config.llm.model),
        Err(_) => println!(
            "LLM: {} not set, fallback mode will be used",
            config.llm.api_key_env
        ),
    }

    info!("Configuration validation complete");
    println!("Configuration is valid");
    Ok(())
}

fn handle_sessions_command(
    config: &NiravaConfig,
    action: SessionAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SessionStore::open(&config.session.storage_dir)?;

    match action {
        SessionAction::List { user } => {
            let sessions = store.list(user.as_deref());
            if sessions.is_empty() {
                println!("No sessions found");
            }
            for session in sessions {
                println!(
                    "{}  user={}  phase={}  messages={}  checkpoints={}  updated={}",
                    session.session_id,
                    session.user_id,
                    session.phase,
                    session.history.len(),
                    session.checkpoints.len(),
                    session.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        SessionAction::Show { id } => match store.get(&id) {
            Some(session) => println!("{}", serde_json::to_string_pretty(session)?),
            None => return Err(format!("Session not found: {id}").into()),
        },
        SessionAction::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted session {id}");
            } else {
                return Err(format!("Session not found: {id}").into());
            }
        }
    }
    Ok(())
}

async fn run_evaluation(config: NiravaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = LlmProviderFactory::create_provider(&config)?;
    let mut system = NiravaSystem::new(config, provider, SessionStore::in_memory(), "eval", None)?;

    let summary = AgentEvaluator::new(&mut system).run_all().await;
    println!("{summary}");
    Ok(())
}

fn list_agents(config: NiravaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let system = NiravaSystem::new(config, None, SessionStore::in_memory(), DEFAULT_USER, None)?;
    for card in system.registry().list() {
        println!("{} ({}) v{}", card.name, card.agent_id, card.version);
        println!("  {}", card.description);
        for skill in &card.skills {
            println!("  - {}: {}", skill.name, skill.description);
        }
    }
    Ok(())
}

async fn run_health_check(config: &NiravaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Some(provider) = LlmProviderFactory::create_provider(config)? else {
        println!("No API key configured ({}); fallback mode only", config.llm.api_key_env);
        return Ok(());
    };

    provider.health_check().await?;
    println!("{} provider is healthy", provider.name());
    Ok(())
}
