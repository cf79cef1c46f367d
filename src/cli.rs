//! Command line interface.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{default_config_path, Config};
use crate::logging;
use crate::relay::token::render_command;

#[derive(Parser, Debug)]
#[command(
    name = "tokenrelay",
    version,
    about = "Forward tokens to an analyzer chat and route replies back to the requester"
)]
pub struct Cli {
    /// Path to config.toml (defaults to ~/.tokenrelay/config.toml)
    #[arg(long, short = 'c', env = "TOKENRELAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the relay (default)
    Run,

    /// Validate config, authorize and probe both peers, then exit
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which token a message would yield and the command it would send
    Extract {
        /// Message text
        text: String,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

/// Execute the parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.clone().unwrap_or(Commands::Run);
    let path = cli.config_path();

    if let Commands::Init { force } = command {
        Config::default()
            .write_to(&path, force)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let config = Config::load(Some(&path))?;
    let level = logging::level_for_verbosity(cli.verbose, &config.logging.level);
    let _guard = logging::init(&config.logging, &level)?;

    match command {
        Commands::Extract { text } => extract(&config, &text),
        Commands::Check { json } => check(config, json).await,
        Commands::Run => start(config).await,
        Commands::Init { .. } => Ok(()),
    }
}

fn extract(config: &Config, text: &str) -> anyhow::Result<()> {
    let extractor = config.relay.extractor()?;
    match extractor.extract(text) {
        Some(token) => {
            println!("token:   {}", token);
            println!(
                "command: {}",
                render_command(&config.relay.command_template, &token)
            );
        }
        None => println!("no token matches {}", extractor.pattern()),
    }
    Ok(())
}

#[cfg(feature = "telegram")]
async fn check(config: Config, json: bool) -> anyhow::Result<()> {
    let agent = crate::telegram::TelegramRelayAgent::new(config)?;
    let report = agent.check().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "authorized as @{} ({})",
            report.bot_username.as_deref().unwrap_or("?"),
            report.bot_id
        );
        println!("reply policy: {}", report.reply_policy);
        println!(
            "account: api_id={} api_hash={} phone={}",
            report.account.api_id.as_deref().unwrap_or("-"),
            if report.account.api_hash_set { "set" } else { "-" },
            report.account.phone_number.as_deref().unwrap_or("-")
        );
        for probe in &report.peers {
            let status = match (probe.reachable, probe.chat_id) {
                (true, Some(id)) => format!("ok ({id})"),
                (true, None) => "ok".to_string(),
                (false, _) => "unreachable".to_string(),
            };
            match &probe.error {
                Some(e) => println!("{:<10} {:<24} {} ({})", probe.role, probe.peer, status, e),
                None => println!("{:<10} {:<24} {}", probe.role, probe.peer, status),
            }
        }
        for warning in &report.warnings {
            println!("warning: {}", warning);
        }
    }
    Ok(())
}

#[cfg(feature = "telegram")]
async fn start(config: Config) -> anyhow::Result<()> {
    tracing::info!("tokenrelay v{} starting", crate::VERSION);
    crate::telegram::TelegramRelayAgent::new(config)?.start().await
}

#[cfg(not(feature = "telegram"))]
async fn check(_config: Config, _json: bool) -> anyhow::Result<()> {
    anyhow::bail!("built without the `telegram` feature")
}

#[cfg(not(feature = "telegram"))]
async fn start(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("built without the `telegram` feature")
}
