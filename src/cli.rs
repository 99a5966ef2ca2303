use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "omnichat")]
#[command(about = "Terminal chat client for a Gemini-backed persona")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// API key to use instead of the environment or keyring
    #[arg(long, global = true)]
    pub api_key: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start the interactive chat interface
    Chat {
        /// Use specific model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Manage API keys
    ApiKey {
        /// Provider name
        #[arg(value_parser = ["gemini"])]
        provider: String,

        /// Set API key for provider
        #[arg(short, long)]
        set: Option<String>,

        /// Remove API key for provider
        #[arg(short, long)]
        remove: bool,

        /// Show current API key status
        #[arg(long)]
        status: bool,
    },

    /// Send a single non-streamed message and print the reply
    Check {
        /// Message to send
        #[arg(default_value = "ping")]
        message: String,
    },

    /// Show the configuration file path and its resolved contents
    Config,
}

impl Cli {
    /// The subcommand to run; `chat` when none was given.
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Chat { model: None })
    }
}
