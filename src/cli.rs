//! CLI definitions for tgwatch.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tgwatch - Telegram bot update collector and search console
#[derive(Parser, Debug)]
#[command(name = "tgwatch")]
#[command(version)]
#[command(about = "Collect Telegram bot updates into SQLite and search them")]
#[command(long_about = r"
tgwatch long-polls the Telegram Bot API with your bot's token and records
every message the bot can see: senders, chats, message text, and username
changes over time. The collected data is searchable from the command line
or from an interactive console.

Quick start:
  1. Create a bot with @BotFather and add it to the groups to watch
  2. Run: tgwatch token --set <TOKEN>
  3. Run: tgwatch monitor          (Ctrl+C to stop)
  4. Search: tgwatch search-users alice
")]
pub struct Cli {
    /// Path to the database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Bot token (overrides the token file and TGWATCH_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the bot token is accepted
    Validate,

    /// Show the bot's identity (getMe)
    BotInfo,

    /// Poll for updates and record every message until interrupted
    Monitor(MonitorArgs),

    /// Look up everything recorded about a user
    User(UserArgs),

    /// Show a user's username history
    History(UserArgs),

    /// Show messages sent by a user, newest first
    Messages(MessagesArgs),

    /// Search current and past usernames
    SearchUsers(SearchUsersArgs),

    /// Search message text
    Search(SearchArgs),

    /// Show database statistics
    Stats,

    /// Export the whole database as JSON
    Export(ExportArgs),

    /// Run health checks on configuration, database and Bot API access
    Doctor(DoctorArgs),

    /// Start the interactive console
    Repl,

    /// Manage the stored bot token
    Token(TokenArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Poll once and exit
    #[arg(long, conflicts_with = "max_cycles")]
    pub once: bool,

    /// Stop after this many poll cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Override the long-poll wait in seconds
    #[arg(long)]
    pub poll_timeout: Option<u64>,

    /// Do not write a session operation log
    #[arg(long)]
    pub no_log: bool,
}

#[derive(Args, Debug)]
pub struct UserArgs {
    /// Telegram user id
    #[arg(value_parser = clap::value_parser!(i64).range(1..))]
    pub user_id: i64,
}

#[derive(Args, Debug)]
pub struct MessagesArgs {
    /// Telegram user id
    #[arg(value_parser = clap::value_parser!(i64).range(1..))]
    pub user_id: i64,

    /// Maximum number of messages
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SearchUsersArgs {
    /// Username or fragment (a leading @ is ignored)
    pub query: String,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Keyword to look for in message text
    pub keyword: String,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path (defaults to the exports directory)
    #[arg(long, short = 'o', conflicts_with = "stdout")]
    pub output: Option<PathBuf>,

    /// Write the export to stdout
    #[arg(long)]
    pub stdout: bool,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Skip the live Bot API check
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct TokenArgs {
    /// Store a token in the token file
    #[arg(long, value_name = "TOKEN")]
    pub set: Option<String>,

    /// Delete the token file
    #[arg(long)]
    pub clear: bool,

    /// Show the configured token (masked)
    #[arg(long)]
    pub show: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Write a default configuration file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    /// Parse a configured format name, falling back to text.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        <Self as ValueEnum>::from_str(value, true).unwrap_or_default()
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tgwatch", "search", "hello", "-n", "5", "--format", "json"])
            .unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.keyword, "hello");
                assert_eq!(args.limit, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn user_id_must_be_positive() {
        assert!(Cli::try_parse_from(["tgwatch", "user", "0"]).is_err());
        assert!(Cli::try_parse_from(["tgwatch", "user", "abc"]).is_err());
        assert!(Cli::try_parse_from(["tgwatch", "user", "42"]).is_ok());
    }

    #[test]
    fn token_requires_exactly_one_action() {
        assert!(Cli::try_parse_from(["tgwatch", "token"]).is_err());
        assert!(Cli::try_parse_from(["tgwatch", "token", "--show", "--clear"]).is_err());
        assert!(Cli::try_parse_from(["tgwatch", "token", "--show"]).is_ok());
    }

    #[test]
    fn output_format_from_config() {
        assert_eq!(OutputFormat::from_config("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_config("json-pretty"), OutputFormat::JsonPretty);
        assert_eq!(OutputFormat::from_config("yaml"), OutputFormat::Text);
    }
}
