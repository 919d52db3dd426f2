//! Interactive console for tgwatch.
//!
//! Lines are parsed into a [`Command`] and dispatched to the query layer;
//! the dispatcher returns rendered text and never touches the terminal, so
//! it can be driven without a TTY.

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, EditMode, Editor};
use std::path::PathBuf;

use crate::api::BotIdentity;
use crate::logging::session_logs;
use tracing::{debug, info, warn};

use crate::display::{self, Theme};
use crate::error::{VALID_CONSOLE_COMMANDS, WatchError, find_closest_match};
use crate::query::{QueryFacade, parse_user_id};

/// One console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User { user_id: i64 },
    History { user_id: i64 },
    Messages { user_id: i64, limit: Option<usize> },
    SearchUsers { query: String },
    Search { keyword: String },
    Stats,
    Bot,
    Logs,
    Help { command: Option<String> },
    Quit,
}

/// Result of dispatching a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Quit,
}

/// Console state.
pub struct ReplSession {
    facade: QueryFacade,
    theme: Theme,
    message_limit: usize,
    search_limit: usize,
    bot: Option<BotIdentity>,
    log_dir: Option<PathBuf>,
    prompt_context: PromptContext,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum PromptContext {
    #[default]
    Normal,
    WithResults(usize),
}

impl ReplSession {
    #[must_use]
    pub const fn new(facade: QueryFacade, theme: Theme, message_limit: usize, search_limit: usize) -> Self {
        Self {
            facade,
            theme,
            message_limit,
            search_limit,
            bot: None,
            log_dir: None,
            prompt_context: PromptContext::Normal,
        }
    }

    /// Bot identity shown by `bot`, fetched when the console starts.
    #[must_use]
    pub fn with_bot(mut self, bot: BotIdentity) -> Self {
        self.bot = Some(bot);
        self
    }

    /// Directory listed by `logs`.
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: PathBuf) -> Self {
        self.log_dir = Some(log_dir);
        self
    }

    fn format_prompt(&self) -> String {
        match self.prompt_context {
            PromptContext::Normal => "tgwatch> ".to_string(),
            PromptContext::WithResults(n) => format!("tgwatch [{n}]> "),
        }
    }

    /// Run one command against the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub fn execute(&mut self, command: &Command) -> crate::Result<Outcome> {
        let theme = self.theme;
        let text = match command {
            Command::User { user_id } => {
                let report = self.facade.user_report(*user_id)?;
                self.prompt_context = PromptContext::WithResults(report.recent_messages.len());
                display::render_user_report(theme, &report)
            }
            Command::History { user_id } => {
                let history = self.facade.username_history(*user_id)?;
                self.prompt_context = PromptContext::WithResults(history.len());
                display::render_username_history(theme, *user_id, &history)
            }
            Command::Messages { user_id, limit } => {
                let messages = self
                    .facade
                    .user_messages(*user_id, limit.unwrap_or(self.message_limit))?;
                self.prompt_context = PromptContext::WithResults(messages.len());
                display::render_message_history(theme, &messages)
            }
            Command::SearchUsers { query } => {
                let matches = self.facade.search_usernames(query)?;
                self.prompt_context = PromptContext::WithResults(matches.len());
                display::render_user_matches(theme, &matches)
            }
            Command::Search { keyword } => {
                let hits = self.facade.search_messages(keyword, self.search_limit)?;
                self.prompt_context = PromptContext::WithResults(hits.len());
                display::render_search_hits(theme, &hits)
            }
            Command::Stats => {
                self.prompt_context = PromptContext::Normal;
                display::render_statistics(theme, &self.facade.statistics()?)
            }
            Command::Bot => match &self.bot {
                Some(bot) => display::render_bot_info(theme, bot),
                None => format!(
                    "{}\n",
                    theme.warning("Bot info unavailable: no token configured or the Bot API was unreachable")
                ),
            },
            Command::Logs => match &self.log_dir {
                Some(dir) => display::render_session_logs(theme, dir, &session_logs(dir)?),
                None => format!("{}\n", theme.warning("No log directory configured")),
            },
            Command::Help { command } => help_text(command.as_deref()),
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Output(text))
    }
}

/// Run the console until `quit` or end of input.
///
/// # Errors
///
/// Returns an error if readline setup or history persistence fails.
pub fn run(mut session: ReplSession, history_path: PathBuf) -> Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;
    if rl.load_history(&history_path).is_err() {
        debug!(path = %history_path.display(), "No console history yet");
    }

    info!("Starting console session");
    print!("{}", display::banner(session.theme));
    println!(
        "{}",
        "Type 'help' for commands, 'quit' to exit.".cyan()
    );
    println!();

    loop {
        let prompt = session.format_prompt();
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if !matches!(line, "quit" | "exit" | "q") {
                    rl.add_history_entry(line)?;
                }

                debug!(command = %line, "Console command");
                let result = parse_command(line).and_then(|command| session.execute(&command));
                match result {
                    Ok(Outcome::Output(text)) => print!("{text}"),
                    Ok(Outcome::Quit) => break,
                    Err(e) => {
                        warn!(error = %e, "Console command failed");
                        eprintln!("{}: {e}", "Error".red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e)).context("Readline failed");
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rl.save_history(&history_path)?;
    info!("Ended console session");
    println!("Goodbye!");
    Ok(())
}

/// Parse one console line.
///
/// # Errors
///
/// Returns [`WatchError::InvalidArgument`] for unknown commands or bad
/// arguments.
pub fn parse_command(input: &str) -> crate::Result<Command> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let Some((&name, args)) = parts.split_first() else {
        return Err(WatchError::invalid_argument("empty command"));
    };

    let user_id = || {
        args.first()
            .ok_or_else(|| WatchError::invalid_argument(format!("usage: {name} <user_id>")))
            .and_then(|raw| parse_user_id(raw))
    };
    let rest = || args.join(" ");

    match name {
        "user" | "u" => Ok(Command::User { user_id: user_id()? }),
        "history" | "hist" => Ok(Command::History { user_id: user_id()? }),
        "messages" | "msgs" | "m" => {
            let limit = args
                .get(1)
                .map(|raw| {
                    raw.parse::<usize>().map_err(|_| {
                        WatchError::invalid_argument(format!("invalid limit '{raw}'"))
                    })
                })
                .transpose()?;
            Ok(Command::Messages {
                user_id: user_id()?,
                limit,
            })
        }
        "search-users" | "su" | "whois" => {
            let query = rest();
            if query.is_empty() {
                return Err(WatchError::invalid_argument("usage: search-users <username>"));
            }
            Ok(Command::SearchUsers { query })
        }
        "search" | "s" => {
            let keyword = rest();
            if keyword.is_empty() {
                return Err(WatchError::invalid_argument("usage: search <keyword>"));
            }
            Ok(Command::Search { keyword })
        }
        "stats" => Ok(Command::Stats),
        "bot" | "bot-info" => Ok(Command::Bot),
        "logs" | "log" => Ok(Command::Logs),
        "help" | "h" | "?" => Ok(Command::Help {
            command: args.first().map(ToString::to_string),
        }),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        _ => {
            let hint = find_closest_match(name, VALID_CONSOLE_COMMANDS, None)
                .map(|c| format!(" Did you mean '{c}'?"))
                .unwrap_or_default();
            Err(WatchError::invalid_argument(format!(
                "unknown command '{name}'.{hint} Type 'help' for available commands."
            )))
        }
    }
}

fn help_text(command: Option<&str>) -> String {
    match command {
        Some("user" | "u") => "user <id>                 - profile, username history, chats and recent messages\n".to_string(),
        Some("history" | "hist") => "history <id>              - username changes, newest first\n".to_string(),
        Some("messages" | "m") => "messages <id> [limit]     - messages sent by a user, newest first\n".to_string(),
        Some("search-users" | "su") => "search-users <name>       - match current and past usernames\n".to_string(),
        Some("search" | "s") => "search <keyword>          - case-insensitive message text search\n".to_string(),
        Some("stats") => "stats                     - store-wide counts\n".to_string(),
        Some("bot") => "bot                       - the bot's identity and privacy mode\n".to_string(),
        Some("logs") => "logs                      - session operation logs, newest first\n".to_string(),
        Some("quit" | "exit") => "quit                      - exit the console\n".to_string(),
        _ => "Commands:\n\
              \x20 user <id>               - user intelligence lookup\n\
              \x20 history <id>            - username history\n\
              \x20 messages <id> [limit]   - message history\n\
              \x20 search-users <name>     - username search (current and past)\n\
              \x20 search <keyword>        - message keyword search\n\
              \x20 stats                   - database statistics\n\
              \x20 bot                     - bot info\n\
              \x20 logs                    - session logs\n\
              \x20 help [command]          - show help\n\
              \x20 quit                    - exit\n"
            .to_string(),
    }
}
