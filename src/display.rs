//! Text rendering for terminal output.
//!
//! Every function here is pure: it takes the data and a [`Theme`] and
//! returns the text to print. Whether color is used is decided by the
//! theme passed in, never by shared state.

use crate::api::BotIdentity;
use crate::doctor::{CheckStatus, DoctorReport};
use crate::format_number;
use crate::model::{IngestRecord, Statistics, StoredMessage, UserMatch, UsernameChange};
use crate::monitor::MonitorSummary;
use crate::query::{HISTORY_PREVIEW_CHARS, PREVIEW_CHARS, UserReport, truncate_text};
use colored::{ColoredString, Colorize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Width of section dividers.
pub const DIVIDER_WIDTH: usize = 70;

/// Recent messages shown in a user lookup.
const LOOKUP_SHOWN: usize = 5;

/// Output styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub colors: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self { colors: true }
    }
}

impl Theme {
    #[must_use]
    pub const fn plain() -> Self {
        Self { colors: false }
    }

    fn paint(self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.colors {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    #[must_use]
    pub fn heading(self, text: &str) -> String {
        self.paint(text, |t| t.bold().cyan())
    }

    #[must_use]
    pub fn success(self, text: &str) -> String {
        self.paint(text, |t| t.green())
    }

    #[must_use]
    pub fn warning(self, text: &str) -> String {
        self.paint(text, |t| t.yellow())
    }

    #[must_use]
    pub fn error(self, text: &str) -> String {
        self.paint(text, |t| t.red().bold())
    }

    #[must_use]
    pub fn label(self, text: &str) -> String {
        self.paint(text, |t| t.blue())
    }

    #[must_use]
    pub fn dim(self, text: &str) -> String {
        self.paint(text, |t| t.dimmed())
    }

    #[must_use]
    pub fn divider(self) -> String {
        self.dim(&"─".repeat(DIVIDER_WIDTH))
    }
}

fn at_username(username: Option<&str>) -> String {
    username.map_or_else(|| "(no username)".to_string(), |u| format!("@{u}"))
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("unknown")
}

/// Startup banner.
#[must_use]
pub fn banner(theme: Theme) -> String {
    format!(
        "{}\n{}\n",
        theme.heading(&format!("tgwatch {}", env!("CARGO_PKG_VERSION"))),
        theme.dim("Telegram bot update collector")
    )
}

/// Section header with dividers.
#[must_use]
pub fn section(theme: Theme, title: &str) -> String {
    format!("{}\n{}\n{}", theme.divider(), theme.heading(title), theme.divider())
}

#[must_use]
pub fn render_bot_info(theme: Theme, bot: &BotIdentity) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", theme.label("Bot Name:"), bot.first_name);
    let _ = writeln!(
        out,
        "{} {}",
        theme.label("Username:"),
        at_username(bot.username.as_deref())
    );
    let _ = writeln!(out, "{} {}", theme.label("Bot ID:"), bot.id);
    if let Some(all) = bot.can_read_all_group_messages {
        let privacy = if all { "disabled" } else { "enabled" };
        let _ = writeln!(out, "{} {privacy}", theme.label("Privacy mode:"));
    }
    out
}

/// One line per stored message while monitoring.
#[must_use]
pub fn render_logged(theme: Theme, record: &IngestRecord) -> String {
    theme.success(&format!(
        "[+] Logged: {} in {}",
        record.sender_label(),
        record.chat_label()
    ))
}

#[must_use]
pub fn render_monitor_summary(theme: Theme, summary: &MonitorSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", theme.heading("Monitoring stopped"));
    let _ = writeln!(out, "  {:<18} {}", "Poll cycles:", summary.cycles);
    let _ = writeln!(out, "  {:<18} {}", "Updates received:", summary.received);
    let _ = writeln!(out, "  {:<18} {}", "Messages stored:", summary.stored);
    let _ = writeln!(out, "  {:<18} {}", "Skipped:", summary.skipped);
    let _ = writeln!(out, "  {:<18} {}", "Store failures:", summary.failed);
    let _ = writeln!(out, "  {:<18} {}", "Poll errors:", summary.transport_errors);
    if let Some(id) = summary.last_update_id {
        let _ = writeln!(out, "  {:<18} {id}", "Last update id:");
    }
    out
}

#[must_use]
pub fn render_user_report(theme: Theme, report: &UserReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", theme.divider());
    let _ = writeln!(out, "{}", theme.heading(&format!("User ID: {}", report.user_id)));

    if report.is_empty() {
        let _ = writeln!(out, "{}", theme.warning("No data recorded for this user"));
        return out;
    }

    if let Some(profile) = &report.profile {
        let name = [profile.first_name.as_deref(), profile.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "  {} {name}", theme.label("Name:"));
        let _ = writeln!(
            out,
            "  {} {}",
            theme.label("Username:"),
            at_username(profile.current_username.as_deref())
        );
        if profile.is_bot {
            let _ = writeln!(out, "  {} yes", theme.label("Bot:"));
        }
        if let Some(lang) = &profile.language_code {
            let _ = writeln!(out, "  {} {lang}", theme.label("Language:"));
        }
        let _ = writeln!(
            out,
            "  {} {}  {} {}",
            theme.label("First seen:"),
            profile.first_seen,
            theme.label("Last seen:"),
            profile.last_seen
        );
    }

    if !report.username_history.is_empty() {
        let _ = writeln!(out, "\n{}", theme.warning("Username History:"));
        out.push_str(&history_lines(&report.username_history));
    }

    if !report.activity.is_empty() {
        let _ = writeln!(out, "\n{}", theme.warning("Chats:"));
        for activity in &report.activity {
            let _ = writeln!(
                out,
                "  {} ({}) - {} message(s), last {}",
                activity
                    .chat_title
                    .clone()
                    .unwrap_or_else(|| activity.chat_id.to_string()),
                activity.status,
                activity.message_count,
                activity.last_seen
            );
        }
    }

    if !report.recent_messages.is_empty() {
        let _ = writeln!(
            out,
            "\n{}",
            theme.success(&format!("Recent Messages ({}):", report.recent_messages.len()))
        );
        for (idx, msg) in report.recent_messages.iter().take(LOOKUP_SHOWN).enumerate() {
            let _ = writeln!(out, "\n  [{}] {}", idx + 1, msg.message_date);
            let _ = writeln!(out, "      Chat: {}", or_unknown(msg.chat_title.as_deref()));
            let _ = writeln!(out, "      {}", truncate_text(&msg.message_text, PREVIEW_CHARS));
        }
    }

    out
}

fn history_lines(history: &[UsernameChange]) -> String {
    let mut out = String::new();
    for (idx, change) in history.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} (was {}) - {}",
            idx + 1,
            at_username(change.username.as_deref()),
            at_username(change.previous_username.as_deref()),
            change.changed_at
        );
    }
    out
}

#[must_use]
pub fn render_username_history(theme: Theme, user_id: i64, history: &[UsernameChange]) -> String {
    if history.is_empty() {
        return theme.warning(&format!("No username changes recorded for {user_id}\n"));
    }
    format!(
        "{}\n{}",
        theme.heading(&format!("Username history for {user_id}:")),
        history_lines(history)
    )
}

#[must_use]
pub fn render_message_history(theme: Theme, messages: &[StoredMessage]) -> String {
    if messages.is_empty() {
        return theme.warning("No messages found\n");
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}\n",
        theme.success(&format!("Found {} messages:", messages.len()))
    );
    for (idx, msg) in messages.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}",
            theme.label(&format!("[{}] {}", idx + 1, msg.message_date))
        );
        let _ = writeln!(
            out,
            "    {} {}",
            theme.dim("Chat:"),
            or_unknown(msg.chat_title.as_deref())
        );
        let _ = writeln!(
            out,
            "    {} {} ({})",
            theme.dim("From:"),
            or_unknown(msg.first_name.as_deref()),
            at_username(msg.username.as_deref())
        );
        let preview = truncate_text(&msg.message_text, HISTORY_PREVIEW_CHARS);
        for line in textwrap::wrap(&preview, DIVIDER_WIDTH) {
            let _ = writeln!(out, "    {line}");
        }
        if let Some(media) = msg.media_type.as_db_str() {
            let _ = writeln!(out, "    {} {media}", theme.dim("Media:"));
        }
        out.push('\n');
    }
    out
}

#[must_use]
pub fn render_user_matches(theme: Theme, matches: &[UserMatch]) -> String {
    if matches.is_empty() {
        return theme.warning("No matches found\n");
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        theme.success(&format!("Found {} match(es):", matches.len()))
    );
    for (idx, m) in matches.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} ({}) - ID: {}",
            idx + 1,
            or_unknown(m.first_name.as_deref()),
            at_username(m.current_username.as_deref()),
            m.user_id
        );
    }
    out
}

#[must_use]
pub fn render_search_hits(theme: Theme, messages: &[StoredMessage]) -> String {
    if messages.is_empty() {
        return theme.warning("No messages found\n");
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}\n",
        theme.success(&format!("Found {} messages:", messages.len()))
    );
    for (idx, msg) in messages.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} {}: {} {}",
            theme.label(&format!("[{}]", idx + 1)),
            at_username(msg.username.as_deref()),
            truncate_text(&msg.message_text, PREVIEW_CHARS),
            theme.dim(&format!("({})", msg.message_date))
        );
    }
    out
}

#[must_use]
pub fn render_statistics(theme: Theme, stats: &Statistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", theme.heading("Database Statistics"));
    let _ = writeln!(out, "{}", theme.dim(&"─".repeat(40)));
    let rows = [
        ("Total Users Tracked:", stats.users),
        ("Total Messages Logged:", stats.messages),
        ("Total Chats Monitored:", stats.chats),
        ("Username Changes:", stats.username_changes),
    ];
    for (label, value) in rows {
        let _ = writeln!(
            out,
            "  {} {:>10}",
            theme.label(&format!("{label:<24}")),
            format_number(value)
        );
    }
    out
}

#[must_use]
pub fn render_doctor_report(theme: Theme, report: &DoctorReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", theme.heading("tgwatch doctor"));
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => theme.success("✓"),
            CheckStatus::Warning => theme.warning("!"),
            CheckStatus::Error => theme.error("✗"),
        };
        let _ = writeln!(
            out,
            "  {marker} [{}] {}",
            check.category,
            theme.label(&check.name)
        );
        for line in check.message.lines() {
            let _ = writeln!(out, "      {line}");
        }
        if let Some(suggestion) = &check.suggestion {
            let _ = writeln!(out, "      {}", theme.dim(&format!("hint: {suggestion}")));
        }
    }
    let _ = writeln!(
        out,
        "\n{} passed, {} warnings, {} errors",
        report.passed, report.warnings, report.errors
    );
    out
}

/// Session log files for the console `logs` command.
#[must_use]
pub fn render_session_logs(theme: Theme, log_dir: &Path, logs: &[PathBuf]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", theme.label("Log directory:"), log_dir.display());
    if logs.is_empty() {
        let _ = writeln!(out, "{}", theme.warning("No session logs yet"));
        return out;
    }
    for (idx, path) in logs.iter().enumerate() {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());
        let marker = if idx == 0 { " (latest)" } else { "" };
        let _ = writeln!(out, "  {name}{}", theme.dim(marker));
    }
    out
}
