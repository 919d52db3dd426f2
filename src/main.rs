//! tgwatch - Telegram bot update collector
//!
//! Main entry point for the tgwatch command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tgwatch::config::{TokenStore, mask_token, token_format_ok};
use tgwatch::display::{self, Theme};
use tgwatch::doctor::{self, DoctorReport};
use tgwatch::export::{ExportDocument, default_export_path, export_to_file};
use tgwatch::logging::{OperationGuard, OperationLog, init_cli_logging};
use tgwatch::monitor::MonitorEvent;
use tgwatch::repl::{self, ReplSession};
use tgwatch::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_cli_logging(cli.quiet, cli.verbose);

    if let Err(err) = run(cli).await {
        report_error(&err);
        std::process::exit(1);
    }
}

fn report_error(err: &anyhow::Error) {
    if let Some(watch) = err.downcast_ref::<WatchError>() {
        let hints: Vec<&str> = watch.suggestion().into_iter().collect();
        eprintln!("{}", format_error(&watch.to_string(), "", &hints));
    } else {
        eprintln!("{} {err:#}", "Error:".red().bold());
    }
}

/// Everything a command needs from the invocation.
struct AppContext {
    config: Config,
    theme: Theme,
    format: OutputFormat,
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load();
    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }
    if let Some(token) = &cli.token {
        config.telegram.token = Some(token.trim().to_string());
    }
    let format = cli
        .format
        .unwrap_or_else(|| OutputFormat::from_config(&config.output.format));
    let theme = Theme {
        colors: config.output.colors,
    };
    if !theme.colors {
        colored::control::set_override(false);
    }

    let ctx = AppContext {
        config,
        theme,
        format,
    };

    match cli.command {
        Commands::Validate => cmd_validate(&ctx).await,
        Commands::BotInfo => cmd_bot_info(&ctx).await,
        Commands::Monitor(args) => cmd_monitor(&ctx, &args).await,
        Commands::User(args) => cmd_user(&ctx, args.user_id),
        Commands::History(args) => cmd_history(&ctx, args.user_id),
        Commands::Messages(args) => cmd_messages(&ctx, &args),
        Commands::SearchUsers(args) => cmd_search_users(&ctx, &args.query),
        Commands::Search(args) => cmd_search(&ctx, &args),
        Commands::Stats => cmd_stats(&ctx),
        Commands::Export(args) => cmd_export(&ctx, &args),
        Commands::Doctor(args) => cmd_doctor(&ctx, &args).await,
        Commands::Repl => cmd_repl(&ctx).await,
        Commands::Token(args) => cmd_token(&ctx, &args),
        Commands::Config(args) => cmd_config(&ctx, &args),
        Commands::Completions(args) => {
            cmd_completions(&args);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let text = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn bot_api(config: &Config) -> Result<BotApi> {
    let token = config.require_token()?;
    Ok(BotApi::with_base_url(token, &config.telegram.api_base)?)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn open_facade(config: &Config) -> Result<QueryFacade> {
    let storage = Storage::open_existing(config.db_path())?;
    Ok(QueryFacade::new(storage))
}

// ============================================================================
// Bot API commands
// ============================================================================

async fn cmd_validate(ctx: &AppContext) -> Result<()> {
    let api = bot_api(&ctx.config)?;
    let pb = spinner("Validating bot token...");
    let valid = api.validate_token().await;
    pb.finish_and_clear();

    if ctx.format.is_json() {
        print_json(&serde_json::json!({ "valid": valid }), ctx.format)?;
    } else if valid {
        println!("{}", ctx.theme.success("✓ Bot token is valid"));
    } else {
        println!("{}", ctx.theme.error("✗ Bot token was rejected"));
    }

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_bot_info(ctx: &AppContext) -> Result<()> {
    let api = bot_api(&ctx.config)?;
    let pb = spinner("Fetching bot info...");
    let result = api.get_me().await;
    pb.finish_and_clear();
    let me = result?;

    if ctx.format.is_json() {
        print_json(&me, ctx.format)
    } else {
        print!("{}", display::render_bot_info(ctx.theme, &me));
        Ok(())
    }
}

async fn cmd_monitor(ctx: &AppContext, args: &MonitorArgs) -> Result<()> {
    let api = bot_api(&ctx.config)?;
    let pb = spinner("Validating bot token...");
    let me = api.get_me().await;
    pb.finish_and_clear();
    let me = me?;

    let db_path = ctx.config.db_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let storage = Storage::open(&db_path)?;

    let mut monitor_config = MonitorConfig::from_config(&ctx.config);
    if let Some(timeout) = args.poll_timeout {
        monitor_config.poll_timeout = timeout;
    }
    monitor_config.max_cycles = if args.once { Some(1) } else { args.max_cycles };

    let theme = ctx.theme;
    let json = ctx.format.is_json();
    let mut monitor = Monitor::new(api, storage, monitor_config).with_observer(move |event| {
        match event {
            MonitorEvent::Stored(record) => {
                progress_line(json, &display::render_logged(theme, record));
            }
            MonitorEvent::Skipped { update_id, reason } => {
                debug!(update_id, %reason, "Skipped update");
            }
            MonitorEvent::Failed { update_id, error } => {
                eprintln!(
                    "{}",
                    theme.error(&format!("[!] Failed to store update {update_id}: {error}"))
                );
            }
            MonitorEvent::TransportError { error } => {
                eprintln!("{}", theme.warning(&format!("[!] Poll failed: {error}")));
            }
        }
    });

    if !args.no_log {
        let log = OperationLog::create_session(&ctx.config.log_dir())?;
        info!(path = %log.path().display(), "Writing operation log");
        monitor = monitor.with_operation_log(log);
    }

    progress_line(
        json,
        &format!(
            "{} @{} ({})\n  Database: {}\n  {}\n",
            theme.heading("Monitoring as"),
            me.username.as_deref().unwrap_or("?"),
            me.first_name,
            db_path.display(),
            theme.dim("Press Ctrl+C to stop")
        ),
    );

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn(cancel_on_signal(cancel.clone()));
    let summary = monitor.run(&cancel).await;
    signal_task.abort();

    progress_line(json, "");
    if ctx.format.is_json() {
        print_json(&summary, ctx.format)
    } else {
        print!("{}", display::render_monitor_summary(theme, &summary));
        Ok(())
    }
}

/// Human-readable progress goes to stderr when stdout carries JSON.
fn progress_line(json: bool, text: &str) {
    if json {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown requested");
    cancel.cancel();
}

// ============================================================================
// Query commands
// ============================================================================

fn cmd_user(ctx: &AppContext, user_id: i64) -> Result<()> {
    let report = open_facade(&ctx.config)?.user_report(user_id)?;
    if ctx.format.is_json() {
        print_json(&report, ctx.format)
    } else {
        print!("{}", display::render_user_report(ctx.theme, &report));
        Ok(())
    }
}

fn cmd_history(ctx: &AppContext, user_id: i64) -> Result<()> {
    let history = open_facade(&ctx.config)?.username_history(user_id)?;
    if ctx.format.is_json() {
        print_json(&history, ctx.format)
    } else {
        print!(
            "{}",
            display::render_username_history(ctx.theme, user_id, &history)
        );
        Ok(())
    }
}

fn cmd_messages(ctx: &AppContext, args: &MessagesArgs) -> Result<()> {
    let limit = args.limit.unwrap_or(ctx.config.search.message_limit);
    let messages = open_facade(&ctx.config)?.user_messages(args.user_id, limit)?;
    if ctx.format.is_json() {
        print_json(&messages, ctx.format)
    } else {
        print!("{}", display::render_message_history(ctx.theme, &messages));
        Ok(())
    }
}

fn cmd_search_users(ctx: &AppContext, query: &str) -> Result<()> {
    let matches = open_facade(&ctx.config)?.search_usernames(query)?;
    if ctx.format.is_json() {
        print_json(&matches, ctx.format)
    } else {
        print!("{}", display::render_user_matches(ctx.theme, &matches));
        Ok(())
    }
}

fn cmd_search(ctx: &AppContext, args: &SearchArgs) -> Result<()> {
    let limit = args.limit.unwrap_or(ctx.config.search.search_limit);
    let hits = open_facade(&ctx.config)?.search_messages(&args.keyword, limit)?;
    if ctx.format.is_json() {
        print_json(&hits, ctx.format)
    } else {
        print!("{}", display::render_search_hits(ctx.theme, &hits));
        Ok(())
    }
}

fn cmd_stats(ctx: &AppContext) -> Result<()> {
    let stats = open_facade(&ctx.config)?.statistics()?;
    if ctx.format.is_json() {
        print_json(&stats, ctx.format)
    } else {
        print!("{}", display::render_statistics(ctx.theme, &stats));
        Ok(())
    }
}

fn cmd_export(ctx: &AppContext, args: &ExportArgs) -> Result<()> {
    let storage = Storage::open_existing(ctx.config.db_path())?;

    if args.stdout {
        ExportDocument::collect(&storage)?.write_to(io::stdout().lock())?;
        return Ok(());
    }

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| default_export_path(&ctx.config.export_dir()));
    let guard = OperationGuard::new("export");
    match export_to_file(&storage, &path) {
        Ok(stats) => {
            guard.complete();
            println!(
                "{} {} users, {} messages to {}",
                ctx.theme.success("✓ Exported"),
                format_number(stats.users),
                format_number(stats.messages),
                path.display()
            );
            Ok(())
        }
        Err(e) => {
            guard.fail(&e);
            Err(e.into())
        }
    }
}

// ============================================================================
// Maintenance commands
// ============================================================================

async fn cmd_doctor(ctx: &AppContext, args: &DoctorArgs) -> Result<()> {
    let mut checks = doctor::config_checks(&ctx.config);

    let db_path = ctx.config.db_path();
    if db_path.exists() {
        let storage = Storage::open_existing(&db_path)?;
        checks.extend(storage.database_health_checks());
    } else {
        checks.push(doctor::missing_database_check(&db_path));
    }

    if !args.offline && ctx.config.telegram.token.is_some() {
        let api = bot_api(&ctx.config)?;
        let pb = spinner("Contacting Bot API...");
        checks.push(doctor::api_check(&api).await);
        pb.finish_and_clear();
    }

    let report = DoctorReport::new(checks);
    if ctx.format.is_json() {
        print_json(&report, ctx.format)?;
    } else {
        print!("{}", display::render_doctor_report(ctx.theme, &report));
    }

    if !report.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_repl(ctx: &AppContext) -> Result<()> {
    let facade = open_facade(&ctx.config)?;
    let mut session = ReplSession::new(
        facade,
        ctx.theme,
        ctx.config.search.message_limit,
        ctx.config.search.search_limit,
    )
    .with_log_dir(ctx.config.log_dir());

    if ctx.config.telegram.token.is_some() {
        match bot_api(&ctx.config)?.get_me().await {
            Ok(me) => session = session.with_bot(me),
            Err(e) => warn!(error = %e, "Bot info unavailable in console"),
        }
    }

    repl::run(session, ctx.config.data_dir().join(HISTORY_FILE_NAME))
}

fn cmd_token(ctx: &AppContext, args: &TokenArgs) -> Result<()> {
    let store = TokenStore::new(ctx.config.token_file());

    if let Some(token) = &args.set {
        let token = token.trim();
        if !token.is_empty() && !token_format_ok(token) {
            println!(
                "{}",
                ctx.theme
                    .warning("Token does not look like <digits>:<secret>; saving anyway")
            );
        }
        store.save(token)?;
        println!(
            "{} {}",
            ctx.theme.success("✓ Token saved to"),
            store.path().display()
        );
    } else if args.clear {
        if store.clear()? {
            println!("{}", ctx.theme.success("✓ Token file removed"));
        } else {
            println!("No token file at {}", store.path().display());
        }
    } else if args.show {
        match ctx.config.telegram.token.as_deref() {
            Some(token) => println!("{}", mask_token(token)),
            None => return Err(WatchError::MissingToken.into()),
        }
    }
    Ok(())
}

fn cmd_config(ctx: &AppContext, args: &ConfigArgs) -> Result<()> {
    if args.init {
        let path = Config::user_config_path()
            .context("Cannot determine the configuration directory")?;
        write_default_config(&path, args.force)?;
        println!(
            "{} {}",
            ctx.theme.success("✓ Wrote configuration to"),
            path.display()
        );
        return Ok(());
    }

    if ctx.format.is_json() {
        let mut shown = ctx.config.clone();
        shown.telegram.token = shown.telegram.token.as_deref().map(mask_token);
        return print_json(&shown, ctx.format);
    }

    let theme = ctx.theme;
    let config = &ctx.config;
    println!("{}", theme.heading("Current Configuration"));
    if let Some(path) = Config::user_config_path() {
        println!("  Config file: {}", path.display());
    }
    println!("  Data dir:    {}", config.data_dir().display());
    println!("  Database:    {}", config.db_path().display());
    println!("  Token file:  {}", config.token_file().display());
    println!("  Logs:        {}", config.log_dir().display());
    println!(
        "  Token:       {}",
        config
            .telegram
            .token
            .as_deref()
            .map_or_else(|| "(not set)".to_string(), mask_token)
    );
    println!("  API base:    {}", config.telegram.api_base);
    println!("  Poll wait:   {}s", config.telegram.poll_timeout);
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save_to(path)?;
    Ok(())
}

fn cmd_completions(args: &CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "tgwatch", &mut io::stdout());
}
