//! Tracing setup for the CLI.

use std::path::Path;
use std::sync::OnceLock;

use tracing_subscriber::prelude::*;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Picks the base log level: each `-v` raises the configured level one step.
pub fn effective_level(configured: &str, verbose: u8) -> tracing::Level {
    const LADDER: [tracing::Level; 5] = [
        tracing::Level::ERROR,
        tracing::Level::WARN,
        tracing::Level::INFO,
        tracing::Level::DEBUG,
        tracing::Level::TRACE,
    ];
    let base = configured.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let start = LADDER.iter().position(|l| *l == base).unwrap_or(2);
    LADDER[(start + verbose as usize).min(LADDER.len() - 1)]
}

/// Installs the global subscriber: stderr always, plus a daily-rolling file when `log_dir` is set.
///
/// Stdout is left for command output.
pub fn init_logging(level: tracing::Level, log_dir: Option<&Path>) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(cfg!(debug_assertions));

    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Log directory {} unavailable: {}", dir.display(), e);
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(dir, "nicetouch.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    // Already initialized is fine.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
