use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use netlog_core::{ConnectionLog, MergeScheduler, RawEvent, Settings};

mod view;

/// netlog - Buffered, filterable history of network connection events
///
/// Reads one JSON connection event per line from stdin.
#[derive(Parser, Debug)]
#[command(name = "netlog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum number of entries kept in the buffer and history
    #[arg(long)]
    max_entries: Option<usize>,

    /// Merge period in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Comma-separated include filter
    #[arg(long)]
    include: Option<String>,

    /// Comma-separated exclude filter
    #[arg(long)]
    exclude: Option<String>,

    /// Show and match resolved host names
    #[arg(long)]
    resolve_hosts: bool,

    /// Show and match resolved service names
    #[arg(long)]
    resolve_ports: bool,

    /// Number of displayed rows printed on each update
    #[arg(long, default_value = "20")]
    tail: usize,
}

const DEFAULT_LOG_FILTER: &str = "warn";

/// How long shutdown waits for in-flight async tasks
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    let args = Args::parse();

    // Rows go to stdout, diagnostics to stderr
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let result = runtime.block_on(run_app(args));
    shutdown_runtime(runtime);

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// `RUST_LOG` when set, otherwise warnings and errors only
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Tear the runtime down without joining the stdin reader
///
/// The reader sits in a blocking `read` until the next line or EOF, so
/// waiting for it would hang an interrupted run.
fn shutdown_runtime(runtime: Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

/// Load the settings file (if any) and apply command-line overrides
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(max) = args.max_entries {
        settings.max_log_entries = max;
    }
    if let Some(ms) = args.interval_ms {
        settings.merge_interval_ms = ms;
    }
    if let Some(include) = &args.include {
        settings.filter.include = include.clone();
    }
    if let Some(exclude) = &args.exclude {
        settings.filter.exclude = exclude.clone();
    }
    settings.resolve_hosts |= args.resolve_hosts;
    settings.resolve_ports |= args.resolve_ports;

    settings.validate()?;
    Ok(settings)
}

/// Feed events from `input` into the log until EOF
///
/// Returns the number of events accepted.
fn read_events<R: BufRead>(input: R, log: &ConnectionLog) -> io::Result<usize> {
    let mut accepted = 0;

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match RawEvent::from_json_line(&line) {
            Ok(event) => {
                if log.on_new_log_entry(event) {
                    accepted += 1;
                }
            }
            Err(e) => warn!(line = index + 1, "skipping malformed event: {}", e),
        }
    }

    Ok(accepted)
}

async fn run_app(args: Args) -> Result<()> {
    let settings = load_settings(&args)?;
    let rules = settings.filter_rules();

    let log = ConnectionLog::new(
        settings.max_entries()?,
        Arc::new(settings.directory()),
        Arc::new(settings.resolver()),
    )
    .with_filter(rules.clone())
    .with_resolve_options(settings.resolve_options());

    info!(
        max_entries = log.max_entries(),
        apps = settings.apps.len(),
        include = ?rules.include.tokens(),
        exclude = ?rules.exclude.tokens(),
        "starting"
    );

    let mut changes = log.subscribe();
    let scheduler = MergeScheduler::start(log.clone(), settings.merge_interval()?);

    // Capture source: a dedicated blocking reader on stdin
    let mut reader = {
        let log = log.clone();
        tokio::task::spawn_blocking(move || read_events(io::stdin().lock(), &log))
    };

    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }

            changed = changes.recv() => {
                match changed {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        view::render(&mut stdout, &log, args.tail)?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = &mut reader => {
                let accepted = result.context("event reader panicked")??;
                info!(accepted, "end of input");
                break;
            }
        }
    }

    scheduler.shutdown().await;

    // Pick up anything that arrived after the last cycle
    if !log.buffer_is_empty() {
        log.merge();
        view::render(&mut stdout, &log, args.tail)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlog_core::{AppDirectory, Criteria, OwnerIdentity, TableResolver};
    use std::num::NonZeroUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    #[test]
    fn test_read_events_skips_bad_lines() {
        let directory: AppDirectory = [OwnerIdentity::new(10042, "browser".to_string())]
            .into_iter()
            .collect();
        let log = ConnectionLog::new(
            NonZeroUsize::new(10).unwrap(),
            Arc::new(directory),
            Arc::new(TableResolver::default()),
        );

        let input = concat!(
            r#"{"uid":10042,"src":"10.0.0.1","spt":1,"dst":"10.0.0.2","dpt":443,"len":60,"timestamp":0}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"uid":99999,"src":"10.0.0.1","spt":2,"dst":"10.0.0.2","dpt":443,"len":60,"timestamp":0}"#,
            "\n",
        );

        let accepted = read_events(input.as_bytes(), &log).unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(log.buffered().len(), 1);
    }

    #[test]
    fn test_cli_overrides_settings() {
        let args = Args::parse_from([
            "netlog",
            "--max-entries",
            "5",
            "--include",
            "Browser,443",
            "--resolve-ports",
        ]);
        let settings = load_settings(&args).unwrap();

        assert_eq!(settings.max_log_entries, 5);
        assert!(settings.resolve_ports);
        assert!(!settings.resolve_hosts);
        assert_eq!(
            settings.filter_rules().include,
            Criteria::parse("browser, 443", settings.filter.include_fields)
        );
    }

    #[test]
    fn test_zero_max_entries_rejected() {
        let args = Args::parse_from(["netlog", "--max-entries", "0"]);
        assert!(load_settings(&args).is_err());
    }

    #[test]
    fn test_log_filter_honours_rust_log_level() {
        use tracing::level_filters::LevelFilter;

        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(Some("info")).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            log_filter(Some("netlog_core=debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn test_shutdown_does_not_wait_for_blocked_reader() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        // Stands in for a reader blocked on an idle stdin
        let (release, blocked) = mpsc::channel::<()>();
        runtime.spawn_blocking(move || blocked.recv());

        let started = Instant::now();
        shutdown_runtime(runtime);
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(release);
    }
}
