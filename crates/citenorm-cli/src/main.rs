use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use citenorm_core::config_file::{self, ConfigFile};
use citenorm_core::store::MemoryStore;
use citenorm_core::{
    Config, ProgressEvent, ReferenceDatabase, StatusStore, StoreKind, TitleMatcher,
    clean_journal_title,
};
use citenorm_ingest::DocumentFilter;

mod output;

use output::ColorMode;

/// Standardize cited journal titles to canonical ISSN-Ls
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Standardize the article citations of a document dump
    Standardize(StandardizeArgs),

    /// Show table sizes of a reference snapshot
    Info {
        /// Path to the reference snapshot
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Show exact and fuzzy candidates for a journal title
    Match {
        /// Raw cited journal title
        title: String,

        /// Path to the reference snapshot
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[derive(Args, Debug, Default)]
struct StandardizeArgs {
    /// Documents to process (NDJSON or JSON array, optionally gzipped)
    input: PathBuf,

    /// Path to the reference snapshot
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Enable exact title matching
    #[arg(long)]
    exact: bool,

    /// Enable fuzzy title matching
    #[arg(long)]
    fuzzy: bool,

    /// Status store backend
    #[arg(long)]
    store: Option<StoreKind>,

    /// Status store location (default: $DIR_DATA/std-results-<time>.<ext>)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Only documents of this collection
    #[arg(long)]
    collection: Option<String>,

    /// Only documents processed on or after this date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Only documents processed on or before this date (YYYY-MM-DD)
    #[arg(long)]
    until: Option<String>,

    /// Only the document with this PID
    #[arg(long)]
    pid: Option<String>,

    /// Number of worker tasks
    #[arg(long)]
    workers: Option<usize>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Match and report without writing any records
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    let file_config = config_file::load_config();

    match cli.command {
        Command::Standardize(args) => standardize(args, &file_config).await,
        Command::Info { snapshot, no_color } => {
            let path = resolve_snapshot(snapshot, &file_config, env_var)?;
            info(&path, ColorMode(!no_color))
        }
        Command::Match {
            title,
            snapshot,
            no_color,
        } => {
            let path = resolve_snapshot(snapshot, &file_config, env_var)?;
            match_title(&title, &path, ColorMode(!no_color))
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// Resolve configuration: CLI flags > env vars > config file > defaults
fn resolve_config(
    args: &StandardizeArgs,
    file: &ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Config {
    let mut config = Config::default();
    config_file::apply(file, &mut config);

    if let Some(path) = env("CITENORM_SNAPSHOT") {
        config.snapshot_path = Some(PathBuf::from(path));
    }
    if let Some(path) = env("CITENORM_STORE_PATH") {
        config.store_path = Some(PathBuf::from(path));
    }
    if let Some(dir) = env("DIR_DATA") {
        config.data_dir = PathBuf::from(dir);
    }

    if let Some(path) = &args.snapshot {
        config.snapshot_path = Some(path.clone());
    }
    if let Some(kind) = args.store {
        config.store_kind = kind;
    }
    if let Some(path) = &args.store_path {
        config.store_path = Some(path.clone());
    }
    if args.exact || args.fuzzy {
        config.use_exact = args.exact;
        config.use_fuzzy = args.fuzzy;
    }
    if let Some(n) = args.workers {
        config.num_workers = n.max(1);
    }
    config
}

fn resolve_snapshot(
    flag: Option<PathBuf>,
    file: &ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<PathBuf> {
    flag.or_else(|| env("CITENORM_SNAPSHOT").map(PathBuf::from))
        .or_else(|| {
            file.snapshot
                .as_ref()
                .and_then(|s| s.path.as_ref())
                .map(PathBuf::from)
        })
        .ok_or_else(|| {
            anyhow::anyhow!("No reference snapshot given. Pass --snapshot or set CITENORM_SNAPSHOT.")
        })
}

fn build_filter(args: &StandardizeArgs) -> anyhow::Result<DocumentFilter> {
    Ok(DocumentFilter {
        collection: args.collection.clone(),
        from: args.from.as_deref().map(citenorm_ingest::parse_date).transpose()?,
        until: args.until.as_deref().map(citenorm_ingest::parse_date).transpose()?,
        pid: args.pid.clone(),
    })
}

async fn standardize(args: StandardizeArgs, file_config: &ConfigFile) -> anyhow::Result<()> {
    let config = resolve_config(&args, file_config, env_var);
    let color = ColorMode(!args.no_color);
    let mut out = std::io::stdout();

    if config.snapshot_path.is_none() {
        anyhow::bail!("No reference snapshot given. Pass --snapshot or set CITENORM_SNAPSHOT.");
    }
    if !args.input.exists() {
        anyhow::bail!("Input not found: {}", args.input.display());
    }
    if !config.use_exact && !config.use_fuzzy {
        tracing::warn!("exact and fuzzy matching are both disabled; nothing will be matched");
    }

    let engine = Arc::new(citenorm_core::build_engine(&config)?);

    let (store, store_desc): (Arc<dyn StatusStore>, String) = if args.dry_run {
        (Arc::new(MemoryStore::new()), "dry run, nothing persisted".into())
    } else {
        let path = config.resolved_store_path();
        let store = citenorm_core::build_store(&Config {
            store_path: Some(path.clone()),
            ..config.clone()
        })?;
        let desc = format!("{}: {}", store.name(), path.display());
        (store, desc)
    };

    let filter = build_filter(&args)?;
    let documents = citenorm_ingest::read_documents(&args.input, &filter)?;
    if documents.is_empty() {
        writeln!(out, "No documents to process.")?;
        return Ok(());
    }

    let pb = indicatif::ProgressBar::new(documents.len() as u64);
    pb.set_style(
        indicatif::ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.green/dim}] {pos}/{len} documents ({eta}) {msg}",
        )?
        .progress_chars("=> "),
    );

    let progress_cb = {
        let pb = pb.clone();
        move |event: ProgressEvent| match event {
            ProgressEvent::DocumentStarted { .. } => {}
            ProgressEvent::DocumentFinished { pid, .. } => {
                pb.inc(1);
                pb.set_message(pid);
            }
            ProgressEvent::Warning { pid, message } => {
                pb.println(output::format_warning(&pid, &message, color));
            }
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let stats = citenorm_core::standardize_documents(
        documents,
        engine,
        store,
        config.num_workers,
        progress_cb,
        cancel,
    )
    .await;
    pb.finish_and_clear();

    output::print_summary(&mut out, &stats, &store_desc, color)?;

    if stats.cancelled {
        anyhow::bail!("Interrupted");
    }
    Ok(())
}

fn info(path: &Path, color: ColorMode) -> anyhow::Result<()> {
    let db = ReferenceDatabase::open(path)?;
    output::print_db_info(&mut std::io::stdout(), path, &db.info(), color)?;
    Ok(())
}

fn match_title(title: &str, path: &Path, color: ColorMode) -> anyhow::Result<()> {
    let db = ReferenceDatabase::open(path)?;
    let cleaned = clean_journal_title(title);
    if cleaned.is_empty() {
        anyhow::bail!("Title '{title}' is empty after cleaning");
    }

    let matcher = TitleMatcher::new(&db);
    let exact = matcher.match_exact(&cleaned);
    let fuzzy = matcher.match_fuzzy(&cleaned);
    output::print_match(&mut std::io::stdout(), title, &cleaned, &exact, &fuzzy, &db, color)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use citenorm_core::config_file::{MatchingConfig, SnapshotConfig, StoreConfig};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn args() -> StandardizeArgs {
        StandardizeArgs {
            input: PathBuf::from("docs.jsonl"),
            ..StandardizeArgs::default()
        }
    }

    fn file_config() -> ConfigFile {
        ConfigFile {
            snapshot: Some(SnapshotConfig {
                path: Some("/cfg/refdb.json".into()),
            }),
            store: Some(StoreConfig {
                kind: Some(StoreKind::Sqlite),
                path: Some("/cfg/std.db".into()),
                data_dir: None,
            }),
            matching: Some(MatchingConfig {
                use_exact: Some(true),
                use_fuzzy: Some(true),
            }),
            ..ConfigFile::default()
        }
    }

    #[test]
    fn defaults_without_any_source() {
        let config = resolve_config(&args(), &ConfigFile::default(), no_env);
        assert!(config.snapshot_path.is_none());
        assert!(config.use_exact);
        assert!(!config.use_fuzzy);
        assert_eq!(config.store_kind, StoreKind::Jsonl);
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn env_overrides_config_file() {
        let env = |key: &str| match key {
            "CITENORM_SNAPSHOT" => Some("/env/refdb.json".to_string()),
            "DIR_DATA" => Some("/env/data".to_string()),
            _ => None,
        };
        let config = resolve_config(&args(), &file_config(), env);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/env/refdb.json")));
        assert_eq!(config.store_path, Some(PathBuf::from("/cfg/std.db")));
        assert_eq!(config.data_dir, PathBuf::from("/env/data"));
        assert_eq!(config.store_kind, StoreKind::Sqlite);
    }

    #[test]
    fn flags_override_everything() {
        let args = StandardizeArgs {
            snapshot: Some(PathBuf::from("/flag/refdb.json")),
            fuzzy: true,
            store: Some(StoreKind::Jsonl),
            workers: Some(0),
            ..args()
        };
        let env = |key: &str| (key == "CITENORM_SNAPSHOT").then(|| "/env/refdb.json".to_string());
        let config = resolve_config(&args, &file_config(), env);

        assert_eq!(config.snapshot_path, Some(PathBuf::from("/flag/refdb.json")));
        assert_eq!(config.store_kind, StoreKind::Jsonl);
        // Explicit mode flags replace both configured toggles.
        assert!(!config.use_exact);
        assert!(config.use_fuzzy);
        assert_eq!(config.num_workers, 1);
    }

    #[test]
    fn snapshot_resolution_order() {
        let file = file_config();
        assert_eq!(
            resolve_snapshot(None, &file, no_env).unwrap(),
            PathBuf::from("/cfg/refdb.json")
        );
        assert_eq!(
            resolve_snapshot(Some("/flag".into()), &file, no_env).unwrap(),
            PathBuf::from("/flag")
        );
        assert!(resolve_snapshot(None, &ConfigFile::default(), no_env).is_err());
    }

    #[test]
    fn filter_rejects_bad_dates() {
        let bad = StandardizeArgs {
            from: Some("yesterday".into()),
            ..args()
        };
        assert!(build_filter(&bad).is_err());

        let good = StandardizeArgs {
            collection: Some("scl".into()),
            until: Some("2020-12-31".into()),
            ..args()
        };
        let filter = build_filter(&good).unwrap();
        assert_eq!(filter.collection.as_deref(), Some("scl"));
        assert!(filter.until.is_some());
    }

    #[test]
    fn cli_parses_standardize_flags() {
        let cli = Cli::try_parse_from([
            "citenorm",
            "-v",
            "standardize",
            "docs.jsonl",
            "--snapshot",
            "refdb.json.gz",
            "--exact",
            "--fuzzy",
            "--store",
            "sqlite",
            "--collection",
            "scl",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Command::Standardize(args) = cli.command else {
            panic!("expected standardize");
        };
        assert!(args.exact && args.fuzzy);
        assert_eq!(args.store, Some(StoreKind::Sqlite));
        assert!(Cli::try_parse_from(["citenorm", "standardize", "x", "--store", "mongo"]).is_err());
    }
}
