use crate::count::CountMode;
use crate::{IngestError, IngestResult};
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATABASE_URL_VAR: &str = "POSTGRES_URI";
pub const DEFAULT_CSV_PATH: &str = "./csv/majestic_million.csv";
pub const DEFAULT_BUFFER: usize = 500;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Everything the ingest driver needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub csv_path: PathBuf,
    pub charset: &'static encoding_rs::Encoding,
    pub buffer: usize,
    pub max_connections: u32,
    pub count_mode: CountMode,
    pub progress_interval: Duration,
}

pub const DOTENV_FILE: &str = ".env";

/// What happened to the optional `.env` file.
#[derive(Debug)]
pub enum DotenvStatus {
    Loaded(PathBuf),
    Missing,
    Unreadable(dotenvy::Error),
}

/// Load `.env` from the working directory if there is one.
///
/// Runs before logging is set up so a `RUST_LOG` in the file takes effect;
/// hand the status to [`report_dotenv`] once the subscriber is installed.
pub fn load_dotenv() -> DotenvStatus {
    load_dotenv_from(Path::new(DOTENV_FILE))
}

pub fn load_dotenv_from(path: &Path) -> DotenvStatus {
    match dotenvy::from_path(path) {
        Ok(()) => DotenvStatus::Loaded(path.to_path_buf()),
        Err(e) if e.not_found() => DotenvStatus::Missing,
        Err(e) => DotenvStatus::Unreadable(e),
    }
}

pub fn report_dotenv(status: &DotenvStatus) {
    match status {
        DotenvStatus::Loaded(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        DotenvStatus::Missing => tracing::debug!("no .env file, using process environment"),
        DotenvStatus::Unreadable(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }
}

/// `POSTGRES_URI` from the process environment.
pub fn database_url() -> IngestResult<String> {
    match std::env::var(DATABASE_URL_VAR) {
        Ok(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(IngestError::MissingDatabaseUrl),
    }
}

/// Command line of the `ingest` binary.
pub fn command() -> Command {
    Command::new("ingest")
        .about("Bulk-load the Majestic Million CSV into domain_ranking via COPY")
        .arg(
            Arg::new("path")
                .long("path")
                .help("CSV file to load (.gz and .zst are decompressed)")
                .default_value(DEFAULT_CSV_PATH)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("buffer")
                .long("buffer")
                .help("Rows buffered between the CSV reader and COPY")
                .default_value("500")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("max-connections")
                .long("max-connections")
                .help("Upper bound of the connection pool")
                .default_value("4")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .help("Pre-pass used for the progress total: stream, fast or skip")
                .default_value("stream"),
        )
        .arg(
            Arg::new("encoding")
                .long("encoding")
                .help("Input charset label, e.g. utf-8, windows-1252")
                .default_value("utf-8"),
        )
        .arg(
            Arg::new("progress-ms")
                .long("progress-ms")
                .help("Progress redraw interval in milliseconds")
                .default_value("100")
                .value_parser(clap::value_parser!(u64)),
        )
}

impl Config {
    /// Build from parsed flags plus an explicit database URL.
    pub fn from_matches(matches: &ArgMatches, database_url: String) -> IngestResult<Self> {
        let csv_path = matches
            .get_one::<PathBuf>("path")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_PATH));
        let buffer = matches.get_one::<usize>("buffer").copied().unwrap_or(DEFAULT_BUFFER);
        let max_connections = matches
            .get_one::<u32>("max-connections")
            .copied()
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let count_mode = matches
            .get_one::<String>("count")
            .map(|s| s.parse::<CountMode>())
            .transpose()?
            .unwrap_or_default();
        let label = matches
            .get_one::<String>("encoding")
            .map(String::as_str)
            .unwrap_or("utf-8");
        let charset = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| IngestError::Config(format!("unknown encoding label '{label}'")))?;
        let progress_ms = matches.get_one::<u64>("progress-ms").copied().unwrap_or(100);

        if buffer == 0 {
            return Err(IngestError::Config("--buffer must be greater than 0".into()));
        }
        if max_connections == 0 {
            return Err(IngestError::Config(
                "--max-connections must be greater than 0".into(),
            ));
        }

        Ok(Self {
            database_url,
            csv_path,
            charset,
            buffer,
            max_connections,
            count_mode,
            progress_interval: Duration::from_millis(progress_ms.max(1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> IngestResult<Config> {
        let matches = command()
            .try_get_matches_from(std::iter::once("ingest").chain(args.iter().copied()))
            .unwrap();
        Config::from_matches(&matches, "postgres://localhost/test".into())
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]).unwrap();
        assert_eq!(cfg.csv_path, PathBuf::from(DEFAULT_CSV_PATH));
        assert_eq!(cfg.buffer, 500);
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.count_mode, CountMode::Stream);
        assert_eq!(cfg.charset, encoding_rs::UTF_8);
        assert_eq!(cfg.progress_interval, Duration::from_millis(100));
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = parse(&[
            "--path",
            "data/mm.csv.gz",
            "--buffer",
            "64",
            "--count",
            "skip",
            "--encoding",
            "latin1",
        ])
        .unwrap();
        assert_eq!(cfg.csv_path, PathBuf::from("data/mm.csv.gz"));
        assert_eq!(cfg.buffer, 64);
        assert_eq!(cfg.count_mode, CountMode::Skip);
        assert_eq!(cfg.charset, encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn dotenv_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_dotenv_from(&dir.path().join(".env"));
        assert!(matches!(missing, DotenvStatus::Missing), "{missing:?}");

        let path = dir.path().join(".env");
        std::fs::write(&path, "DOMAIN_INGEST_DOTENV_CHECK=from-file\n").unwrap();
        let loaded = load_dotenv_from(&path);
        assert!(matches!(&loaded, DotenvStatus::Loaded(p) if p == &path), "{loaded:?}");
        assert_eq!(
            std::env::var("DOMAIN_INGEST_DOTENV_CHECK").as_deref(),
            Ok("from-file")
        );

        std::fs::write(&path, "NOT A VALID LINE ===\n\"").unwrap();
        assert!(matches!(load_dotenv_from(&path), DotenvStatus::Unreadable(_)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(parse(&["--buffer", "0"]), Err(IngestError::Config(_))));
        assert!(matches!(parse(&["--count", "maybe"]), Err(IngestError::Config(_))));
        assert!(matches!(parse(&["--encoding", "klingon"]), Err(IngestError::Config(_))));
    }
}
