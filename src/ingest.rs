use crate::config::Config;
use crate::copy::{stream_rows, PgCopySink};
use crate::count::count_rows;
use crate::db;
use crate::io::reader_from_path;
use crate::producer::Producer;
use crate::progress::ProgressReporter;
use crate::schema::{TARGET_COLUMNS, TARGET_TABLE};
use crate::IngestResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows the server reported for the COPY.
    pub copied: u64,
    /// Data rows seen by the pre-pass (0 when skipped).
    pub counted: u64,
    /// Rows the producer handed to the channel.
    pub published: u64,
    pub elapsed: Duration,
}

/// Load `config.csv_path` into `domain_ranking` as one COPY.
///
/// Pool, pre-pass and header problems fail before the COPY starts. Once it is
/// running, any failure rolls the whole statement back.
pub async fn run(config: &Config) -> IngestResult<IngestReport> {
    let start = Instant::now();

    let pool = db::connect(&config.database_url, config.max_connections).await?;
    let result = ingest_with_pool(&pool, config, start).await;
    pool.close().await;
    result
}

async fn ingest_with_pool(
    pool: &sqlx::PgPool,
    config: &Config,
    start: Instant,
) -> IngestResult<IngestReport> {
    let counted = count_rows(&config.csv_path, config.charset, config.count_mode).await?;
    tracing::info!(path = %config.csv_path.display(), rows = counted, mode = ?config.count_mode, "pre-pass complete");

    let (reader, _meta) = reader_from_path(&config.csv_path, config.charset).await?;
    let producer = Producer::from_reader(reader).await?;

    let sink = PgCopySink::begin(pool, TARGET_TABLE, &TARGET_COLUMNS).await?;
    let published = Arc::new(AtomicU64::new(0));
    let progress = ProgressReporter::new(published.clone(), counted)
        .with_interval(config.progress_interval)
        .spawn();

    match stream_rows(producer, sink, config.buffer, published.clone()).await {
        Ok(copied) => {
            let elapsed = start.elapsed();
            progress.finish(copied, elapsed).await;
            if counted != 0 && copied != counted {
                tracing::warn!(counted, copied, "row count changed between pre-pass and copy");
            }
            Ok(IngestReport {
                copied,
                counted,
                published: published.load(Ordering::Acquire),
                elapsed,
            })
        }
        Err(e) => {
            progress.abandon().await;
            Err(e)
        }
    }
}
