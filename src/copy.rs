//! Consumer side: `COPY ... FROM STDIN` fed from a [`RowSource`].
//!
//! Rows are encoded as CSV with every field quoted, so an empty field reaches
//! the server as an empty string rather than NULL. Type coercion from text is
//! left to the server.

use crate::producer::Producer;
use crate::source::RowSource;
use crate::{IngestError, IngestResult};
use async_trait::async_trait;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgCopyIn, PgPool, PgPoolCopyExt};
use sqlx::Postgres;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Encoded bytes accumulated before each `send`.
pub const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Destination of an in-progress COPY.
///
/// `finish` commits and returns the server's row count; `abort` makes the
/// server reject the statement so nothing sent so far is kept.
#[async_trait]
pub trait CopySink: Send {
    async fn send(&mut self, chunk: Vec<u8>) -> IngestResult<()>;
    async fn finish(self) -> IngestResult<u64>;
    async fn abort(self, reason: String) -> IngestResult<()>;
}

/// `COPY <table> (<columns>) FROM STDIN` on one pooled connection.
pub struct PgCopySink {
    copy: PgCopyIn<PoolConnection<Postgres>>,
}

impl PgCopySink {
    pub async fn begin(pool: &PgPool, table: &str, columns: &[&str]) -> IngestResult<Self> {
        let statement = copy_statement(table, columns);
        tracing::debug!(%statement, "starting copy");
        let copy = pool.copy_in_raw(&statement).await?;
        Ok(Self { copy })
    }
}

#[async_trait]
impl CopySink for PgCopySink {
    async fn send(&mut self, chunk: Vec<u8>) -> IngestResult<()> {
        self.copy.send(chunk).await?;
        Ok(())
    }

    async fn finish(self) -> IngestResult<u64> {
        Ok(self.copy.finish().await?)
    }

    async fn abort(self, reason: String) -> IngestResult<()> {
        Ok(self.copy.abort(reason).await?)
    }
}

pub fn copy_statement(table: &str, columns: &[&str]) -> String {
    let columns = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv)",
        quote_ident(table),
        columns
    )
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Turns rows into COPY CSV bytes.
pub struct RowEncoder {
    writer: csv::Writer<Vec<u8>>,
}

impl Default for RowEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowEncoder {
    pub fn new() -> Self {
        Self {
            writer: Self::writer(),
        }
    }

    fn writer() -> csv::Writer<Vec<u8>> {
        WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::with_capacity(COPY_CHUNK_BYTES + (8 << 10)))
    }

    pub fn push<T: AsRef<[u8]>>(&mut self, row: &[T]) -> IngestResult<()> {
        self.writer.write_record(row)?;
        Ok(())
    }

    /// Encoded bytes the writer has flushed into its output vector.
    ///
    /// Rows still sitting in the writer's internal buffer are not counted, so
    /// this lags behind [`push`](Self::push) by at most one buffer.
    pub fn flushed_len(&self) -> usize {
        self.writer.get_ref().len()
    }

    /// Hand over everything encoded so far and start a fresh output vector.
    pub fn take(&mut self) -> IngestResult<Vec<u8>> {
        let full = std::mem::replace(&mut self.writer, Self::writer());
        full.into_inner().map_err(|e| IngestError::Io(e.into_error()))
    }
}

/// Drain `source` into `sink`.
///
/// A producer failure aborts the COPY and is returned as the error; a sink
/// failure is returned as is (dropping the COPY rolls it back).
pub async fn copy_rows<S: CopySink>(
    source: &mut RowSource,
    mut sink: S,
    chunk_bytes: usize,
) -> IngestResult<u64> {
    let mut encoder = RowEncoder::new();

    while source.advance().await {
        encoder.push(source.current().as_slice())?;
        if encoder.flushed_len() >= chunk_bytes {
            sink.send(encoder.take()?).await?;
        }
    }

    if let Some(err) = source.take_error() {
        if let Err(abort_err) = sink.abort(err.to_string()).await {
            tracing::warn!(error = %abort_err, "aborting copy failed");
        }
        return Err(err);
    }

    let tail = encoder.take()?;
    if !tail.is_empty() {
        sink.send(tail).await?;
    }
    sink.finish().await
}

/// Run the producer on its own task and the COPY consumer on this one.
///
/// Returns the row count reported by the sink.
pub async fn stream_rows<R, S>(
    producer: Producer<R>,
    sink: S,
    capacity: usize,
    published: Arc<AtomicU64>,
) -> IngestResult<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
    S: CopySink,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let producer_task = tokio::spawn(producer.run(tx, published));

    let mut source = RowSource::new(rx);
    let copied = copy_rows(&mut source, sink, COPY_CHUNK_BYTES).await;
    // a producer parked on a full channel sees the receiver gone and returns
    drop(source);

    let sent = producer_task.await?;
    let copied = copied?;
    tracing::debug!(published = sent, copied, "copy stream drained");
    Ok(copied)
}
