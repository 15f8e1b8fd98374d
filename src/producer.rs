//! CSV side of the pipeline.
//!
//! [`Producer::from_reader`] consumes the header record and resolves the
//! permutation before anything is published, so header problems never touch
//! the database. [`Producer::run`] then decodes the remaining records in file
//! order and pushes reshaped rows into a bounded channel.
//!
//! Quoting is strict: a bare `"` in an unquoted field, text after a closing
//! quote, or a quoted field still open at EOF ends the stream with an error.

use crate::codec::QuoteCheck;
use crate::schema::{build_permutation, map_headers, Permutation, Row, HEADER_ALIASES, TARGET_COLUMNS};
use crate::{IngestError, IngestResult};
use bytes::BytesMut;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

/// Channel item: a row, or the decode error that ended the stream.
pub type RowMessage = IngestResult<Row>;

/// Input bytes after RFC 4180 quote validation.
type Checked<R> = StreamReader<FramedRead<R, QuoteCheck>, BytesMut>;

pub struct Producer<R> {
    reader: AsyncReader<Checked<R>>,
    permutation: Permutation,
    header_width: usize,
}

impl<R> Producer<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Read the header record and build the permutation into target order.
    pub async fn from_reader(reader: R) -> IngestResult<Self> {
        let mut reader = AsyncReaderBuilder::new()
            .has_headers(true)
            // every record must be as wide as the header
            .flexible(false)
            .buffer_capacity(1 << 20)
            .create_reader(StreamReader::new(FramedRead::new(reader, QuoteCheck::new(b','))));

        let headers = reader.headers().await?.clone();
        let mapped = map_headers(headers.iter(), HEADER_ALIASES)?;
        let permutation = build_permutation(&mapped, &TARGET_COLUMNS)?;
        tracing::debug!(?mapped, permutation = ?permutation.indices(), "resolved csv header");

        Ok(Self {
            reader,
            permutation,
            header_width: headers.len(),
        })
    }

    pub fn permutation(&self) -> &Permutation {
        &self.permutation
    }

    /// Publish every data record, in order, then close the channel.
    ///
    /// `published` is bumped once per row accepted by the channel. A decode
    /// error is sent down the channel as the terminal message. If the receiver
    /// goes away the producer stops quietly; the consumer owns that failure.
    /// Returns the number of rows published.
    pub async fn run(mut self, tx: mpsc::Sender<RowMessage>, published: Arc<AtomicU64>) -> u64 {
        let mut record = StringRecord::new();
        let mut sent = 0u64;

        loop {
            let row = match self.reader.read_record(&mut record).await {
                Ok(true) => self.reshape(&record),
                Ok(false) => break,
                Err(e) => Err(IngestError::from(e)),
            };

            let failed = row.is_err();
            if let Err(e) = &row {
                tracing::error!(error = %e, rows = sent, "csv decode failed, closing stream");
            }
            if tx.send(row).await.is_err() {
                tracing::debug!(rows = sent, "row channel closed by consumer");
                return sent;
            }
            if failed {
                return sent;
            }

            sent += 1;
            published.fetch_add(1, Ordering::Release);
        }

        tracing::debug!(rows = sent, "producer reached end of file");
        sent
    }

    fn reshape(&self, record: &StringRecord) -> IngestResult<Row> {
        self.permutation
            .reshape(|idx| record.get(idx))
            .ok_or_else(|| IngestError::ShortRecord {
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                expected: self.header_width,
                found: record.len(),
            })
    }
}
