use crate::io::{reader_from_path, Compression};
use crate::{IngestError, IngestResult};
use csv_async::{AsyncReaderBuilder, ByteRecord};
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncRead;

/// How the progress denominator is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    /// Decode the whole file once with the CSV reader.
    #[default]
    Stream,
    /// Count newlines over an mmap (feature `fast_local`, plain files only).
    Fast,
    /// No pre-pass; progress shows raw counts.
    Skip,
}

impl FromStr for CountMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(CountMode::Stream),
            "fast" => Ok(CountMode::Fast),
            "skip" | "none" => Ok(CountMode::Skip),
            other => Err(IngestError::Config(format!(
                "unknown count mode '{other}' (expected stream, fast or skip)"
            ))),
        }
    }
}

/// Number of data records, header excluded. An empty file counts as 0.
pub async fn count_records<R>(reader: R) -> IngestResult<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .buffer_capacity(1 << 20)
        .create_reader(reader);

    let mut record = ByteRecord::new();
    let mut rows = 0u64;
    // ByteRecord skips UTF-8 validation, we only need record boundaries here
    while rdr.read_byte_record(&mut record).await? {
        rows += 1;
    }
    Ok(rows)
}

/// Pre-pass over `path` according to `mode`.
pub async fn count_rows(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
    mode: CountMode,
) -> IngestResult<u64> {
    match mode {
        CountMode::Skip => Ok(0),
        CountMode::Fast
            if Compression::from_path(path) == Compression::None && charset == encoding_rs::UTF_8 =>
        {
            fast_count(path, charset).await
        }
        CountMode::Fast => {
            tracing::warn!(path = %path.display(), "fast count needs an uncompressed UTF-8 file, falling back to stream");
            stream_count(path, charset).await
        }
        CountMode::Stream => stream_count(path, charset).await,
    }
}

async fn stream_count(path: &Path, charset: &'static encoding_rs::Encoding) -> IngestResult<u64> {
    let (reader, _meta) = reader_from_path(path, charset).await?;
    count_records(reader).await
}

#[cfg(feature = "fast_local")]
async fn fast_count(path: &Path, _charset: &'static encoding_rs::Encoding) -> IngestResult<u64> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || crate::fast::count_lines_local(&owned, b'\n')).await?
}

#[cfg(not(feature = "fast_local"))]
async fn fast_count(path: &Path, charset: &'static encoding_rs::Encoding) -> IngestResult<u64> {
    tracing::warn!("built without feature `fast_local`, falling back to stream count");
    stream_count(path, charset).await
}
