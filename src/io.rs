use crate::IngestResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::codec::Transcoder;

/// Compression wrapped around the CSV bytes, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Compression::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("zst") => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceMeta {
    /// File the bytes come from (for logs only).
    pub path: PathBuf,
    pub compression: Compression,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            compression: Compression::None,
            charset: encoding_rs::UTF_8,
        }
    }
}

/// Wrap a raw reader with optional decompression and UTF-8 transcoding.
pub fn build_csv_reader<R>(raw: R, meta: &SourceMeta) -> impl AsyncRead + Unpin + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // 1 MiB read buffer, the file is scanned front to back twice
    let buf = BufReader::with_capacity(1 << 20, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = match meta.compression {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };

    let reader: Box<dyn AsyncRead + Unpin + Send> = if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    };
    reader
}

/// Open a local CSV file for one sequential pass.
pub async fn reader_from_path(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> IngestResult<(impl AsyncRead + Unpin + Send, SourceMeta)> {
    let file = File::open(path).await?;
    let meta = SourceMeta {
        path: path.to_path_buf(),
        compression: Compression::from_path(path),
        charset,
    };
    tracing::debug!(path = %path.display(), compression = ?meta.compression, charset = meta.charset.name(), "opened csv source");
    Ok((build_csv_reader(file, &meta), meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_follows_extension() {
        assert_eq!(Compression::from_path(Path::new("a/majestic_million.csv")), Compression::None);
        assert_eq!(Compression::from_path(Path::new("m.csv.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("m.csv.ZST")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("noext")), Compression::None);
    }
}
