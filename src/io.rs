use crate::codec::Utf8Transcoder;
use crate::constants::READ_BUFFER_CAPACITY;
use crate::IngestResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Transport details of an upload, as a multipart form or a file path gives them.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    /// e.g. "text/csv" or "application/gzip"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// Original file name, used for the extension fallback.
    pub file_name: String,
    /// Defaults to UTF-8.
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for UploadMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            file_name: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    // encoding header first, then content type, then extension
    fn detect(meta: &UploadMeta) -> Self {
        let ce = meta.content_encoding.to_ascii_lowercase();
        let ct = meta.content_type.to_ascii_lowercase();
        let name = meta.file_name.to_ascii_lowercase();
        let encoded = |token: &str| ce.split(',').any(|s| s.trim() == token);

        if encoded("gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || name.ends_with(".gz")
        {
            Compression::Gzip
        } else if encoded("zstd") || ct == "application/zstd" || name.ends_with(".zst") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// Accept uploads that are CSV by content type or by file name.
pub fn is_csv_upload(meta: &UploadMeta) -> bool {
    let ct = meta.content_type.to_ascii_lowercase();
    let name = meta.file_name.to_ascii_lowercase();
    ct.split(';').next().map(str::trim) == Some("text/csv")
        || [".csv", ".csv.gz", ".csv.zst"]
            .iter()
            .any(|ext| name.ends_with(ext))
}

/// Wrap `raw` with decompression and UTF-8 transcoding as `meta` requires.
pub fn build_reader<R>(raw: R, meta: UploadMeta) -> (impl AsyncRead + Unpin + Send, UploadMeta)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let compression = Compression::detect(&meta);
    debug!(?compression, charset = meta.charset.name(), file = %meta.file_name, "opening upload");

    let buf = BufReader::with_capacity(READ_BUFFER_CAPACITY, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = match compression {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };

    let reader: Box<dyn AsyncRead + Unpin + Send> = if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    };

    (reader, meta)
}

/// Open a local upload; metadata comes from the extension only.
pub async fn reader_from_path(path: &Path) -> IngestResult<(impl AsyncRead + Unpin + Send, UploadMeta)> {
    let file = File::open(path).await?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut meta = UploadMeta {
        file_name,
        ..Default::default()
    };
    match path.extension().and_then(|s| s.to_str()).unwrap_or_default() {
        "gz" => {
            meta.content_type = "application/gzip".into();
            meta.content_encoding = "gzip".into();
        }
        "zst" => {
            meta.content_type = "application/zstd".into();
            meta.content_encoding = "zstd".into();
        }
        _ => meta.content_type = "text/csv".into(),
    }

    Ok(build_reader(file, meta))
}
