//! Request bodies that report progress as the transport pulls them.

use futures_util::{Stream, TryStreamExt, stream};
use tokio_util::io::ReaderStream;

use mocup_protocol::ErrorCode;
use mocup_transfer::{FileSource, UploadFile};
use mocup_upload::{ApiFailure, ProgressFn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Streams the file's bytes, calling `progress` with cumulative counts.
pub(crate) async fn progress_body(
    file: &UploadFile,
    progress: ProgressFn,
) -> Result<reqwest::Body, ApiFailure> {
    let total = file.size();
    let body = match file.source() {
        FileSource::Memory(data) => {
            let data = data.clone();
            let len = data.len();
            let chunks = (0..len).step_by(CHUNK_SIZE).map(move |start| {
                let end = (start + CHUNK_SIZE).min(len);
                Ok::<_, std::io::Error>(data[start..end].to_vec())
            });
            reqwest::Body::wrap_stream(counted(stream::iter(chunks), total, progress))
        }
        FileSource::Path(path) => {
            let handle = tokio::fs::File::open(path)
                .await
                .map_err(|e| read_failure(file, &e))?;
            let reader = ReaderStream::with_capacity(handle, CHUNK_SIZE);
            reqwest::Body::wrap_stream(counted(reader, total, progress))
        }
    };
    Ok(body)
}

fn counted<S, T>(
    chunks: S,
    total: u64,
    progress: ProgressFn,
) -> impl Stream<Item = std::io::Result<T>> + Send + 'static
where
    S: Stream<Item = std::io::Result<T>> + Send + 'static,
    T: AsRef<[u8]> + Send + 'static,
{
    let mut loaded = 0u64;
    chunks.inspect_ok(move |chunk| {
        loaded += chunk.as_ref().len() as u64;
        progress(loaded.min(total), total);
    })
}

fn read_failure(file: &UploadFile, err: &std::io::Error) -> ApiFailure {
    ApiFailure::new(
        ErrorCode::Unknown,
        format!("Cannot read {}: {err}", file.name()),
    )
}
