use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;

use crate::phash::calculate_lightweight_image_hash;
use crate::providers::ImageFetcher;

pub const DEFAULT_BATCH_SIZE: usize = 3;
pub const DEFAULT_YIELD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashResult {
    pub url: String,
    pub hash: Option<String>,
    pub success: bool,
}

impl HashResult {
    pub fn new(url: String, hash: Option<String>) -> Self {
        let success = hash.is_some();
        Self { url, hash, success }
    }
}

/// Hash `urls` in chunks of `batch_size`, at most that many loads in flight.
/// Results come back positionally, so order matches `urls` whatever order
/// the loads finish in. Sleeps `pause` between chunks to leave room for
/// other work on the runtime.
pub async fn calculate_hashes_batch(
    fetcher: &dyn ImageFetcher,
    urls: &[String],
    batch_size: usize,
    pause: Duration,
) -> Vec<HashResult> {
    calculate_hashes_batch_with_progress(fetcher, urls, batch_size, pause, |_| {}).await
}

/// Same as [`calculate_hashes_batch`], calling `on_chunk` with each finished
/// chunk's results before the pause that follows it.
pub async fn calculate_hashes_batch_with_progress<F>(
    fetcher: &dyn ImageFetcher,
    urls: &[String],
    batch_size: usize,
    pause: Duration,
    mut on_chunk: F,
) -> Vec<HashResult>
where
    F: FnMut(&[HashResult]),
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(urls.len());

    let mut chunks = urls.chunks(batch_size).peekable();
    while let Some(chunk) = chunks.next() {
        let hashes = join_all(chunk.iter().map(|u| calculate_lightweight_image_hash(fetcher, u))).await;
        let start = results.len();
        results.extend(chunk.iter().cloned().zip(hashes).map(|(url, hash)| HashResult::new(url, hash)));
        on_chunk(&results[start..]);

        if chunks.peek().is_some() && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    results
}
