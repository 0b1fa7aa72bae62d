//! Coarse 16-cell colour fingerprint used for the second dedup stage.
//!
//! The image is scaled down to a 4x4 grid and every cell contributes one hex
//! digit, `floor((r + g + b) / 48)`, giving a 16-character signature. It is
//! an approximate average-colour signature, not an exact-match or
//! cryptographic hash: two different decoders may disagree at the edges.

use image::{imageops::FilterType, DynamicImage};

use crate::providers::ImageFetcher;

pub const GRID: u32 = 4;
pub const HASH_LEN: usize = (GRID * GRID) as usize;

pub fn hash_image(img: &DynamicImage) -> String {
    let small = image::imageops::resize(&img.to_rgba8(), GRID, GRID, FilterType::Triangle);
    let mut hash = String::with_capacity(HASH_LEN);
    for px in small.pixels() {
        let [r, g, b, _a] = px.0;
        let level = (r as u32 + g as u32 + b as u32) / 48;
        hash.push(char::from_digit(level, 16).unwrap_or('f'));
    }
    hash
}

/// Decode and hash; `None` if the bytes are not a decodable image.
pub fn hash_bytes(bytes: &[u8]) -> Option<String> {
    match image::load_from_memory(bytes) {
        Ok(img) => Some(hash_image(&img)),
        Err(e) => {
            tracing::debug!(error = %e, "image decode failed");
            None
        }
    }
}

/// Load `url` through `fetcher` and hash it. Every failure (network, CORS
/// refusal via the proxy, decode) collapses to `None`, meaning "cannot judge".
pub async fn calculate_lightweight_image_hash(fetcher: &dyn ImageFetcher, url: &str) -> Option<String> {
    let bytes = match fetcher.fetch(url).await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(%url, fetcher = fetcher.name(), error = %e, "image load failed");
            return None;
        }
    };
    tokio::task::spawn_blocking(move || hash_bytes(&bytes)).await.ok().flatten()
}
