//! Background candidate pipeline for one-line phrase cards: paginated
//! candidate loading with two-stage image dedup, crop/zoom geometry for the
//! detail view, and rendering of the finished card.

pub mod backoff;
pub mod batch;
pub mod client;
pub mod config;
pub mod dedupe;
pub mod editor;
pub mod events;
pub mod geometry;
pub mod identifier;
pub mod io;
pub mod loader;
pub mod manifest;
pub mod phash;
pub mod post;
pub mod providers;

pub use batch::{calculate_hashes_batch, HashResult};
pub use client::{ApiClient, ApiError, CandidateApi, ContentUpdate, SelectResponse};
pub use dedupe::DedupRegistry;
pub use identifier::extract_image_identifier;
pub use loader::{CandidateLoader, LoadError, LoadOutcome, LoadState, LoaderParams};
pub use phash::calculate_lightweight_image_hash;
pub use providers::{FetchError, HttpImageFetcher, ImageFetcher};
