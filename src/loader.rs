use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::batch::{calculate_hashes_batch, DEFAULT_BATCH_SIZE, DEFAULT_YIELD};
use crate::client::{ApiError, CandidateApi, ContentUpdate};
use crate::dedupe::{stage_one, stage_two, DedupRegistry};
use crate::editor::{EditorError, EditorState};
use crate::events::SessionEvent;
use crate::providers::ImageFetcher;

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const DEFAULT_MAX_SKIP_PAGES: u32 = 3;

#[derive(Debug, Clone)]
pub struct LoaderParams {
    pub per_page: u32,
    pub batch_size: usize,
    pub batch_pause: Duration,
    /// How many consecutive full pages that dedupe down to nothing are
    /// skipped over automatically within one `load()`.
    pub max_skip_pages: u32,
}

impl Default for LoaderParams {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_YIELD,
            max_skip_pages: DEFAULT_MAX_SKIP_PAGES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A load was already in flight or there is nothing left to fetch.
    Skipped,
    /// `page` is the last page applied; `added` counts survivors across
    /// every page fetched by this call.
    Applied { page: u32, added: usize, exhausted: bool },
    /// The session was reset while this load was in flight; its results
    /// were dropped.
    Stale,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no phrase selected")]
    NoPhrase,
    #[error("loading page {page} failed: {source}")]
    Page {
        page: u32,
        #[source]
        source: ApiError,
    },
    #[error("no content id yet, load a page first")]
    NoContent,
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error("saving the selection failed: {0}")]
    Save(#[source] ApiError),
}

#[derive(Debug)]
struct Session {
    generation: u64,
    phrase_id: Option<String>,
    phrase_text: Option<String>,
    content_id: Option<String>,
    page: u32,
    has_more: bool,
    loading: bool,
    candidates: Vec<String>,
    registry: DedupRegistry,
}

impl Session {
    fn new(generation: u64, phrase_id: Option<String>) -> Self {
        Self {
            generation,
            phrase_id,
            phrase_text: None,
            content_id: None,
            page: 1,
            has_more: true,
            loading: false,
            candidates: Vec::new(),
            registry: DedupRegistry::new(),
        }
    }
}

/// Clears `loading` when a `load()` future is dropped before it finishes,
/// so a timed-out or aborted load does not wedge the session.
struct InFlight<'a> {
    session: &'a Mutex<Session>,
    generation: u64,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(&mut self) { self.armed = false; }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut s = self.session.lock();
        if s.generation == self.generation {
            s.loading = false;
            tracing::debug!(generation = self.generation, page = s.page, "candidate load cancelled");
        }
    }
}

/// Paginated, deduplicated background candidates for one phrase at a time.
///
/// Every `reset` starts a new generation with an empty candidate list and a
/// fresh dedup registry. Work started under an older generation is thrown
/// away when it completes.
pub struct CandidateLoader {
    api: Arc<dyn CandidateApi>,
    fetcher: Arc<dyn ImageFetcher>,
    params: LoaderParams,
    session: Mutex<Session>,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl CandidateLoader {
    pub fn new(api: Arc<dyn CandidateApi>, fetcher: Arc<dyn ImageFetcher>, params: LoaderParams) -> Self {
        Self { api, fetcher, params, session: Mutex::new(Session::new(0, None)), events: None }
    }

    pub fn with_events(mut self, tx: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, evt: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(evt);
        }
    }

    pub fn state(&self) -> LoadState {
        let s = self.session.lock();
        if s.loading {
            LoadState::Loading
        } else if !s.has_more {
            LoadState::Exhausted
        } else {
            LoadState::Idle
        }
    }

    pub fn candidates(&self) -> Vec<String> { self.session.lock().candidates.clone() }
    pub fn has_more(&self) -> bool { self.session.lock().has_more }
    /// Next page number to request.
    pub fn page(&self) -> u32 { self.session.lock().page }
    pub fn generation(&self) -> u64 { self.session.lock().generation }
    pub fn phrase_id(&self) -> Option<String> { self.session.lock().phrase_id.clone() }
    pub fn phrase_text(&self) -> Option<String> { self.session.lock().phrase_text.clone() }
    pub fn content_id(&self) -> Option<String> { self.session.lock().content_id.clone() }

    /// Start a new session for `phrase_id` and load its first page.
    pub async fn reset(&self, phrase_id: &str) -> Result<LoadOutcome, LoadError> {
        let generation = {
            let mut s = self.session.lock();
            let generation = s.generation + 1;
            *s = Session::new(generation, Some(phrase_id.to_string()));
            generation
        };
        tracing::info!(%phrase_id, generation, "candidate session started");
        self.emit(SessionEvent::Started { generation, phrase_id: phrase_id.to_string() });
        self.load().await
    }

    /// Fetch the next page and append its deduplicated survivors.
    pub async fn load(&self) -> Result<LoadOutcome, LoadError> {
        let (generation, phrase_id, mut page) = {
            let mut s = self.session.lock();
            if s.loading || !s.has_more {
                return Ok(LoadOutcome::Skipped);
            }
            let Some(phrase_id) = s.phrase_id.clone() else {
                return Err(LoadError::NoPhrase);
            };
            s.loading = true;
            (s.generation, phrase_id, s.page)
        };
        let mut in_flight = InFlight { session: &self.session, generation, armed: true };

        let mut added_total = 0usize;
        let mut skipped_empty = 0u32;
        loop {
            let resp = match self.api.select(&phrase_id, page, self.params.per_page).await {
                Ok(r) => r,
                Err(e) => {
                    {
                        let mut s = self.session.lock();
                        if s.generation != generation {
                            return Ok(self.discard(generation, page));
                        }
                        s.loading = false;
                        in_flight.disarm();
                    }
                    tracing::warn!(%phrase_id, page, error = %e, "candidate page failed");
                    self.emit(SessionEvent::Failed { generation, page, error: e.to_string() });
                    return Err(LoadError::Page { page, source: e });
                }
            };
            let raw = resp.images.len();

            let fresh = {
                let mut s = self.session.lock();
                if s.generation != generation {
                    return Ok(self.discard(generation, page));
                }
                stage_one(&mut s.registry, resp.images)
            };

            let hashed = calculate_hashes_batch(
                self.fetcher.as_ref(),
                &fresh,
                self.params.batch_size,
                self.params.batch_pause,
            )
            .await;

            // survivors land in one update so the page never shows half-applied
            let (added, total, exhausted, keep_going) = {
                let mut s = self.session.lock();
                if s.generation != generation {
                    return Ok(self.discard(generation, page));
                }
                let kept = stage_two(&mut s.registry, hashed);
                let added = kept.len();
                s.candidates.extend(kept);
                s.content_id = Some(resp.content_id);
                if resp.text.is_some() {
                    s.phrase_text = resp.text;
                }
                s.page = page + 1;

                let exhausted = raw < self.params.per_page as usize;
                s.has_more = !exhausted;
                let keep_going = !exhausted && added == 0 && skipped_empty < self.params.max_skip_pages;
                if !keep_going {
                    s.loading = false;
                    in_flight.disarm();
                }
                (added, s.candidates.len(), exhausted, keep_going)
            };

            added_total += added;
            tracing::info!(%phrase_id, page, raw, added, total, "candidate page applied");
            self.emit(SessionEvent::PageLoaded { generation, page, raw, added, total });
            if exhausted {
                self.emit(SessionEvent::Exhausted { generation, total });
            }

            if !keep_going {
                return Ok(LoadOutcome::Applied { page, added: added_total, exhausted });
            }
            tracing::debug!(page, "full page was all duplicates, fetching the next one");
            skipped_empty += 1;
            page += 1;
        }
    }

    fn discard(&self, generation: u64, page: u32) -> LoadOutcome {
        tracing::debug!(generation, page, "dropping result from a superseded session");
        self.emit(SessionEvent::Discarded { generation, page });
        LoadOutcome::Stale
    }

    /// Record `url` as the phrase's background together with the editor state.
    pub async fn choose(&self, url: &str, editor: &EditorState, status: Option<String>) -> Result<(), LoadError> {
        let content_id = self.content_id().ok_or(LoadError::NoContent)?;
        let body = ContentUpdate { image_url: url.to_string(), editor_json: editor.to_json()?, status };
        self.api.update_content(&content_id, &body).await.map_err(LoadError::Save)?;
        tracing::info!(%content_id, %url, "background saved");
        Ok(())
    }
}
