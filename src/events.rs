use serde::{Deserialize, Serialize};

/// Progress notifications from a candidate session, keyed by generation so
/// listeners can drop events from a session that has since been reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { generation: u64, phrase_id: String },
    PageLoaded { generation: u64, page: u32, raw: usize, added: usize, total: usize },
    Exhausted { generation: u64, total: usize },
    Failed { generation: u64, page: u32, error: String },
    Discarded { generation: u64, page: u32 },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SessionEvent::Started { generation, .. }
            | SessionEvent::PageLoaded { generation, .. }
            | SessionEvent::Exhausted { generation, .. }
            | SessionEvent::Failed { generation, .. }
            | SessionEvent::Discarded { generation, .. } => *generation,
        }
    }
}
