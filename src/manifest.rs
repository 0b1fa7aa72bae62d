use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::{self, OpenOptions}, io::{AsyncBufReadExt, AsyncWriteExt}, sync::Mutex};

/// One line of `manifest.jsonl` per rendered card.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CardRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phrase_id: Option<String>,
    pub background: String,
    pub preset: String,
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub created_at: String,
}

#[derive(Clone)]
pub struct ManifestWriter {
    file: Arc<Mutex<tokio::fs::File>>,
    path: PathBuf,
}

impl ManifestWriter {
    pub async fn open(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() { fs::create_dir_all(parent).await?; }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self { file: Arc::new(Mutex::new(file)), path })
    }

    pub async fn append(&self, rec: &CardRecord) -> anyhow::Result<()> {
        let mut f = self.file.lock().await;
        let line = serde_json::to_vec(rec)?;
        f.write_all(&line).await?;
        f.write_all(b"\n").await?;
        f.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &PathBuf { &self.path }
}

/// Read every record back; unparsable lines are skipped.
pub async fn read_records(path: &Path) -> anyhow::Result<Vec<CardRecord>> {
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut lines = tokio::io::BufReader::new(file).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str(&line) {
            Ok(rec) => out.push(rec),
            Err(e) => tracing::warn!(error = %e, "skipping malformed manifest line"),
        }
    }
    Ok(out)
}
