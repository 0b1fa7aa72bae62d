use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

use crate::editor::EditorState;
use crate::manifest::CardRecord;

/// What gets written next to every card image.
#[derive(Debug, Serialize)]
pub struct Sidecar<'a> {
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub editor: &'a EditorState,
    pub created_at: String,
}

impl Sidecar<'_> {
    /// Manifest line for the card saved at `file`.
    pub fn record(&self, file: &Path) -> CardRecord {
        CardRecord {
            id: self.id.to_string(),
            phrase_id: self.phrase_id.map(str::to_string),
            background: self.editor.background.clone(),
            preset: self.editor.preset.key().to_string(),
            file: file.display().to_string(),
            width: self.width,
            height: self.height,
            created_at: self.created_at.clone(),
        }
    }
}

pub struct SavedCard {
    pub image: PathBuf,
    pub sidecar: PathBuf,
    pub thumbnail: Option<PathBuf>,
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(bytes).await?;
        let _ = f.sync_all().await; // best-effort
    }
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Write `<stem>.<ext>`, `<stem>.json` and optionally `<stem>.thumb.png`,
/// each via a temp file and rename so readers never see partial files.
pub async fn save_card(
    out_dir: &Path,
    stem: &str,
    ext: &str,
    bytes: &[u8],
    thumb: Option<&[u8]>,
    sidecar: &Sidecar<'_>,
) -> anyhow::Result<SavedCard> {
    fs::create_dir_all(out_dir).await?;

    let image = out_dir.join(format!("{stem}.{ext}"));
    write_atomic(&image, bytes).await?;

    let thumbnail = match thumb {
        Some(t) => {
            let p = out_dir.join(format!("{stem}.thumb.png"));
            write_atomic(&p, t).await?;
            Some(p)
        }
        None => None,
    };

    let json = out_dir.join(format!("{stem}.json"));
    write_atomic(&json, &serde_json::to_vec_pretty(sidecar)?).await?;

    Ok(SavedCard { image, sidecar: json, thumbnail })
}

pub fn now_rfc3339() -> String { Utc::now().to_rfc3339() }
