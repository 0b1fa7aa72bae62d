use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use phrasecard::backoff::Backoff;
use phrasecard::config::AppCfg;
use phrasecard::editor::EditorState;
use phrasecard::events::SessionEvent;
use phrasecard::geometry::{CropRect, PresetAspect, Size};
use phrasecard::io::{now_rfc3339, save_card, Sidecar};
use phrasecard::manifest::ManifestWriter;
use phrasecard::post::{thumbnail, CardRenderer, OutFmt};
use phrasecard::batch::calculate_hashes_batch_with_progress;
use phrasecard::{
    extract_image_identifier, ApiClient, CandidateLoader, HttpImageFetcher, ImageFetcher,
    LoadError, LoadOutcome, LoaderParams,
};

#[derive(Parser)]
#[command(name = "phrasecard", version, about = "Background candidates and card rendering for phrase cards")]
struct Cli {
    /// YAML config file; defaults plus PHRASECARD_* env vars when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the dedup identifier of each URL.
    Ids { urls: Vec<String> },
    /// Compute colour hashes for image URLs.
    Hash {
        urls: Vec<String>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Load deduplicated background candidates for a phrase.
    Candidates {
        #[arg(long)]
        phrase_id: String,
        #[arg(long, default_value_t = 1)]
        pages: u32,
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },
    /// Save a background choice for a phrase's content.
    Choose {
        #[arg(long)]
        phrase_id: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "square")]
        preset: PresetAspect,
        #[arg(long)]
        status: Option<String>,
    },
    /// Render a finished card from a background and phrase text.
    Render {
        /// Local path or http(s) URL.
        #[arg(long)]
        image: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value = "square")]
        preset: PresetAspect,
        /// x,y,w,h in on-screen pixels (w/h may be negative).
        #[arg(long)]
        crop: Option<String>,
        /// WxH of the image element the crop was drawn on.
        #[arg(long)]
        client: Option<String>,
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        #[arg(long)]
        phrase_id: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        size_px: Option<f32>,
    },
}

fn parse_crop(s: &str) -> Result<CropRect> {
    let v: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid crop {s:?}"))?;
    let [x, y, w, h] = v[..] else { bail!("crop needs x,y,w,h, got {s:?}") };
    Ok(CropRect { x, y, w, h })
}

fn parse_size(s: &str) -> Result<Size> {
    let (w, h) = s.split_once(['x', 'X']).with_context(|| format!("size must be WxH, got {s:?}"))?;
    Ok(Size { w: w.trim().parse()?, h: h.trim().parse()? })
}

fn build_fetcher(cfg: &AppCfg) -> Result<HttpImageFetcher> {
    let f = HttpImageFetcher::new(cfg.backend.timeout(), cfg.backend.max_image_bytes)?;
    Ok(if cfg.backend.use_image_proxy {
        f.with_proxy(&cfg.backend.base_url, cfg.backend.token())?
    } else {
        f
    })
}

fn build_loader(cfg: &AppCfg) -> Result<CandidateLoader> {
    let api = ApiClient::new(&cfg.backend.base_url, cfg.backend.token(), cfg.backend.timeout())?;
    let fetcher = build_fetcher(cfg)?;
    Ok(CandidateLoader::new(Arc::new(api), Arc::new(fetcher), LoaderParams::from(&cfg.loader)))
}

/// Retry a failed page with backoff; any other outcome is returned as-is.
async fn with_retry<F, Fut>(retries: u32, mut op: F) -> Result<LoadOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<LoadOutcome, LoadError>>,
{
    let backoff = Backoff::default();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(o) => return Ok(o),
            Err(LoadError::Page { page, source }) if attempt < retries => {
                attempt += 1;
                let wait = backoff.delay(attempt);
                tracing::warn!(page, attempt, ?wait, error = %source, "retrying candidate page");
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = AppCfg::load(cli.config.as_deref()).await?;

    match cli.cmd {
        Cmd::Ids { urls } => {
            for u in urls {
                println!("{}\t{}", extract_image_identifier(&u), u);
            }
        }
        Cmd::Hash { urls, batch_size } => {
            let fetcher = build_fetcher(&cfg)?;
            let params = LoaderParams::from(&cfg.loader);
            let batch = batch_size.unwrap_or(params.batch_size).max(1);
            let pb = ProgressBar::new(urls.len() as u64);
            pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
            let results = calculate_hashes_batch_with_progress(&fetcher, &urls, batch, params.batch_pause, |done| {
                pb.inc(done.len() as u64)
            })
            .await;
            pb.finish_and_clear();
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Cmd::Candidates { phrase_id, pages, retries } => {
            let (tx, mut rx) = broadcast::channel::<SessionEvent>(64);
            let loader = build_loader(&cfg)?.with_events(tx);
            let watcher = tokio::spawn(async move {
                while let Ok(evt) = rx.recv().await {
                    tracing::debug!(?evt, "session event");
                }
            });

            with_retry(retries, || loader.reset(&phrase_id)).await?;
            for _ in 1..pages {
                if !loader.has_more() {
                    break;
                }
                with_retry(retries, || loader.load()).await?;
            }
            let out = serde_json::json!({
                "phrase_id": phrase_id,
                "content_id": loader.content_id(),
                "has_more": loader.has_more(),
                "next_page": loader.page(),
                "candidates": loader.candidates(),
            });
            drop(loader);
            watcher.await.ok();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Cmd::Choose { phrase_id, url, preset, status } => {
            let loader = build_loader(&cfg)?;
            loader.reset(&phrase_id).await?;
            let mut editor = EditorState::new(&url);
            editor.preset = preset;
            editor.text = loader.phrase_text();
            loader.choose(&url, &editor, status).await?;
            println!("{}", loader.content_id().unwrap_or_default());
        }
        Cmd::Render { image, text, preset, crop, client, scale, phrase_id, color, size_px } => {
            let bytes = if image.starts_with("http://") || image.starts_with("https://") {
                build_fetcher(&cfg)?.fetch(&image).await?.to_vec()
            } else {
                tokio::fs::read(&image).await.with_context(|| format!("reading {image}"))?
            };
            let src = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
                .await?
                .context("decoding background image")?;

            let mut editor = EditorState::new(&image);
            editor.preset = preset;
            editor.crop = crop.as_deref().map(parse_crop).transpose()?;
            editor.scale = scale;
            editor.text = text.clone();
            if let Some(c) = color { editor.style.color = c; }
            if let Some(px) = size_px { editor.style.size_px = px; }
            let client = client.as_deref().map(parse_size).transpose()?;

            let fmt = OutFmt::parse(&cfg.render.format, cfg.render.jpeg_quality);
            let mut renderer = CardRenderer::new(fmt);
            if let Some(font) = &cfg.render.font_path {
                renderer = renderer.with_font_file(font)?;
            }
            let card = renderer.compose(&src, &editor, client)?;
            let encoded = renderer.encode(&card)?;
            let thumb = if cfg.render.thumbnail { Some(thumbnail(&card, cfg.render.thumb_max)?) } else { None };

            let id = uuid::Uuid::new_v4().to_string();
            let stem = format!("{}-{}", slug::slugify(text.as_deref().unwrap_or("card")), &id[..8]);
            let (w, h) = card.dimensions();
            let sidecar = Sidecar {
                id: &id,
                phrase_id: phrase_id.as_deref(),
                content_id: None,
                width: w,
                height: h,
                editor: &editor,
                created_at: now_rfc3339(),
            };
            let saved = save_card(&cfg.out_dir, &stem, fmt.extension(), &encoded, thumb.as_deref(), &sidecar).await?;

            let manifest = ManifestWriter::open(cfg.out_dir.join("manifest.jsonl")).await?;
            manifest.append(&sidecar.record(&saved.image)).await?;
            println!("{}", saved.image.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phrasecard=info")))
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
