use ab_glyph::{FontVec, PxScale};
use image::{imageops::FilterType, DynamicImage, ImageFormat, Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::editor::{parse_hex_color, EditorState, TextMode};
use crate::geometry::{to_source_rect, Size, SourceRect};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("crop rectangle is empty after mapping to the source image")]
    EmptyCrop,
    #[error("a crop rectangle needs the on-screen size it was drawn on")]
    MissingClientSize,
    #[error("failed to load font {path}: {reason}")]
    Font { path: String, reason: String },
}

/// Output format for finished cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutFmt {
    Png,
    Jpeg(u8), // quality 1..=100
    Webp,     // lossless
}

impl OutFmt {
    pub fn parse(name: &str, jpeg_quality: u8) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => OutFmt::Jpeg(jpeg_quality.clamp(1, 100)),
            "webp" => OutFmt::Webp,
            _ => OutFmt::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutFmt::Png => "png",
            OutFmt::Jpeg(_) => "jpg",
            OutFmt::Webp => "webp",
        }
    }
}

/// Turns a chosen background plus editor state into the final card.
pub struct CardRenderer {
    fmt: OutFmt,
    // None: text overlay is skipped
    font: Option<FontVec>,
}

impl CardRenderer {
    pub fn new(fmt: OutFmt) -> Self { Self { fmt, font: None } }

    pub fn with_font_file(mut self, path: &Path) -> Result<Self, RenderError> {
        let font_err = |reason: String| RenderError::Font { path: path.display().to_string(), reason };
        let bytes = std::fs::read(path).map_err(|e| font_err(e.to_string()))?;
        self.font = Some(FontVec::try_from_vec(bytes).map_err(|e| font_err(e.to_string()))?);
        Ok(self)
    }

    pub fn has_font(&self) -> bool { self.font.is_some() }
    pub fn format(&self) -> OutFmt { self.fmt }

    /// Crop, scale to the preset canvas and overlay the phrase text.
    /// `client` is the on-screen size of the image while it was edited; the
    /// crop rectangle and pan offset are expressed in that space.
    pub fn compose(&self, src: &DynamicImage, editor: &EditorState, client: Option<Size>) -> Result<RgbaImage, RenderError> {
        let (tw, th) = editor.preset.dimensions();
        let natural = (src.width(), src.height());

        let region = match (editor.crop, client) {
            (Some(rect), Some(client)) => to_source_rect(rect, client, natural).ok_or(RenderError::EmptyCrop)?,
            (Some(_), None) => return Err(RenderError::MissingClientSize),
            (None, _) => cover_region(natural, (tw, th), editor.scale, pan_in_source(editor, client, natural)),
        };
        if region.w == 0 || region.h == 0 {
            return Err(RenderError::EmptyCrop);
        }

        let card = src
            .crop_imm(region.x, region.y, region.w, region.h)
            .resize_exact(tw, th, FilterType::CatmullRom);
        let mut rgba = card.to_rgba8();

        if let (Some(text), Some(font)) = (editor.text.as_deref(), &self.font) {
            let text_scale = client.map(|c| tw as f32 / c.w as f32).unwrap_or(1.0);
            draw_phrase(&mut rgba, font, text, editor, text_scale);
        } else if editor.text.is_some() {
            tracing::warn!("no font configured, card rendered without text");
        }
        Ok(rgba)
    }

    pub fn encode(&self, img: &RgbaImage) -> Result<Vec<u8>, RenderError> {
        let mut out = Vec::new();
        match self.fmt {
            OutFmt::Png => {
                img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
            }
            OutFmt::Jpeg(q) => {
                let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
                let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, q);
                enc.encode_image(&rgb)?;
            }
            OutFmt::Webp => {
                img.write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)?;
            }
        }
        Ok(out)
    }

    /// compose + encode -> (bytes, width, height)
    pub fn render(&self, src: &DynamicImage, editor: &EditorState, client: Option<Size>) -> Result<(Vec<u8>, u32, u32), RenderError> {
        let card = self.compose(src, editor, client)?;
        let (w, h) = card.dimensions();
        Ok((self.encode(&card)?, w, h))
    }
}

pub fn thumbnail(img: &RgbaImage, max: u32) -> Result<Vec<u8>, RenderError> {
    let thumb = DynamicImage::ImageRgba8(img.clone()).resize(max, max, FilterType::Lanczos3);
    let mut buf = Vec::new();
    thumb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

fn pan_in_source(editor: &EditorState, client: Option<Size>, natural: (u32, u32)) -> (f64, f64) {
    match client {
        Some(c) if c.w > 0.0 && c.h > 0.0 => (
            editor.pan.x * natural.0 as f64 / c.w,
            editor.pan.y * natural.1 as f64 / c.h,
        ),
        _ => (0.0, 0.0),
    }
}

/// Largest region of the target aspect that fits the source, shrunk by
/// `scale` and shifted against `pan` (dragging the image right reveals
/// more of its left side), then clamped inside the source.
fn cover_region(natural: (u32, u32), target: (u32, u32), scale: f64, pan: (f64, f64)) -> SourceRect {
    let (nw, nh) = (natural.0 as f64, natural.1 as f64);
    let aspect = target.0 as f64 / target.1 as f64;
    let (mut w, mut h) = if nw / nh > aspect { (nh * aspect, nh) } else { (nw, nw / aspect) };
    let scale = scale.max(1.0);
    w /= scale;
    h /= scale;
    let x = ((nw - w) / 2.0 - pan.0 / scale).clamp(0.0, nw - w);
    let y = ((nh - h) / 2.0 - pan.1 / scale).clamp(0.0, nh - h);
    SourceRect {
        x: x.round() as u32,
        y: y.round() as u32,
        w: (w.round() as u32).clamp(1, natural.0.max(1)),
        h: (h.round() as u32).clamp(1, natural.1.max(1)),
    }
}

/// Horizontal shift per pixel of height for faux italics.
const ITALIC_SHEAR: f32 = 0.2;

fn draw_phrase(img: &mut RgbaImage, font: &FontVec, text: &str, editor: &EditorState, text_scale: f32) {
    let style = &editor.style;
    let [r, g, b] = parse_hex_color(&style.color).unwrap_or([255, 255, 255]);
    let color = Rgba([r, g, b, 255]);
    let scale = PxScale::from((style.size_px * text_scale).max(1.0));
    let line_height = (scale.y * 1.2).ceil() as i32;

    let lines: Vec<String> = match editor.text_mode {
        TextMode::Horizontal => text.lines().map(str::to_string).collect(),
        TextMode::Vertical => text.chars().filter(|c| !c.is_whitespace()).map(String::from).collect(),
    };
    let widest = lines.iter().map(|l| text_size(scale, font, l).0).max().unwrap_or(0) as i32;
    let block_h = line_height * lines.len() as i32;

    let (w, h) = (img.width() as i32, img.height() as i32);
    let x = ((style.position.x as f32 * w as f32) as i32).clamp(0, (w - widest).max(0));
    let y = ((style.position.y as f32 * h as f32) as i32).clamp(0, (h - block_h).max(0));

    // italics are drawn upright on a clear layer, then sheared onto the card
    let mut layer = style.italic.then(|| RgbaImage::new(img.width(), img.height()));
    let target = layer.as_mut().unwrap_or(&mut *img);
    for (i, line) in lines.iter().enumerate() {
        let ly = y + i as i32 * line_height;
        draw_text_mut(target, color, x, ly, scale, font, line);
        if style.bold {
            draw_text_mut(target, color, x + 1, ly, scale, font, line);
        }
    }
    if let Some(layer) = layer {
        overlay_sheared(img, &layer, [r, g, b], y + block_h);
    }
}

/// Composite `layer` onto `dst`, slanting rows above `baseline` to the right.
/// Only the layer's alpha is used; colour comes from `rgb`.
fn overlay_sheared(dst: &mut RgbaImage, layer: &RgbaImage, rgb: [u8; 3], baseline: i32) {
    let width = dst.width() as i32;
    for (lx, ly, px) in layer.enumerate_pixels() {
        let alpha = px.0[3];
        if alpha == 0 {
            continue;
        }
        let dx = lx as i32 + ((baseline - ly as i32) as f32 * ITALIC_SHEAR).round() as i32;
        if !(0..width).contains(&dx) {
            continue;
        }
        dst.get_pixel_mut(dx as u32, ly).blend(&Rgba([rgb[0], rgb[1], rgb[2], alpha]));
    }
}
