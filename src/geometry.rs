//! Pointer-driven crop and zoom state for the background detail view.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self { Self { x, y } }
    pub fn distance(self, other: Point) -> f64 { (self.x - other.x).hypot(self.y - other.y) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

/// On-screen rectangle relative to the displayed image element. `w`/`h` go
/// negative while dragging up or left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl CropRect {
    /// Top-left origin, non-negative size.
    pub fn normalized(self) -> Self {
        let (x, w) = if self.w < 0.0 { (self.x + self.w, -self.w) } else { (self.x, self.w) };
        let (y, h) = if self.h < 0.0 { (self.y + self.h, -self.h) } else { (self.y, self.h) };
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool { self.w == 0.0 || self.h == 0.0 }
}

/// Rectangle in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Map an on-screen rectangle onto the natural pixels of the image it was
/// drawn over. Returns `None` when the rectangle is empty after clamping to
/// the image bounds or the client size is degenerate.
pub fn to_source_rect(rect: CropRect, client: Size, natural: (u32, u32)) -> Option<SourceRect> {
    if client.w <= 0.0 || client.h <= 0.0 {
        return None;
    }
    let r = rect.normalized();
    let (nw, nh) = (natural.0 as f64, natural.1 as f64);
    let sx = nw / client.w;
    let sy = nh / client.h;

    let x0 = (r.x * sx).round().clamp(0.0, nw);
    let y0 = (r.y * sy).round().clamp(0.0, nh);
    let x1 = ((r.x + r.w) * sx).round().clamp(0.0, nw);
    let y1 = ((r.y + r.h) * sy).round().clamp(0.0, nh);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(SourceRect { x: x0 as u32, y: y0 as u32, w: (x1 - x0) as u32, h: (y1 - y0) as u32 })
}

/// Mouse drag that draws a crop rectangle over the image.
#[derive(Debug, Default)]
pub struct DragCrop {
    origin: Point,
    rect: Option<CropRect>,
    dragging: bool,
}

impl DragCrop {
    pub fn new() -> Self { Self::default() }

    /// `origin` is the top-left of the image element's bounding box.
    pub fn press(&mut self, pointer: Point, origin: Point) {
        self.origin = origin;
        self.rect = Some(CropRect { x: pointer.x - origin.x, y: pointer.y - origin.y, w: 0.0, h: 0.0 });
        self.dragging = true;
    }

    pub fn move_to(&mut self, pointer: Point) {
        if !self.dragging {
            return;
        }
        if let Some(r) = self.rect.as_mut() {
            r.w = pointer.x - self.origin.x - r.x;
            r.h = pointer.y - self.origin.y - r.y;
        }
    }

    pub fn release(&mut self) { self.dragging = false; }

    pub fn is_dragging(&self) -> bool { self.dragging }

    /// Raw rectangle, possibly with negative extent.
    pub fn rect(&self) -> Option<CropRect> { self.rect }
}

pub type PointerId = i64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    Idle,
    OneFinger { id: PointerId, last: Point },
    TwoFinger {
        a: (PointerId, Point),
        b: (PointerId, Point),
        start_distance: f64,
        start_scale: f64,
    },
}

/// Two-finger pinch zoom with one-finger pan.
#[derive(Debug)]
pub struct PinchZoom {
    state: GestureState,
    scale: f64,
    pan: Point,
}

impl Default for PinchZoom {
    fn default() -> Self { Self { state: GestureState::Idle, scale: 1.0, pan: Point::default() } }
}

impl PinchZoom {
    pub fn new() -> Self { Self::default() }

    pub fn scale(&self) -> f64 { self.scale }
    pub fn pan(&self) -> Point { self.pan }
    pub fn state(&self) -> GestureState { self.state }

    pub fn set_scale(&mut self, scale: f64) { self.scale = scale.clamp(MIN_SCALE, MAX_SCALE); }

    pub fn pointer_down(&mut self, id: PointerId, p: Point) {
        self.state = match self.state {
            GestureState::Idle => GestureState::OneFinger { id, last: p },
            GestureState::OneFinger { id: first, last } if first != id => GestureState::TwoFinger {
                a: (first, last),
                b: (id, p),
                start_distance: last.distance(p),
                start_scale: self.scale,
            },
            // a third finger, or a repeated down for a tracked pointer
            other => other,
        };
    }

    pub fn pointer_move(&mut self, id: PointerId, p: Point) {
        match &mut self.state {
            GestureState::Idle => {}
            GestureState::OneFinger { id: tracked, last } => {
                if *tracked == id {
                    self.pan.x += p.x - last.x;
                    self.pan.y += p.y - last.y;
                    *last = p;
                }
            }
            GestureState::TwoFinger { a, b, start_distance, start_scale } => {
                if a.0 == id {
                    a.1 = p;
                } else if b.0 == id {
                    b.1 = p;
                } else {
                    return;
                }
                if *start_distance > f64::EPSILON {
                    let d = a.1.distance(b.1);
                    self.scale = (d / *start_distance * *start_scale).clamp(MIN_SCALE, MAX_SCALE);
                }
            }
        }
    }

    pub fn pointer_up(&mut self, id: PointerId) {
        self.state = match self.state {
            GestureState::OneFinger { id: tracked, .. } if tracked == id => GestureState::Idle,
            GestureState::TwoFinger { a, b, .. } if a.0 == id => GestureState::OneFinger { id: b.0, last: b.1 },
            GestureState::TwoFinger { a, b, .. } if b.0 == id => GestureState::OneFinger { id: a.0, last: a.1 },
            other => other,
        };
    }

    pub fn reset(&mut self) { *self = Self::default(); }
}

/// Output canvas shapes a card can be rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PresetAspect {
    #[default]
    #[serde(rename = "square")]
    Square,
    #[serde(rename = "4:5")]
    FourFive,
    #[serde(rename = "9:16", alias = "9:19")]
    NineSixteen,
}

impl PresetAspect {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            PresetAspect::Square => (1080, 1080),
            PresetAspect::FourFive => (1080, 1350),
            PresetAspect::NineSixteen => (1080, 1920),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            PresetAspect::Square => "square",
            PresetAspect::FourFive => "4:5",
            PresetAspect::NineSixteen => "9:16",
        }
    }
}

impl FromStr for PresetAspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" | "1:1" => Ok(PresetAspect::Square),
            "4:5" | "fourfive" => Ok(PresetAspect::FourFive),
            "9:16" | "9:19" | "ninesixteen" => Ok(PresetAspect::NineSixteen),
            other => Err(format!("unknown preset aspect: {other}")),
        }
    }
}
