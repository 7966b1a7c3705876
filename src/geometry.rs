// geometry.rs — Coordinate conventions shared by the mapper, the oracle and
// the overlay renderer.
//
// Two conventions live side by side as separate types:
//   * `NormalizedPoint`: tap positions as a percentage of the display
//     container (0–100 on each axis).
//   * `NormalizedBox`: oracle visual cues as a fraction of the analysed
//     frame (0–1 on each axis).

use serde::{Deserialize, Serialize};

// ── Tap points (0–100) ──────────────────────────────────────────────────

/// A tap position expressed as a percentage of the display container.
///
/// Independent of viewport size and device pixel ratio. This is the value the
/// oracle receives for identify-component requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    /// Build a point, clamping both axes into `[0, 100]`.
    pub fn clamped(x: f64, y: f64) -> Self {
        Self {
            x: x.clamp(0.0, 100.0),
            y: y.clamp(0.0, 100.0),
        }
    }
}

// ── Visual-cue boxes (0–1) ──────────────────────────────────────────────

/// Bounding box of a visual cue, as fractions of the frame.
///
/// Field names match the oracle wire format (`xmin/ymin/xmax/ymax`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl NormalizedBox {
    /// True when every edge is finite, inside `[0, 1]`, and min ≤ max.
    pub fn is_well_formed(&self) -> bool {
        let edges = [self.xmin, self.ymin, self.xmax, self.ymax];
        edges.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v))
            && self.xmin <= self.xmax
            && self.ymin <= self.ymax
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Place the box inside a container of the given pixel size.
    ///
    /// This is the renderer's placement math; [`map_to_container`] is its
    /// inverse (modulo the 0–1 vs 0–100 scale).
    pub fn to_pixels(&self, width: f64, height: f64) -> PixelRect {
        PixelRect {
            left: self.xmin * width,
            top: self.ymin * height,
            width: (self.xmax - self.xmin) * width,
            height: (self.ymax - self.ymin) * height,
        }
    }
}

/// A rectangle in container pixels, relative to the container's origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

// ── Coordinate mapper ───────────────────────────────────────────────────

/// The on-screen box of the display container (client coordinates).
///
/// The video is presented cropped-to-fill inside this box, so taps are
/// measured against the container and not the video's intrinsic size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// A raw input event from the display layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    /// Mouse or pen.
    Pointer { client_x: f64, client_y: f64 },
    /// Touch; the first touch point is authoritative.
    Touch { touches: Vec<(f64, f64)> },
}

impl PointerInput {
    pub fn pointer(client_x: f64, client_y: f64) -> Self {
        Self::Pointer { client_x, client_y }
    }

    fn client_position(&self) -> Option<(f64, f64)> {
        match self {
            Self::Pointer { client_x, client_y } => Some((*client_x, *client_y)),
            Self::Touch { touches } => touches.first().copied(),
        }
    }
}

/// Convert a tap in client space into a [`NormalizedPoint`].
///
/// Taps outside the container are clamped to its edges. Returns `None` for a
/// touch event with no touch points or a container with no area.
pub fn map_to_container(input: &PointerInput, rect: &ContainerRect) -> Option<NormalizedPoint> {
    if !(rect.width > 0.0 && rect.height > 0.0) {
        return None;
    }
    let (client_x, client_y) = input.client_position()?;
    let x = 100.0 * (client_x - rect.left) / rect.width;
    let y = 100.0 * (client_y - rect.top) / rect.height;
    Some(NormalizedPoint::clamped(x, y))
}
