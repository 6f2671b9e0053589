//! Core types for page rendering

use std::ops::Add;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use super::error::RenderError;

/// Points per inch of document space
pub const POINTS_PER_INCH: f64 = 72.0;
/// PPI assumed when the display reports none
pub const FALLBACK_PPI: f64 = 100.0;

static CLOCK_ANCHOR: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic timestamp (microseconds) of the last time a page was looked at.
///
/// Used both as job priority (newer renders first) and as cache recency
/// (older gets evicted first).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewTime(pub i64);

impl ViewTime {
    pub const OLDEST: ViewTime = ViewTime(i64::MIN);

    #[must_use]
    pub fn now() -> Self {
        let micros = CLOCK_ANCHOR.elapsed().as_micros();
        Self(i64::try_from(micros).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn as_micros(self) -> i64 {
        self.0
    }
}

impl Add<Duration> for ViewTime {
    type Output = ViewTime;

    fn add(self, penalty: Duration) -> ViewTime {
        let micros = i64::try_from(penalty.as_micros()).unwrap_or(i64::MAX);
        ViewTime(self.0.saturating_add(micros))
    }
}

/// Page size in document points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Identity and geometry of one page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageInfo {
    /// Page number (0-indexed)
    pub index: usize,
    pub size: PageSize,
}

impl PageInfo {
    #[must_use]
    pub const fn new(index: usize, width: f64, height: f64) -> Self {
        Self {
            index,
            size: PageSize::new(width, height),
        }
    }
}

/// Page rotation in clockwise degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    /// Normalizes any multiple of 90 degrees; anything else maps to `None`.
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Self::Quarter,
            180 => Self::Half,
            270 => Self::ThreeQuarters,
            _ => Self::None,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Quarter => 90,
            Self::Half => 180,
            Self::ThreeQuarters => 270,
        }
    }

    /// Whether width and height trade places
    #[must_use]
    pub const fn is_sideways(self) -> bool {
        matches!(self, Self::Quarter | Self::ThreeQuarters)
    }
}

/// HiDPI scale factors of the output device
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceFactors {
    pub x: f64,
    pub y: f64,
}

impl Default for DeviceFactors {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

/// Document-wide view parameters that every render reads at execution time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewParams {
    /// Zoom factor (1.0 = 100%)
    pub zoom: f64,
    /// Screen pixels per inch, 0 when unknown
    pub ppi: f64,
    pub rotation: Rotation,
    pub device_factors: DeviceFactors,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            ppi: 0.0,
            rotation: Rotation::None,
            device_factors: DeviceFactors::default(),
        }
    }
}

impl ViewParams {
    /// Pixels per document point
    #[must_use]
    pub fn scale(&self) -> f64 {
        let ppi = if self.ppi < f64::EPSILON {
            FALLBACK_PPI
        } else {
            self.ppi
        };
        self.zoom * ppi / POINTS_PER_INCH
    }
}

/// Parameters handed to the decoder for one page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodeParams {
    /// Pixels per point applied before device factors
    pub scale: f64,
    pub rotation: Rotation,
    pub device_factors: DeviceFactors,
}

impl DecodeParams {
    /// Native page size, used for plain and blocking renders
    #[must_use]
    pub fn plain(scale: f64) -> Self {
        Self {
            scale,
            rotation: Rotation::None,
            device_factors: DeviceFactors::default(),
        }
    }
}

/// Rectangle in page points (unrotated, unscaled)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PageRect {
    #[must_use]
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Rotates the rectangle the same way the page is rotated on screen.
    #[must_use]
    pub fn rotate(self, rotation: Rotation, page: PageSize) -> Self {
        let PageSize { width, height } = page;
        match rotation {
            Rotation::Quarter => Self::new(height - self.y2, self.x1, height - self.y1, self.x2),
            Rotation::Half => Self::new(
                width - self.x2,
                height - self.y2,
                width - self.x1,
                height - self.y1,
            ),
            Rotation::ThreeQuarters => {
                Self::new(self.y1, width - self.x2, self.y2, width - self.x1)
            }
            Rotation::None => self,
        }
    }

    /// Maps the rectangle into bitmap coordinates, clamped to the bitmap.
    /// Returns `None` if nothing of it is visible.
    #[must_use]
    pub fn to_pixels(
        self,
        page: PageSize,
        params: &DecodeParams,
        width_px: u32,
        height_px: u32,
    ) -> Option<PixelRect> {
        if width_px == 0 || height_px == 0 {
            return None;
        }
        let r = self.rotate(params.rotation, page);
        let sx = params.scale * params.device_factors.x;
        let sy = params.scale * params.device_factors.y;

        let x1 = (r.x1.min(r.x2) * sx).floor();
        let x2 = (r.x1.max(r.x2) * sx).ceil();
        let y1 = (r.y1.min(r.y2) * sy).floor();
        let y2 = (r.y1.max(r.y2) * sy).ceil();

        let max_x = f64::from(width_px - 1);
        let max_y = f64::from(height_px - 1);
        if x2 < 0.0 || y2 < 0.0 || x1 > max_x || y1 > max_y {
            return None;
        }

        Some(PixelRect {
            x1: x1.max(0.0) as u32,
            y1: y1.max(0.0) as u32,
            x2: x2.min(max_x) as u32,
            y2: y2.min(max_y) as u32,
        })
    }
}

/// Rectangle in bitmap pixels, bounds inclusive on all sides
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    #[must_use]
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        self.x1 <= x && self.x2 >= x && self.y1 <= y && self.y2 >= y
    }
}

/// Rendered page bitmap.
///
/// RGBA, 4 bytes per pixel, rows packed without padding.
#[derive(Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    /// Device scale the bitmap was rendered for (HiDPI)
    pub device_scale: DeviceFactors,
}

impl PixelBuffer {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Allocates a transparent-black bitmap.
    ///
    /// Allocation failure is reported, not aborted on: a huge zoom must not
    /// take the process down.
    pub fn try_new(width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidGeometry { width, height });
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(Self::BYTES_PER_PIXEL))
            .ok_or(RenderError::Allocation { width, height })?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| RenderError::Allocation { width, height })?;
        pixels.resize(len, 0);

        Ok(Self {
            width,
            height,
            pixels,
            device_scale: DeviceFactors::default(),
        })
    }

    /// Builds a bitmap from raw RGBA bytes.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RenderError> {
        let expected = (width as usize) * (height as usize) * Self::BYTES_PER_PIXEL;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(RenderError::InvalidGeometry { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels,
            device_scale: DeviceFactors::default(),
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.pixels
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(Self::BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let offset = self.offset(x, y)?;
        let mut out = [0; 4];
        out.copy_from_slice(&self.pixels[offset..offset + Self::BYTES_PER_PIXEL]);
        Some(out)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if let Some(offset) = self.offset(x, y) {
            self.pixels[offset..offset + Self::BYTES_PER_PIXEL].copy_from_slice(&rgba);
        }
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.stride() + x as usize * Self::BYTES_PER_PIXEL)
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("device_scale", &self.device_scale)
            .field("bytes", &self.pixels.len())
            .finish_non_exhaustive()
    }
}
