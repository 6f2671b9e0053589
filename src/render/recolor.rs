//! Lightness-preserving page recoloring
//!
//! Every pixel is described by a lightness scalar (weighted average of its
//! channels), a hue vector pointing away from the grey axis inside the plane
//! of equal lightness, and a saturation. Recoloring moves the lightness into
//! the interval spanned by the palette's dark and light colors. Black lands
//! on the dark color and white on the light color.

use rayon::prelude::*;

use super::color::{Color, LIGHTNESS_WEIGHTS};
use super::types::{PixelBuffer, PixelRect};

/// Bitmaps with at least this many pixels are recolored row-parallel.
const PARALLEL_MIN_PIXELS: usize = 128 * 1024;

/// Recolor settings shared by every job of a document
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecolorConfig {
    pub enabled: bool,
    /// Keep the hue of colored pixels instead of mapping them to grey
    pub preserve_hue: bool,
    /// Leave embedded raster images untouched
    pub reverse_video: bool,
    /// Color white is mapped to
    pub light: Color,
    /// Color black is mapped to
    pub dark: Color,
}

impl Default for RecolorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            preserve_hue: false,
            reverse_video: false,
            light: Color::BLACK,
            dark: Color::WHITE,
        }
    }
}

impl RecolorConfig {
    #[must_use]
    pub fn engine(&self) -> RecolorEngine {
        RecolorEngine::new(self.light, self.dark, self.preserve_hue)
    }
}

/// Recolor transform with the per-palette constants computed once.
#[derive(Clone, Debug)]
pub struct RecolorEngine {
    light: Color,
    dark: Color,
    preserve_hue: bool,
    light_lightness: f64,
    dark_lightness: f64,
    light_hue: [f64; 3],
    dark_hue: [f64; 3],
    rgb_diff: [f64; 3],
    light_transparency: f64,
    dark_transparency: f64,
    fast_formula: bool,
}

impl RecolorEngine {
    #[must_use]
    pub fn new(light: Color, dark: Color, preserve_hue: bool) -> Self {
        let light_lightness = light.lightness();
        let dark_lightness = dark.lightness();
        let hue = |c: &Color, l: f64| {
            [
                c.red * c.alpha - l,
                c.green * c.alpha - l,
                c.blue * c.alpha - l,
            ]
        };

        // The alpha-aware mix is only needed for translucent palettes, or
        // when hue must survive a chromatic palette.
        let fast_formula = (!preserve_hue || (light.is_grey() && dark.is_grey()))
            && light.is_opaque()
            && dark.is_opaque();

        Self {
            light,
            dark,
            preserve_hue,
            light_lightness,
            dark_lightness,
            light_hue: hue(&light, light_lightness),
            dark_hue: hue(&dark, dark_lightness),
            rgb_diff: [
                light.red - dark.red,
                light.green - dark.green,
                light.blue - dark.blue,
            ],
            light_transparency: 1.0 - light.alpha,
            dark_transparency: 1.0 - dark.alpha,
            fast_formula,
        }
    }

    #[must_use]
    pub fn uses_fast_formula(&self) -> bool {
        self.fast_formula
    }

    /// Recolors `bitmap` in place.
    ///
    /// With `reverse_video`, pixels inside any of `image_regions` keep their
    /// color and are made opaque.
    pub fn apply(&self, bitmap: &mut PixelBuffer, reverse_video: bool, image_regions: &[PixelRect]) {
        let regions: &[PixelRect] = if reverse_video { image_regions } else { &[] };
        let stride = bitmap.stride();
        let pixel_count = bitmap.width() as usize * bitmap.height() as usize;
        let bytes = bitmap.as_bytes_mut();

        if pixel_count >= PARALLEL_MIN_PIXELS {
            bytes
                .par_chunks_mut(stride)
                .enumerate()
                .for_each(|(y, row)| self.apply_row(y as u32, row, regions));
        } else {
            for (y, row) in bytes.chunks_mut(stride).enumerate() {
                self.apply_row(y as u32, row, regions);
            }
        }
    }

    #[inline]
    fn apply_row(&self, y: u32, row: &mut [u8], regions: &[PixelRect]) {
        for (x, px) in row
            .chunks_exact_mut(PixelBuffer::BYTES_PER_PIXEL)
            .enumerate()
        {
            if regions.iter().any(|r| r.contains(x as u32, y)) {
                px[3] = 255;
                continue;
            }
            self.recolor_pixel(px);
        }
    }

    /// Recolors one RGBA pixel.
    pub fn recolor_pixel(&self, px: &mut [u8]) {
        let rgb = [
            f64::from(px[0]) / 255.0,
            f64::from(px[1]) / 255.0,
            f64::from(px[2]) / 255.0,
        ];
        let [wr, wg, wb] = LIGHTNESS_WEIGHTS;
        let l = wr * rgb[0] + wg * rgb[1] + wb * rgb[2];

        let out = if self.preserve_hue {
            self.keep_hue(rgb, l)
        } else {
            self.linear(rgb, l)
        };
        px[..4].copy_from_slice(&out);
    }

    fn keep_hue(&self, rgb: [f64; 3], l: f64) -> [u8; 4] {
        let (l1, l2) = (self.dark_lightness, self.light_lightness);
        let h = [rgb[0] - l, rgb[1] - l, rgb[2] - l];

        let u = max_saturation(h, l, 0.0, 1.0);
        let s = if u.abs() > f64::EPSILON { 1.0 / u } else { 0.0 };

        let l = l * (l2 - l1) + l1;
        let su = s * max_saturation(h, l, l1, l2);

        if self.fast_formula {
            return [
                to_byte(l + su * h[0]),
                to_byte(l + su * h[1]),
                to_byte(l + su * h[2]),
                255,
            ];
        }

        let (tr1, tr2) = channel_extremes(rgb);
        let tr1 = 1.0 - tr1;
        let channel = |k: usize| {
            (tr1 * self.dark_hue[k] + tr2 * self.light_hue[k] + (l + su * h[k])).clamp(0.0, 1.0)
        };
        [
            to_byte(channel(0)),
            to_byte(channel(1)),
            to_byte(channel(2)),
            to_byte(1.0 - tr1 * self.dark_transparency - tr2 * self.light_transparency),
        ]
    }

    fn linear(&self, rgb: [f64; 3], l: f64) -> [u8; 4] {
        let dark = [self.dark.red, self.dark.green, self.dark.blue];

        if self.fast_formula {
            return [
                to_byte(l * self.rgb_diff[0] + dark[0]),
                to_byte(l * self.rgb_diff[1] + dark[1]),
                to_byte(l * self.rgb_diff[2] + dark[2]),
                255,
            ];
        }

        let light = [self.light.red, self.light.green, self.light.blue];
        let (max, min) = channel_extremes(rgb);
        let f1 = 1.0 - (1.0 - max) * self.dark_transparency;
        let f2 = min * self.light_transparency;
        let channel = |k: usize| l * self.rgb_diff[k] - f2 * light[k] + f1 * dark[k];
        [
            to_byte(channel(0)),
            to_byte(channel(1)),
            to_byte(channel(2)),
            to_byte(f1 - f2),
        ]
    }
}

/// Recolors `bitmap` so its lightness spans `dark..light`.
pub fn recolor(
    bitmap: &mut PixelBuffer,
    light: Color,
    dark: Color,
    preserve_hue: bool,
    reverse_video: bool,
    image_regions: &[PixelRect],
) {
    RecolorEngine::new(light, dark, preserve_hue).apply(bitmap, reverse_video, image_regions);
}

/// Largest saturation for hue `h` at lightness `l` that keeps every channel
/// inside `[0, 1]`, forced to zero at both ends of `[l1, l2]`.
fn max_saturation(h: [f64; 3], l: f64, l1: f64, l2: f64) -> f64 {
    if h.iter().all(|c| c.abs() <= f64::EPSILON) {
        return 0.0;
    }
    if (l2 - l1).abs() <= f64::EPSILON {
        return 0.0;
    }

    let lv = (l - l1) / (l2 - l1);
    let mut u = f64::MAX;
    let mut v = f64::MAX;
    for hk in h {
        if hk > f64::EPSILON {
            u = u.min(((1.0 - l) / hk).abs());
            v = v.min(((1.0 - lv) / hk).abs());
        } else if hk < -f64::EPSILON {
            u = u.min((l / hk).abs());
            v = v.min((lv / hk).abs());
        }
    }

    u.min((l2 - l1).abs() * v)
}

/// Largest and smallest channel
#[inline]
fn channel_extremes(rgb: [f64; 3]) -> (f64, f64) {
    (
        rgb[0].max(rgb[1]).max(rgb[2]),
        rgb[0].min(rgb[1]).min(rgb[2]),
    )
}

#[inline]
fn to_byte(v: f64) -> u8 {
    (255.0 * v).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(pixels: &[[u8; 4]], width: u32) -> PixelBuffer {
        let height = pixels.len() as u32 / width;
        PixelBuffer::from_rgba(width, height, pixels.concat()).expect("valid geometry")
    }

    fn lightness_of(px: [u8; 4]) -> f64 {
        Color::from_rgb8(px[0], px[1], px[2]).lightness()
    }

    #[test]
    fn black_to_white_linear_keeps_grey_bitmaps() {
        let greys: Vec<[u8; 4]> = (0..=255u8).step_by(5).map(|v| [v, v, v, 255]).collect();
        let mut bitmap = buffer(&greys, greys.len() as u32);
        let original = bitmap.clone();

        recolor(&mut bitmap, Color::WHITE, Color::BLACK, false, false, &[]);
        assert_eq!(bitmap, original);
    }

    #[test]
    fn default_palette_inverts() {
        let config = RecolorConfig::default();
        let mut bitmap = buffer(&[[255, 255, 255, 255], [0, 0, 0, 255]], 2);

        config.engine().apply(&mut bitmap, false, &[]);
        assert_eq!(bitmap.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(bitmap.pixel(1, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn hue_mode_anchors_black_and_white_on_palette_lightness() {
        let palettes = [
            (
                Color::parse("#CCCCCC").expect("valid"),
                Color::parse("#333333").expect("valid"),
            ),
            (
                Color::parse("#F0E0C0").expect("valid"),
                Color::parse("#1E3A5F").expect("valid"),
            ),
        ];

        for (light, dark) in palettes {
            let mut bitmap = buffer(&[[0, 0, 0, 255], [255, 255, 255, 255]], 2);
            recolor(&mut bitmap, light, dark, true, false, &[]);

            let black = bitmap.pixel(0, 0).expect("in bounds");
            let white = bitmap.pixel(1, 0).expect("in bounds");
            assert!((lightness_of(black) - dark.lightness()).abs() <= 1.0 / 255.0);
            assert!((lightness_of(white) - light.lightness()).abs() <= 1.0 / 255.0);
        }
    }

    #[test]
    fn hue_mode_keeps_colored_pixels_colored() {
        let mut bitmap = buffer(&[[200, 40, 40, 255]], 1);
        recolor(&mut bitmap, Color::BLACK, Color::WHITE, true, false, &[]);

        let [r, g, b, _] = bitmap.pixel(0, 0).expect("in bounds");
        assert!(r > g && r > b, "red should stay dominant, got {r},{g},{b}");
    }

    #[test]
    fn degenerate_interval_gives_grey() {
        let grey = Color::parse("#808080").expect("valid");
        let mut bitmap = buffer(&[[200, 40, 40, 255], [10, 200, 90, 255]], 2);
        recolor(&mut bitmap, grey, grey, true, false, &[]);

        let expected = to_byte(grey.lightness());
        for x in 0..2 {
            assert_eq!(
                bitmap.pixel(x, 0),
                Some([expected, expected, expected, 255])
            );
        }
    }

    #[test]
    fn reverse_video_leaves_image_regions_alone() {
        let mut pixels = vec![[255, 255, 255, 255]; 16];
        pixels[5] = [10, 20, 30, 0];
        pixels[10] = [40, 50, 60, 128];
        let mut bitmap = buffer(&pixels, 4);
        let image = PixelRect::new(1, 1, 2, 2);

        recolor(
            &mut bitmap,
            Color::BLACK,
            Color::WHITE,
            false,
            true,
            &[image],
        );

        assert_eq!(bitmap.pixel(1, 1), Some([10, 20, 30, 255]));
        assert_eq!(bitmap.pixel(2, 2), Some([40, 50, 60, 255]));
        assert_eq!(bitmap.pixel(2, 1), Some([255, 255, 255, 255]));
        assert_eq!(bitmap.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(bitmap.pixel(3, 3), Some([0, 0, 0, 255]));
    }

    #[test]
    fn image_regions_are_ignored_without_reverse_video() {
        let mut bitmap = buffer(&[[255, 255, 255, 255]; 4], 2);
        recolor(
            &mut bitmap,
            Color::BLACK,
            Color::WHITE,
            false,
            false,
            &[PixelRect::new(0, 0, 1, 1)],
        );
        assert!(
            bitmap
                .as_bytes()
                .chunks_exact(4)
                .all(|px| px == [0, 0, 0, 255])
        );
    }

    #[test]
    fn translucent_palette_produces_alpha() {
        let light = Color::rgba(0.0, 0.0, 0.0, 0.5);
        let engine = RecolorEngine::new(light, Color::WHITE, false);
        assert!(!engine.uses_fast_formula());

        let mut bitmap = buffer(&[[255, 255, 255, 255], [0, 0, 0, 255]], 2);
        engine.apply(&mut bitmap, false, &[]);

        assert_eq!(bitmap.pixel(0, 0), Some([0, 0, 0, 128]));
        assert_eq!(bitmap.pixel(1, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn fast_formula_selection() {
        let tint = Color::parse("#F0E0C0").expect("valid");
        assert!(RecolorEngine::new(Color::BLACK, Color::WHITE, true).uses_fast_formula());
        assert!(RecolorEngine::new(tint, Color::BLACK, false).uses_fast_formula());
        assert!(!RecolorEngine::new(tint, Color::BLACK, true).uses_fast_formula());
    }

    #[test]
    fn parallel_path_matches_per_pixel_recolor() {
        let (width, height) = (512u32, 300u32);
        let pixels: Vec<u8> = (0..width * height)
            .flat_map(|i| {
                let v = (i % 251) as u8;
                [v, v.wrapping_mul(3), v.wrapping_add(77), 255]
            })
            .collect();
        let mut bitmap = PixelBuffer::from_rgba(width, height, pixels).expect("valid geometry");
        let engine = RecolorEngine::new(
            Color::parse("#F0E0C0").expect("valid"),
            Color::parse("#1E3A5F").expect("valid"),
            true,
        );

        let mut expected = bitmap.clone();
        for px in expected.as_bytes_mut().chunks_exact_mut(4) {
            engine.recolor_pixel(px);
        }

        engine.apply(&mut bitmap, false, &[]);
        assert_eq!(bitmap, expected);
    }
}
