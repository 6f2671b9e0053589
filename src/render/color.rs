//! Recolor palette colors

use std::str::FromStr;

/// RGB weights used for perceptual lightness. They sum to one.
pub const LIGHTNESS_WEIGHTS: [f64; 3] = [0.30, 0.59, 0.11];

/// Color with channels in `[0, 1]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized color '{input}'")]
pub struct ColorParseError {
    pub input: String,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    #[must_use]
    pub const fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Self::rgba(red, green, blue, 1.0)
    }

    #[must_use]
    pub const fn rgba(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    #[must_use]
    pub fn from_rgb8(red: u8, green: u8, blue: u8) -> Self {
        Self::rgb(
            f64::from(red) / 255.0,
            f64::from(green) / 255.0,
            f64::from(blue) / 255.0,
        )
    }

    #[must_use]
    pub fn lightness(&self) -> f64 {
        let [wr, wg, wb] = LIGHTNESS_WEIGHTS;
        wr * self.red + wg * self.green + wb * self.blue
    }

    #[must_use]
    pub fn is_grey(&self) -> bool {
        (self.red - self.blue).abs() < f64::EPSILON && (self.red - self.green).abs() < f64::EPSILON
    }

    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.alpha >= 1.0 - f64::EPSILON
    }

    /// Parses `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)`
    /// and a handful of names.
    pub fn parse(input: &str) -> Result<Self, ColorParseError> {
        let err = || ColorParseError {
            input: input.to_string(),
        };
        let s = input.trim();

        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(err);
        }

        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "black" => return Ok(Self::BLACK),
            "white" => return Ok(Self::WHITE),
            "transparent" => return Ok(Self::rgba(0.0, 0.0, 0.0, 0.0)),
            _ => {}
        }

        if let Some(args) = lower
            .strip_prefix("rgba(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_functional(args, true).ok_or_else(err);
        }
        if let Some(args) = lower
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_functional(args, false).ok_or_else(err);
        }

        Err(err())
    }

    /// Formats as `#rrggbb`, or `#rrggbbaa` when translucent.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        if self.is_opaque() {
            format!(
                "#{:02X}{:02X}{:02X}",
                byte(self.red),
                byte(self.green),
                byte(self.blue)
            )
        } else {
            format!(
                "#{:02X}{:02X}{:02X}{:02X}",
                byte(self.red),
                byte(self.green),
                byte(self.blue),
                byte(self.alpha)
            )
        }
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let unit = |v: u8| f64::from(v) / 255.0;

    let (r, g, b, a) = match hex.len() {
        3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
        4 => (nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
        6 => (byte(0)?, byte(2)?, byte(4)?, 255),
        8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
        _ => return None,
    };
    Some(Color::rgba(unit(r), unit(g), unit(b), unit(a)))
}

fn parse_functional(args: &str, with_alpha: bool) -> Option<Color> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let expected = if with_alpha { 4 } else { 3 };
    if parts.len() != expected {
        return None;
    }

    let channel = |s: &str| -> Option<f64> {
        if let Some(pct) = s.strip_suffix('%') {
            pct.trim().parse::<f64>().ok().map(|v| v / 100.0)
        } else {
            s.parse::<f64>().ok().map(|v| v / 255.0)
        }
    };

    let red = channel(parts[0])?;
    let green = channel(parts[1])?;
    let blue = channel(parts[2])?;
    let alpha = if with_alpha {
        parts[3].parse::<f64>().ok()?
    } else {
        1.0
    };

    let in_range = |v: f64| (0.0..=1.0).contains(&v);
    if [red, green, blue, alpha].into_iter().all(in_range) {
        Some(Color::rgba(red, green, blue, alpha))
    } else {
        None
    }
}
