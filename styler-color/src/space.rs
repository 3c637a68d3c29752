//! Color representations and conversions between them.
//!
//! `Rgb` is the canonical arithmetic form; `Hsl` exists for hue-based
//! manipulation. Textual forms (hex, `rgb()`/`rgba()`, `hsl()`/`hsla()`)
//! are parsed with [`parse_color`] and produced with [`rgb_to_hex`],
//! [`format_rgb`] and [`format_hsl`].

use serde::{Deserialize, Serialize};

use crate::error::{ColorError, ColorResult};

/// An RGB color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel (0-255).
    pub r: u8,
    /// Green channel (0-255).
    pub g: u8,
    /// Blue channel (0-255).
    pub b: u8,
}

impl Rgb {
    /// Create an RGB color from channel values.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// An HSL color.
///
/// Hue is in degrees `[0, 360)`; saturation and lightness are
/// percentages `[0, 100]`. Conversions round all three components to
/// whole numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    /// Hue in degrees.
    pub h: f32,
    /// Saturation percentage.
    pub s: f32,
    /// Lightness percentage.
    pub l: f32,
}

impl Hsl {
    /// Create an HSL color from components.
    #[must_use]
    pub const fn new(h: f32, s: f32, l: f32) -> Self {
        Self { h, s, l }
    }
}

/// Parse a 6-digit hex color, with or without a leading `#`.
///
/// Case-insensitive. Shorthand (3-digit) and alpha (8-digit) forms are
/// rejected.
///
/// # Errors
///
/// Returns [`ColorError::InvalidColorFormat`] if the input is not
/// exactly six hex digits after the optional `#`.
pub fn hex_to_rgb(hex: &str) -> ColorResult<Rgb> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);

    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidColorFormat(hex.to_string()));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map_err(|_| ColorError::InvalidColorFormat(hex.to_string()))
    };

    Ok(Rgb {
        r: channel(0..2)?,
        g: channel(2..4)?,
        b: channel(4..6)?,
    })
}

/// Format RGB channels as a lowercase `#rrggbb` string.
///
/// Channels are clamped to `[0, 255]` and rounded to the nearest
/// integer, so out-of-range or fractional inputs are silently
/// normalized rather than rejected.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgb_to_hex(r: f64, g: f64, b: f64) -> String {
    let clamp = |c: f64| -> u8 {
        if c.is_nan() {
            return 0;
        }
        c.round().clamp(0.0, 255.0) as u8
    };

    format!("#{:02x}{:02x}{:02x}", clamp(r), clamp(g), clamp(b))
}

/// Convert RGB to HSL.
///
/// Achromatic colors (r == g == b) yield hue 0 and saturation 0.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // components bounded by construction
pub fn rgb_to_hsl(rgb: Rgb) -> Hsl {
    let r = f64::from(rgb.r) / 255.0;
    let g = f64::from(rgb.g) / 255.0;
    let b = f64::from(rgb.b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let l = (max + min) / 2.0;
    let mut h = 0.0;
    let mut s = 0.0;

    if delta > f64::EPSILON {
        s = if l > 0.5 {
            delta / (2.0 - max - min)
        } else {
            delta / (max + min)
        };

        h = if (max - r).abs() < f64::EPSILON {
            ((g - b) / delta + if g < b { 6.0 } else { 0.0 }) / 6.0
        } else if (max - g).abs() < f64::EPSILON {
            ((b - r) / delta + 2.0) / 6.0
        } else {
            ((r - g) / delta + 4.0) / 6.0
        };
    }

    Hsl {
        // Keep hue in [0, 360) after rounding.
        h: ((h * 360.0).round() % 360.0) as f32,
        s: (s * 100.0).round() as f32,
        l: (l * 100.0).round() as f32,
    }
}

/// Convert HSL to RGB.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsl_to_rgb(hsl: Hsl) -> Rgb {
    let h = f64::from(hsl.h) / 360.0;
    let s = (f64::from(hsl.s) / 100.0).clamp(0.0, 1.0);
    let l = (f64::from(hsl.l) / 100.0).clamp(0.0, 1.0);

    let (r, g, b) = if s < f64::EPSILON {
        // Achromatic (gray)
        (l, l, l)
    } else {
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        (
            hue_to_channel(p, q, h + 1.0 / 3.0),
            hue_to_channel(p, q, h),
            hue_to_channel(p, q, h - 1.0 / 3.0),
        )
    };

    Rgb {
        r: (r * 255.0).round().clamp(0.0, 255.0) as u8,
        g: (g * 255.0).round().clamp(0.0, 255.0) as u8,
        b: (b * 255.0).round().clamp(0.0, 255.0) as u8,
    }
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let mut t = t;
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Parse any supported textual color form into RGB.
///
/// Supported forms: `#rrggbb`, `rgb(r, g, b)`, `rgba(r, g, b, a)` (alpha
/// parsed, then discarded), `hsl(h, s%, l%)` and `hsla(h, s%, l%, a)`.
/// Numeric channels are clamped to their valid ranges.
///
/// # Errors
///
/// Returns [`ColorError::InvalidColorFormat`] for a malformed hex
/// string and [`ColorError::UnsupportedColorFormat`] for anything else
/// that does not match a supported form.
pub fn parse_color(text: &str) -> ColorResult<Rgb> {
    let trimmed = text.trim();

    if trimmed.starts_with('#') {
        return hex_to_rgb(trimmed);
    }

    if let Some(args) = call_args(trimmed, "rgba").or_else(|| call_args(trimmed, "rgb")) {
        return parse_rgb_args(args).ok_or_else(|| unsupported(text));
    }

    if let Some(args) = call_args(trimmed, "hsla").or_else(|| call_args(trimmed, "hsl")) {
        return parse_hsl_args(args).ok_or_else(|| unsupported(text));
    }

    Err(unsupported(text))
}

fn unsupported(text: &str) -> ColorError {
    ColorError::UnsupportedColorFormat(text.to_string())
}

/// Extract the argument list of `name(...)`, or `None` if the input is
/// not a call to `name`.
fn call_args<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(name)?.trim_start();
    rest.strip_prefix('(')?.strip_suffix(')')
}

fn parse_rgb_args(args: &str) -> Option<Rgb> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    // Alpha is validated, then dropped from the returned triple.
    if parts.len() == 4 {
        parts[3].parse::<f64>().ok()?;
    }

    Some(Rgb {
        r: parse_channel(parts[0])?,
        g: parse_channel(parts[1])?,
        b: parse_channel(parts[2])?,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_channel(text: &str) -> Option<u8> {
    let value = text.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 255.0) as u8)
}

fn parse_hsl_args(args: &str) -> Option<Rgb> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    if parts.len() == 4 {
        parts[3].parse::<f64>().ok()?;
    }

    let h = parts[0].parse::<f32>().ok()?;
    let s = parts[1].trim_end_matches('%').parse::<f32>().ok()?;
    let l = parts[2].trim_end_matches('%').parse::<f32>().ok()?;

    if !h.is_finite() || !s.is_finite() || !l.is_finite() {
        return None;
    }

    Some(hsl_to_rgb(Hsl { h, s, l }))
}

/// Report whether a color string parses successfully. Never errors.
#[must_use]
pub fn is_valid_color(text: &str) -> bool {
    parse_color(text).is_ok()
}

/// Format RGB as a CSS `rgb()` string, or `rgba()` when alpha is given.
#[must_use]
pub fn format_rgb(rgb: Rgb, alpha: Option<f64>) -> String {
    match alpha {
        Some(a) => format!("rgba({}, {}, {}, {})", rgb.r, rgb.g, rgb.b, a),
        None => format!("rgb({}, {}, {})", rgb.r, rgb.g, rgb.b),
    }
}

/// Format HSL as a CSS `hsl()` string, or `hsla()` when alpha is given.
#[must_use]
pub fn format_hsl(hsl: Hsl, alpha: Option<f64>) -> String {
    match alpha {
        Some(a) => format!("hsla({}, {}%, {}%, {})", hsl.h, hsl.s, hsl.l, a),
        None => format!("hsl({}, {}%, {}%)", hsl.h, hsl.s, hsl.l),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb_basic() {
        assert_eq!(hex_to_rgb("#ff0000").unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(hex_to_rgb("00ff00").unwrap(), Rgb::new(0, 255, 0));
        assert_eq!(hex_to_rgb("#0000FF").unwrap(), Rgb::new(0, 0, 255));
    }

    #[test]
    fn test_hex_to_rgb_rejects_malformed() {
        assert!(hex_to_rgb("#fff").is_err());
        assert!(hex_to_rgb("#ff00000").is_err());
        assert!(hex_to_rgb("#gg0000").is_err());
        assert!(hex_to_rgb("").is_err());
        assert!(hex_to_rgb("#").is_err());
    }

    #[test]
    fn test_rgb_to_hex_clamps_and_rounds() {
        assert_eq!(rgb_to_hex(300.0, -10.0, 127.5), "#ff0080");
        assert_eq!(rgb_to_hex(0.0, 0.0, 0.0), "#000000");
        assert_eq!(rgb_to_hex(255.0, 255.0, 255.0), "#ffffff");
    }

    #[test]
    fn test_hex_round_trip() {
        for hex in ["#000000", "#ffffff", "#1e40af", "#a1b2c3", "#0f0f0f"] {
            let rgb = hex_to_rgb(hex).unwrap();
            assert_eq!(
                rgb_to_hex(f64::from(rgb.r), f64::from(rgb.g), f64::from(rgb.b)),
                hex
            );
        }
    }

    #[test]
    fn test_rgb_to_hsl_achromatic() {
        let hsl = rgb_to_hsl(Rgb::new(128, 128, 128));
        assert!((hsl.h - 0.0).abs() < f32::EPSILON);
        assert!((hsl.s - 0.0).abs() < f32::EPSILON);
        assert!((hsl.l - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rgb_to_hsl_primaries() {
        let red = rgb_to_hsl(Rgb::new(255, 0, 0));
        assert!((red.h - 0.0).abs() < f32::EPSILON);
        assert!((red.s - 100.0).abs() < f32::EPSILON);
        assert!((red.l - 50.0).abs() < f32::EPSILON);

        let green = rgb_to_hsl(Rgb::new(0, 255, 0));
        assert!((green.h - 120.0).abs() < f32::EPSILON);

        let blue = rgb_to_hsl(Rgb::new(0, 0, 255));
        assert!((blue.h - 240.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_hsl_to_rgb_round_trip_within_rounding() {
        for rgb in [
            Rgb::new(255, 0, 0),
            Rgb::new(30, 144, 255),
            Rgb::new(199, 21, 133),
            Rgb::new(46, 139, 87),
        ] {
            let back = hsl_to_rgb(rgb_to_hsl(rgb));
            assert!(back.r.abs_diff(rgb.r) <= 3);
            assert!(back.g.abs_diff(rgb.g) <= 3);
            assert!(back.b.abs_diff(rgb.b) <= 3);
        }
    }

    #[test]
    fn test_hue_wraps_below_360() {
        // A hue that would round to 360 must wrap to 0.
        let hsl = rgb_to_hsl(Rgb::new(255, 0, 1));
        assert!(hsl.h >= 0.0 && hsl.h < 360.0);
    }

    #[test]
    fn test_parse_color_variants() {
        assert_eq!(parse_color("#ff0000").unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(parse_color("rgb(10, 20, 30)").unwrap(), Rgb::new(10, 20, 30));
        assert_eq!(
            parse_color("rgba(10, 20, 30, 0.5)").unwrap(),
            Rgb::new(10, 20, 30)
        );
        assert_eq!(
            parse_color("hsl(0, 100%, 50%)").unwrap(),
            Rgb::new(255, 0, 0)
        );
        assert_eq!(
            parse_color("hsla(120, 100%, 50%, 0.3)").unwrap(),
            Rgb::new(0, 255, 0)
        );
        assert_eq!(parse_color("  rgb(1,2,3)  ").unwrap(), Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_parse_color_rejects_unsupported() {
        assert!(matches!(
            parse_color("blue"),
            Err(ColorError::UnsupportedColorFormat(_))
        ));
        assert!(parse_color("").is_err());
        assert!(parse_color("rgb(1, 2)").is_err());
        assert!(parse_color("rgb(a, b, c)").is_err());
        assert!(parse_color("hsl(0, x%, 50%)").is_err());
    }

    #[test]
    fn test_is_valid_color_never_panics() {
        assert!(is_valid_color("#123456"));
        assert!(is_valid_color("rgb(0, 0, 0)"));
        assert!(!is_valid_color("not-a-color"));
        assert!(!is_valid_color(""));
    }

    #[test]
    fn test_format_rgb() {
        assert_eq!(format_rgb(Rgb::new(1, 2, 3), None), "rgb(1, 2, 3)");
        assert_eq!(
            format_rgb(Rgb::new(1, 2, 3), Some(0.5)),
            "rgba(1, 2, 3, 0.5)"
        );
    }

    #[test]
    fn test_format_hsl() {
        let hsl = Hsl::new(120.0, 50.0, 40.0);
        assert_eq!(format_hsl(hsl, None), "hsl(120, 50%, 40%)");
        assert_eq!(format_hsl(hsl, Some(0.25)), "hsla(120, 50%, 40%, 0.25)");
    }
}
