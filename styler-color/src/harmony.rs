//! Hue-rotation palette generation.
//!
//! All generators operate in HSL space, preserve the base color's
//! saturation and lightness, and return lowercase hex.

use crate::error::ColorResult;
use crate::space::{hsl_to_rgb, parse_color, rgb_to_hex, rgb_to_hsl, Hsl, Rgb};

/// Default angle for analogous palettes, in degrees.
pub const ANALOGOUS_ANGLE: f32 = 30.0;

/// Complementary color: hue rotated 180 degrees.
///
/// # Errors
///
/// Returns a [`crate::ColorError`] if the base color fails to parse.
pub fn complementary(base: &str) -> ColorResult<String> {
    let hsl = rgb_to_hsl(parse_color(base)?);
    Ok(hex_at_hue(hsl, 180.0))
}

/// Analogous pair: hues rotated by `angle` in both directions.
///
/// # Errors
///
/// Returns a [`crate::ColorError`] if the base color fails to parse.
pub fn analogous(base: &str, angle: f32) -> ColorResult<(String, String)> {
    let hsl = rgb_to_hsl(parse_color(base)?);
    Ok((hex_at_hue(hsl, angle), hex_at_hue(hsl, -angle)))
}

/// Analogous pair at the default 30 degree spread.
///
/// # Errors
///
/// Returns a [`crate::ColorError`] if the base color fails to parse.
pub fn analogous_default(base: &str) -> ColorResult<(String, String)> {
    analogous(base, ANALOGOUS_ANGLE)
}

/// Triadic pair: hues rotated +120 and +240 degrees.
///
/// # Errors
///
/// Returns a [`crate::ColorError`] if the base color fails to parse.
pub fn triadic(base: &str) -> ColorResult<(String, String)> {
    let hsl = rgb_to_hsl(parse_color(base)?);
    Ok((hex_at_hue(hsl, 120.0), hex_at_hue(hsl, 240.0)))
}

fn hex_at_hue(hsl: Hsl, offset: f32) -> String {
    let rotated = Hsl {
        h: (hsl.h + offset).rem_euclid(360.0),
        ..hsl
    };
    hex_of(hsl_to_rgb(rotated))
}

fn hex_of(rgb: Rgb) -> String {
    rgb_to_hex(f64::from(rgb.r), f64::from(rgb.g), f64::from(rgb.b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::hex_to_rgb;

    fn hue_of(hex: &str) -> f32 {
        rgb_to_hsl(hex_to_rgb(hex).unwrap()).h
    }

    fn hue_distance(a: f32, b: f32) -> f32 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    #[test]
    fn test_complementary_rotates_180() {
        let result = complementary("#ff0000").unwrap();
        assert!(hue_distance(hue_of(&result), 180.0) <= 1.0);
    }

    #[test]
    fn test_complementary_preserves_saturation_and_lightness() {
        let base = rgb_to_hsl(hex_to_rgb("#3b82f6").unwrap());
        let result = rgb_to_hsl(hex_to_rgb(&complementary("#3b82f6").unwrap()).unwrap());
        assert!((base.s - result.s).abs() <= 2.0);
        assert!((base.l - result.l).abs() <= 2.0);
    }

    #[test]
    fn test_analogous_default_spread() {
        let (plus, minus) = analogous_default("#00ff00").unwrap();
        let base_hue = hue_of("#00ff00");
        assert!(hue_distance(hue_of(&plus), base_hue + 30.0) <= 1.0);
        assert!(hue_distance(hue_of(&minus), base_hue - 30.0) <= 1.0);
    }

    #[test]
    fn test_analogous_custom_angle() {
        let (plus, minus) = analogous("#ff0000", 15.0).unwrap();
        assert!(hue_distance(hue_of(&plus), 15.0) <= 1.0);
        assert!(hue_distance(hue_of(&minus), 345.0) <= 1.0);
    }

    #[test]
    fn test_triadic_rotations() {
        let (first, second) = triadic("#ff0000").unwrap();
        assert!(hue_distance(hue_of(&first), 120.0) <= 1.0);
        assert!(hue_distance(hue_of(&second), 240.0) <= 1.0);
    }

    #[test]
    fn test_rejects_invalid_base() {
        assert!(complementary("nope").is_err());
        assert!(analogous_default("").is_err());
        assert!(triadic("#12345").is_err());
    }

    #[test]
    fn test_achromatic_base_stays_achromatic() {
        let result = complementary("#808080").unwrap();
        assert_eq!(result, "#808080");
    }
}
