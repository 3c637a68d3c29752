//! WCAG 2.1 contrast evaluation and accessible-color suggestion.

use crate::error::ColorResult;
use crate::space::{hsl_to_rgb, parse_color, rgb_to_hex, rgb_to_hsl, Hsl, Rgb};

/// WCAG conformance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WcagLevel {
    /// Level AA: 4.5 for normal text, 3.0 for large text.
    #[default]
    Aa,
    /// Level AAA: 7.0 for normal text, 4.5 for large text.
    Aaa,
}

impl WcagLevel {
    /// Minimum contrast ratio required at this level.
    ///
    /// Large text is 18pt+, or 14pt+ bold.
    #[must_use]
    pub fn min_ratio(self, is_large_text: bool) -> f64 {
        match (self, is_large_text) {
            (Self::Aa, false) => 4.5,
            (Self::Aa, true) => 3.0,
            (Self::Aaa, false) => 7.0,
            (Self::Aaa, true) => 4.5,
        }
    }
}

/// Relative luminance of a color per the WCAG 2.1 formula.
///
/// Each channel is normalized to `[0, 1]` and gamma-corrected with the
/// piecewise curve (linear below 0.03928, power 2.4 above), then the
/// channels are combined with the 0.2126 / 0.7152 / 0.0722 weights.
#[must_use]
pub fn relative_luminance(rgb: Rgb) -> f64 {
    let linearize = |channel: u8| {
        let c = f64::from(channel) / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };

    0.2126 * linearize(rgb.r) + 0.7152 * linearize(rgb.g) + 0.0722 * linearize(rgb.b)
}

/// WCAG 2.1 contrast ratio between two colors, in `[1, 21]`.
///
/// Symmetric in its arguments: `contrast_ratio(a, b) ==
/// contrast_ratio(b, a)`.
///
/// # Errors
///
/// Returns a [`crate::ColorError`] if either color fails to parse.
pub fn contrast_ratio(color_a: &str, color_b: &str) -> ColorResult<f64> {
    let lum_a = relative_luminance(parse_color(color_a)?);
    let lum_b = relative_luminance(parse_color(color_b)?);

    let lighter = lum_a.max(lum_b);
    let darker = lum_a.min(lum_b);

    Ok((lighter + 0.05) / (darker + 0.05))
}

/// Check whether a foreground/background pair meets a WCAG level.
///
/// # Errors
///
/// Returns a [`crate::ColorError`] if either color fails to parse.
pub fn is_accessible(
    foreground: &str,
    background: &str,
    level: WcagLevel,
    is_large_text: bool,
) -> ColorResult<bool> {
    let ratio = contrast_ratio(foreground, background)?;
    Ok(ratio >= level.min_ratio(is_large_text))
}

/// Maximum binary-search iterations when adjusting lightness.
const MAX_SUGGEST_ITERATIONS: u32 = 20;

/// Suggest an accessible variant of `candidate` against `background`.
///
/// Walks the candidate's HSL lightness — upward against dark
/// backgrounds, downward against light ones — until the contrast
/// threshold for the requested level is met, preserving hue and
/// saturation. A candidate that already meets the threshold is returned
/// unchanged (as normalized hex).
///
/// The walk is bounded. If no lightness of the candidate's hue reaches
/// the threshold, the result falls back to whichever extreme (white or
/// black) scores the higher ratio; AA targets are always reachable this
/// way, so the returned color is guaranteed to satisfy an AA request.
///
/// # Errors
///
/// Returns a [`crate::ColorError`] if either color fails to parse.
pub fn suggest_accessible_color(
    candidate: &str,
    background: &str,
    level: WcagLevel,
    is_large_text: bool,
) -> ColorResult<String> {
    let target = level.min_ratio(is_large_text);
    let base = parse_color(candidate)?;
    let bg = parse_color(background)?;

    if ratio_against(base, bg) >= target {
        return Ok(hex_of(base));
    }

    let hsl = rgb_to_hsl(base);
    let go_lighter = relative_luminance(bg) < 0.5;

    // Binary search for the least lightness change that clears the
    // threshold.
    let mut lo = if go_lighter { hsl.l } else { 0.0 };
    let mut hi = if go_lighter { 100.0 } else { hsl.l };
    let mut best: Option<f32> = None;

    for _ in 0..MAX_SUGGEST_ITERATIONS {
        let mid = ((lo + hi) / 2.0).round();
        let probe = hsl_to_rgb(Hsl { l: mid, ..hsl });

        if ratio_against(probe, bg) >= target {
            best = Some(mid);
            // Accessible: move back toward the original lightness.
            if go_lighter {
                hi = mid;
            } else {
                lo = mid;
            }
        } else if go_lighter {
            lo = mid;
        } else {
            hi = mid;
        }

        if (hi - lo).abs() <= 1.0 {
            break;
        }
    }

    if let Some(l) = best {
        let adjusted = hsl_to_rgb(Hsl { l, ..hsl });
        if ratio_against(adjusted, bg) >= target {
            return Ok(hex_of(adjusted));
        }
    }

    // This hue never clears the threshold: fall back to the stronger of
    // the two extremes.
    let extreme = hsl_to_rgb(Hsl {
        l: if go_lighter { 100.0 } else { 0.0 },
        ..hsl
    });
    if ratio_against(extreme, bg) >= target {
        return Ok(hex_of(extreme));
    }

    let white = Rgb::new(255, 255, 255);
    let black = Rgb::new(0, 0, 0);
    tracing::debug!(
        candidate,
        background,
        target,
        "no hue-preserving lightness meets the target; using extreme"
    );
    if ratio_against(white, bg) >= ratio_against(black, bg) {
        Ok(hex_of(white))
    } else {
        Ok(hex_of(black))
    }
}

fn ratio_against(color: Rgb, bg: Rgb) -> f64 {
    let lum_a = relative_luminance(color);
    let lum_b = relative_luminance(bg);
    (lum_a.max(lum_b) + 0.05) / (lum_a.min(lum_b) + 0.05)
}

fn hex_of(rgb: Rgb) -> String {
    rgb_to_hex(f64::from(rgb.r), f64::from(rgb.g), f64::from(rgb.b))
}
