//! # Styler Color
//!
//! Deterministic color-space math and WCAG 2.1 accessibility evaluation
//! for the Styler theming engine.
//!
//! Every function here is pure: no hidden state, no I/O, safe to call
//! from any thread. Colors move between four representations:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  "#1e40af"  ◄──►  Rgb { r, g, b }           │
//! │  "rgb(…)"         │                         │
//! │  "rgba(…)"        ▼                         │
//! │  "hsl(…)"   ◄──►  Hsl { h, s, l }           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Contrast evaluation implements the WCAG 2.1 relative-luminance
//! formula and the AA/AAA threshold table; palette generation rotates
//! hue in HSL space.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod contrast;
pub mod error;
pub mod harmony;
pub mod space;

pub use contrast::{
    contrast_ratio, is_accessible, relative_luminance, suggest_accessible_color, WcagLevel,
};
pub use error::{ColorError, ColorResult};
pub use harmony::{analogous, analogous_default, complementary, triadic};
pub use space::{
    format_hsl, format_rgb, hex_to_rgb, hsl_to_rgb, is_valid_color, parse_color, rgb_to_hex,
    rgb_to_hsl, Hsl, Rgb,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
