use rusttype::Font;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumString};

/// A recipient mailing address, one per input row.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub addressee: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}
impl AddressRecord {
    /// The three-line text written on the card.
    pub fn text(&self) -> String {
        format!(
            "{}\n{}\n{}, {} {}",
            self.addressee, self.address, self.city, self.state, self.zip
        )
    }
}
impl fmt::Display for AddressRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.addressee, self.address, self.city, self.state, self.zip
        )
    }
}

/// An RGB color triple.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);
impl Rgb {
    pub const DARK_BLUE: Rgb = Rgb(0, 0, 139);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
}
impl From<Rgb> for image::Rgb<u8> {
    fn from(c: Rgb) -> Self {
        image::Rgb([c.0, c.1, c.2])
    }
}

/// A loaded font face at a fixed pixel size.
#[derive(Clone)]
pub struct FontHandle {
    pub font: Arc<Font<'static>>,
    pub size: f32,
}
impl fmt::Debug for FontHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FontHandle")
            .field("glyphs", &self.font.glyph_count())
            .field("size", &self.size)
            .finish()
    }
}

/// Multi-line text treated as one unit for layout.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub font: FontHandle,
    pub color: Rgb,
}
impl TextBlock {
    pub fn new(text: &str, font: FontHandle, color: Rgb) -> Self {
        Self {
            lines: text.split('\n').map(|s| s.trim_end_matches('\r').to_string()).collect(),
            font,
            color,
        }
    }
}

/// Ink bounding box size of one line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineMetrics {
    pub width: u32,
    pub height: u32,
}

/// Where a text block's top-left corner goes on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    /// Centered, with the vertical start multiplied by a bias factor.
    Centered { vertical_bias: f32 },
    TopLeftFixed { x: i32, y: i32 },
}

/// Per-line positional noise.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub enabled: bool,
    pub x_range: i32,
    pub y_range: i32,
}
impl Jitter {
    pub const NONE: Jitter = Jitter {
        enabled: false,
        x_range: 0,
        y_range: 0,
    };
}

/// How the packer scales an image onto its page.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum ScalePolicy {
    FitToPage,
    FixedFactor(f32),
}

/// What to do with a row that fails validation.
#[derive(
    Debug, Default, Display, EnumString, Serialize, Deserialize, Clone, Copy, PartialEq, Eq,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    #[default]
    Halt,
    Skip,
}

/// A record that was skipped or failed, by 1-based row number.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Failure {
    pub row: usize,
    pub reason: String,
}
impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}
