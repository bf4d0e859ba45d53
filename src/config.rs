use crate::core::*;
use crate::envelope::*;
use crate::err::*;
use crate::models::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const FONT_SIZE: f32 = 90.0;
pub const SENDER_FONT_SIZE: f32 = 60.0;
/// Blank canvas size when no background is given.
pub const CANVAS_WIDTH: u32 = 1800;
pub const CANVAS_HEIGHT: u32 = 1200;
/// Sender block offset from the top-left corner.
pub const SENDER_MARGIN: i32 = 50;
/// Downward shift used with a sender block, tuned for the stock background.
pub const DUAL_VERTICAL_BIAS: f32 = 1.2;
pub const JITTER_X: i32 = 10;
pub const JITTER_Y: i32 = 5;
/// Upper bounds on pixel offsets, keeping canvas arithmetic in `i32`.
pub const MAX_JITTER: i32 = 1_000;
pub const MAX_OFFSET: i32 = 100_000;

/// Everything a mailing run needs. Loadable from JSON; missing keys take defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub input: PathBuf,
    pub fonts_dir: PathBuf,
    pub font: FontChoice,
    pub font_size: f32,
    pub sender_font_size: f32,
    pub background: Option<PathBuf>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub canvas_fill: Rgb,
    pub text_color: Rgb,
    pub line_spacing: i32,
    pub sender: Option<String>,
    pub sender_margin: (i32, i32),
    pub jitter: Jitter,
    /// Multiplier on the centered block's vertical start; `None` picks 1.0, or
    /// `DUAL_VERTICAL_BIAS` when a sender block is drawn.
    pub vertical_bias: Option<f32>,
    /// Directory for per-record JPEGs; `None` skips writing them.
    pub out_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub scale: ScalePolicy,
    /// Page size in points; `None` derives it from the canvas and the divisor.
    pub page: Option<PageSize>,
    pub seed: Option<u64>,
    pub row_policy: RowPolicy,
    pub summary: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: "addresses.csv".into(),
            fonts_dir: "fonts".into(),
            font: FontChoice::default(),
            font_size: FONT_SIZE,
            sender_font_size: SENDER_FONT_SIZE,
            background: None,
            canvas_width: CANVAS_WIDTH,
            canvas_height: CANVAS_HEIGHT,
            canvas_fill: Rgb::WHITE,
            text_color: Rgb::DARK_BLUE,
            line_spacing: crate::compose::LINE_SPACING,
            sender: None,
            sender_margin: (SENDER_MARGIN, SENDER_MARGIN),
            jitter: Jitter {
                enabled: true,
                x_range: JITTER_X,
                y_range: JITTER_Y,
            },
            vertical_bias: None,
            out_dir: Some("handwritten_texts".into()),
            output: "handwritten_texts.pdf".into(),
            scale: ScalePolicy::FitToPage,
            page: None,
            seed: None,
            row_policy: RowPolicy::Halt,
            summary: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let cfg: Config = read_from_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks values that would otherwise fail mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(Error::Config("canvas size must be positive".into()));
        }
        if let ScalePolicy::FixedFactor(f) = self.scale {
            if !f.is_finite() || f <= 0.0 {
                return Err(Error::Config(format!("divisor must be positive, got {f}")));
            }
        }
        if let Some(bias) = self.vertical_bias {
            if !bias.is_finite() || bias < 0.0 {
                return Err(Error::Config(format!("vertical bias must be >= 0, got {bias}")));
            }
        }
        if let Some(page) = self.page {
            if !(page.width > 0.0 && page.height > 0.0) {
                return Err(Error::Config("page size must be positive".into()));
            }
        }
        let max = MAX_OFFSET as u32;
        if self.canvas_width > max || self.canvas_height > max {
            return Err(Error::Config(format!("canvas size must be at most {max}")));
        }
        for (name, v) in [("x", self.jitter.x_range), ("y", self.jitter.y_range)] {
            if !(0..=MAX_JITTER).contains(&v) {
                return Err(Error::Config(format!(
                    "jitter {name} range must be in 0..={MAX_JITTER}, got {v}"
                )));
            }
        }
        let (mx, my) = self.sender_margin;
        if !(0..=MAX_OFFSET).contains(&mx) || !(0..=MAX_OFFSET).contains(&my) {
            return Err(Error::Config(format!(
                "sender margin must be in 0..={MAX_OFFSET}, got ({mx}, {my})"
            )));
        }
        if !(-MAX_JITTER..=MAX_OFFSET).contains(&self.line_spacing) {
            return Err(Error::Config(format!(
                "line spacing must be in -{MAX_JITTER}..={MAX_OFFSET}, got {}",
                self.line_spacing
            )));
        }
        Ok(())
    }

    /// The sender text, with literal `\n` sequences turned into line breaks.
    pub fn sender_text(&self) -> Option<String> {
        self.sender
            .as_deref()
            .map(|s| s.replace("\\n", "\n"))
            .filter(|s| !s.trim().is_empty())
    }

    pub fn bias(&self) -> f32 {
        match (self.vertical_bias, self.sender_text()) {
            (Some(bias), _) => bias,
            (None, Some(_)) => DUAL_VERTICAL_BIAS,
            (None, None) => 1.0,
        }
    }

    /// Page size for canvases of the given dimensions.
    pub fn page_size(&self, canvas: (u32, u32)) -> PageSize {
        if let Some(page) = self.page {
            return page;
        }
        let divisor = match self.scale {
            ScalePolicy::FixedFactor(f) => f,
            ScalePolicy::FitToPage => DEFAULT_DIVISOR,
        };
        PageSize::from_image(canvas.0, canvas.1, divisor)
    }
}
