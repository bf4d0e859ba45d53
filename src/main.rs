use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
mod compose;
mod config;
mod core;
mod envelope;
mod err;
mod mailing;
mod models;
mod table;
use crate::config::*;
use crate::core::*;
use crate::envelope::*;
use crate::mailing::*;
use crate::models::*;
use crate::table::*;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScaleArg {
    /// Fit each image inside the page, keeping its aspect ratio.
    Fit,
    /// Scale every image by 1/divisor.
    Fixed,
}

#[derive(Parser, Debug)]
#[command(version, about = "Renders handwritten-style address cards and packs them into one PDF.")]
struct Cli {
    /// JSON config file; flags override its values.
    #[arg(short, long, env = "ADRCARD_CONFIG")]
    config: Option<PathBuf>,
    /// Recipient table (CSV with Adressee, Address, City, State, Zip).
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Directory of .ttf/.otf fonts.
    #[arg(long)]
    fonts: Option<PathBuf>,
    /// 1-based font number from --list-fonts.
    #[arg(long, conflicts_with = "font")]
    font_index: Option<usize>,
    /// Font file name or path inside the fonts directory.
    #[arg(long)]
    font: Option<PathBuf>,
    #[arg(long)]
    font_size: Option<f32>,
    /// Print the available fonts and exit.
    #[arg(long)]
    list_fonts: bool,
    /// Background image; a blank canvas is used when absent.
    #[arg(short, long)]
    background: Option<PathBuf>,
    /// Directory for per-record JPEGs.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Skip writing per-record JPEGs.
    #[arg(long, conflicts_with = "out_dir")]
    no_images: bool,
    /// Output PDF.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Sender address for the top-left block; use \n between lines.
    #[arg(long)]
    sender: Option<String>,
    #[arg(long, value_enum)]
    scale: Option<ScaleArg>,
    /// Divisor for --scale fixed.
    #[arg(long)]
    divisor: Option<f32>,
    /// Page geometry: postcard, envelope, derived, or WIDTHxHEIGHT in points.
    #[arg(long, value_parser = parse_page_arg)]
    page: Option<PageArg>,
    /// Seed for the handwriting jitter.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    no_jitter: bool,
    /// Multiplier on the centered block's vertical start.
    #[arg(long)]
    vertical_bias: Option<f32>,
    /// What to do with malformed rows: halt or skip.
    #[arg(long)]
    row_policy: Option<RowPolicy>,
    /// Also write the run summary as JSON.
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum PageArg {
    Derived,
    Fixed(PageSize),
}

fn parse_page_arg(s: &str) -> std::result::Result<PageArg, String> {
    match s.to_lowercase().as_str() {
        "postcard" => Ok(PageArg::Fixed(PageSize::POSTCARD)),
        "envelope" | "no10" => Ok(PageArg::Fixed(PageSize::NO10_ENVELOPE)),
        "derived" => Ok(PageArg::Derived),
        custom => {
            let parts: Vec<&str> = custom.split('x').collect();
            if parts.len() == 2 {
                if let (Ok(width), Ok(height)) =
                    (parts[0].trim().parse::<f32>(), parts[1].trim().parse::<f32>())
                {
                    if width > 0.0 && height > 0.0 {
                        return Ok(PageArg::Fixed(PageSize { width, height }));
                    }
                }
            }
            Err(format!(
                "Unknown page: '{s}'. Valid options: postcard, envelope, derived, WIDTHxHEIGHT"
            ))
        }
    }
}

impl Cli {
    /// Applies flags on top of a config.
    fn apply(&self, cfg: &mut Config) -> Result<()> {
        if let Some(v) = &self.input {
            cfg.input.clone_from(v);
        }
        if let Some(v) = &self.fonts {
            cfg.fonts_dir.clone_from(v);
        }
        if let Some(idx) = self.font_index {
            cfg.font = FontChoice::Index(idx);
        }
        if let Some(v) = &self.font {
            cfg.font = FontChoice::Path(v.clone());
        }
        if let Some(v) = self.font_size {
            cfg.font_size = v;
        }
        if let Some(v) = &self.background {
            cfg.background = Some(v.clone());
        }
        if let Some(v) = &self.out_dir {
            cfg.out_dir = Some(v.clone());
        }
        if self.no_images {
            cfg.out_dir = None;
        }
        if let Some(v) = &self.output {
            cfg.output.clone_from(v);
        }
        if let Some(v) = &self.sender {
            cfg.sender = Some(v.clone());
        }
        let divisor = self.divisor.unwrap_or(match cfg.scale {
            ScalePolicy::FixedFactor(f) => f,
            ScalePolicy::FitToPage => DEFAULT_DIVISOR,
        });
        match (self.scale, cfg.scale) {
            (Some(ScaleArg::Fit), _) => {
                if self.divisor.is_some() {
                    return Err(anyhow!("--divisor requires --scale fixed"));
                }
                cfg.scale = ScalePolicy::FitToPage;
            }
            (Some(ScaleArg::Fixed), _) | (None, ScalePolicy::FixedFactor(_)) => {
                cfg.scale = ScalePolicy::FixedFactor(divisor);
            }
            (None, ScalePolicy::FitToPage) => {
                if self.divisor.is_some() {
                    return Err(anyhow!("--divisor requires --scale fixed"));
                }
            }
        }
        match self.page {
            Some(PageArg::Derived) => cfg.page = None,
            Some(PageArg::Fixed(page)) => cfg.page = Some(page),
            None => {}
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.no_jitter {
            cfg.jitter = Jitter::NONE;
        }
        if self.vertical_bias.is_some() {
            cfg.vertical_bias = self.vertical_bias;
        }
        if let Some(v) = self.row_policy {
            cfg.row_policy = v;
        }
        if let Some(v) = &self.summary {
            cfg.summary = Some(v.clone());
        }
        Ok(())
    }
}

/// Tags a failure with its class for the user.
fn fail(err: err::Error) -> anyhow::Error {
    anyhow!("{} error: {err}", err.kind())
}

pub fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // Build config.
    let mut cfg = match &cli.config {
        Some(pth) => Config::load(pth).map_err(fail)?,
        None => Config::default(),
    };
    cli.apply(&mut cfg)?;

    if cli.list_fonts {
        let fnts = list_fonts(&cfg.fonts_dir).map_err(fail)?;
        println!("Available fonts:");
        for (idx, fnt) in fnts.iter().enumerate() {
            let name = fnt.file_name().unwrap_or_default().to_string_lossy();
            println!("{}. {}", idx + 1, name);
        }
        return Ok(());
    }

    // Fonts and background fail here, before any record.
    let mailing = Mailing::new(cfg).map_err(fail)?;
    let tbl = Table::load(&mailing.cfg.input, mailing.cfg.row_policy).map_err(fail)?;
    let smry = mailing.run(&tbl).map_err(fail)?;

    println!("{smry}");
    if let Some(pth) = &mailing.cfg.summary {
        write_to_file(&smry, pth).map_err(fail)?;
    }

    Ok(())
}
