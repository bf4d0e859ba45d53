use crate::compose::*;
use crate::config::*;
use crate::core::*;
use crate::envelope::*;
use crate::err::*;
use crate::models::*;
use crate::table::*;
use fastrand::Rng;
use image::RgbImage;
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

const DOC_TITLE: &str = "Address cards";

/// A mailing run: resolved fonts and background plus the config they came from.
pub struct Mailing {
    pub cfg: Config,
    font: FontHandle,
    sender: Option<TextBlock>,
    background: Option<RgbImage>,
    seed: u64,
}

/// What a run produced.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Summary {
    pub rendered: usize,
    pub written: usize,
    pub packed: usize,
    pub output: Option<PathBuf>,
    pub failures: Vec<Failure>,
}
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} documents rendered, {} images written, {} pages packed",
            self.rendered, self.written, self.packed
        )?;
        if let Some(out) = &self.output {
            write!(f, " into {}", out.display())?;
        }
        if !self.failures.is_empty() {
            write!(
                f,
                "\n{} records skipped or failed:\n  {}",
                self.failures.len(),
                self.failures.iter().join("\n  ")
            )?;
        }
        Ok(())
    }
}

impl Mailing {
    /// Resolves every resource up front. Font and background problems fail
    /// here, before any record is touched.
    pub fn new(cfg: Config) -> Result<Mailing> {
        cfg.validate()?;

        // Select and load fonts.
        let font_pth = select_font(&cfg.fonts_dir, &cfg.font)?;
        info!("Using font {}", font_pth.display());
        let font = load_font(&font_pth, cfg.font_size)?;
        let sender = match cfg.sender_text() {
            None => None,
            Some(txt) => {
                let fnt = load_font(&font_pth, cfg.sender_font_size)?;
                Some(TextBlock::new(&txt, fnt, cfg.text_color))
            }
        };

        let background = match &cfg.background {
            None => None,
            Some(pth) => Some(load_background(pth)?),
        };

        let seed = cfg.seed.unwrap_or_else(|| fastrand::u64(..));
        info!("Jitter seed {seed}");

        Ok(Mailing {
            cfg,
            font,
            sender,
            background,
            seed,
        })
    }

    /// A fresh canvas: the background, or a blank fill.
    pub fn canvas(&self) -> RgbImage {
        match &self.background {
            Some(bg) => bg.clone(),
            None => blank_canvas(
                self.cfg.canvas_width,
                self.cfg.canvas_height,
                self.cfg.canvas_fill,
            ),
        }
    }

    /// Renders one record. Depends only on the record and its row number, so
    /// records may be rendered in any order.
    pub fn render_record(&self, row: usize, adr: &AddressRecord) -> Result<RgbImage> {
        let mut rng = Rng::with_seed(self.seed.wrapping_add(row as u64));
        let blk = TextBlock::new(&adr.text(), self.font.clone(), self.cfg.text_color);
        let centered = Anchor::Centered {
            vertical_bias: self.cfg.bias(),
        };
        let spacing = self.cfg.line_spacing;
        let jitter = self.cfg.jitter;

        match &self.sender {
            None => render(self.canvas(), &blk, centered, spacing, jitter, &mut rng)
                .map_err(|reason| Error::Render { row, reason }),
            Some(sdr) => {
                let (x, y) = self.cfg.sender_margin;
                let blocks = [(&blk, centered), (sdr, Anchor::TopLeftFixed { x, y })];
                let (img, _) = render_all(self.canvas(), &blocks, spacing, jitter, &mut rng, row)?;
                Ok(img)
            }
        }
    }

    /// Renders every record, writes the optional images, then packs the
    /// rendered canvases in input order into one document.
    pub fn run(&self, tbl: &Table) -> Result<Summary> {
        let mut smry = Summary {
            failures: tbl.skipped.clone(),
            ..Default::default()
        };

        if let Some(dir) = &self.cfg.out_dir {
            fs::create_dir_all(dir)?;
        }

        let mut imgs: Vec<(usize, RgbImage)> = Vec::with_capacity(tbl.records.len());
        let len = tbl.records.len().max(1) as f64;
        for (idx, (row, adr)) in tbl.records.iter().enumerate() {
            let pct = (((idx as f64 + 1.0) / len) * 100.0) as u8;
            info!("  {}% {} {}", pct, row, adr);

            let img = match self.render_record(*row, adr) {
                Ok(img) => img,
                Err(err) => {
                    warn!("render failed: {err}");
                    let reason = match err {
                        Error::Render { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    smry.failures.push(Failure { row: *row, reason });
                    continue;
                }
            };
            smry.rendered += 1;

            if let Some(dir) = &self.cfg.out_dir {
                let pth = dir.join(format!("document_{row}.jpeg"));
                match write_jpeg(&img, &pth) {
                    Ok(()) => smry.written += 1,
                    Err(err) => {
                        warn!("write failed: {err}");
                        smry.failures.push(Failure {
                            row: *row,
                            reason: err.to_string(),
                        });
                    }
                }
            }
            imgs.push((*row, img));
        }

        // Pack in input order, whatever order rendering finished in.
        imgs.sort_by_key(|(row, _)| *row);
        let imgs: Vec<RgbImage> = imgs.into_iter().map(|(_, img)| img).collect();
        smry.failures.sort_by_key(|f| f.row);

        if imgs.is_empty() {
            warn!("nothing rendered, no document written");
            return Ok(smry);
        }
        let page = self.cfg.page_size(imgs[0].dimensions());
        let doc = pack(DOC_TITLE, &imgs, page, self.cfg.scale)?;
        doc.save(&self.cfg.output)?;
        smry.packed = doc.pages();
        smry.output = Some(self.cfg.output.clone());

        Ok(smry)
    }
}
