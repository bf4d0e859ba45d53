use crate::err::*;
use crate::models::*;
use image::{DynamicImage, RgbImage};
use log::{debug, info};
use printpdf::{Image, ImageTransform, Mm, PdfDocument, Pt};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

// A Number 10 envelope, commonly used for business and personal correspondence,
// has dimensions of 241.3 mm in width, and 104.8 mm in height.
// A standard US postcard is 6 in by 4 in.

/// Divisor tuned for the stock background, whose pixels are three times the page size.
pub const DEFAULT_DIVISOR: f32 = 3.0;

/// Images are embedded at 72 dpi so one pixel is one point before scaling.
const IMG_DPI: f32 = 72.0;

/// Page geometry in PDF points.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}
impl PageSize {
    pub const POSTCARD: PageSize = PageSize {
        width: 432.0,
        height: 288.0,
    };
    pub const NO10_ENVELOPE: PageSize = PageSize {
        width: 684.0,
        height: 297.1,
    };

    /// A page proportioned to an image by convention: each side divided by `divisor`.
    pub fn from_image(width: u32, height: u32, divisor: f32) -> PageSize {
        PageSize {
            width: width as f32 / divisor,
            height: height as f32 / divisor,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
        {
            return Err(Error::Config(format!(
                "page size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Where one image lands on its page, in points from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scales and centers an image of `img` pixels on `page`.
pub fn place(img: (u32, u32), page: PageSize, policy: ScalePolicy) -> Result<Placement> {
    if img.0 == 0 || img.1 == 0 {
        return Err(Error::Packaging(format!("empty image {}x{}", img.0, img.1)));
    }
    let (iw, ih) = (img.0 as f32, img.1 as f32);
    let (scale, width, height) = match policy {
        ScalePolicy::FitToPage => {
            let scale = (page.width / iw).min(page.height / ih);
            (scale, (iw * scale).min(page.width), (ih * scale).min(page.height))
        }
        ScalePolicy::FixedFactor(f) => {
            if !f.is_finite() || f <= 0.0 {
                return Err(Error::Config(format!("scale divisor must be positive, got {f}")));
            }
            (1.0 / f, iw / f, ih / f)
        }
    };
    Ok(Placement {
        scale,
        x: (page.width - width) / 2.0,
        y: (page.height - height) / 2.0,
        width,
        height,
    })
}

/// A finalized multi-page PDF held in memory.
#[derive(Debug)]
pub struct PackedDocument {
    pub placements: Vec<Placement>,
    bytes: Vec<u8>,
}
impl PackedDocument {
    pub fn pages(&self) -> usize {
        self.placements.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Persists the document through a `.part` file, so the final name only
    /// ever holds a complete PDF.
    pub fn save(&self, path: &Path) -> Result<()> {
        info!("Writing file: {}", path.display());
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        let res = File::create(&tmp).map_err(Error::from).and_then(|file| {
            let mut wtr = BufWriter::new(file);
            wtr.write_all(&self.bytes)?;
            wtr.flush()?;
            Ok(())
        });
        if let Err(err) = res {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Emits one page per image, in input order, each image centered on its page.
pub fn pack(
    title: &str,
    images: &[RgbImage],
    page: PageSize,
    policy: ScalePolicy,
) -> Result<PackedDocument> {
    page.validate()?;
    if images.is_empty() {
        return Err(Error::Packaging("no images to pack".into()));
    }
    let placements = images
        .iter()
        .map(|img| place(img.dimensions(), page, policy))
        .collect::<Result<Vec<_>>>()?;

    let (width, height) = (Mm::from(Pt(page.width)), Mm::from(Pt(page.height)));
    let (doc, page1, layer1) = PdfDocument::new(title, width, height, "Layer 1");
    let mut cur = Some((page1, layer1));

    for (idx, (img, plc)) in images.iter().zip(&placements).enumerate() {
        // The first page comes with the document.
        let (pg, lyr) = match cur.take() {
            Some(fst) => fst,
            None => doc.add_page(width, height, format!("Layer {}", idx + 1)),
        };
        debug!("page {}: {:?}", idx + 1, plc);
        let layer = doc.get_page(pg).get_layer(lyr);
        let pdf_img = Image::from_dynamic_image(&DynamicImage::ImageRgb8(img.clone()));
        pdf_img.add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(Mm::from(Pt(plc.x))),
                translate_y: Some(Mm::from(Pt(plc.y))),
                scale_x: Some(plc.scale),
                scale_y: Some(plc.scale),
                dpi: Some(IMG_DPI),
                ..Default::default()
            },
        );
    }

    let bytes = doc.save_to_bytes()?;

    // Read the document back to confirm every image got its page.
    let pages = page_count(&bytes)?;
    if pages != placements.len() {
        return Err(Error::Packaging(format!(
            "document has {pages} pages, expected {}",
            placements.len()
        )));
    }

    Ok(PackedDocument { placements, bytes })
}

/// Counts the pages of a PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize> {
    let doc = lopdf::Document::load_mem(bytes)?;
    Ok(doc.get_pages().len())
}
