use crate::err::*;
use crate::models::*;
use image::{ImageFormat, RgbImage};
use log::{debug, info};
use rusttype::Font;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serializes a JSON struct to a file.
pub fn write_to_file<T: Serialize>(data: &T, file_path: &Path) -> Result<()> {
    info!("Writing file: {}", file_path.display());
    let file = File::create(file_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &data)?;
    Ok(())
}

/// Deserializes a JSON struct from a file.
pub fn read_from_file<T: for<'de> Deserialize<'de>>(file_path: &Path) -> Result<T> {
    info!("Reading file: {}", file_path.display());
    let file = File::open(file_path)?;
    let reader = BufReader::new(file);
    let data = serde_json::from_reader(reader)?;
    Ok(data)
}

/// How a font is picked from the fonts directory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum FontChoice {
    /// 1-based position in the sorted listing.
    Index(usize),
    Path(PathBuf),
}
impl Default for FontChoice {
    fn default() -> Self {
        FontChoice::Index(1)
    }
}

/// Lists glyph-outline font files in a directory, sorted by file name.
pub fn list_fonts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut fnts: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|_| Error::EmptyFontSet(dir.to_path_buf()))?
        .filter_map(|ent| ent.ok().map(|e| e.path()))
        .filter(|pth| pth.is_file() && is_font_file(pth))
        .collect();
    fnts.sort();
    Ok(fnts)
}

fn is_font_file(pth: &Path) -> bool {
    pth.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"))
}

/// Resolves a font choice to a file inside the fonts directory.
pub fn select_font(dir: &Path, choice: &FontChoice) -> Result<PathBuf> {
    let fnts = list_fonts(dir)?;
    if fnts.is_empty() {
        return Err(Error::EmptyFontSet(dir.to_path_buf()));
    }

    match choice {
        FontChoice::Index(idx) => {
            if *idx < 1 || *idx > fnts.len() {
                return Err(Error::FontIndex {
                    index: *idx,
                    count: fnts.len(),
                });
            }
            Ok(fnts[idx - 1].clone())
        }
        FontChoice::Path(pth) => {
            // Accept a bare file name or a path into the directory.
            let pth = if pth.is_relative() && pth.parent() == Some(Path::new("")) {
                dir.join(pth)
            } else {
                pth.clone()
            };
            let pth_can = pth
                .canonicalize()
                .map_err(|_| Error::Config(format!("font {pth:?} does not exist")))?;
            let dir_can = dir.canonicalize()?;
            if !pth_can.starts_with(&dir_can) || !is_font_file(&pth_can) {
                return Err(Error::FontOutsideDir(pth));
            }
            Ok(pth)
        }
    }
}

/// Loads a font file at a pixel size.
pub fn load_font(path: &Path, size: f32) -> Result<FontHandle> {
    let font_err = |reason: &str| Error::FontLoad {
        path: path.to_path_buf(),
        size,
        reason: reason.into(),
    };
    if !size.is_finite() || size <= 0.0 {
        return Err(font_err("size must be positive"));
    }
    let bytes = fs::read(path).map_err(|err| font_err(&err.to_string()))?;
    let font = Font::try_from_vec(bytes).ok_or_else(|| font_err("not a valid font"))?;
    debug!("Loaded font {} ({} glyphs)", path.display(), font.glyph_count());
    Ok(FontHandle {
        font: Arc::new(font),
        size,
    })
}

/// Loads a background image as RGB.
pub fn load_background(path: &Path) -> Result<RgbImage> {
    info!("Reading file: {}", path.display());
    let img = image::open(path).map_err(|source| Error::Background {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Synthesizes a blank canvas.
pub fn blank_canvas(width: u32, height: u32, fill: Rgb) -> RgbImage {
    RgbImage::from_pixel(width, height, fill.into())
}

/// Writes a JPEG through a `.part` file so a crash never leaves a truncated image
/// under the final name.
pub fn write_jpeg(img: &RgbImage, path: &Path) -> Result<()> {
    info!("Writing file: {}", path.display());
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    img.save_with_format(&tmp, ImageFormat::Jpeg)
        .map_err(|err| Error::Packaging(format!("{}: {err}", path.display())))?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub const FONT_FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/fonts/DejaVuSans.ttf");

    pub fn test_font(size: f32) -> FontHandle {
        load_font(Path::new(FONT_FIXTURE), size).unwrap()
    }

    #[test]
    fn test_select_font_inside_dir() {
        let dir = tempdir().unwrap();
        fs::copy(FONT_FIXTURE, dir.path().join("b.ttf")).unwrap();
        fs::copy(FONT_FIXTURE, dir.path().join("a.TTF")).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        for idx in 1..=2 {
            let pth = select_font(dir.path(), &FontChoice::Index(idx)).unwrap();
            assert!(pth.starts_with(dir.path()));
        }
        let fst = select_font(dir.path(), &FontChoice::Index(1)).unwrap();
        assert_eq!(fst.file_name().unwrap(), "a.TTF");

        let pth = select_font(dir.path(), &FontChoice::Path("b.ttf".into())).unwrap();
        assert_eq!(pth, dir.path().join("b.ttf"));
    }

    #[test]
    fn test_select_font_empty_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), "no fonts").unwrap();
        let err = select_font(dir.path(), &FontChoice::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyFontSet(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_select_font_bad_index() {
        let dir = tempdir().unwrap();
        fs::copy(FONT_FIXTURE, dir.path().join("a.ttf")).unwrap();
        for idx in [0, 2] {
            let err = select_font(dir.path(), &FontChoice::Index(idx)).unwrap_err();
            assert!(matches!(err, Error::FontIndex { count: 1, .. }));
        }
    }

    #[test]
    fn test_select_font_outside_dir() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        fs::copy(FONT_FIXTURE, dir.path().join("a.ttf")).unwrap();
        let outside = other.path().join("c.ttf");
        fs::copy(FONT_FIXTURE, &outside).unwrap();
        let err = select_font(dir.path(), &FontChoice::Path(outside)).unwrap_err();
        assert!(matches!(err, Error::FontOutsideDir(_)));
        let err = select_font(dir.path(), &FontChoice::Path("nope.ttf".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_load_font_errors() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.ttf");
        fs::write(&bad, b"definitely not a font").unwrap();
        assert!(matches!(load_font(&bad, 90.0), Err(Error::FontLoad { .. })));
        assert!(matches!(
            load_font(Path::new(FONT_FIXTURE), 0.0),
            Err(Error::FontLoad { .. })
        ));
        assert!(load_font(Path::new(FONT_FIXTURE), 90.0).is_ok());
    }

    #[test]
    fn test_write_jpeg_leaves_no_part_file() {
        let dir = tempdir().unwrap();
        let pth = dir.path().join("document_1.jpeg");
        write_jpeg(&blank_canvas(40, 20, Rgb::WHITE), &pth).unwrap();
        assert!(pth.exists());
        assert!(!dir.path().join("document_1.jpeg.part").exists());
        let back = image::open(&pth).unwrap();
        assert_eq!((back.width(), back.height()), (40, 20));
    }
}
