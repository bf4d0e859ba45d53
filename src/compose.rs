use crate::err::*;
use crate::models::*;
use fastrand::Rng;
use image::RgbImage;
use rusttype::{point, Scale};

/// Default space between consecutive lines.
pub const LINE_SPACING: i32 = 10;

/// One line positioned on the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    /// Top-left of the line's ink box before jitter.
    pub x: i32,
    pub y: i32,
    /// Jitter applied to this line only.
    pub dx: i32,
    pub dy: i32,
    pub metrics: LineMetrics,
    /// Ink box offset from the pen origin.
    ink_min: (i32, i32),
}

/// Geometry of a whole text block, computed before anything is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    /// Sum of line heights plus spacing after every line.
    pub height: u32,
    pub lines: Vec<PlacedLine>,
}
impl BlockLayout {
    /// Block box grown by the largest possible jitter.
    pub fn bounds(&self, jitter: Jitter) -> (i32, i32, i32, i32) {
        let (jx, jy) = if jitter.enabled {
            (jitter.x_range.saturating_abs(), jitter.y_range.saturating_abs())
        } else {
            (0, 0)
        };
        (
            self.x - jx,
            self.y - jy,
            self.x + self.width as i32 + jx,
            self.y + self.height as i32 + jy,
        )
    }

    pub fn overlaps(&self, other: &BlockLayout, jitter: Jitter) -> bool {
        let a = self.bounds(jitter);
        let b = other.bounds(jitter);
        a.0 < b.2 && b.0 < a.2 && a.1 < b.3 && b.1 < a.3
    }

    /// Moves the block and every line down by `dy`.
    fn shift_down(&mut self, dy: i32) {
        self.y += dy;
        for lne in &mut self.lines {
            lne.y += dy;
        }
    }
}

/// Measures the ink box of one line. Returns the metrics and the box's
/// offset from a pen placed at the line's top-left.
pub fn measure_line(font: &FontHandle, line: &str) -> (LineMetrics, (i32, i32)) {
    let scale = Scale::uniform(font.size);
    let v_metrics = font.font.v_metrics(scale);
    let mut ink: Option<(i32, i32, i32, i32)> = None;
    for glyph in font.font.layout(line, scale, point(0.0, v_metrics.ascent)) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            ink = Some(match ink {
                None => (bb.min.x, bb.min.y, bb.max.x, bb.max.y),
                Some((x0, y0, x1, y1)) => {
                    (x0.min(bb.min.x), y0.min(bb.min.y), x1.max(bb.max.x), y1.max(bb.max.y))
                }
            });
        }
    }
    match ink {
        None => (LineMetrics::default(), (0, 0)),
        Some((x0, y0, x1, y1)) => (
            LineMetrics {
                width: (x1 - x0) as u32,
                height: (y1 - y0) as u32,
            },
            (x0, y0),
        ),
    }
}

/// Fails when the font has no glyph for a visible character.
fn check_glyphs(font: &FontHandle, line: &str) -> std::result::Result<(), String> {
    for ch in line.chars().filter(|c| !c.is_whitespace() && !c.is_control()) {
        if font.font.glyph(ch).id().0 == 0 {
            return Err(format!("font has no glyph for {ch:?}"));
        }
    }
    Ok(())
}

/// Computes where every line of a block goes. Jitter is drawn here, so the
/// result fully determines the pixels written by `draw`.
pub fn layout(
    block: &TextBlock,
    canvas_size: (u32, u32),
    anchor: Anchor,
    spacing: i32,
    jitter: Jitter,
    rng: &mut Rng,
) -> std::result::Result<BlockLayout, String> {
    let mut mets = Vec::with_capacity(block.lines.len());
    let mut max_width = 0u32;
    let mut total_height = 0i32;
    for lne in &block.lines {
        check_glyphs(&block.font, lne)?;
        let (met, ink_min) = measure_line(&block.font, lne);
        max_width = max_width.max(met.width);
        total_height += met.height as i32 + spacing;
        mets.push((met, ink_min));
    }
    let total_height = total_height.max(0);

    let (x_start, y_start) = match anchor {
        Anchor::Centered { vertical_bias } => {
            let x = (canvas_size.0 as i32 - max_width as i32).div_euclid(2);
            let y = (canvas_size.1 as i32 - total_height).div_euclid(2);
            (x, (y as f32 * vertical_bias).round() as i32)
        }
        Anchor::TopLeftFixed { x, y } => (x, y),
    };

    let mut lines = Vec::with_capacity(mets.len());
    let mut y = y_start;
    for (met, ink_min) in mets {
        let (dx, dy) = if jitter.enabled {
            let (xr, yr) = (jitter.x_range.saturating_abs(), jitter.y_range.saturating_abs());
            (rng.i32(-xr..=xr), rng.i32(-yr..=yr))
        } else {
            (0, 0)
        };
        lines.push(PlacedLine {
            x: x_start,
            y,
            dx,
            dy,
            metrics: met,
            ink_min,
        });
        // Advance by the unjittered height.
        y += met.height as i32 + spacing;
    }

    Ok(BlockLayout {
        x: x_start,
        y: y_start,
        width: max_width,
        height: total_height as u32,
        lines,
    })
}

/// Rasterizes a laid-out block onto the canvas, blending glyph coverage
/// with the block color.
pub fn draw(canvas: &mut RgbImage, block: &TextBlock, lay: &BlockLayout) {
    let scale = Scale::uniform(block.font.size);
    let v_metrics = block.font.font.v_metrics(scale);
    let color = block.color;
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);

    for (lne, plc) in block.lines.iter().zip(&lay.lines) {
        // Pen origin so the ink box lands on the placed position.
        let ox = (plc.x + plc.dx - plc.ink_min.0) as f32;
        let oy = (plc.y + plc.dy - plc.ink_min.1) as f32 + v_metrics.ascent;
        for glyph in block.font.font.layout(lne, scale, point(ox, oy)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, v| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px >= cw || py >= ch || v <= 0.0 {
                    return;
                }
                let dst = canvas.get_pixel_mut(px as u32, py as u32);
                let sa = v.min(1.0);
                let inv = 1.0 - sa;
                dst.0[0] = (color.0 as f32 * sa + dst.0[0] as f32 * inv) as u8;
                dst.0[1] = (color.1 as f32 * sa + dst.0[1] as f32 * inv) as u8;
                dst.0[2] = (color.2 as f32 * sa + dst.0[2] as f32 * inv) as u8;
            });
        }
    }
}

/// Lays out and draws one block, returning the canvas for chaining.
pub fn render(
    mut canvas: RgbImage,
    block: &TextBlock,
    anchor: Anchor,
    spacing: i32,
    jitter: Jitter,
    rng: &mut Rng,
) -> std::result::Result<RgbImage, String> {
    let lay = layout(block, canvas.dimensions(), anchor, spacing, jitter, rng)?;
    draw(&mut canvas, block, &lay);
    Ok(canvas)
}

/// Pushes centered blocks below any fixed block they would collide with,
/// jitter included. Fixed blocks never move.
fn clear_fixed_blocks(lays: &mut [BlockLayout], anchors: &[Anchor], jitter: Jitter) {
    let jy = if jitter.enabled {
        jitter.y_range.saturating_abs()
    } else {
        0
    };
    for idx in 0..lays.len() {
        if !matches!(anchors[idx], Anchor::Centered { .. }) {
            continue;
        }
        for fix in 0..lays.len() {
            if !matches!(anchors[fix], Anchor::TopLeftFixed { .. }) {
                continue;
            }
            if lays[idx].overlaps(&lays[fix], jitter) {
                // Block height already ends with one spacing.
                let floor = lays[fix].y + lays[fix].height as i32 + 2 * jy;
                let dy = floor - lays[idx].y;
                lays[idx].shift_down(dy);
            }
        }
    }
}

/// Renders several blocks onto one canvas. Every layout is computed against
/// the untouched canvas before any block is drawn, and centered blocks are
/// kept clear of fixed ones.
pub fn render_all(
    mut canvas: RgbImage,
    blocks: &[(&TextBlock, Anchor)],
    spacing: i32,
    jitter: Jitter,
    rng: &mut Rng,
    row: usize,
) -> Result<(RgbImage, Vec<BlockLayout>)> {
    let size = canvas.dimensions();
    let mut lays = blocks
        .iter()
        .map(|(blk, anchor)| layout(blk, size, *anchor, spacing, jitter, rng))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|reason| Error::Render { row, reason })?;
    let anchors: Vec<Anchor> = blocks.iter().map(|(_, anchor)| *anchor).collect();
    clear_fixed_blocks(&mut lays, &anchors, jitter);
    for ((blk, _), lay) in blocks.iter().zip(&lays) {
        draw(&mut canvas, blk, lay);
    }
    Ok((canvas, lays))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blank_canvas;
    use crate::core::tests::test_font;

    const CENTER: Anchor = Anchor::Centered { vertical_bias: 1.0 };
    const JITTER: Jitter = Jitter {
        enabled: true,
        x_range: 10,
        y_range: 5,
    };

    fn recipient() -> TextBlock {
        TextBlock::new(
            "Jane Doe\n100 Main St\nSpringfield, IL 62704",
            test_font(90.0),
            Rgb::DARK_BLUE,
        )
    }

    #[test]
    fn test_measure_line() {
        let fnt = test_font(90.0);
        let (met, _) = measure_line(&fnt, "Springfield");
        assert!(met.width > 0 && met.height > 0);
        let (wide, _) = measure_line(&fnt, "Springfield, IL 62704");
        assert!(wide.width > met.width);
        assert_eq!(measure_line(&fnt, "").0, LineMetrics::default());
        assert_eq!(measure_line(&fnt, "   ").0, LineMetrics::default());
    }

    #[test]
    fn test_centered_block_is_centered() {
        let blk = recipient();
        let mut rng = Rng::with_seed(7);
        for (w, h) in [(1800, 1200), (1201, 799), (640, 480)] {
            let lay = layout(&blk, (w, h), CENTER, LINE_SPACING, Jitter::NONE, &mut rng).unwrap();
            let cx2 = 2 * lay.x + lay.width as i32;
            let cy2 = 2 * lay.y + lay.height as i32;
            assert!((cx2 - w as i32).abs() <= 2, "x center off: {lay:?}");
            assert!((cy2 - h as i32).abs() <= 2, "y center off: {lay:?}");
        }
    }

    #[test]
    fn test_height_accumulates_spacing() {
        let blk = recipient();
        let lay = layout(&blk, (1800, 1200), CENTER, 10, Jitter::NONE, &mut Rng::with_seed(1)).unwrap();
        let sum: u32 = lay.lines.iter().map(|l| l.metrics.height + 10).sum();
        assert_eq!(lay.height, sum);
        assert_eq!(lay.width, lay.lines.iter().map(|l| l.metrics.width).max().unwrap());
    }

    #[test]
    fn test_vertical_bias_shifts_down() {
        let blk = recipient();
        let base = layout(&blk, (1800, 1200), CENTER, 10, Jitter::NONE, &mut Rng::with_seed(1)).unwrap();
        let biased = layout(
            &blk,
            (1800, 1200),
            Anchor::Centered { vertical_bias: 1.2 },
            10,
            Jitter::NONE,
            &mut Rng::with_seed(1),
        )
        .unwrap();
        assert_eq!(biased.x, base.x);
        assert_eq!(biased.y, (base.y as f32 * 1.2).round() as i32);
    }

    #[test]
    fn test_top_left_fixed_ignores_size() {
        let blk = recipient();
        let anchor = Anchor::TopLeftFixed { x: 50, y: 50 };
        for size in [(1800, 1200), (300, 200)] {
            let lay = layout(&blk, size, anchor, 10, Jitter::NONE, &mut Rng::with_seed(1)).unwrap();
            assert_eq!((lay.x, lay.y), (50, 50));
            assert_eq!(lay.lines[0].y, 50);
        }
    }

    #[test]
    fn test_jitter_bounded_and_not_cumulative() {
        let blk = recipient();
        let plain = layout(&blk, (1800, 1200), CENTER, 10, Jitter::NONE, &mut Rng::with_seed(3)).unwrap();
        for seed in 0..50 {
            let lay = layout(&blk, (1800, 1200), CENTER, 10, JITTER, &mut Rng::with_seed(seed)).unwrap();
            for (a, b) in lay.lines.iter().zip(&plain.lines) {
                assert!((-10..=10).contains(&a.dx));
                assert!((-5..=5).contains(&a.dy));
                // Baselines match the unjittered layout.
                assert_eq!((a.x, a.y), (b.x, b.y));
            }
        }
    }

    #[test]
    fn test_jitter_reproducible_with_seed() {
        let blk = recipient();
        let a = layout(&blk, (1800, 1200), CENTER, 10, JITTER, &mut Rng::with_seed(42)).unwrap();
        let b = layout(&blk, (1800, 1200), CENTER, 10, JITTER, &mut Rng::with_seed(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_draws_inside_block() {
        let blk = recipient();
        let lay = layout(&blk, (1800, 1200), CENTER, 10, Jitter::NONE, &mut Rng::with_seed(1)).unwrap();
        let img = render(
            blank_canvas(1800, 1200, Rgb::WHITE),
            &blk,
            CENTER,
            10,
            Jitter::NONE,
            &mut Rng::with_seed(1),
        )
        .unwrap();
        let (mut inked, mut stray) = (0, 0);
        for (x, y, px) in img.enumerate_pixels() {
            if px.0 != [255, 255, 255] {
                // One pixel of slack for subpixel rounding.
                let inside = (x as i32) >= lay.x - 1
                    && (x as i32) <= lay.x + lay.width as i32
                    && (y as i32) >= lay.y - 1
                    && (y as i32) <= lay.y + lay.height as i32;
                if inside {
                    inked += 1;
                } else {
                    stray += 1;
                }
            }
        }
        assert!(inked > 0);
        assert_eq!(stray, 0);
    }

    #[test]
    fn test_missing_glyph_is_render_error() {
        let blk = TextBlock::new("Jane \u{4E2D}", test_font(40.0), Rgb::DARK_BLUE);
        let res = render_all(
            blank_canvas(400, 200, Rgb::WHITE),
            &[(&blk, CENTER)],
            10,
            Jitter::NONE,
            &mut Rng::with_seed(1),
            4,
        );
        assert!(matches!(res, Err(Error::Render { row: 4, .. })));
    }

    #[test]
    fn test_sender_and_recipient_do_not_overlap() {
        let sender = TextBlock::new(
            "Sam Sender\n1 Elm Rd\nPortland, OR 97201",
            test_font(60.0),
            Rgb::DARK_BLUE,
        );
        let rcp = recipient();
        for (w, h) in [(1500, 600), (1800, 600), (1500, 700), (1500, 1000), (1800, 1200), (2400, 1600)] {
            for bias in [1.0, 1.2] {
                let (_, lays) = render_all(
                    blank_canvas(w, h, Rgb::WHITE),
                    &[
                        (&rcp, Anchor::Centered { vertical_bias: bias }),
                        (&sender, Anchor::TopLeftFixed { x: 50, y: 50 }),
                    ],
                    10,
                    JITTER,
                    &mut Rng::with_seed(9),
                    1,
                )
                .unwrap();
                assert!(!lays[0].overlaps(&lays[1], JITTER), "{w}x{h} bias {bias}");
                // Sender stays put.
                assert_eq!((lays[1].x, lays[1].y), (50, 50));
            }
        }
    }

    #[test]
    fn test_short_canvas_pushes_recipient_below_sender() {
        let sender = TextBlock::new(
            "Sam Sender\n1 Elm Rd\nPortland, OR 97201",
            test_font(60.0),
            Rgb::DARK_BLUE,
        );
        let rcp = recipient();
        let centered = layout(&rcp, (1500, 600), CENTER, 10, Jitter::NONE, &mut Rng::with_seed(2)).unwrap();
        let (_, lays) = render_all(
            blank_canvas(1500, 600, Rgb::WHITE),
            &[(&rcp, CENTER), (&sender, Anchor::TopLeftFixed { x: 50, y: 50 })],
            10,
            Jitter::NONE,
            &mut Rng::with_seed(2),
            1,
        )
        .unwrap();
        let sdr_bottom = lays[1].y + lays[1].height as i32;
        assert!(centered.y < sdr_bottom, "canvas too tall to collide: {centered:?}");
        assert_eq!(lays[0].y, sdr_bottom);
        assert_eq!(lays[0].x, centered.x);
        let dy = lays[0].y - centered.y;
        for (a, b) in lays[0].lines.iter().zip(&centered.lines) {
            assert_eq!(a.y, b.y + dy);
        }
    }
}
