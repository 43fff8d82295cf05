//! Annotated image rendering.
//!
//! Draws each remapped box as an outlined rectangle with a filled label tag above its top
//! edge. Rendering works on a copy; the source frame is never modified. Boxes are drawn in
//! input order, so later boxes cover earlier ones where they overlap.

mod glyphs;

use image::{Rgba, RgbaImage};

use crate::frame::Frame;
use crate::remap::RemappedBox;

use glyphs::{glyph, is_set, GLYPH_HEIGHT, GLYPH_WIDTH};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderStyle {
    pub box_color: Rgba<u8>,
    pub stroke: u32,
    /// Tag fill; the alpha channel controls blending with the image below.
    pub tag_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
    /// Pixel size of one font cell.
    pub text_scale: u32,
    pub padding: u32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            box_color: Rgba([255, 64, 32, 255]),
            stroke: 4,
            tag_color: Rgba([0, 0, 0, 180]),
            text_color: Rgba([255, 255, 255, 255]),
            text_scale: 4,
            padding: 8,
        }
    }
}

impl RenderStyle {
    pub fn text_size(&self, text: &str) -> (u32, u32) {
        let scale = self.text_scale.max(1);
        let chars = text.chars().count() as u32;
        let width = if chars == 0 {
            0
        } else {
            chars * (GLYPH_WIDTH + 1) * scale - scale
        };
        (width, GLYPH_HEIGHT * scale)
    }
}

/// Label tag contents: `"<label> <confidence%>"`.
pub fn tag_text(b: &RemappedBox) -> String {
    format!("{} {}%", b.label, (b.confidence * 100.0).round() as i32)
}

pub fn annotate(frame: &Frame, boxes: &[RemappedBox], style: &RenderStyle) -> RgbaImage {
    let mut img = frame.image().clone();
    for b in boxes {
        draw_box(&mut img, b, style);
    }
    img
}

fn draw_box(img: &mut RgbaImage, b: &RemappedBox, style: &RenderStyle) {
    let right = b.x.saturating_add(b.w);
    let bottom = b.y.saturating_add(b.h);
    draw_rect_outline(img, [b.x, b.y, right, bottom], style.box_color, style.stroke);

    let text = tag_text(b);
    let (text_w, text_h) = style.text_size(&text);
    let tag_w = text_w + 2 * style.padding;
    let tag_h = text_h + 2 * style.padding;
    // Keep the whole tag inside the image when the box touches the top edge.
    let tag_top = b.y.saturating_sub(tag_h);
    fill_rect_blend(
        img,
        [b.x, tag_top, b.x.saturating_add(tag_w), tag_top + tag_h],
        style.tag_color,
    );
    draw_text(
        img,
        b.x + style.padding,
        tag_top + style.padding,
        &text,
        style.text_scale.max(1),
        style.text_color,
    );
}

/// Rectangle border drawn inward from `[x0, y0, x1, y1]`, clipped to the image.
fn draw_rect_outline(img: &mut RgbaImage, bbox: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let [x0, y0, x1, y1] = bbox;
    let x1 = x1.min(w - 1);
    let y1 = y1.min(h - 1);
    for t in 0..thickness.max(1) {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let a = src[3] as u32;
    for c in 0..3 {
        dst[c] = ((src[c] as u32 * a + dst[c] as u32 * (255 - a)) / 255) as u8;
    }
    dst[3] = dst[3].max(src[3]);
}

/// Alpha-blended fill of the half-open rectangle `[x0, x1) x [y0, y1)`.
fn fill_rect_blend(img: &mut RgbaImage, rect: [u32; 4], color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = rect;
    for y in y0..y1.min(h) {
        for x in x0..x1.min(w) {
            blend(img.get_pixel_mut(x, y), color);
        }
    }
}

fn draw_text(img: &mut RgbaImage, x: u32, y: u32, text: &str, scale: u32, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    let advance = (GLYPH_WIDTH + 1) * scale;
    for (i, c) in text.chars().enumerate() {
        let rows = glyph(c);
        let origin_x = x.saturating_add(i as u32 * advance);
        if origin_x >= w {
            break;
        }
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if !is_set(&rows, col, row) {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + col * scale + dx;
                        let py = y + row * scale + dy;
                        if px < w && py < h {
                            img.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgba<u8> = Rgba([10, 120, 10, 255]);

    fn frame(w: u32, h: u32) -> Frame {
        Frame::new(RgbaImage::from_pixel(w, h, BG), 0)
    }

    fn rbox(x: u32, y: u32, w: u32, h: u32, confidence: f32) -> RemappedBox {
        RemappedBox {
            x,
            y,
            w,
            h,
            label: "pothole".to_string(),
            confidence,
        }
    }

    #[test]
    fn tag_text_rounds_confidence() {
        assert_eq!(tag_text(&rbox(0, 0, 1, 1, 0.876)), "pothole 88%");
        assert_eq!(tag_text(&rbox(0, 0, 1, 1, 0.0)), "pothole 0%");
        assert_eq!(tag_text(&rbox(0, 0, 1, 1, 1.0)), "pothole 100%");
    }

    #[test]
    fn draws_outline_without_touching_source() {
        let src = frame(200, 200);
        let style = RenderStyle::default();
        let out = annotate(&src, &[rbox(50, 120, 60, 40, 0.9)], &style);

        assert_eq!(out.get_pixel(50, 120), &style.box_color);
        assert_eq!(out.get_pixel(110, 160), &style.box_color);
        assert_eq!(out.get_pixel(80, 140), &BG);
        assert!(src.image().pixels().all(|p| *p == BG));
    }

    #[test]
    fn tag_sits_above_the_box() {
        let style = RenderStyle::default();
        let out = annotate(&frame(300, 300), &[rbox(20, 200, 100, 50, 0.5)], &style);
        let (_, text_h) = style.text_size("pothole 50%");
        let tag_h = text_h + 2 * style.padding;
        // Corner of the padding area: blended tag color, no text.
        let tag_px = out.get_pixel(21, 200 - tag_h);
        assert_ne!(tag_px, &BG);
        assert!(tag_px[1] < BG[1]);
        // Just above the tag stays untouched.
        assert_eq!(out.get_pixel(21, 200 - tag_h - 1), &BG);
    }

    #[test]
    fn tag_is_clamped_to_image_top() {
        let style = RenderStyle::default();
        let out = annotate(&frame(300, 300), &[rbox(10, 5, 50, 50, 0.5)], &style);
        let tag_px = out.get_pixel(11, 0);
        assert_ne!(tag_px, &BG);
    }

    #[test]
    fn later_boxes_draw_over_earlier_ones() {
        let style = RenderStyle::default();
        let low = rbox(100, 150, 40, 40, 0.5);
        // Top edge of `high` runs through the label tag of `low`.
        let high = rbox(90, 120, 80, 60, 0.5);

        let out = annotate(&frame(200, 200), &[low.clone(), high.clone()], &style);
        assert_eq!(out.get_pixel(120, 121), &style.box_color);

        let out = annotate(&frame(200, 200), &[high, low], &style);
        assert_ne!(out.get_pixel(120, 121), &style.box_color);
    }

    #[test]
    fn boxes_at_the_frame_edge_do_not_panic() {
        let style = RenderStyle::default();
        let out = annotate(&frame(20, 10), &[rbox(19, 9, 1, 1, 0.99)], &style);
        assert_eq!(out.dimensions(), (20, 10));
    }
}
