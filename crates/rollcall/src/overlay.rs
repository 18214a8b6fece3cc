//! Labelled face boxes drawn onto RGB frames.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

pub const MATCH_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const OUTLINE_THICKNESS: i32 = 2;
const LABEL_BAR_HEIGHT: i32 = 35;
const LABEL_FONT_SIZE: f32 = 28.0;
const LABEL_TEXT_INSET_X: i32 = 6;
const LABEL_TEXT_INSET_Y: i32 = 4;

/// Draws face boxes with a filled name bar along their bottom edge.
pub struct Overlay {
    font: Option<FontVec>,
}

impl Overlay {
    /// Overlay without text; boxes and bars only.
    pub fn without_font() -> Self {
        Self { font: None }
    }

    /// Load a TrueType font for labels. A missing or invalid font degrades to
    /// boxes without text.
    pub fn with_font_file(path: &Path) -> Self {
        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|e| e.to_string()));

        match font {
            Ok(font) => Self { font: Some(font) },
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "label font unavailable; drawing boxes without names"
                );
                Self::without_font()
            }
        }
    }

    /// Draw `label` in a box spanning `(left, top)`..`(right, bottom)`.
    pub fn draw_label(
        &self,
        image: &mut RgbImage,
        (left, top, right, bottom): (i32, i32, i32, i32),
        label: &str,
        color: Rgb<u8>,
    ) {
        if right <= left || bottom <= top {
            return;
        }

        for inset in 0..OUTLINE_THICKNESS {
            let w = right - left - 2 * inset;
            let h = bottom - top - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(left + inset, top + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        let bar = Rect::at(left, bottom - LABEL_BAR_HEIGHT)
            .of_size((right - left) as u32, LABEL_BAR_HEIGHT as u32);
        draw_filled_rect_mut(image, bar, color);

        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                TEXT_COLOR,
                left + LABEL_TEXT_INSET_X,
                bottom - LABEL_BAR_HEIGHT + LABEL_TEXT_INSET_Y,
                PxScale::from(LABEL_FONT_SIZE),
                font,
                label,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_and_bar_geometry() {
        let mut image = RgbImage::new(200, 200);
        Overlay::without_font().draw_label(&mut image, (20, 20, 120, 120), "ALICE", MATCH_COLOR);

        // Two-pixel outline
        assert_eq!(*image.get_pixel(20, 50), MATCH_COLOR);
        assert_eq!(*image.get_pixel(21, 50), MATCH_COLOR);
        assert_eq!(*image.get_pixel(22, 50), Rgb([0, 0, 0]));
        // Filled bar from bottom - 35
        assert_eq!(*image.get_pixel(70, 86), MATCH_COLOR);
        assert_eq!(*image.get_pixel(70, 84), Rgb([0, 0, 0]));
        // Outside untouched
        assert_eq!(*image.get_pixel(150, 150), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_clipped_box_does_not_panic() {
        let mut image = RgbImage::new(50, 50);
        let overlay = Overlay::without_font();
        overlay.draw_label(&mut image, (-40, -40, 40, 40), "Unknown", UNKNOWN_COLOR);
        assert_eq!(*image.get_pixel(25, 25), UNKNOWN_COLOR);
    }

    #[test]
    fn test_degenerate_box_is_ignored() {
        let mut image = RgbImage::new(50, 50);
        Overlay::without_font().draw_label(&mut image, (10, 10, 10, 30), "X", MATCH_COLOR);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_missing_font_degrades() {
        let overlay = Overlay::with_font_file(Path::new("/nonexistent/font.ttf"));
        assert!(overlay.font.is_none());
    }
}
