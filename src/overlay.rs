//! Marks accepted centroids on a copy of the input frame.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;

const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const MARKER_RADIUS: i32 = 3;
const LABEL_OFFSET: (i32, i32) = (4, -4);
const GLYPH_SCALE: i32 = 2;
const GLYPH_WIDTH: i32 = 3;
const GLYPH_HEIGHT: i32 = 5;

/// 3x5 digit bitmaps, one row per entry, most significant bit on the left.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Draws a filled dot on every centroid and its 1-based index up and to the right.
pub fn draw_overlay(source: &DynamicImage, centroids: &[(i32, i32)]) -> RgbImage {
    let mut canvas = source.to_rgb8();
    for (i, &(x, y)) in centroids.iter().enumerate() {
        draw_filled_circle_mut(&mut canvas, (x, y), MARKER_RADIUS, MARKER_COLOR);
        // the label sits on its baseline like a text origin
        let left = x + LABEL_OFFSET.0;
        let top = y + LABEL_OFFSET.1 - GLYPH_HEIGHT * GLYPH_SCALE;
        draw_number(&mut canvas, i + 1, (left, top), LABEL_COLOR);
    }
    canvas
}

fn draw_number(canvas: &mut RgbImage, value: usize, origin: (i32, i32), color: Rgb<u8>) {
    let advance = (GLYPH_WIDTH + 1) * GLYPH_SCALE;
    for (i, ch) in value.to_string().bytes().enumerate() {
        let glyph = &DIGITS[(ch - b'0') as usize];
        let left = origin.0 + i as i32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let rect = Rect::at(left + col * GLYPH_SCALE, origin.1 + row as i32 * GLYPH_SCALE)
                    .of_size(GLYPH_SCALE as u32, GLYPH_SCALE as u32);
                draw_filled_rect_mut(canvas, rect, color);
            }
        }
    }
}
