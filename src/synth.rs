//! Synthetic chamber frames: flat background with filled disks.

use std::path::Path;

use image::{GrayImage, Luma};

/// A filled disk drawn into a [`SyntheticSample`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    pub center: (f32, f32),
    pub radius: f32,
    pub intensity: u8,
}

/// Flat background with filled disks, used as a stand-in chamber image.
///
/// Pixels whose integer coordinates satisfy `(x - cx)^2 + (y - cy)^2 <= r^2`
/// take the disk intensity; later disks paint over earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSample {
    pub width: u32,
    pub height: u32,
    pub background: u8,
    pub disks: Vec<Disk>,
}

impl SyntheticSample {
    /// A 320x240 frame with a loose grid of dark cells on a bright field.
    pub fn demo() -> Self {
        let mut disks = Vec::new();
        for row in 0..4 {
            for col in 0..6 {
                let jitter = ((row * 7 + col * 3) % 5) as f32;
                disks.push(Disk {
                    center: (30.0 + col as f32 * 50.0 + jitter, 35.0 + row as f32 * 55.0),
                    radius: 5.0 + ((row + col) % 4) as f32,
                    intensity: 40 + ((row * 6 + col) % 3) as u8 * 20,
                });
            }
        }
        Self {
            width: 320,
            height: 240,
            background: 210,
            disks,
        }
    }

    pub fn render(&self) -> GrayImage {
        let mut img = GrayImage::from_pixel(self.width, self.height, Luma([self.background]));
        for disk in &self.disks {
            let (cx, cy) = disk.center;
            let r2 = disk.radius * disk.radius;
            let min_x = (cx - disk.radius).floor().max(0.0) as u32;
            let min_y = (cy - disk.radius).floor().max(0.0) as u32;
            let max_x = ((cx + disk.radius).ceil().max(0.0) as u32).min(self.width.saturating_sub(1));
            let max_y = ((cy + disk.radius).ceil().max(0.0) as u32).min(self.height.saturating_sub(1));
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let dx = x as f32 - cx;
                    let dy = y as f32 - cy;
                    if dx * dx + dy * dy <= r2 && x < self.width && y < self.height {
                        img.put_pixel(x, y, Luma([disk.intensity]));
                    }
                }
            }
        }
        img
    }
}

/// Writes the [`SyntheticSample::demo`] frame to `path`.
pub fn write_sample(path: &Path) -> Result<(), image::ImageError> {
    SyntheticSample::demo().render().save(path)
}
