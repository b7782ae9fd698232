//! Runs the detector over a set of image files.
//!
//! Images are independent, so they are processed on the rayon pool. Results
//! come back in input order; failed images are logged and left out.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;

use crate::concentration::concentration;
use crate::detect::{DetectionConfig, DetectionError, detect_from_image};
use crate::overlay::draw_overlay;
use crate::report::CountRecord;

/// Everything a batch run needs besides the file list.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub config: DetectionConfig,
    pub out_dir: PathBuf,
    pub write_overlay: bool,
    pub dilution: Option<f64>,
    pub frame_volume_ml: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("failed to open {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("detection failed for {}: {source}", path.display())]
    Detection {
        path: PathBuf,
        source: DetectionError,
    },
    #[error("failed to write overlay {}: {source}", path.display())]
    Overlay {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn is_image_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "png" | "jpg" | "jpeg" | "bmp" | "gif" | "tif" | "tiff" | "webp"
    )
}

/// Shell-style file name match supporting `*` and `?`.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                // let the last star absorb one more character
                Some((star, consumed)) => {
                    p = star + 1;
                    n = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Lists image files in `dir`, optionally restricted to names matching
/// `pattern`, sorted by path.
///
/// A pattern with a directory part (`data/*.jpg`) lists that directory,
/// resolved against `dir`; only the file name part may hold wildcards.
pub fn discover_images(dir: &Path, pattern: Option<&str>) -> std::io::Result<Vec<PathBuf>> {
    let (dir, pattern) = match pattern.map(split_pattern) {
        Some((Some(sub), name)) => (dir.join(sub), Some(name)),
        Some((None, name)) => (dir.to_path_buf(), Some(name)),
        None => (dir.to_path_buf(), None),
    };
    let mut images: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image_file(p))
        .filter(|p| match (pattern, p.file_name().and_then(OsStr::to_str)) {
            (None, _) => true,
            (Some(pat), Some(name)) => matches_pattern(name, pat),
            (Some(_), None) => false,
        })
        .collect();
    images.sort();
    Ok(images)
}

/// Splits `data/*.jpg` into `(Some("data"), "*.jpg")`.
fn split_pattern(pattern: &str) -> (Option<&Path>, &str) {
    match pattern.rfind(['/', std::path::MAIN_SEPARATOR]) {
        Some(0) => (Some(Path::new("/")), &pattern[1..]),
        Some(i) => (Some(Path::new(&pattern[..i])), &pattern[i + 1..]),
        None => (None, pattern),
    }
}

/// Counts cells in one file and writes its overlay when enabled.
pub fn process_image(path: &Path, settings: &BatchSettings) -> Result<CountRecord, BatchError> {
    let img = image::open(path).map_err(|source| BatchError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let centroids =
        detect_from_image(&img, &settings.config).map_err(|source| BatchError::Detection {
            path: path.to_path_buf(),
            source,
        })?;

    if settings.write_overlay {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let out_path = settings.out_dir.join(format!("{stem}_overlay.png"));
        fs::create_dir_all(&settings.out_dir)?;
        draw_overlay(&img, &centroids)
            .save(&out_path)
            .map_err(|source| BatchError::Overlay {
                path: out_path.clone(),
                source,
            })?;
    }

    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cells = centroids.len();
    let conc = match concentration(cells, settings.dilution, settings.frame_volume_ml) {
        Ok(c) => c,
        Err(e) => {
            warn!("{name}: concentration unavailable: {e}");
            None
        }
    };

    match conc {
        Some(c) => info!("{name:25}  {cells:4} cells  |  {c:.3e} cells/mL"),
        None => info!("{name:25}  {cells:4} cells"),
    }

    Ok(CountRecord {
        image: name,
        cells,
        concentration: conc,
    })
}

/// Processes `paths` in parallel. The returned records follow input order.
pub fn run_batch(paths: &[PathBuf], settings: &BatchSettings) -> Vec<CountRecord> {
    let results: Vec<Result<CountRecord, BatchError>> = paths
        .par_iter()
        .map(|p| process_image(p, settings))
        .collect();

    results
        .into_iter()
        .filter_map(|r| match r {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("{e}; skipped");
                None
            }
        })
        .collect()
}
