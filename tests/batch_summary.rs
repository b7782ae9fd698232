use std::fs;
use std::path::{Path, PathBuf};

use cell_counter::batch::{BatchSettings, discover_images, process_image, run_batch};
use cell_counter::detect::{
    BlobColor, Connectivity, DetectionConfig, DetectionParams, RepresentativeLevel,
};
use cell_counter::report::{CountRecord, summary_csv, write_summary_csv};
use cell_counter::synth::{Disk, SyntheticSample};

fn settings(out_dir: &Path, dilution: Option<f64>, frame_volume_ml: Option<f64>) -> BatchSettings {
    let config = DetectionConfig::new(DetectionParams {
        min_area: 30,
        max_area: 1500,
        use_circularity_filter: true,
        min_circularity: 0.4,
        min_threshold: 10,
        max_threshold: 220,
        threshold_step: 10,
        centroid_match_tolerance: 10.0,
        min_repeatability: 2,
        blob_color: BlobColor::Any,
        connectivity: Connectivity::Eight,
        representative: RepresentativeLevel::First,
    })
    .expect("valid params");
    BatchSettings {
        config,
        out_dir: out_dir.to_path_buf(),
        write_overlay: true,
        dilution,
        frame_volume_ml,
    }
}

/// Writes a 120x60 frame with `cells` dark disks in a row.
fn write_frame(path: &Path, cells: usize) {
    SyntheticSample {
        width: 120,
        height: 60,
        background: 210,
        disks: (0..cells)
            .map(|i| Disk {
                center: (15.0 + i as f32 * 30.0, 30.0),
                radius: 6.0,
                intensity: 50,
            })
            .collect(),
    }
    .render()
    .save(path)
    .expect("failed to write frame");
}

#[test]
fn batch_counts_each_frame_in_input_order() {
    let input = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    let counts = [3usize, 0, 4, 1, 2];
    let mut paths: Vec<PathBuf> = Vec::new();
    for (i, &n) in counts.iter().enumerate() {
        let path = input.path().join(format!("frame{i}.png"));
        write_frame(&path, n);
        paths.push(path);
    }
    // reverse to show the output follows the given order, not file names
    paths.reverse();

    let records = run_batch(&paths, &settings(out.path(), Some(2.0), Some(1e-4)));
    let got: Vec<(String, usize)> = records.iter().map(|r| (r.image.clone(), r.cells)).collect();
    let expected: Vec<(String, usize)> = counts
        .iter()
        .enumerate()
        .rev()
        .map(|(i, &n)| (format!("frame{i}.png"), n))
        .collect();
    assert_eq!(got, expected);
    assert_eq!(records[0].concentration, Some(2.0 * 2.0 / 1e-4));

    for i in 0..counts.len() {
        assert!(out.path().join(format!("frame{i}_overlay.png")).is_file());
    }
}

#[test]
fn unreadable_file_is_skipped() {
    let input = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    let good = input.path().join("a.png");
    let bad = input.path().join("b.png");
    write_frame(&good, 2);
    fs::write(&bad, b"not an image").expect("write");

    let settings = settings(out.path(), None, None);
    assert!(process_image(&bad, &settings).is_err());

    let records = run_batch(&[bad, good], &settings);
    assert_eq!(
        records,
        vec![CountRecord {
            image: "a.png".into(),
            cells: 2,
            concentration: None,
        }]
    );
}

#[test]
fn zero_frame_volume_still_reports_the_count() {
    let input = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    let path = input.path().join("a.png");
    write_frame(&path, 3);

    let mut settings = settings(out.path(), Some(2.0), Some(0.0));
    settings.write_overlay = false;
    let record = process_image(&path, &settings).expect("processing failed");
    assert_eq!(record.cells, 3);
    assert_eq!(record.concentration, None);
    assert!(!out.path().join("a_overlay.png").exists());
}

#[test]
fn discovery_filters_by_extension_and_pattern() {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in ["b.jpg", "a.jpg", "c.png", "notes.txt"] {
        fs::write(dir.path().join(name), b"").expect("write");
    }
    fs::create_dir(dir.path().join("sub.jpg")).expect("mkdir");

    let names = |paths: Vec<PathBuf>| -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    };
    let all = discover_images(dir.path(), None).expect("read_dir");
    assert_eq!(names(all), vec!["a.jpg", "b.jpg", "c.png"]);
    let jpgs = discover_images(dir.path(), Some("*.jpg")).expect("read_dir");
    assert_eq!(names(jpgs), vec!["a.jpg", "b.jpg"]);
}

#[test]
fn pattern_with_directory_part_lists_that_directory() {
    let root = tempfile::tempdir().expect("tempdir");
    let data = root.path().join("data");
    fs::create_dir(&data).expect("mkdir");
    for name in ["a.jpg", "b.png"] {
        fs::write(data.join(name), b"").expect("write");
    }
    fs::write(root.path().join("top.jpg"), b"").expect("write");

    let found = discover_images(root.path(), Some("data/*.jpg")).expect("read_dir");
    assert_eq!(found, vec![data.join("a.jpg")]);

    let absolute = format!("{}/*.png", data.display());
    let found = discover_images(Path::new("."), Some(&absolute)).expect("read_dir");
    assert_eq!(found, vec![data.join("b.png")]);
}

#[test]
fn summary_file_matches_records() {
    let out = tempfile::tempdir().expect("tempdir");
    let records = vec![
        CountRecord {
            image: "a.png".into(),
            cells: 250,
            concentration: Some(5_000_000.0),
        },
        CountRecord {
            image: "b.png".into(),
            cells: 7,
            concentration: None,
        },
    ];
    let path = out.path().join("results/summary.csv");
    write_summary_csv(&path, &records).expect("write failed");
    let text = fs::read_to_string(&path).expect("read failed");
    assert_eq!(text, summary_csv(&records));
    assert_eq!(
        text,
        "image,cells,concentration_cells_per_mL\na.png,250,5000000\nb.png,7,\n"
    );
}
