//! Tracks regions across threshold levels and folds each track into one blob.

use std::cmp::Ordering;
use std::f32::consts::PI;

use super::config::{DetectionConfig, Polarity, RepresentativeLevel};
use super::scanner::{ConnectedRegion, LevelRegions};

/// One physical blob, seen at one or more consecutive threshold levels.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobCandidate {
    pub polarity: Polarity,
    /// Sub-pixel centroid `(x, y)` at the representative level.
    pub centroid: (f32, f32),
    pub area: u32,
    /// Radius of a disk with the same area.
    pub radius: f32,
    pub circularity: f32,
    pub first_level: u8,
    pub last_level: u8,
    /// Number of levels the blob persisted.
    pub repeatability: u32,
}

#[derive(Debug, Clone)]
struct Observation {
    level: u8,
    region: ConnectedRegion,
}

#[derive(Debug)]
struct Track {
    polarity: Polarity,
    observations: Vec<Observation>,
}

impl Track {
    fn last_centroid(&self) -> (f32, f32) {
        // a track is never created empty
        self.observations
            .last()
            .map_or((f32::NAN, f32::NAN), |o| o.region.centroid)
    }
}

/// Streaming aggregator; feed levels in ascending order, then [`finish`](Self::finish).
pub struct BlobAggregator<'a> {
    config: &'a DetectionConfig,
    open: Vec<Track>,
    closed: Vec<Track>,
}

impl<'a> BlobAggregator<'a> {
    pub fn new(config: &'a DetectionConfig) -> Self {
        Self {
            config,
            open: Vec::new(),
            closed: Vec::new(),
        }
    }

    /// Matches this level's regions to the open tracks.
    ///
    /// Pairs within tolerance are assigned nearest-first, one region per track.
    /// Tracks left without a region are closed; regions left without a track
    /// open new ones.
    pub fn push_level(&mut self, level: LevelRegions) {
        let tolerance = self.config.params().centroid_match_tolerance;

        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ri, region) in level.regions.iter().enumerate() {
            for (ti, track) in self.open.iter().enumerate() {
                if track.polarity != region.polarity {
                    continue;
                }
                let d = distance(track.last_centroid(), region.centroid);
                if d <= tolerance {
                    pairs.push((d, ri, ti));
                }
            }
        }
        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut region_track: Vec<Option<usize>> = vec![None; level.regions.len()];
        let mut track_taken = vec![false; self.open.len()];
        for (_, ri, ti) in pairs {
            if region_track[ri].is_some() || track_taken[ti] {
                continue;
            }
            region_track[ri] = Some(ti);
            track_taken[ti] = true;
        }

        let mut open: Vec<Option<Track>> = self.open.drain(..).map(Some).collect();
        let mut next_open = Vec::with_capacity(level.regions.len());
        for (region, assigned) in level.regions.into_iter().zip(region_track) {
            let observation = Observation {
                level: level.level,
                region,
            };
            match assigned.and_then(|ti| open[ti].take()) {
                Some(mut track) => {
                    track.observations.push(observation);
                    next_open.push(track);
                }
                None => next_open.push(Track {
                    polarity: observation.region.polarity,
                    observations: vec![observation],
                }),
            }
        }
        self.closed.extend(open.into_iter().flatten());
        self.open = next_open;
    }

    /// Closes every remaining track and returns the blobs in row-major order.
    pub fn finish(mut self) -> Vec<BlobCandidate> {
        self.closed.append(&mut self.open);
        let mut blobs: Vec<BlobCandidate> = self
            .closed
            .iter()
            .filter_map(|track| self.summarize(track))
            .collect();
        blobs.sort_by(row_major);
        blobs
    }

    fn summarize(&self, track: &Track) -> Option<BlobCandidate> {
        let first = track.observations.first()?;
        let last = track.observations.last()?;
        let rep = match self.config.params().representative {
            RepresentativeLevel::First => first,
            RepresentativeLevel::AreaBandCenter => {
                let center = self.config.area_band_center();
                track
                    .observations
                    .iter()
                    .min_by(|a, b| {
                        let da = (a.region.area as f32 - center).abs();
                        let db = (b.region.area as f32 - center).abs();
                        da.total_cmp(&db)
                    })
                    .unwrap_or(first)
            }
        };
        Some(BlobCandidate {
            polarity: track.polarity,
            centroid: rep.region.centroid,
            area: rep.region.area,
            radius: (rep.region.area as f32 / PI).sqrt(),
            circularity: rep.region.circularity,
            first_level: first.level,
            last_level: last.level,
            repeatability: track.observations.len() as u32,
        })
    }
}

/// Aggregates an already collected sweep.
pub fn aggregate<I>(levels: I, config: &DetectionConfig) -> Vec<BlobCandidate>
where
    I: IntoIterator<Item = LevelRegions>,
{
    let mut aggregator = BlobAggregator::new(config);
    for level in levels {
        aggregator.push_level(level);
    }
    aggregator.finish()
}

/// Keeps one candidate per spot when tracks end up on top of each other, as
/// a dark core inside a bright rim does.
///
/// Candidates are visited by descending repeatability, then row-major; one is
/// dropped when its centroid lies within the match tolerance of a candidate
/// already kept. The result is row-major.
pub fn suppress_duplicates(
    mut candidates: Vec<BlobCandidate>,
    config: &DetectionConfig,
) -> Vec<BlobCandidate> {
    let tolerance = config.params().centroid_match_tolerance;
    candidates.sort_by(|a, b| {
        b.repeatability
            .cmp(&a.repeatability)
            .then_with(|| row_major(a, b))
    });
    let mut kept: Vec<BlobCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| distance(k.centroid, candidate.centroid) > tolerance)
        {
            kept.push(candidate);
        }
    }
    kept.sort_by(row_major);
    kept
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

fn row_major(a: &BlobCandidate, b: &BlobCandidate) -> Ordering {
    a.centroid
        .1
        .total_cmp(&b.centroid.1)
        .then(a.centroid.0.total_cmp(&b.centroid.0))
        .then(a.first_level.cmp(&b.first_level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::config::DetectionParams;
    use crate::detect::config::tests::base_params;
    use approx::assert_abs_diff_eq;

    fn region(x: f32, y: f32, area: u32) -> ConnectedRegion {
        ConnectedRegion {
            polarity: Polarity::Bright,
            area,
            centroid: (x, y),
            perimeter: 10.0,
            circularity: 0.9,
            bbox: [0, 0, 0, 0],
        }
    }

    fn level(level: u8, regions: Vec<ConnectedRegion>) -> LevelRegions {
        LevelRegions { level, regions }
    }

    #[test]
    fn persistent_region_becomes_one_candidate() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let blobs = aggregate(
            [
                level(10, vec![region(20.0, 20.0, 50)]),
                level(20, vec![region(21.0, 20.5, 80)]),
                level(30, vec![region(22.0, 21.0, 120)]),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert_eq!(blob.repeatability, 3);
        assert_eq!((blob.first_level, blob.last_level), (10, 30));
        // first level is representative
        assert_eq!(blob.area, 50);
        assert_abs_diff_eq!(blob.centroid.0, 20.0);
    }

    #[test]
    fn far_regions_start_separate_candidates() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let blobs = aggregate(
            [
                level(10, vec![region(10.0, 50.0, 50), region(50.0, 50.0, 50)]),
                level(20, vec![region(10.0, 50.0, 50), region(50.0, 50.0, 50)]),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 2);
        assert!(blobs.iter().all(|b| b.repeatability == 2));
        assert!(blobs[0].centroid.0 < blobs[1].centroid.0);
    }

    #[test]
    fn gap_closes_the_track() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let blobs = aggregate(
            [
                level(10, vec![region(20.0, 20.0, 50)]),
                level(20, vec![]),
                level(30, vec![region(20.0, 20.0, 50)]),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].first_level, 10);
        assert_eq!(blobs[1].first_level, 30);
    }

    #[test]
    fn nearest_region_wins_the_track() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let blobs = aggregate(
            [
                level(10, vec![region(20.0, 20.0, 50)]),
                level(20, vec![region(27.0, 20.0, 40), region(21.0, 20.0, 60)]),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 2);
        let tracked = blobs.iter().find(|b| b.repeatability == 2).unwrap();
        assert_abs_diff_eq!(tracked.centroid.0, 20.0);
        let fresh = blobs.iter().find(|b| b.repeatability == 1).unwrap();
        assert_abs_diff_eq!(fresh.centroid.0, 27.0);
    }

    #[test]
    fn polarities_never_share_a_track() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let dark = ConnectedRegion {
            polarity: Polarity::Dark,
            ..region(20.0, 20.0, 50)
        };
        let blobs = aggregate(
            [
                level(10, vec![region(20.0, 20.0, 50)]),
                level(20, vec![dark]),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 2);
        assert!(blobs.iter().all(|b| b.repeatability == 1));
    }

    #[test]
    fn area_band_center_picks_closest_level() {
        let config = DetectionConfig::new(DetectionParams {
            min_area: 50,
            max_area: 150,
            representative: RepresentativeLevel::AreaBandCenter,
            ..base_params()
        })
        .unwrap();
        let blobs = aggregate(
            [
                level(10, vec![region(20.0, 20.0, 30)]),
                level(20, vec![region(20.5, 20.0, 95)]),
                level(30, vec![region(21.0, 20.0, 200)]),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 95);
        assert_abs_diff_eq!(blobs[0].centroid.0, 20.5);
        assert_eq!(blobs[0].first_level, 10);
    }

    fn candidate(x: f32, y: f32, polarity: Polarity, repeatability: u32) -> BlobCandidate {
        BlobCandidate {
            polarity,
            centroid: (x, y),
            area: 100,
            radius: 5.6,
            circularity: 0.9,
            first_level: 10,
            last_level: 10,
            repeatability,
        }
    }

    #[test]
    fn coincident_candidates_keep_the_most_persistent() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let blobs = suppress_duplicates(
            vec![
                candidate(50.0, 50.0, Polarity::Bright, 4),
                candidate(50.5, 50.0, Polarity::Dark, 9),
                candidate(80.0, 50.0, Polarity::Bright, 3),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].polarity, Polarity::Dark);
        assert_eq!(blobs[0].repeatability, 9);
        assert_abs_diff_eq!(blobs[1].centroid.0, 80.0);
    }

    #[test]
    fn equal_persistence_keeps_the_row_major_first() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let blobs = suppress_duplicates(
            vec![
                candidate(22.0, 30.0, Polarity::Bright, 5),
                candidate(20.0, 30.0, Polarity::Bright, 5),
            ],
            &config,
        );
        assert_eq!(blobs.len(), 1);
        assert_abs_diff_eq!(blobs[0].centroid.0, 20.0);
    }

    #[test]
    fn candidates_beyond_tolerance_are_untouched() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let input = vec![
            candidate(10.0, 10.0, Polarity::Dark, 2),
            candidate(20.5, 10.0, Polarity::Bright, 7),
        ];
        assert_eq!(suppress_duplicates(input.clone(), &config), input);
    }

    #[test]
    fn output_is_row_major() {
        let config = DetectionConfig::new(base_params()).unwrap();
        let blobs = aggregate(
            [level(
                10,
                vec![
                    region(80.0, 10.0, 50),
                    region(10.0, 60.0, 50),
                    region(40.0, 10.0, 50),
                ],
            )],
            &config,
        );
        let centroids: Vec<(f32, f32)> = blobs.iter().map(|b| b.centroid).collect();
        assert_eq!(centroids, vec![(40.0, 10.0), (80.0, 10.0), (10.0, 60.0)]);
    }
}
