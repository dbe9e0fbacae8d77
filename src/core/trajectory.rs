//! Closest-approach matching between independently sampled trajectories

use crate::core::geodesy::{geodesic_distance, MAX_GEODESIC_DISTANCE_M};
use crate::core::interpolation::{align_periodic, align_to, AlignmentMethod};
use crate::types::{epoch_seconds, HampError, HampResult, TimeIndexed, TimeRange, Trajectory};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Trajectory matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Approaches further apart than this are not a colocation
    pub max_colocation_radius_m: f64,
    /// Largest gap (seconds) bridged when resampling the lower-rate track.
    /// `None` uses three median sampling intervals of that track.
    pub max_interp_gap_s: Option<f64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_colocation_radius_m: 50_000.0,
            max_interp_gap_s: None,
        }
    }
}

/// Time and separation of the closest approach
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosestApproach {
    pub time: DateTime<Utc>,
    pub distance_m: f64,
    /// Name of the trajectory whose clock `time` belongs to
    pub reference: String,
    /// Index into the reference trajectory
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NoMatchReason {
    /// The trajectories share no time interval
    NoOverlap,
    /// Every common timestamp falls in a gap of either track
    AllGaps,
    /// Closest approach is beyond the colocation radius
    TooFar { min_distance_m: f64 },
}

/// Outcome of a closest-approach search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Colocation {
    Found(ClosestApproach),
    NoMatch(NoMatchReason),
}

impl Colocation {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Colocation::Found(approach) => Some(approach.time),
            Colocation::NoMatch(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Colocation::Found(_))
    }

    /// Convert "no match" into the corresponding error
    pub fn into_result(self) -> HampResult<ClosestApproach> {
        match self {
            Colocation::Found(approach) => Ok(approach),
            Colocation::NoMatch(NoMatchReason::NoOverlap) => Err(HampError::MissingCoverage(
                "trajectories share no time interval".to_string(),
            )),
            Colocation::NoMatch(NoMatchReason::AllGaps) => {
                Err(HampError::NoColocation { min_distance_m: None })
            }
            Colocation::NoMatch(NoMatchReason::TooFar { min_distance_m }) => {
                Err(HampError::NoColocation {
                    min_distance_m: Some(min_distance_m),
                })
            }
        }
    }
}

/// Separation of two tracks on the higher-rate track's clock
#[derive(Debug, Clone)]
pub struct TrackSeparation {
    /// Name of the higher-rate track
    pub reference: String,
    pub time: Vec<DateTime<Utc>>,
    /// Index of each sample into the reference track
    pub index: Vec<usize>,
    /// Metres; gaps carry [`MAX_GEODESIC_DISTANCE_M`]
    pub distance_m: Array1<f64>,
}

impl TrackSeparation {
    pub fn valid_count(&self) -> usize {
        self.distance_m
            .iter()
            .filter(|&&d| d < MAX_GEODESIC_DISTANCE_M)
            .count()
    }

    /// Position of the minimum, the earliest one on ties
    pub fn argmin(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &d) in self.distance_m.iter().enumerate() {
            if best.map_or(true, |(_, b)| d < b) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }
}

/// Finds the time of closest geodesic approach between two trajectories
pub struct TrajectoryMatcher {
    config: MatchConfig,
}

impl TrajectoryMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Common time interval of two trajectories
    pub fn overlap(a: &Trajectory, b: &Trajectory) -> Option<TimeRange> {
        let start = (*a.time.first()?).max(*b.time.first()?);
        let end = (*a.time.last()?).min(*b.time.last()?);
        TimeRange::new(start, end).ok()
    }

    /// Distances between the tracks at every reference timestamp within
    /// their overlap. The lower-rate track is resampled onto the
    /// higher-rate track, never the reverse. `None` without overlap.
    pub fn separation(&self, a: &Trajectory, b: &Trajectory) -> HampResult<Option<TrackSeparation>> {
        a.validate()?;
        b.validate()?;
        let range = match Self::overlap(a, b) {
            Some(range) => range,
            None => return Ok(None),
        };

        let a_step = a.median_interval().unwrap_or(f64::INFINITY);
        let b_step = b.median_interval().unwrap_or(f64::INFINITY);
        // a single-sample track has no rate to resample and becomes the reference
        let a_is_reference = if a.len() < 2 {
            true
        } else if b.len() < 2 {
            false
        } else {
            a_step <= b_step
        };
        let (reference, reference_step, other, other_step) = if a_is_reference {
            (a, a_step, b, b_step)
        } else {
            (b, b_step, a, a_step)
        };
        log::debug!(
            "Matching '{}' ({:.3}s) against '{}' ({:.3}s)",
            reference.name,
            reference_step,
            other.name,
            other_step
        );

        let index = range.indices_in(&reference.time);
        let sliced = reference.select_indices(&index);
        let target = Array1::from_iter(sliced.time.iter().map(epoch_seconds));
        let source = Array1::from_iter(other.time.iter().map(epoch_seconds));

        let gap = match self.config.max_interp_gap_s {
            Some(gap) => gap,
            None if other_step.is_finite() => 3.0 * other_step,
            None => 0.0,
        };
        let method = AlignmentMethod::Linear;
        let lat = align_to(source.view(), other.lat.view(), target.view(), method, Some(gap));
        let lon = align_periodic(source.view(), other.lon.view(), target.view(), method, Some(gap), 360.0);

        let distance_m = Array1::from_iter((0..sliced.len()).map(|i| {
            let d = geodesic_distance(sliced.lat[i], sliced.lon[i], lat[i], lon[i]);
            if d.is_finite() {
                d
            } else {
                MAX_GEODESIC_DISTANCE_M
            }
        }));

        Ok(Some(TrackSeparation {
            reference: reference.name.clone(),
            time: sliced.time,
            index,
            distance_m,
        }))
    }

    /// Timestamp of minimum separation, or an explicit "no match"
    pub fn find_closest_approach(&self, a: &Trajectory, b: &Trajectory) -> HampResult<Colocation> {
        let separation = match self.separation(a, b)? {
            Some(separation) => separation,
            None => {
                log::warn!("'{}' and '{}' do not overlap in time", a.name, b.name);
                return Ok(Colocation::NoMatch(NoMatchReason::NoOverlap));
            }
        };
        if separation.valid_count() == 0 {
            log::warn!("'{}' and '{}' overlap only in gaps", a.name, b.name);
            return Ok(Colocation::NoMatch(NoMatchReason::AllGaps));
        }
        let best = match separation.argmin() {
            Some(best) => best,
            None => return Ok(Colocation::NoMatch(NoMatchReason::AllGaps)),
        };
        let distance_m = separation.distance_m[best];
        if distance_m > self.config.max_colocation_radius_m {
            log::warn!(
                "Closest approach of '{}' and '{}' is {:.1} km, beyond {:.1} km",
                a.name,
                b.name,
                distance_m / 1000.0,
                self.config.max_colocation_radius_m / 1000.0
            );
            return Ok(Colocation::NoMatch(NoMatchReason::TooFar {
                min_distance_m: distance_m,
            }));
        }

        let approach = ClosestApproach {
            time: separation.time[best],
            distance_m,
            reference: separation.reference.clone(),
            index: separation.index[best],
        };
        log::info!(
            "Closest approach of '{}' and '{}' at {} ({:.1} m)",
            a.name,
            b.name,
            approach.time,
            approach.distance_m
        );
        Ok(Colocation::Found(approach))
    }

    /// Sample of `track` nearest to a fixed position, within the radius
    pub fn closest_to_point(&self, track: &Trajectory, lat: f64, lon: f64) -> HampResult<Colocation> {
        track.validate()?;
        let distances = track
            .lat
            .iter()
            .zip(track.lon.iter())
            .map(|(&la, &lo)| geodesic_distance(la, lo, lat, lon))
            .map(|d| if d.is_finite() { d } else { MAX_GEODESIC_DISTANCE_M });
        let separation = TrackSeparation {
            reference: track.name.clone(),
            time: track.time.clone(),
            index: (0..track.len()).collect(),
            distance_m: Array1::from_iter(distances),
        };
        if separation.valid_count() == 0 {
            return Ok(Colocation::NoMatch(NoMatchReason::AllGaps));
        }
        let best = separation.argmin().unwrap_or(0);
        let distance_m = separation.distance_m[best];
        if distance_m > self.config.max_colocation_radius_m {
            return Ok(Colocation::NoMatch(NoMatchReason::TooFar {
                min_distance_m: distance_m,
            }));
        }
        Ok(Colocation::Found(ClosestApproach {
            time: track.time[best],
            distance_m,
            reference: track.name.clone(),
            index: best,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn track(name: &str, n: usize, step_s: i64, lat: impl Fn(usize) -> f64, lon: impl Fn(usize) -> f64) -> Trajectory {
        let t0 = Utc.timestamp_opt(1_724_000_000, 0).unwrap();
        Trajectory::new(
            name,
            (0..n).map(|i| t0 + Duration::seconds(i as i64 * step_s)).collect(),
            Array1::from_iter((0..n).map(&lat)),
            Array1::from_iter((0..n).map(&lon)),
        )
        .unwrap()
    }

    #[test]
    fn test_gap_never_wins() {
        let matcher = TrajectoryMatcher::new(MatchConfig::default());
        let a = track("a", 10, 1, |_| 10.0, |i| -40.0 + i as f64 * 0.01);
        let b = track("b", 10, 1, |i| if i == 3 { f64::NAN } else { 10.1 }, |i| -40.0 + i as f64 * 0.01);
        let separation = matcher.separation(&a, &b).unwrap().unwrap();
        assert_eq!(separation.distance_m[3], MAX_GEODESIC_DISTANCE_M);
        let found = matcher.find_closest_approach(&a, &b).unwrap();
        assert!(found.is_found());
        assert_ne!(found.time(), Some(a.time[3]));
    }

    #[test]
    fn test_no_overlap() {
        let matcher = TrajectoryMatcher::new(MatchConfig::default());
        let a = track("a", 5, 1, |_| 10.0, |_| -40.0);
        let mut b = a.clone();
        b.time = b.time.iter().map(|t| *t + Duration::hours(2)).collect();
        assert_eq!(
            matcher.find_closest_approach(&a, &b).unwrap(),
            Colocation::NoMatch(NoMatchReason::NoOverlap)
        );
        assert!(matches!(
            Colocation::NoMatch(NoMatchReason::NoOverlap).into_result(),
            Err(HampError::MissingCoverage(_))
        ));
    }

    #[test]
    fn test_closest_to_point() {
        let matcher = TrajectoryMatcher::new(MatchConfig::default());
        let a = track("a", 5, 1, |i| 10.0 + i as f64 * 0.01, |_| -40.0);
        let found = matcher.closest_to_point(&a, 10.021, -40.0).unwrap();
        assert_eq!(found.time(), Some(a.time[2]));
    }
}
