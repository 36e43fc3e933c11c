// GroupMetricsCalculator - shot group statistics
//
// Consumes shots already converted to inches relative to the point of aim
// and derives the standard group-size figures:
//
// - centroid: mean of all x / y offsets
// - extreme spread: largest center-to-center distance over every shot pair
// - mean radius: mean distance of each shot from the centroid
// - group size in MOA: extreme spread / (distance_yards * 1.047 / 100)
//
// Every output is independent of shot order; sequence numbers only ride
// along for display.

use serde::{Deserialize, Serialize};

use crate::calibration::InchShot;
use crate::error::MetricsError;

/// Inches subtended by one minute of angle at 100 yards
pub const INCHES_PER_MOA_AT_100_YARDS: f64 = 1.047;

/// Derived statistics for one shot group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub shot_count: usize,
    /// Horizontal centroid offset from the point of aim (inches)
    pub group_center_x: f64,
    /// Vertical centroid offset from the point of aim (inches)
    pub group_center_y: f64,
    /// Largest distance between any two shots (inches)
    pub extreme_spread: f64,
    /// Mean distance of the shots from the centroid (inches)
    pub mean_radius: f64,
    /// Extreme spread expressed in minutes of angle at the target distance
    pub group_size_moa: f64,
}

/// Horizontal/vertical extent of a group and its displacement from the POA
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupDispersion {
    /// Horizontal extent, leftmost to rightmost shot (inches)
    pub width: f64,
    /// Vertical extent, lowest to highest shot (inches)
    pub height: f64,
    /// Distance from the point of aim to the centroid (inches)
    pub poa_offset: f64,
    /// Direction of the centroid from the POA, degrees counter-clockwise from +x
    pub poa_offset_direction_deg: f64,
}

/// Convert a linear size at the given distance to MOA
pub fn inches_to_moa(inches: f64, distance_yards: f64) -> Result<f64, MetricsError> {
    validate_distance(distance_yards)?;
    Ok(inches / inches_per_moa(distance_yards))
}

/// Convert an angular size in MOA to inches at the given distance
pub fn moa_to_inches(moa: f64, distance_yards: f64) -> Result<f64, MetricsError> {
    validate_distance(distance_yards)?;
    Ok(moa * inches_per_moa(distance_yards))
}

/// Compute group metrics for a set of shots at a target distance
///
/// # Errors
/// - `InsufficientShots` when `shots` is empty
/// - `InvalidDistance` when `distance_yards` is not a finite value > 0
pub fn compute_metrics(
    shots: &[InchShot],
    distance_yards: f64,
) -> Result<GroupMetrics, MetricsError> {
    if shots.is_empty() {
        return Err(MetricsError::InsufficientShots);
    }
    validate_distance(distance_yards)?;

    let (group_center_x, group_center_y) = centroid(shots);
    let extreme_spread = extreme_spread(shots);
    let mean_radius = shots
        .iter()
        .map(|shot| (shot.x_inches - group_center_x).hypot(shot.y_inches - group_center_y))
        .sum::<f64>()
        / shots.len() as f64;

    Ok(GroupMetrics {
        shot_count: shots.len(),
        group_center_x,
        group_center_y,
        extreme_spread,
        mean_radius,
        group_size_moa: extreme_spread / inches_per_moa(distance_yards),
    })
}

/// Compute the width/height of a group and its offset from the point of aim
pub fn compute_dispersion(shots: &[InchShot]) -> Result<GroupDispersion, MetricsError> {
    if shots.is_empty() {
        return Err(MetricsError::InsufficientShots);
    }

    let (min_x, max_x, min_y, max_y) = shots.iter().fold(
        (
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ),
        |(min_x, max_x, min_y, max_y), shot| {
            (
                min_x.min(shot.x_inches),
                max_x.max(shot.x_inches),
                min_y.min(shot.y_inches),
                max_y.max(shot.y_inches),
            )
        },
    );
    let (center_x, center_y) = centroid(shots);

    Ok(GroupDispersion {
        width: max_x - min_x,
        height: max_y - min_y,
        poa_offset: center_x.hypot(center_y),
        poa_offset_direction_deg: center_y.atan2(center_x).to_degrees(),
    })
}

fn validate_distance(distance_yards: f64) -> Result<(), MetricsError> {
    if !distance_yards.is_finite() || distance_yards <= 0.0 {
        return Err(MetricsError::InvalidDistance { distance_yards });
    }
    Ok(())
}

fn inches_per_moa(distance_yards: f64) -> f64 {
    distance_yards * INCHES_PER_MOA_AT_100_YARDS / 100.0
}

fn centroid(shots: &[InchShot]) -> (f64, f64) {
    let count = shots.len() as f64;
    let (sum_x, sum_y) = shots.iter().fold((0.0, 0.0), |(sx, sy), shot| {
        (sx + shot.x_inches, sy + shot.y_inches)
    });
    (sum_x / count, sum_y / count)
}

// O(n^2) over all unordered pairs; a group is a handful of rounds.
fn extreme_spread(shots: &[InchShot]) -> f64 {
    let mut max_distance = 0.0_f64;
    for (i, a) in shots.iter().enumerate() {
        for b in &shots[i + 1..] {
            max_distance = max_distance.max((a.x_inches - b.x_inches).hypot(a.y_inches - b.y_inches));
        }
    }
    max_distance
}
