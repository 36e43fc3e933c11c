// CalibrationTransform - pixel to physical-unit mapping
//
// A calibration reference is two pixel points whose real-world separation is
// known (a 1" reference dot, a ruler edge). The resulting scale converts
// marked shot pixels into inch offsets from the point of aim:
//
//   pixels_per_inch = |p1 - p0| / physical_length_inches
//   x_inches = (shot.x - poa.x) / pixels_per_inch
//   y_inches = (poa.y - shot.y) / pixels_per_inch   (image y grows downward)
//
// The transform is a one-shot computation; callers recompute the scale when
// reference points move and freeze it once shot marking begins.

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Raw image coordinate, origin top-left, in rendered pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point in pixels
    pub fn distance_to(&self, other: &PixelPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// True when both coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Two pixel points with a known physical separation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReference {
    pub pixel_points: [PixelPoint; 2],
    pub physical_length_inches: f64,
}

impl CalibrationReference {
    pub fn new(start: PixelPoint, end: PixelPoint, physical_length_inches: f64) -> Self {
        Self {
            pixel_points: [start, end],
            physical_length_inches,
        }
    }

    /// Pixel separation of the two reference points
    pub fn pixel_distance(&self) -> f64 {
        self.pixel_points[0].distance_to(&self.pixel_points[1])
    }
}

/// Derived pixel density of a calibrated target image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    pub pixels_per_inch: f64,
}

impl ScaleFactor {
    /// Convert a pixel length to inches
    pub fn pixels_to_inches(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_inch
    }

    /// Convert an inch length to pixels
    pub fn inches_to_pixels(&self, inches: f64) -> f64 {
        inches * self.pixels_per_inch
    }
}

/// User-marked shot hole in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelShot {
    pub x: f64,
    pub y: f64,
    pub sequence_number: u32,
}

impl PixelShot {
    pub fn new(x: f64, y: f64, sequence_number: u32) -> Self {
        Self {
            x,
            y,
            sequence_number,
        }
    }
}

/// Shot offset from the point of aim in inches, up and right positive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InchShot {
    pub x_inches: f64,
    pub y_inches: f64,
    pub sequence_number: u32,
}

impl InchShot {
    pub fn new(x_inches: f64, y_inches: f64, sequence_number: u32) -> Self {
        Self {
            x_inches,
            y_inches,
            sequence_number,
        }
    }
}

/// Compute the scale factor for a single reference
///
/// # Errors
/// `InvalidCalibration` when the points coincide, any coordinate is not
/// finite, the physical length is not a positive finite number, or the
/// resulting density overflows or underflows.
pub fn compute_scale(reference: &CalibrationReference) -> Result<ScaleFactor, CalibrationError> {
    let [start, end] = reference.pixel_points;
    if !start.is_finite() || !end.is_finite() {
        return Err(CalibrationError::invalid(
            "reference points must have finite coordinates",
        ));
    }

    let length = reference.physical_length_inches;
    if !length.is_finite() || length <= 0.0 {
        return Err(CalibrationError::invalid(format!(
            "physical length must be greater than 0 inches (got {})",
            length
        )));
    }

    let pixel_distance = reference.pixel_distance();
    if pixel_distance <= 0.0 {
        return Err(CalibrationError::invalid("reference points coincide"));
    }

    checked_scale(pixel_distance / length)
}

/// Compute a scale factor averaged over several references
///
/// Each reference is validated individually; the result is the mean of the
/// per-reference pixel densities.
pub fn compute_scale_multi(
    references: &[CalibrationReference],
) -> Result<ScaleFactor, CalibrationError> {
    if references.is_empty() {
        return Err(CalibrationError::invalid(
            "at least one calibration reference is required",
        ));
    }

    let mut total = 0.0;
    for reference in references {
        total += compute_scale(reference)?.pixels_per_inch;
    }

    checked_scale(total / references.len() as f64)
}

/// Only normal, positive densities can be divided by safely
fn checked_scale(pixels_per_inch: f64) -> Result<ScaleFactor, CalibrationError> {
    if !pixels_per_inch.is_normal() || pixels_per_inch <= 0.0 {
        return Err(CalibrationError::invalid(format!(
            "scale out of range ({} px/in)",
            pixels_per_inch
        )));
    }
    Ok(ScaleFactor { pixels_per_inch })
}

/// Convert a marked shot to inches relative to the point of aim
pub fn to_inches(shot: &PixelShot, poa: &PixelPoint, scale: &ScaleFactor) -> InchShot {
    InchShot {
        x_inches: (shot.x - poa.x) / scale.pixels_per_inch,
        y_inches: (poa.y - shot.y) / scale.pixels_per_inch,
        sequence_number: shot.sequence_number,
    }
}
