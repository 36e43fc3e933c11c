// Calibration module - target image calibration
//
// This module provides two components:
// 1. transform: pixel-to-inch scale from reference markers, and conversion of
//    marked shots into inch offsets from the point of aim
// 2. marker: zoom-compensated marker sizing for the capture view
//
// The calibration workflow:
// 1. Place reference markers of known physical size
// 2. Compute the scale factor
// 3. Place the point of aim and mark shots, converting each with `to_inches`

pub mod marker;
pub mod transform;

pub use marker::marker_display_size;
pub use transform::{
    compute_scale, compute_scale_multi, to_inches, CalibrationReference, InchShot, PixelPoint,
    PixelShot, ScaleFactor,
};
