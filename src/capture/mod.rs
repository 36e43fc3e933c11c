// Capture module - target capture workflow
//
// A CaptureSession walks one photographed target through the capture steps:
//
// 1. Calibrate: one or more reference markers of known size give the scale
// 2. Place the point of aim
// 3. Mark, remove or undo shots (stored in pixel space, numbered from 1)
// 4. Finish at a target distance, producing a CapturedTarget
//
// Calibration is locked once the first shot is marked. Shots keep their
// sequence numbers when earlier shots are removed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::group::{compute_metrics, GroupMetrics};
use crate::calibration::{
    compute_scale, compute_scale_multi, marker_display_size, to_inches, CalibrationReference,
    InchShot, PixelPoint, PixelShot, ScaleFactor,
};
use crate::config::CaptureConfig;
use crate::error::{
    log_calibration_error, log_metrics_error, CalibrationError, ErrorCode, MetricsError,
};

/// How the scale factor of a capture was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationMode {
    /// Printed reference dot(s) of known diameter
    ReferenceMarker,
    /// A measured edge of the target (ruler, known target width)
    MeasuredEdge,
}

/// Result of a completed capture, handed to the session store for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedTarget {
    pub calibration_mode: CalibrationMode,
    pub distance_yards: f64,
    pub scale: ScaleFactor,
    pub point_of_aim: PixelPoint,
    /// Shots in entry order, in inches relative to the point of aim
    pub shots: Vec<InchShot>,
    pub metrics: GroupMetrics,
}

/// Errors surfaced by operations spanning calibration and metrics
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    Calibration(CalibrationError),
    Metrics(MetricsError),
}

impl ErrorCode for CaptureError {
    fn code(&self) -> i32 {
        match self {
            CaptureError::Calibration(err) => err.code(),
            CaptureError::Metrics(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            CaptureError::Calibration(err) => err.message(),
            CaptureError::Metrics(err) => err.message(),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Calibration(err) => err.fmt(f),
            CaptureError::Metrics(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<CalibrationError> for CaptureError {
    fn from(err: CalibrationError) -> Self {
        CaptureError::Calibration(err)
    }
}

impl From<MetricsError> for CaptureError {
    fn from(err: MetricsError) -> Self {
        CaptureError::Metrics(err)
    }
}

/// One target capture in progress
///
/// # Example
/// ```
/// use range_trainer::calibration::{CalibrationReference, PixelPoint};
/// use range_trainer::capture::{CalibrationMode, CaptureSession};
///
/// let mut session = CaptureSession::new(CalibrationMode::ReferenceMarker);
/// session
///     .calibrate(&CalibrationReference::new(
///         PixelPoint::new(0.0, 0.0),
///         PixelPoint::new(100.0, 0.0),
///         1.0,
///     ))
///     .unwrap();
/// session.set_point_of_aim(PixelPoint::new(500.0, 500.0)).unwrap();
/// session.add_shot(PixelPoint::new(550.0, 450.0)).unwrap();
/// let target = session.finish(100.0).unwrap();
/// assert_eq!(target.shots[0].x_inches, 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct CaptureSession {
    mode: CalibrationMode,
    config: CaptureConfig,
    scale: Option<ScaleFactor>,
    point_of_aim: Option<PixelPoint>,
    shots: Vec<PixelShot>,
    next_sequence: u32,
    finished: bool,
}

impl CaptureSession {
    pub fn new(mode: CalibrationMode) -> Self {
        Self::with_config(mode, CaptureConfig::default())
    }

    pub fn with_config(mode: CalibrationMode, config: CaptureConfig) -> Self {
        Self {
            mode,
            config,
            scale: None,
            point_of_aim: None,
            shots: Vec::new(),
            next_sequence: 1,
            finished: false,
        }
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn scale(&self) -> Option<ScaleFactor> {
        self.scale
    }

    pub fn point_of_aim(&self) -> Option<PixelPoint> {
        self.point_of_aim
    }

    pub fn pixel_shots(&self) -> &[PixelShot] {
        &self.shots
    }

    pub fn shot_count(&self) -> usize {
        self.shots.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Marker size in image pixels at the given zoom
    pub fn marker_size(&self, zoom_scale: f64) -> f64 {
        marker_display_size(self.config.marker_base_size_px, zoom_scale)
    }

    /// Establish the scale from a single reference
    ///
    /// # Errors
    /// - `InvalidCalibration` for degenerate geometry, or when shots are
    ///   already marked against the current scale
    /// - `CaptureFinished` once the capture is finished
    pub fn calibrate(
        &mut self,
        reference: &CalibrationReference,
    ) -> Result<ScaleFactor, CalibrationError> {
        self.check_calibration_editable()?;
        let scale = compute_scale(reference).inspect_err(|err| {
            log_calibration_error(err, "calibrate");
        })?;
        self.scale = Some(scale);
        log::info!(
            "[Capture] Calibrated at {:.3} px/in ({:?})",
            scale.pixels_per_inch,
            self.mode
        );
        Ok(scale)
    }

    /// Calibrate from the two edges of the configured default reference marker
    pub fn calibrate_default_marker(
        &mut self,
        start: PixelPoint,
        end: PixelPoint,
    ) -> Result<ScaleFactor, CalibrationError> {
        let reference = CalibrationReference::new(start, end, self.config.reference_length_inches);
        self.calibrate(&reference)
    }

    /// Establish the scale from several references, averaging their scales
    pub fn calibrate_multi(
        &mut self,
        references: &[CalibrationReference],
    ) -> Result<ScaleFactor, CalibrationError> {
        self.check_calibration_editable()?;
        let scale = compute_scale_multi(references).inspect_err(|err| {
            log_calibration_error(err, "calibrate_multi");
        })?;
        self.scale = Some(scale);
        log::info!(
            "[Capture] Calibrated from {} references at {:.3} px/in",
            references.len(),
            scale.pixels_per_inch
        );
        Ok(scale)
    }

    /// Place or move the point of aim
    ///
    /// Shots are stored in pixel space, so moving the POA re-expresses every
    /// marked shot relative to the new origin.
    pub fn set_point_of_aim(&mut self, point: PixelPoint) -> Result<(), CalibrationError> {
        self.check_not_finished()?;
        if !point.is_finite() {
            return Err(CalibrationError::invalid("point of aim must be finite"));
        }
        self.point_of_aim = Some(point);
        Ok(())
    }

    /// Mark a shot hole, returning it converted to inches
    pub fn add_shot(&mut self, point: PixelPoint) -> Result<InchShot, CalibrationError> {
        self.check_not_finished()?;
        let (scale, poa) = self.transform_inputs()?;
        if !point.is_finite() {
            return Err(CalibrationError::invalid("shot position must be finite"));
        }

        let shot = PixelShot::new(point.x, point.y, self.next_sequence);
        self.next_sequence += 1;
        self.shots.push(shot);
        log::debug!(
            "[Capture] Marked shot #{} at ({:.1}, {:.1})",
            shot.sequence_number,
            shot.x,
            shot.y
        );
        Ok(to_inches(&shot, &poa, &scale))
    }

    /// Remove the shot with the given sequence number
    ///
    /// Returns `None` if no such shot exists. Remaining shots keep their numbers.
    pub fn remove_shot(&mut self, sequence_number: u32) -> Result<Option<PixelShot>, CalibrationError> {
        self.check_not_finished()?;
        let removed = self
            .shots
            .iter()
            .position(|shot| shot.sequence_number == sequence_number)
            .map(|index| self.shots.remove(index));
        Ok(removed)
    }

    /// Remove the most recently marked shot
    pub fn undo_last_shot(&mut self) -> Result<Option<PixelShot>, CalibrationError> {
        self.check_not_finished()?;
        Ok(self.shots.pop())
    }

    /// Remove every shot and restart numbering at 1
    ///
    /// Calibration becomes editable again.
    pub fn clear_shots(&mut self) -> Result<(), CalibrationError> {
        self.check_not_finished()?;
        self.shots.clear();
        self.next_sequence = 1;
        Ok(())
    }

    /// Current shots in inches relative to the point of aim, in entry order
    pub fn inch_shots(&self) -> Result<Vec<InchShot>, CalibrationError> {
        let (scale, poa) = self.transform_inputs()?;
        Ok(self
            .shots
            .iter()
            .map(|shot| to_inches(shot, &poa, &scale))
            .collect())
    }

    /// Live group metrics for the shots marked so far
    pub fn metrics(&self, distance_yards: f64) -> Result<GroupMetrics, CaptureError> {
        let shots = self.inch_shots()?;
        Ok(compute_metrics(&shots, distance_yards)?)
    }

    /// Complete the capture
    ///
    /// A failed finish leaves the session editable so the user can add shots
    /// or correct the distance.
    ///
    /// # Errors
    /// - `NotCalibrated` / `PointOfAimMissing` if the transform is incomplete
    /// - `InsufficientShots` when no shot is marked
    /// - `InvalidDistance` when the distance is not a finite value > 0
    /// - `CaptureFinished` when called twice
    pub fn finish(&mut self, distance_yards: f64) -> Result<CapturedTarget, CaptureError> {
        self.check_not_finished()?;
        let (scale, point_of_aim) = self.transform_inputs()?;
        let shots = self.inch_shots()?;
        let metrics = compute_metrics(&shots, distance_yards).inspect_err(|err| {
            log_metrics_error(err, "finish_capture");
        })?;

        self.finished = true;
        log::info!(
            "[Capture] Finished: {} shots, ES {:.3}\", {:.2} MOA at {} yd",
            metrics.shot_count,
            metrics.extreme_spread,
            metrics.group_size_moa,
            distance_yards
        );

        Ok(CapturedTarget {
            calibration_mode: self.mode,
            distance_yards,
            scale,
            point_of_aim,
            shots,
            metrics,
        })
    }

    // ========================================================================
    // HELPER METHODS - Workflow guards
    // ========================================================================

    fn check_not_finished(&self) -> Result<(), CalibrationError> {
        if self.finished {
            return Err(CalibrationError::CaptureFinished);
        }
        Ok(())
    }

    fn check_calibration_editable(&self) -> Result<(), CalibrationError> {
        self.check_not_finished()?;
        if !self.shots.is_empty() {
            let err = CalibrationError::invalid(format!(
                "calibration is locked while {} shot(s) are marked",
                self.shots.len()
            ));
            log_calibration_error(&err, "calibrate");
            return Err(err);
        }
        Ok(())
    }

    fn transform_inputs(&self) -> Result<(ScaleFactor, PixelPoint), CalibrationError> {
        let scale = self.scale.ok_or(CalibrationError::NotCalibrated)?;
        let poa = self.point_of_aim.ok_or(CalibrationError::PointOfAimMissing)?;
        Ok((scale, poa))
    }
}
