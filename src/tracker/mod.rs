//! Temporal smoothing of per-frame quadrilateral detections.
//!
//! The tracker consumes at most one detection per frame together with an
//! optional gyro sample and emits a smoothed quadrilateral, a confidence and a
//! mode label. Center, rotation and the two scales are filtered independently.
//! Missing or weak detections are bridged by prediction for a bounded number
//! of frames, after which all state is dropped and the next detection starts
//! over.
//!
//! ```text
//! Uninitialized -> Initial -> Tracking <-> Predicted -> Lost -> Uninitialized
//! ```

mod gyro;
mod kalman;
mod transform;

pub use gyro::{AccumulatedRotation, GyroIntegrator, GyroSample};
pub use kalman::{CenterFilter, FilterNoise, RotationFilter, ScaleFilter};
pub use transform::{max_corner_error, Point2, Quad, Transform};

use crate::trace::{trace_debug, trace_event};
use crate::util::math::wrap_angle;
use crate::util::{LshTrackError, LshTrackResult};
use std::fmt;

/// Confidence reported on the first detection.
pub const INITIAL_CONFIDENCE: f32 = 0.8;

/// Confidence reported while bridging missing detections.
pub const PREDICTED_CONFIDENCE: f32 = 0.3;

/// Upper bound of the tracking confidence.
const MAX_TRACKING_CONFIDENCE: f32 = 0.95;

/// Match count at which measurement noise equals its configured baseline.
const MATCH_NOISE_REFERENCE: f32 = 20.0;

/// Configuration for [`TemporalTracker`].
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Detections with fewer matches are treated as missing.
    pub min_matches_for_update: usize,
    /// Consecutive missing frames bridged by prediction before reset.
    pub max_frames_without_detection: usize,
    /// Integrate gyro samples into the rotation estimate.
    pub use_gyro: bool,
    /// Weight applied to the integrated z rotation.
    pub gyro_weight: f32,
    /// Noise for the center filter (pixels squared).
    pub center_noise: FilterNoise,
    /// Noise for the rotation filter (radians squared).
    pub rotation_noise: FilterNoise,
    /// Noise for the two scale filters (pixels squared).
    pub scale_noise: FilterNoise,
    /// Largest relative scale change accepted per update.
    pub max_scale_change: f32,
    /// Frame interval used by [`TemporalTracker::update`], in seconds.
    pub frame_dt: f32,
    /// Longest gyro interval integrated at once, in seconds.
    pub max_gyro_dt: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_matches_for_update: 8,
            max_frames_without_detection: 12,
            use_gyro: true,
            gyro_weight: 1.0,
            center_noise: FilterNoise::new(2.0, 4.0),
            rotation_noise: FilterNoise::new(0.01, 0.02),
            scale_noise: FilterNoise::new(1.0, 6.0),
            max_scale_change: 0.15,
            frame_dt: 1.0 / 30.0,
            max_gyro_dt: 0.2,
        }
    }
}

impl TrackerConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> LshTrackResult<()> {
        for noise in [self.center_noise, self.rotation_noise, self.scale_noise] {
            if !(noise.process > 0.0 && noise.process.is_finite()) {
                return Err(LshTrackError::InvalidInput(
                    "process noise must be positive and finite",
                ));
            }
            if !(noise.measurement > 0.0 && noise.measurement.is_finite()) {
                return Err(LshTrackError::InvalidInput(
                    "measurement noise must be positive and finite",
                ));
            }
        }
        if !(self.max_scale_change >= 0.0 && self.max_scale_change.is_finite()) {
            return Err(LshTrackError::InvalidInput(
                "max_scale_change must be non-negative",
            ));
        }
        if !(self.frame_dt > 0.0 && self.frame_dt.is_finite()) {
            return Err(LshTrackError::InvalidInput("frame_dt must be positive"));
        }
        if !(self.max_gyro_dt > 0.0) {
            return Err(LshTrackError::InvalidInput("max_gyro_dt must be positive"));
        }
        if !self.gyro_weight.is_finite() {
            return Err(LshTrackError::InvalidInput("gyro_weight must be finite"));
        }
        Ok(())
    }
}

/// Label attached to every tracker output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackingMode {
    /// First detection after (re)initialization.
    Initial,
    /// Filtered detection.
    Tracking,
    /// Extrapolated while detections are missing.
    Predicted,
    /// No estimate; state was cleared or never created.
    Lost,
}

impl TrackingMode {
    /// Lowercase name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingMode::Initial => "initial",
            TrackingMode::Tracking => "tracking",
            TrackingMode::Predicted => "predicted",
            TrackingMode::Lost => "lost",
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one tracker step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerOutput {
    /// Smoothed corners, or the last known corners when lost.
    pub corners: Option<Quad>,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// State the tracker was in when producing this output.
    pub mode: TrackingMode,
    /// Transform behind `corners`; `None` when lost.
    pub transform: Option<Transform>,
}

struct TrackerState {
    transform: Transform,
    center: CenterFilter,
    rotation: RotationFilter,
    scale_x: ScaleFilter,
    scale_y: ScaleFilter,
}

impl TrackerState {
    fn seed(measured: Transform, cfg: &TrackerConfig) -> Self {
        Self {
            transform: measured,
            center: CenterFilter::new(measured.center_x, measured.center_y, cfg.center_noise),
            rotation: RotationFilter::new(measured.rotation, cfg.rotation_noise),
            scale_x: ScaleFilter::new(measured.scale_x, cfg.scale_noise),
            scale_y: ScaleFilter::new(measured.scale_y, cfg.scale_noise),
        }
    }

    fn filtered(&self) -> Transform {
        let (center_x, center_y) = self.center.position();
        Transform {
            center_x,
            center_y,
            scale_x: self.scale_x.value(),
            scale_y: self.scale_y.value(),
            rotation: self.rotation.angle(),
        }
    }
}

/// Limits a scale measurement to `previous * (1 ± max_change)`.
///
/// A zero or non-finite previous scale disables the clamp.
pub fn clamp_scale(measured: f32, previous: f32, max_change: f32) -> f32 {
    if previous == 0.0 || !previous.is_finite() {
        return measured;
    }
    let lo = previous * (1.0 - max_change);
    let hi = previous * (1.0 + max_change);
    measured.clamp(lo.min(hi), lo.max(hi))
}

/// Kalman-smoothed quadrilateral tracker with gyro-assisted rotation.
pub struct TemporalTracker {
    cfg: TrackerConfig,
    state: Option<TrackerState>,
    frames_without_detection: usize,
    gyro: GyroIntegrator,
    last_update_s: Option<f64>,
    last_corners: Option<Quad>,
}

impl Default for TemporalTracker {
    fn default() -> Self {
        Self::with_config(TrackerConfig::default())
    }
}

impl TemporalTracker {
    /// Creates a tracker with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker without validating `cfg`.
    pub fn with_config(cfg: TrackerConfig) -> Self {
        let gyro = GyroIntegrator::new(cfg.max_gyro_dt);
        Self {
            cfg,
            state: None,
            frames_without_detection: 0,
            gyro,
            last_update_s: None,
            last_corners: None,
        }
    }

    /// Creates a tracker after validating `cfg`.
    pub fn try_with_config(cfg: TrackerConfig) -> LshTrackResult<Self> {
        cfg.validate()?;
        Ok(Self::with_config(cfg))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    /// Returns true once a detection has seeded the filters.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Returns the number of consecutive frames without a usable detection.
    pub fn frames_without_detection(&self) -> usize {
        self.frames_without_detection
    }

    /// Returns the most recent transform estimate.
    pub fn transform(&self) -> Option<Transform> {
        self.state.as_ref().map(|state| state.transform)
    }

    /// Returns gyro rotation integrated since it was last consumed.
    pub fn accumulated_rotation(&self) -> AccumulatedRotation {
        self.gyro.accumulated()
    }

    /// Drops all filter state, the loss counter and the gyro accumulator.
    pub fn reset(&mut self) {
        self.state = None;
        self.frames_without_detection = 0;
        self.gyro.reset();
        self.last_update_s = None;
        self.last_corners = None;
    }

    /// Advances one frame at the configured frame interval.
    pub fn update(
        &mut self,
        corners: Option<&Quad>,
        match_count: usize,
        gyro: Option<GyroSample>,
    ) -> TrackerOutput {
        let timestamp_s = self
            .last_update_s
            .map_or(0.0, |t| t + self.cfg.frame_dt as f64);
        self.update_at(timestamp_s, corners, match_count, gyro)
    }

    /// Advances one frame stamped at `timestamp_s` seconds.
    ///
    /// The filter step is the time since the previous frame; the configured
    /// frame interval is used for the first frame and for non-increasing
    /// timestamps.
    pub fn update_at(
        &mut self,
        timestamp_s: f64,
        corners: Option<&Quad>,
        match_count: usize,
        gyro: Option<GyroSample>,
    ) -> TrackerOutput {
        if self.cfg.use_gyro {
            if let Some(sample) = gyro {
                self.gyro.integrate(sample);
            }
        }

        let dt = self.step_dt(timestamp_s);
        if timestamp_s.is_finite() {
            self.last_update_s = Some(timestamp_s);
        }

        let detection = corners.filter(|_| match_count >= self.cfg.min_matches_for_update);
        let out = match detection {
            Some(corners) => self.on_detection(corners, match_count, dt),
            None => self.on_missing(dt),
        };
        if out.mode != TrackingMode::Lost {
            self.last_corners = out.corners;
        }

        trace_debug!(
            "tracker_update",
            mode = out.mode.as_str(),
            confidence = out.confidence,
            frames_without_detection = self.frames_without_detection
        );
        out
    }

    fn step_dt(&self, timestamp_s: f64) -> f32 {
        match self.last_update_s {
            Some(last) if timestamp_s.is_finite() && timestamp_s > last => {
                (timestamp_s - last) as f32
            }
            _ => self.cfg.frame_dt,
        }
    }

    fn on_missing(&mut self, dt: f32) -> TrackerOutput {
        self.frames_without_detection += 1;
        if self.frames_without_detection <= self.cfg.max_frames_without_detection {
            if let Some(state) = self.state.as_mut() {
                state.center.predict(dt);
                state.rotation.predict(dt);
                state.scale_x.predict();
                state.scale_y.predict();
                let acc = self.gyro.consume();
                state.rotation.offset(-acc.z * self.cfg.gyro_weight);

                let transform = state.filtered();
                state.transform = transform;
                return TrackerOutput {
                    corners: Some(transform.to_corners()),
                    confidence: PREDICTED_CONFIDENCE,
                    mode: TrackingMode::Predicted,
                    transform: Some(transform),
                };
            }
        }

        let corners = self.last_corners;
        if self.state.is_some() {
            trace_event!(
                "tracker_reset",
                frames_without_detection = self.frames_without_detection
            );
        }
        let last_update_s = self.last_update_s;
        self.reset();
        self.last_update_s = last_update_s;
        TrackerOutput {
            corners,
            confidence: 0.0,
            mode: TrackingMode::Lost,
            transform: None,
        }
    }

    fn on_detection(&mut self, corners: &Quad, match_count: usize, dt: f32) -> TrackerOutput {
        self.frames_without_detection = 0;
        let measured = Transform::from_corners(corners);
        let acc = self.gyro.consume();

        let Some(state) = self.state.as_mut() else {
            self.state = Some(TrackerState::seed(measured, &self.cfg));
            return TrackerOutput {
                corners: Some(*corners),
                confidence: INITIAL_CONFIDENCE,
                mode: TrackingMode::Initial,
                transform: Some(measured),
            };
        };

        let noise_scale = MATCH_NOISE_REFERENCE / match_count.max(1) as f32;
        state
            .center
            .set_measurement_noise(self.cfg.center_noise.measurement * noise_scale);
        state
            .rotation
            .set_measurement_noise(self.cfg.rotation_noise.measurement * noise_scale);
        let scale_r = self.cfg.scale_noise.measurement * noise_scale;
        state.scale_x.set_measurement_noise(scale_r);
        state.scale_y.set_measurement_noise(scale_r);

        let rotation = wrap_angle(measured.rotation - acc.z * self.cfg.gyro_weight);
        let scale_x = clamp_scale(
            measured.scale_x,
            state.scale_x.value(),
            self.cfg.max_scale_change,
        );
        let scale_y = clamp_scale(
            measured.scale_y,
            state.scale_y.value(),
            self.cfg.max_scale_change,
        );

        state
            .center
            .update(measured.center_x, measured.center_y, dt);
        state.rotation.update(rotation, dt);
        state.scale_x.update(scale_x);
        state.scale_y.update(scale_y);

        let transform = state.filtered();
        state.transform = transform;
        let confidence = (0.5 + match_count as f32 / 40.0).min(MAX_TRACKING_CONFIDENCE);
        TrackerOutput {
            corners: Some(transform.to_corners()),
            confidence,
            mode: TrackingMode::Tracking,
            transform: Some(transform),
        }
    }
}
