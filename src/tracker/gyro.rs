//! Integration of angular-rate samples between tracker frames.

/// Angular velocity about three axes in rad/s, stamped in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GyroSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp_s: f64,
}

impl GyroSample {
    /// Creates a sample.
    pub const fn new(x: f32, y: f32, z: f32, timestamp_s: f64) -> Self {
        Self { x, y, z, timestamp_s }
    }
}

/// Rotation accumulated per axis, in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccumulatedRotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Integrates gyro samples until the accumulated rotation is consumed.
///
/// Samples can arrive at any cadence. The interval is measured from the
/// previous sample, so irregular spacing is handled; the first sample after
/// construction or reset only starts the clock.
#[derive(Clone, Debug)]
pub struct GyroIntegrator {
    accumulated: AccumulatedRotation,
    last_timestamp_s: Option<f64>,
    max_dt_s: f64,
}

impl GyroIntegrator {
    /// Creates an integrator that caps any single interval at `max_dt_s`.
    pub fn new(max_dt_s: f64) -> Self {
        Self {
            accumulated: AccumulatedRotation::default(),
            last_timestamp_s: None,
            max_dt_s,
        }
    }

    /// Adds `rate * dt` for the interval since the previous sample.
    ///
    /// Out-of-order or non-finite timestamps contribute nothing but still
    /// advance the clock when finite.
    pub fn integrate(&mut self, sample: GyroSample) {
        if !sample.timestamp_s.is_finite() {
            return;
        }
        if let Some(last) = self.last_timestamp_s {
            let dt = sample.timestamp_s - last;
            if dt > 0.0 {
                let dt = dt.min(self.max_dt_s) as f32;
                if sample.x.is_finite() && sample.y.is_finite() && sample.z.is_finite() {
                    self.accumulated.x += sample.x * dt;
                    self.accumulated.y += sample.y * dt;
                    self.accumulated.z += sample.z * dt;
                }
            }
        }
        self.last_timestamp_s = Some(sample.timestamp_s);
    }

    /// Returns the rotation accumulated since the last consumption.
    pub fn accumulated(&self) -> AccumulatedRotation {
        self.accumulated
    }

    /// Returns the accumulated rotation and zeroes it; the clock is kept.
    pub fn consume(&mut self) -> AccumulatedRotation {
        std::mem::take(&mut self.accumulated)
    }

    /// Clears the accumulator and the clock.
    pub fn reset(&mut self) {
        self.accumulated = AccumulatedRotation::default();
        self.last_timestamp_s = None;
    }
}
