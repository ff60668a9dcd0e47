//! Scalar Kalman filters with diagonal covariance.
//!
//! Center, rotation and scale are filtered independently; there are no
//! cross-axis covariance terms. Each gain is the scalar `P / (P + R)`.

use crate::util::math::{shortest_arc, wrap_angle};

/// Smallest time step accepted by the filters, in seconds.
const MIN_DT: f32 = 1e-4;

/// Velocity variance grows by this fraction of the position process noise.
const VELOCITY_NOISE_FRACTION: f32 = 0.1;

/// Process and measurement noise for one filter group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterNoise {
    /// Variance added per predict step.
    pub process: f32,
    /// Baseline measurement variance.
    pub measurement: f32,
}

impl FilterNoise {
    /// Creates a noise pair.
    pub const fn new(process: f32, measurement: f32) -> Self {
        Self {
            process,
            measurement,
        }
    }
}

fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() {
        dt.max(MIN_DT)
    } else {
        MIN_DT
    }
}

#[inline]
fn gain(p: f32, r: f32) -> f32 {
    let s = p + r;
    if s > f32::EPSILON {
        p / s
    } else {
        0.0
    }
}

/// 2D position with constant-velocity prediction, one scalar filter per axis.
#[derive(Clone, Debug)]
pub struct CenterFilter {
    pos: [f32; 2],
    vel: [f32; 2],
    pos_var: [f32; 2],
    vel_var: [f32; 2],
    noise: FilterNoise,
    measurement_noise: f32,
}

impl CenterFilter {
    /// Seeds the filter at a measured position with zero velocity.
    pub fn new(x: f32, y: f32, noise: FilterNoise) -> Self {
        Self {
            pos: [x, y],
            vel: [0.0; 2],
            pos_var: [noise.measurement; 2],
            vel_var: [noise.measurement; 2],
            noise,
            measurement_noise: noise.measurement,
        }
    }

    /// Overrides the measurement variance for the next updates.
    pub fn set_measurement_noise(&mut self, r: f32) {
        self.measurement_noise = r;
    }

    /// Advances position by velocity and inflates the variances.
    pub fn predict(&mut self, dt: f32) {
        let dt = sanitize_dt(dt);
        for axis in 0..2 {
            self.pos[axis] += self.vel[axis] * dt;
            self.pos_var[axis] += self.noise.process;
            self.vel_var[axis] += self.noise.process * VELOCITY_NOISE_FRACTION;
        }
    }

    /// Predicts, blends in the measurement and re-derives velocity from the
    /// per-step displacement.
    pub fn update(&mut self, mx: f32, my: f32, dt: f32) {
        let dt = sanitize_dt(dt);
        let before = self.pos;
        self.predict(dt);
        let r = self.measurement_noise;
        for (axis, measured) in [mx, my].into_iter().enumerate() {
            let k = gain(self.pos_var[axis], r);
            self.pos[axis] += k * (measured - self.pos[axis]);
            self.pos_var[axis] *= 1.0 - k;
            self.vel[axis] = (self.pos[axis] - before[axis]) / dt;
        }
    }

    /// Returns the filtered position.
    pub fn position(&self) -> (f32, f32) {
        (self.pos[0], self.pos[1])
    }

    /// Returns the estimated velocity in units per second.
    pub fn velocity(&self) -> (f32, f32) {
        (self.vel[0], self.vel[1])
    }

    /// Returns the position variances.
    pub fn variance(&self) -> (f32, f32) {
        (self.pos_var[0], self.pos_var[1])
    }
}

/// Angle with angular-velocity prediction; every sum wraps to (-pi, pi].
#[derive(Clone, Debug)]
pub struct RotationFilter {
    angle: f32,
    rate: f32,
    angle_var: f32,
    rate_var: f32,
    noise: FilterNoise,
    measurement_noise: f32,
}

impl RotationFilter {
    /// Seeds the filter at a measured angle with zero angular velocity.
    pub fn new(angle: f32, noise: FilterNoise) -> Self {
        Self {
            angle: wrap_angle(angle),
            rate: 0.0,
            angle_var: noise.measurement,
            rate_var: noise.measurement,
            noise,
            measurement_noise: noise.measurement,
        }
    }

    /// Overrides the measurement variance for the next updates.
    pub fn set_measurement_noise(&mut self, r: f32) {
        self.measurement_noise = r;
    }

    /// Advances the angle by the angular velocity.
    pub fn predict(&mut self, dt: f32) {
        let dt = sanitize_dt(dt);
        self.angle = wrap_angle(self.angle + self.rate * dt);
        self.angle_var += self.noise.process;
        self.rate_var += self.noise.process * VELOCITY_NOISE_FRACTION;
    }

    /// Predicts and blends in the measurement along the shortest arc.
    pub fn update(&mut self, measured: f32, dt: f32) {
        let dt = sanitize_dt(dt);
        let before = self.angle;
        self.predict(dt);
        let innovation = shortest_arc(self.angle, measured);
        let k = gain(self.angle_var, self.measurement_noise);
        self.angle = wrap_angle(self.angle + k * innovation);
        self.angle_var *= 1.0 - k;
        self.rate = shortest_arc(before, self.angle) / dt;
    }

    /// Applies an external correction, such as integrated gyro rotation.
    pub fn offset(&mut self, delta: f32) {
        self.angle = wrap_angle(self.angle + delta);
    }

    /// Returns the filtered angle.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Returns the estimated angular velocity in radians per second.
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

/// Single-state scale filter without a velocity term.
#[derive(Clone, Debug)]
pub struct ScaleFilter {
    value: f32,
    var: f32,
    noise: FilterNoise,
    measurement_noise: f32,
}

impl ScaleFilter {
    /// Seeds the filter at a measured scale.
    pub fn new(value: f32, noise: FilterNoise) -> Self {
        Self {
            value,
            var: noise.measurement,
            noise,
            measurement_noise: noise.measurement,
        }
    }

    /// Overrides the measurement variance for the next updates.
    pub fn set_measurement_noise(&mut self, r: f32) {
        self.measurement_noise = r;
    }

    /// Inflates the variance; the value is held.
    pub fn predict(&mut self) {
        self.var += self.noise.process;
    }

    /// Predicts and blends in the measurement.
    pub fn update(&mut self, measured: f32) {
        self.predict();
        let k = gain(self.var, self.measurement_noise);
        self.value += k * (measured - self.value);
        self.var *= 1.0 - k;
    }

    /// Returns the filtered scale.
    pub fn value(&self) -> f32 {
        self.value
    }
}
