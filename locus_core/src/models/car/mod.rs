// locus_core/src/models/car/mod.rs

//! Lateral vehicle dynamics: a linear single-track ("bicycle") model whose
//! tire stiffness, steer ratio and steering offsets are estimated online.
//!
//! The state is purely Euclidean, so the error state coincides with the state
//! and the default [`ErrorStateMap`] applies.

use nalgebra::{DMatrix, DVector};

use crate::error::EkfResult;
use crate::models::layout::StateBlock;
use crate::models::{
    ErrorStateMap, FilterModel, MeasurementModel, ObservationKind, ProcessModel, GRAVITY,
};
use crate::types::{Covariance, Jacobian, Observation, State};
use crate::utils::jacobian::selection_jacobian;

pub mod params;

pub use params::CarParams;

// --- State indices ---
pub const STIFFNESS: usize = 0;
pub const STEER_RATIO: usize = 1;
pub const ANGLE_OFFSET: usize = 2;
pub const ANGLE_OFFSET_FAST: usize = 3;
pub const VELOCITY_U: usize = 4;
pub const VELOCITY_V: usize = 5;
pub const YAW_RATE: usize = 6;
pub const STEER_ANGLE: usize = 7;
pub const ROAD_ROLL: usize = 8;

pub const CAR_STATE_DIM: usize = 9;

/// Longitudinal speed used by the dynamics is never below this [m/s]. The
/// single-track model divides by `u` and is meaningless near standstill.
pub const MIN_SPEED: f64 = 5.0;
/// Steer ratio used by the dynamics is never below this.
pub const MIN_STEER_RATIO: f64 = 1.0;

static CAR_LAYOUT: [StateBlock; 8] = [
    StateBlock::euclidean("stiffness", STIFFNESS, 1),
    StateBlock::euclidean("steer_ratio", STEER_RATIO, 1),
    StateBlock::euclidean("angle_offset", ANGLE_OFFSET, 1),
    StateBlock::euclidean("angle_offset_fast", ANGLE_OFFSET_FAST, 1),
    StateBlock::euclidean("velocity", VELOCITY_U, 2),
    StateBlock::euclidean("yaw_rate", YAW_RATE, 1),
    StateBlock::euclidean("steer_angle", STEER_ANGLE, 1),
    StateBlock::euclidean("road_roll", ROAD_ROLL, 1),
];

observation_kinds! {
    /// Observations the car filter understands.
    pub enum CarObservation for "car" {
        /// Road-frame longitudinal and lateral speed `(u, v)`.
        RoadFrameXySpeed = 24 => 2,
        RoadFrameYawRate = 25 => 1,
        SteerAngle = 26 => 1,
        AngleOffsetFast = 27 => 1,
        /// Direct observation of the stiffness factor.
        Stiffness = 28 => 1,
        SteerRatio = 29 => 1,
        RoadFrameXSpeed = 30 => 1,
        RoadRoll = 31 => 1,
    }
}

impl CarObservation {
    /// The state entries this kind reads directly.
    fn state_indices(self) -> &'static [usize] {
        match self {
            CarObservation::RoadFrameXySpeed => &[VELOCITY_U, VELOCITY_V],
            CarObservation::RoadFrameYawRate => &[YAW_RATE],
            CarObservation::SteerAngle => &[STEER_ANGLE],
            CarObservation::AngleOffsetFast => &[ANGLE_OFFSET_FAST],
            CarObservation::Stiffness => &[STIFFNESS],
            CarObservation::SteerRatio => &[STEER_RATIO],
            CarObservation::RoadFrameXSpeed => &[VELOCITY_U],
            CarObservation::RoadRoll => &[ROAD_ROLL],
        }
    }
}

/// Single-track lateral dynamics with online parameter estimation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarModel {
    params: CarParams,
}

/// Quantities shared by `f` and `F`, evaluated once per call.
struct LateralTerms {
    c_f: f64,
    c_r: f64,
    u: f64,
    steer_ratio: f64,
    slip_input: f64,
    u_floored: bool,
    steer_ratio_floored: bool,
}

impl CarModel {
    /// Fails with [`crate::error::EkfError::InvalidParameter`] unless `params` passes
    /// [`CarParams::validate`].
    pub fn new(params: CarParams) -> EkfResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &CarParams {
        &self.params
    }

    /// Only for callers that go through the validating [`CarParams`] setters.
    pub(crate) fn params_mut(&mut self) -> &mut CarParams {
        &mut self.params
    }

    fn lateral_terms(&self, x: &State) -> LateralTerms {
        let sf = x[STIFFNESS];
        let u_raw = x[VELOCITY_U];
        let sr_raw = x[STEER_RATIO];
        LateralTerms {
            c_f: sf * self.params.stiffness_front,
            c_r: sf * self.params.stiffness_rear,
            u: u_raw.max(MIN_SPEED),
            steer_ratio: sr_raw.max(MIN_STEER_RATIO),
            slip_input: x[STEER_ANGLE] - x[ANGLE_OFFSET] - x[ANGLE_OFFSET_FAST],
            u_floored: u_raw <= MIN_SPEED,
            steer_ratio_floored: sr_raw <= MIN_STEER_RATIO,
        }
    }

    /// `(v̇, ṙ)` of the single-track model.
    fn lateral_derivatives(&self, x: &State) -> (f64, f64) {
        let p = &self.params;
        let t = self.lateral_terms(x);
        let (m, j, a_f, a_r) = (p.mass, p.rotational_inertia, p.center_to_front, p.center_to_rear);
        let v = x[VELOCITY_V];
        let r = x[YAW_RATE];

        let moment = t.c_f * a_f - t.c_r * a_r;
        let moment2 = t.c_f * a_f * a_f + t.c_r * a_r * a_r;

        let v_dot = -(t.c_f + t.c_r) / (m * t.u) * v
            + (-moment / (m * t.u) - t.u) * r
            + t.c_f / (m * t.steer_ratio) * t.slip_input
            - GRAVITY * x[ROAD_ROLL];
        let r_dot = -moment / (j * t.u) * v - moment2 / (j * t.u) * r
            + t.c_f * a_f / (j * t.steer_ratio) * t.slip_input;

        (v_dot, r_dot)
    }

    /// `∂(v̇, ṙ)/∂x`, a `2 x 9` matrix.
    fn lateral_jacobian(&self, x: &State) -> DMatrix<f64> {
        let p = &self.params;
        let t = self.lateral_terms(x);
        let (m, j, a_f, a_r) = (p.mass, p.rotational_inertia, p.center_to_front, p.center_to_rear);
        let (c_f0, c_r0) = (p.stiffness_front, p.stiffness_rear);
        let v = x[VELOCITY_V];
        let r = x[YAW_RATE];
        let u = t.u;
        let sr = t.steer_ratio;
        let sa = t.slip_input;

        let moment = t.c_f * a_f - t.c_r * a_r;
        let moment2 = t.c_f * a_f * a_f + t.c_r * a_r * a_r;

        let mut a = DMatrix::zeros(2, CAR_STATE_DIM);

        // v̇
        a[(0, STIFFNESS)] = -(c_f0 + c_r0) / (m * u) * v - (c_f0 * a_f - c_r0 * a_r) / (m * u) * r
            + c_f0 / (m * sr) * sa;
        if !t.steer_ratio_floored {
            a[(0, STEER_RATIO)] = -t.c_f / (m * sr * sr) * sa;
        }
        a[(0, ANGLE_OFFSET)] = -t.c_f / (m * sr);
        a[(0, ANGLE_OFFSET_FAST)] = -t.c_f / (m * sr);
        if !t.u_floored {
            a[(0, VELOCITY_U)] = (t.c_f + t.c_r) / (m * u * u) * v + (moment / (m * u * u) - 1.0) * r;
        }
        a[(0, VELOCITY_V)] = -(t.c_f + t.c_r) / (m * u);
        a[(0, YAW_RATE)] = -moment / (m * u) - u;
        a[(0, STEER_ANGLE)] = t.c_f / (m * sr);
        a[(0, ROAD_ROLL)] = -GRAVITY;

        // ṙ
        a[(1, STIFFNESS)] = -(c_f0 * a_f - c_r0 * a_r) / (j * u) * v
            - (c_f0 * a_f * a_f + c_r0 * a_r * a_r) / (j * u) * r
            + c_f0 * a_f / (j * sr) * sa;
        if !t.steer_ratio_floored {
            a[(1, STEER_RATIO)] = -t.c_f * a_f / (j * sr * sr) * sa;
        }
        a[(1, ANGLE_OFFSET)] = -t.c_f * a_f / (j * sr);
        a[(1, ANGLE_OFFSET_FAST)] = -t.c_f * a_f / (j * sr);
        if !t.u_floored {
            a[(1, VELOCITY_U)] = moment / (j * u * u) * v + moment2 / (j * u * u) * r;
        }
        a[(1, VELOCITY_V)] = -moment / (j * u);
        a[(1, YAW_RATE)] = -moment2 / (j * u);
        a[(1, STEER_ANGLE)] = t.c_f * a_f / (j * sr);

        a
    }
}

impl ErrorStateMap for CarModel {
    const STATE_DIM: usize = CAR_STATE_DIM;
    const ERROR_DIM: usize = CAR_STATE_DIM;
}

impl ProcessModel for CarModel {
    fn transition(&self, x: &State, dt: f64) -> State {
        let (v_dot, r_dot) = self.lateral_derivatives(x);
        let mut next = x.clone();
        next[VELOCITY_V] += dt * v_dot;
        next[YAW_RATE] += dt * r_dot;
        next
    }

    fn transition_jacobian(&self, x: &State, dt: f64) -> Jacobian {
        let a = self.lateral_jacobian(x);
        let mut f = DMatrix::identity(CAR_STATE_DIM, CAR_STATE_DIM);
        for col in 0..CAR_STATE_DIM {
            f[(VELOCITY_V, col)] += dt * a[(0, col)];
            f[(YAW_RATE, col)] += dt * a[(1, col)];
        }
        f
    }
}

impl MeasurementModel for CarModel {
    type Kind = CarObservation;

    fn predict_measurement(
        &self,
        kind: CarObservation,
        x: &State,
        _extra: Option<&DVector<f64>>,
    ) -> Observation {
        DVector::from_iterator(kind.dim(), kind.state_indices().iter().map(|&i| x[i]))
    }

    fn measurement_jacobian(
        &self,
        kind: CarObservation,
        _x: &State,
        _extra: Option<&DVector<f64>>,
    ) -> Jacobian {
        selection_jacobian(kind.state_indices(), CAR_STATE_DIM)
    }
}

impl FilterModel for CarModel {
    const NAME: &'static str = "car";

    fn state_layout(&self) -> &'static [StateBlock] {
        &CAR_LAYOUT
    }

    fn initial_state(&self) -> State {
        DVector::from_column_slice(&[1.0, 15.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0])
    }

    fn initial_covariance(&self) -> Covariance {
        let deg = 1.0_f64.to_radians();
        DMatrix::from_diagonal(&DVector::from_column_slice(&[
            0.1_f64.powi(2),
            0.1_f64.powi(2),
            (0.1 * deg).powi(2),
            (0.1 * deg).powi(2),
            10.0_f64.powi(2),
            10.0_f64.powi(2),
            1.0,
            1.0,
            1.0,
        ]))
    }

    fn process_noise(&self) -> Covariance {
        let deg = 1.0_f64.to_radians();
        DMatrix::from_diagonal(&DVector::from_column_slice(&[
            (0.05 / 100.0_f64).powi(2),
            0.01_f64.powi(2),
            (0.02 * deg).powi(2),
            (0.25 * deg).powi(2),
            0.1_f64.powi(2),
            0.01_f64.powi(2),
            (0.1 * deg).powi(2),
            (0.1 * deg).powi(2),
            deg.powi(2),
        ]))
    }

    fn observation_noise(&self, kind: CarObservation) -> Covariance {
        let deg = 1.0_f64.to_radians();
        let sigma = match kind {
            CarObservation::RoadFrameXySpeed => 0.1,
            CarObservation::RoadFrameYawRate => 0.005,
            CarObservation::SteerAngle => 0.05 * deg,
            CarObservation::AngleOffsetFast => 10.0 * deg,
            CarObservation::Stiffness => 0.5,
            CarObservation::SteerRatio => 5.0,
            CarObservation::RoadFrameXSpeed => 0.1,
            CarObservation::RoadRoll => deg,
        };
        DMatrix::identity(kind.dim(), kind.dim()) * (sigma * sigma)
    }
}
