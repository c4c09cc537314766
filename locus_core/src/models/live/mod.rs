// locus_core/src/models/live/mod.rs

//! Device pose in ECEF: position, orientation, velocity and the inertial
//! sensor states with their biases.
//!
//! Orientation is stored as a unit quaternion `(w, x, y, z)` and perturbed with
//! a three-element rotation vector, so the error state is one element shorter
//! than the state. Every error index from 6 onward maps to state index + 1.

use nalgebra::{DMatrix, DVector, Quaternion, UnitQuaternion, Vector3};

use crate::models::layout::StateBlock;
use crate::models::{
    ErrorStateMap, FilterModel, MeasurementModel, ObservationKind, ProcessModel, GRAVITY,
};
use crate::types::{Covariance, ErrorState, Jacobian, Observation, State};
use crate::utils::jacobian::{error_state_jacobian, numerical_jacobian, selection_jacobian};

// --- State indices ---
pub const ECEF_POS: usize = 0;
pub const ECEF_ORIENTATION: usize = 3;
pub const ECEF_VELOCITY: usize = 7;
pub const ANGULAR_VELOCITY: usize = 10;
pub const GYRO_BIAS: usize = 13;
pub const ACCELERATION: usize = 16;
pub const ACC_BIAS: usize = 19;

pub const LIVE_STATE_DIM: usize = 22;
pub const LIVE_ERROR_DIM: usize = 21;

/// Offset of the rotation vector inside the error state.
const ERR_ORIENTATION: usize = 3;
/// First error index after the rotation vector; maps to state index + 1.
const ERR_TAIL: usize = 6;
const STATE_TAIL: usize = ECEF_VELOCITY;
const TAIL_LEN: usize = LIVE_STATE_DIM - STATE_TAIL;

/// Below this distance from the earth center [m] the position says nothing
/// about the gravity direction and the accelerometer model drops gravity.
const MIN_GRAVITY_RADIUS: f64 = 1.0;

/// Below this scalar part the relative rotation is within a hair of a half
/// turn, where `2·vec/w` blows up; the log map takes over there.
const MIN_RELATIVE_W: f64 = 1e-6;

static LIVE_LAYOUT: [StateBlock; 7] = [
    StateBlock::euclidean("ecef_pos", ECEF_POS, 3),
    StateBlock::shifted("ecef_orientation", ECEF_ORIENTATION, 4, ERR_ORIENTATION, 3),
    StateBlock::shifted("ecef_velocity", ECEF_VELOCITY, 3, 6, 3),
    StateBlock::shifted("angular_velocity", ANGULAR_VELOCITY, 3, 9, 3),
    StateBlock::shifted("gyro_bias", GYRO_BIAS, 3, 12, 3),
    StateBlock::shifted("acceleration", ACCELERATION, 3, 15, 3),
    StateBlock::shifted("acc_bias", ACC_BIAS, 3, 18, 3),
];

observation_kinds! {
    /// Observations the live pose filter understands.
    pub enum LiveObservation for "live" {
        /// Raw gyroscope: angular velocity plus bias.
        PhoneGyro = 4 => 3,
        /// Pseudo-observation of zero rotation while stationary.
        NoRot = 9 => 3,
        /// Raw accelerometer: acceleration plus bias plus gravity in the device frame.
        PhoneAccel = 10 => 3,
        EcefPos = 12 => 3,
        /// Velocity expressed in the device frame.
        CameraOdoTranslation = 13 => 3,
        CameraOdoRotation = 14 => 3,
        /// Orientation quaternion `(w, x, y, z)`.
        EcefOrientationFromGps = 32 => 4,
        /// Pseudo-observation of zero acceleration while stationary.
        NoAccel = 33 => 3,
        EcefVel = 35 => 3,
    }
}

fn vec3(x: &State, start: usize) -> Vector3<f64> {
    Vector3::new(x[start], x[start + 1], x[start + 2])
}

/// Reads the orientation; a degenerate (zero) quaternion reads as identity.
fn orientation(x: &State) -> UnitQuaternion<f64> {
    let q = Quaternion::new(
        x[ECEF_ORIENTATION],
        x[ECEF_ORIENTATION + 1],
        x[ECEF_ORIENTATION + 2],
        x[ECEF_ORIENTATION + 3],
    );
    UnitQuaternion::try_new(q, 1e-12).unwrap_or_else(UnitQuaternion::identity)
}

fn write_orientation(x: &mut State, q: &UnitQuaternion<f64>) {
    let q = q.quaternion();
    x[ECEF_ORIENTATION] = q.w;
    x[ECEF_ORIENTATION + 1] = q.i;
    x[ECEF_ORIENTATION + 2] = q.j;
    x[ECEF_ORIENTATION + 3] = q.k;
}

fn write_vec3(out: &mut DVector<f64>, start: usize, v: &Vector3<f64>) {
    out.rows_mut(start, 3).copy_from(v);
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveModel;

impl LiveModel {
    pub fn new() -> Self {
        Self
    }

    /// Gravity as the accelerometer sees it, expressed in the device frame.
    fn gravity_in_device(x: &State) -> Vector3<f64> {
        let pos = vec3(x, ECEF_POS);
        let radius = pos.norm();
        if radius < MIN_GRAVITY_RADIUS {
            return Vector3::zeros();
        }
        orientation(x).inverse_transform_vector(&(pos * (GRAVITY / radius)))
    }
}

impl ErrorStateMap for LiveModel {
    const STATE_DIM: usize = LIVE_STATE_DIM;
    const ERROR_DIM: usize = LIVE_ERROR_DIM;

    fn compose(&self, nominal: &State, delta: &ErrorState) -> State {
        let mut out = nominal.clone();

        let mut pos = out.rows_mut(ECEF_POS, 3);
        pos += delta.rows(0, 3);

        let half = vec3(delta, ERR_ORIENTATION) * 0.5;
        let dq = UnitQuaternion::new_normalize(Quaternion::new(1.0, half.x, half.y, half.z));
        write_orientation(&mut out, &(orientation(nominal) * dq));

        let mut tail = out.rows_mut(STATE_TAIL, TAIL_LEN);
        tail += delta.rows(ERR_TAIL, TAIL_LEN);
        out
    }

    fn difference(&self, nominal: &State, true_state: &State) -> ErrorState {
        let mut delta = DVector::zeros(LIVE_ERROR_DIM);

        delta
            .rows_mut(0, 3)
            .copy_from(&(true_state.rows(ECEF_POS, 3) - nominal.rows(ECEF_POS, 3)));

        let mut rel = (orientation(nominal).inverse() * orientation(true_state)).into_inner();
        if rel.w < 0.0 {
            rel = -rel;
        }
        let rotation = if rel.w > MIN_RELATIVE_W {
            rel.imag() * (2.0 / rel.w)
        } else {
            UnitQuaternion::new_unchecked(rel).scaled_axis()
        };
        write_vec3(&mut delta, ERR_ORIENTATION, &rotation);

        delta.rows_mut(ERR_TAIL, TAIL_LEN).copy_from(
            &(true_state.rows(STATE_TAIL, TAIL_LEN) - nominal.rows(STATE_TAIL, TAIL_LEN)),
        );
        delta
    }

    fn h_mod(&self, x: &State) -> Jacobian {
        let mut h = DMatrix::zeros(LIVE_STATE_DIM, LIVE_ERROR_DIM);
        h.view_mut((ECEF_POS, 0), (3, 3))
            .fill_with_identity();

        let q = orientation(x);
        let (w, i, j, k) = (q.w, q.i, q.j, q.k);
        #[rustfmt::skip]
        let block = nalgebra::Matrix4x3::new(
            -i, -j, -k,
             w, -k,  j,
             k,  w, -i,
            -j,  i,  w,
        ) * 0.5;
        h.view_mut((ECEF_ORIENTATION, ERR_ORIENTATION), (4, 3))
            .copy_from(&block);

        h.view_mut((STATE_TAIL, ERR_TAIL), (TAIL_LEN, TAIL_LEN))
            .fill_with_identity();
        h
    }
}

impl ProcessModel for LiveModel {
    fn transition(&self, x: &State, dt: f64) -> State {
        if dt == 0.0 {
            return x.clone();
        }
        let mut next = x.clone();
        let q = orientation(x);
        let vel = vec3(x, ECEF_VELOCITY);

        write_vec3(&mut next, ECEF_POS, &(vec3(x, ECEF_POS) + vel * dt));

        let omega = vec3(x, ANGULAR_VELOCITY);
        write_orientation(&mut next, &(q * UnitQuaternion::from_scaled_axis(omega * dt)));

        let acc_ecef = q.transform_vector(&vec3(x, ACCELERATION));
        write_vec3(&mut next, ECEF_VELOCITY, &(vel + acc_ecef * dt));

        next
    }

    fn transition_jacobian(&self, x: &State, dt: f64) -> Jacobian {
        if dt == 0.0 {
            return DMatrix::identity(LIVE_ERROR_DIM, LIVE_ERROR_DIM);
        }
        let propagated = self.transition(x, dt);
        error_state_jacobian(
            |delta| self.difference(&propagated, &self.transition(&self.compose(x, delta), dt)),
            LIVE_ERROR_DIM,
        )
    }
}

impl MeasurementModel for LiveModel {
    type Kind = LiveObservation;

    fn predict_measurement(
        &self,
        kind: LiveObservation,
        x: &State,
        _extra: Option<&DVector<f64>>,
    ) -> Observation {
        let z = match kind {
            LiveObservation::PhoneGyro => vec3(x, ANGULAR_VELOCITY) + vec3(x, GYRO_BIAS),
            LiveObservation::NoRot | LiveObservation::CameraOdoRotation => {
                vec3(x, ANGULAR_VELOCITY)
            }
            LiveObservation::PhoneAccel => {
                vec3(x, ACCELERATION) + vec3(x, ACC_BIAS) + Self::gravity_in_device(x)
            }
            LiveObservation::EcefPos => vec3(x, ECEF_POS),
            LiveObservation::CameraOdoTranslation => {
                orientation(x).inverse_transform_vector(&vec3(x, ECEF_VELOCITY))
            }
            LiveObservation::EcefOrientationFromGps => {
                return x.rows(ECEF_ORIENTATION, 4).into_owned();
            }
            LiveObservation::NoAccel => vec3(x, ACCELERATION),
            LiveObservation::EcefVel => vec3(x, ECEF_VELOCITY),
        };
        DVector::from_column_slice(z.as_slice())
    }

    fn measurement_jacobian(
        &self,
        kind: LiveObservation,
        x: &State,
        extra: Option<&DVector<f64>>,
    ) -> Jacobian {
        let block = |start: usize| [start, start + 1, start + 2];
        match kind {
            LiveObservation::PhoneGyro => {
                let mut h = selection_jacobian(&block(ANGULAR_VELOCITY), LIVE_STATE_DIM);
                h.view_mut((0, GYRO_BIAS), (3, 3)).fill_with_identity();
                h
            }
            LiveObservation::NoRot | LiveObservation::CameraOdoRotation => {
                selection_jacobian(&block(ANGULAR_VELOCITY), LIVE_STATE_DIM)
            }
            LiveObservation::EcefPos => selection_jacobian(&block(ECEF_POS), LIVE_STATE_DIM),
            LiveObservation::EcefOrientationFromGps => selection_jacobian(
                &[
                    ECEF_ORIENTATION,
                    ECEF_ORIENTATION + 1,
                    ECEF_ORIENTATION + 2,
                    ECEF_ORIENTATION + 3,
                ],
                LIVE_STATE_DIM,
            ),
            LiveObservation::NoAccel => selection_jacobian(&block(ACCELERATION), LIVE_STATE_DIM),
            LiveObservation::EcefVel => selection_jacobian(&block(ECEF_VELOCITY), LIVE_STATE_DIM),
            // Rotated quantities: differentiate the observation function itself.
            LiveObservation::PhoneAccel | LiveObservation::CameraOdoTranslation => {
                numerical_jacobian(|s| self.predict_measurement(kind, s, extra), x)
            }
        }
    }
}

impl FilterModel for LiveModel {
    const NAME: &'static str = "live";

    fn state_layout(&self) -> &'static [StateBlock] {
        &LIVE_LAYOUT
    }

    fn initial_state(&self) -> State {
        let mut x = DVector::zeros(LIVE_STATE_DIM);
        write_vec3(&mut x, ECEF_POS, &Vector3::new(-2.7e6, 4.2e6, 3.8e6));
        write_orientation(&mut x, &UnitQuaternion::identity());
        x
    }

    fn initial_covariance(&self) -> Covariance {
        error_diagonal([10.0, 0.01, 10.0, 1.0, 1.0, 100.0, 0.01])
    }

    fn process_noise(&self) -> Covariance {
        error_diagonal([0.03, 0.001, 0.01, 0.1, 0.005 / 100.0, 3.0, 0.005])
    }

    fn observation_noise(&self, kind: LiveObservation) -> Covariance {
        let sigma = match kind {
            LiveObservation::PhoneGyro => 0.025,
            LiveObservation::NoRot => 0.005,
            LiveObservation::PhoneAccel => 0.5,
            LiveObservation::EcefPos => 5.0,
            LiveObservation::CameraOdoTranslation => 0.3,
            LiveObservation::CameraOdoRotation => 0.05,
            LiveObservation::EcefOrientationFromGps => 0.2,
            LiveObservation::NoAccel => 0.05,
            LiveObservation::EcefVel => 0.5,
        };
        DMatrix::identity(kind.dim(), kind.dim()) * (sigma * sigma)
    }
}

/// A diagonal error-state covariance from one standard deviation per 3-element
/// error block, in layout order.
fn error_diagonal(block_std: [f64; 7]) -> Covariance {
    let diag = DVector::from_iterator(
        LIVE_ERROR_DIM,
        block_std.iter().flat_map(|s| std::iter::repeat(s * s).take(3)),
    );
    DMatrix::from_diagonal(&diag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EkfError;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    fn moving_state() -> State {
        let model = LiveModel::new();
        let mut x = model.initial_state();
        write_orientation(
            &mut x,
            &UnitQuaternion::from_euler_angles(0.1, -0.2, 0.7),
        );
        write_vec3(&mut x, ECEF_VELOCITY, &Vector3::new(3.0, -1.0, 0.5));
        write_vec3(&mut x, ANGULAR_VELOCITY, &Vector3::new(0.02, 0.01, 0.3));
        write_vec3(&mut x, GYRO_BIAS, &Vector3::new(0.001, -0.002, 0.0005));
        write_vec3(&mut x, ACCELERATION, &Vector3::new(0.4, 0.1, -0.2));
        x
    }

    #[test]
    fn compose_then_difference_recovers_the_perturbation() {
        let model = LiveModel::new();
        let x = moving_state();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let normal = Normal::new(0.0, 0.1).unwrap();

        for _ in 0..50 {
            let delta = DVector::from_fn(LIVE_ERROR_DIM, |_, _| normal.sample(&mut rng));
            let back = model.difference(&x, &model.compose(&x, &delta));
            assert_abs_diff_eq!((back - &delta).amax(), 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn difference_stays_finite_at_a_half_turn() {
        let model = LiveModel::new();
        let x = moving_state();
        let mut flipped = x.clone();
        let half_turn = orientation(&x) * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI);
        write_orientation(&mut flipped, &half_turn);

        let delta = model.difference(&x, &flipped);
        assert!(delta.iter().all(|v| v.is_finite()));
        let rotation = vec3(&delta, ERR_ORIENTATION);
        assert_relative_eq!(rotation.norm(), PI, epsilon = 1e-9);
        assert_abs_diff_eq!(rotation.z.abs(), PI, epsilon = 1e-9);
    }

    #[test]
    fn compose_keeps_the_quaternion_unit_length() {
        let model = LiveModel::new();
        let x = moving_state();
        let mut delta = DVector::zeros(LIVE_ERROR_DIM);
        write_vec3(&mut delta, ERR_ORIENTATION, &Vector3::new(0.3, -0.4, 0.2));
        let out = model.compose(&x, &delta);
        assert_relative_eq!(out.rows(ECEF_ORIENTATION, 4).norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn h_mod_is_the_derivative_of_compose() {
        let model = LiveModel::new();
        let x = moving_state();
        let numeric = error_state_jacobian(|d| model.compose(&x, d), LIVE_ERROR_DIM);
        let analytic = model.h_mod(&x);
        assert_eq!(analytic.shape(), (LIVE_STATE_DIM, LIVE_ERROR_DIM));
        assert_abs_diff_eq!((analytic - numeric).amax(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn zero_dt_is_exact_identity() {
        let model = LiveModel::new();
        let x = moving_state();
        assert_eq!(model.transition(&x, 0.0), x);
        assert_eq!(
            model.transition_jacobian(&x, 0.0),
            DMatrix::<f64>::identity(LIVE_ERROR_DIM, LIVE_ERROR_DIM)
        );
    }

    #[test]
    fn transition_integrates_rates() {
        let model = LiveModel::new();
        let mut x = model.initial_state();
        write_vec3(&mut x, ECEF_VELOCITY, &Vector3::new(1.0, 2.0, 3.0));
        write_vec3(&mut x, ANGULAR_VELOCITY, &Vector3::new(0.0, 0.0, 1.0));
        write_vec3(&mut x, ACCELERATION, &Vector3::new(1.0, 0.0, 0.0));

        let next = model.transition(&x, 0.1);
        assert_abs_diff_eq!(next[ECEF_POS], -2.7e6 + 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(next[ECEF_POS + 2], 3.8e6 + 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(orientation(&next).euler_angles().2, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(next[ECEF_VELOCITY], 1.1, epsilon = 1e-12);
    }

    #[test]
    fn transition_jacobian_couples_position_to_velocity() {
        let model = LiveModel::new();
        let x = moving_state();
        let dt = 0.05;
        let f = model.transition_jacobian(&x, dt);
        assert_eq!(f.shape(), (LIVE_ERROR_DIM, LIVE_ERROR_DIM));
        for axis in 0..3 {
            assert_abs_diff_eq!(f[(axis, axis)], 1.0, epsilon = 1e-5);
            assert_abs_diff_eq!(f[(axis, ERR_TAIL + axis)], dt, epsilon = 1e-5);
        }
        // Biases are constant.
        assert_abs_diff_eq!(f[(12, 12)], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(f[(20, 20)], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn accelerometer_sees_gravity_away_from_the_earth_center() {
        let model = LiveModel::new();
        let mut x = DVector::zeros(LIVE_STATE_DIM);
        write_orientation(&mut x, &UnitQuaternion::identity());
        x[ECEF_POS + 2] = 6.4e6;

        let z = model.predict_measurement(LiveObservation::PhoneAccel, &x, None);
        assert_abs_diff_eq!(z[2], GRAVITY, epsilon = 1e-12);
        assert_abs_diff_eq!(z[0], 0.0, epsilon = 1e-12);

        // At the origin there is no direction to point gravity along.
        let z0 = model.predict_measurement(LiveObservation::PhoneAccel, &DVector::zeros(LIVE_STATE_DIM), None);
        assert_eq!(z0, DVector::zeros(3));
    }

    #[test]
    fn rotation_observations_share_a_model() {
        let model = LiveModel::new();
        let x = moving_state();
        assert_eq!(
            model.predict_measurement(LiveObservation::NoRot, &x, None),
            model.predict_measurement(LiveObservation::CameraOdoRotation, &x, None)
        );
        let gyro = model.predict_measurement(LiveObservation::PhoneGyro, &x, None);
        assert_abs_diff_eq!(gyro[2], 0.3005, epsilon = 1e-12);
    }

    #[test]
    fn every_kind_has_consistent_shapes() {
        let model = LiveModel::new();
        let x = moving_state();
        for &kind in LiveObservation::ALL {
            let z = model.predict_measurement(kind, &x, None);
            let h = model.measurement_jacobian(kind, &x, None);
            assert_eq!(z.len(), kind.dim(), "{}", kind.name());
            assert_eq!(h.shape(), (kind.dim(), LIVE_STATE_DIM), "{}", kind.name());
            assert_eq!((h * model.h_mod(&x)).shape(), (kind.dim(), LIVE_ERROR_DIM));
        }
    }

    #[test]
    fn kinds_decode_from_tags() {
        assert_eq!(LiveObservation::ALL.len(), 9);
        assert_eq!(LiveObservation::try_from(32), Ok(LiveObservation::EcefOrientationFromGps));
        assert_eq!(LiveObservation::EcefOrientationFromGps.dim(), 4);
        assert_eq!(
            LiveObservation::try_from(24),
            Err(EkfError::UnknownKind { model: "live", tag: 24 })
        );
    }

    #[test]
    fn layout_dimensions() {
        let model = LiveModel::new();
        assert_eq!(crate::models::layout::state_dim(model.state_layout()), LIVE_STATE_DIM);
        assert_eq!(crate::models::layout::error_dim(model.state_layout()), LIVE_ERROR_DIM);
        assert_eq!(model.initial_covariance().nrows(), LIVE_ERROR_DIM);
        assert_eq!(model.process_noise().ncols(), LIVE_ERROR_DIM);
    }
}
