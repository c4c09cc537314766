// locus_core/src/estimation/filters/eskf.rs

use nalgebra::DVector;
use tracing::{debug, info, trace, warn};

use crate::error::{EkfError, EkfResult};
use crate::estimate::Estimate;
use crate::estimation::ekf::{ekf_predict, ekf_update, PredictParams, UpdateParams, UpdateReport};
use crate::estimation::gating::GateConfig;
use crate::estimation::{Processed, StateEstimator};
use crate::messages::{BlockSnapshot, FilterInput, FilterSnapshot};
use crate::models::car::{CarModel, CarParams};
use crate::models::live::LiveModel;
use crate::models::{FilterModel, ObservationKind};
use crate::types::{Covariance, Observation, State};
use crate::utils::linalg::{is_finite, symmetrize};

/// An error-state extended Kalman filter over one [`FilterModel`].
///
/// The filter owns exactly one estimate and mutates it only when an operation
/// succeeds; every `Err` leaves mean, covariance and filter time untouched.
#[derive(Debug, Clone)]
pub struct ErrorStateKalmanFilter<M: FilterModel> {
    model: M,
    /// The current state of the filter (x, P, t).
    estimate: Estimate,
    /// Per-unit-time process noise used by [`Self::predict_to`].
    process_noise: Covariance,
    gate: Option<GateConfig<M::Kind>>,
}

/// The vehicle-dynamics filter.
pub type CarFilter = ErrorStateKalmanFilter<CarModel>;
/// The device-pose filter.
pub type LiveFilter = ErrorStateKalmanFilter<LiveModel>;

impl<M: FilterModel> ErrorStateKalmanFilter<M> {
    /// Creates a filter at the model's initial state, covariance and process noise.
    pub fn new(model: M) -> Self {
        let estimate = Estimate::new(model.initial_state(), model.initial_covariance(), None);
        let process_noise = model.process_noise();
        Self {
            model,
            estimate,
            process_noise,
            gate: None,
        }
    }

    /// Enables innovation gating.
    pub fn with_gate(mut self, gate: GateConfig<M::Kind>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_gate(&mut self, gate: Option<GateConfig<M::Kind>>) {
        self.gate = gate;
    }

    /// Replaces the estimate.
    pub fn init_state(&mut self, x: State, covariance: Covariance, filter_time: Option<f64>) -> EkfResult<()> {
        if x.nrows() != M::STATE_DIM {
            return Err(EkfError::shape("x", (M::STATE_DIM, 1), (x.nrows(), 1)));
        }
        if covariance.shape() != (M::ERROR_DIM, M::ERROR_DIM) {
            return Err(EkfError::shape("P", (M::ERROR_DIM, M::ERROR_DIM), covariance.shape()));
        }
        if !is_finite(&x) {
            return Err(EkfError::NonFiniteInput { what: "x" });
        }
        if !is_finite(&covariance) {
            return Err(EkfError::NonFiniteInput { what: "P" });
        }
        if filter_time.is_some_and(|t| !t.is_finite()) {
            return Err(EkfError::NonFiniteInput { what: "timestamp" });
        }

        let mut covariance = covariance;
        symmetrize(&mut covariance);
        self.estimate = Estimate::new(x, covariance, filter_time);
        debug!(model = M::NAME, ?filter_time, "state initialized");
        Ok(())
    }

    /// Replaces the per-unit-time process noise used by timestamped predicts.
    pub fn set_process_noise(&mut self, q: Covariance) -> EkfResult<()> {
        if q.shape() != (M::ERROR_DIM, M::ERROR_DIM) {
            return Err(EkfError::shape("Q", (M::ERROR_DIM, M::ERROR_DIM), q.shape()));
        }
        if !is_finite(&q) {
            return Err(EkfError::NonFiniteInput { what: "Q" });
        }
        self.process_noise = q;
        Ok(())
    }

    // --- Predict ---

    /// Advances the estimate by `dt` with the caller's process noise `q`.
    pub fn predict(&mut self, dt: f64, q: &Covariance) -> EkfResult<()> {
        let params = PredictParams { process_noise: q, dt };
        let mut next = ekf_predict(&self.model, &self.estimate, &params)
            .inspect_err(|err| warn!(model = M::NAME, dt, error = %err, "predict rejected"))?;
        next.filter_time = self.estimate.filter_time.map(|t| t + dt);
        trace!(model = M::NAME, dt, trace = next.trace(), "predict");
        self.estimate = next;
        Ok(())
    }

    /// Advances the estimate to time `t` with the stored process noise.
    ///
    /// The first timestamped call only stamps the filter time. Timestamps older
    /// than the filter time are refused; the filter never rewinds.
    pub fn predict_to(&mut self, t: f64) -> EkfResult<()> {
        self.estimate = self
            .advanced_to(t)
            .inspect_err(|err| warn!(model = M::NAME, t, error = %err, "predict rejected"))?;
        Ok(())
    }

    fn advanced_to(&self, t: f64) -> EkfResult<Estimate> {
        if !t.is_finite() {
            return Err(EkfError::NonFiniteInput { what: "timestamp" });
        }
        match self.estimate.filter_time {
            None => {
                let mut stamped = self.estimate.clone();
                stamped.filter_time = Some(t);
                Ok(stamped)
            }
            Some(filter_time) if t < filter_time => Err(EkfError::StaleTimestamp {
                timestamp: t,
                filter_time,
            }),
            Some(filter_time) => {
                let dt = t - filter_time;
                let params = PredictParams {
                    process_noise: &self.process_noise,
                    dt,
                };
                let mut next = ekf_predict(&self.model, &self.estimate, &params)?;
                next.filter_time = Some(t);
                trace!(model = M::NAME, t, dt, trace = next.trace(), "predict");
                Ok(next)
            }
        }
    }

    // --- Update ---

    /// Fuses one observation with noise `r`.
    pub fn update(
        &mut self,
        kind: M::Kind,
        z: &Observation,
        r: &Covariance,
    ) -> EkfResult<UpdateReport<M::Kind>> {
        self.update_with_extra(kind, z, r, None)
    }

    /// Fuses one observation whose observation function takes a side input.
    pub fn update_with_extra(
        &mut self,
        kind: M::Kind,
        z: &Observation,
        r: &Covariance,
        extra: Option<&DVector<f64>>,
    ) -> EkfResult<UpdateReport<M::Kind>> {
        let (next, report) = self.fuse(&self.estimate, kind, z, r, extra)?;
        self.estimate = next;
        Ok(report)
    }

    /// Predicts to `t`, then fuses `zs[i]` with `rs[i]` in order.
    ///
    /// All-or-nothing: if any step fails the filter is left exactly as it was,
    /// including its filter time.
    pub fn predict_and_update_batch(
        &mut self,
        t: f64,
        kind: M::Kind,
        zs: &[Observation],
        rs: &[Covariance],
        extra: Option<&DVector<f64>>,
    ) -> EkfResult<Vec<UpdateReport<M::Kind>>> {
        if zs.len() != rs.len() {
            return Err(EkfError::shape("batch", (zs.len(), 1), (rs.len(), 1)));
        }
        let mut working = self
            .advanced_to(t)
            .inspect_err(|err| warn!(model = M::NAME, t, error = %err, "predict rejected"))?;

        let mut reports = Vec::with_capacity(zs.len());
        for (z, r) in zs.iter().zip(rs) {
            let (next, report) = self.fuse(&working, kind, z, r, extra)?;
            working = next;
            reports.push(report);
        }

        self.estimate = working;
        Ok(reports)
    }

    fn fuse(
        &self,
        estimate: &Estimate,
        kind: M::Kind,
        z: &Observation,
        r: &Covariance,
        extra: Option<&DVector<f64>>,
    ) -> EkfResult<(Estimate, UpdateReport<M::Kind>)> {
        let params = UpdateParams {
            kind,
            z,
            r,
            extra,
            gate_threshold: self.gate.as_ref().and_then(|g| g.threshold(kind)),
        };
        match ekf_update(&self.model, estimate, &params) {
            Ok((next, report)) => {
                debug!(
                    model = M::NAME,
                    kind = kind.name(),
                    nis = report.mahalanobis,
                    "update accepted"
                );
                Ok((next, report))
            }
            Err(err) => {
                warn!(model = M::NAME, kind = kind.name(), error = %err, "update rejected");
                Err(err)
            }
        }
    }

    // --- Accessors ---

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn estimate(&self) -> &Estimate {
        &self.estimate
    }

    pub fn state(&self) -> &State {
        &self.estimate.x
    }

    pub fn covariance(&self) -> &Covariance {
        &self.estimate.covariance
    }

    pub fn filter_time(&self) -> Option<f64> {
        self.estimate.filter_time
    }

    pub fn process_noise(&self) -> &Covariance {
        &self.process_noise
    }

    pub fn gate(&self) -> Option<&GateConfig<M::Kind>> {
        self.gate.as_ref()
    }

    /// The error between the current estimate and a reference state, in the
    /// error basis.
    pub fn error_to(&self, reference: &State) -> EkfResult<DVector<f64>> {
        if reference.nrows() != M::STATE_DIM {
            return Err(EkfError::shape("reference", (M::STATE_DIM, 1), (reference.nrows(), 1)));
        }
        Ok(self.model.difference(&self.estimate.x, reference))
    }

    pub fn snapshot(&self) -> FilterSnapshot {
        let blocks = self
            .model
            .state_layout()
            .iter()
            .map(|block| BlockSnapshot {
                name: block.name.to_string(),
                values: self.estimate.block(block).iter().copied().collect(),
                std_dev: self.estimate.block_std_dev(block).iter().copied().collect(),
            })
            .collect();

        FilterSnapshot {
            model: M::NAME.to_string(),
            filter_time: self.estimate.filter_time,
            state: self.estimate.x.iter().copied().collect(),
            covariance_diagonal: self.estimate.covariance.diagonal().iter().copied().collect(),
            blocks,
        }
    }
}

// --- Car parameters ---
impl ErrorStateKalmanFilter<CarModel> {
    pub fn params(&self) -> &CarParams {
        self.model.params()
    }

    /// Replaces all six parameters at once after validating them.
    pub fn set_params(&mut self, params: CarParams) -> EkfResult<()> {
        params
            .validate()
            .inspect_err(|err| warn!(model = "car", error = %err, "parameters rejected"))?;
        *self.model.params_mut() = params;
        info!(model = "car", ?params, "parameters replaced");
        Ok(())
    }

    pub fn set_mass(&mut self, value: f64) -> EkfResult<()> {
        self.set_param("mass", value, CarParams::set_mass)
    }

    pub fn set_rotational_inertia(&mut self, value: f64) -> EkfResult<()> {
        self.set_param("rotational_inertia", value, CarParams::set_rotational_inertia)
    }

    pub fn set_center_to_front(&mut self, value: f64) -> EkfResult<()> {
        self.set_param("center_to_front", value, CarParams::set_center_to_front)
    }

    pub fn set_center_to_rear(&mut self, value: f64) -> EkfResult<()> {
        self.set_param("center_to_rear", value, CarParams::set_center_to_rear)
    }

    pub fn set_stiffness_front(&mut self, value: f64) -> EkfResult<()> {
        self.set_param("stiffness_front", value, CarParams::set_stiffness_front)
    }

    pub fn set_stiffness_rear(&mut self, value: f64) -> EkfResult<()> {
        self.set_param("stiffness_rear", value, CarParams::set_stiffness_rear)
    }

    fn set_param(
        &mut self,
        name: &'static str,
        value: f64,
        setter: fn(&mut CarParams, f64) -> EkfResult<()>,
    ) -> EkfResult<()> {
        match setter(self.model.params_mut(), value) {
            Ok(()) => {
                info!(model = "car", parameter = name, value, "parameter updated");
                Ok(())
            }
            Err(err) => {
                warn!(model = "car", parameter = name, value, error = %err, "parameter rejected");
                Err(err)
            }
        }
    }
}

// --- The Public Trait Implementation ---
impl<M: FilterModel> StateEstimator for ErrorStateKalmanFilter<M> {
    type Kind = M::Kind;

    fn process(&mut self, input: &FilterInput) -> EkfResult<Processed<M::Kind>> {
        match *input {
            FilterInput::Advance { timestamp } => {
                self.predict_to(timestamp)?;
                Ok(Processed::Advanced)
            }
            FilterInput::Observation {
                timestamp,
                tag,
                z,
                r,
            } => {
                let kind = <M::Kind>::try_from(tag)
                    .inspect_err(|err| warn!(model = M::NAME, error = %err, "observation rejected"))?;
                let default_r;
                let r = match r {
                    Some(r) => r,
                    None => {
                        default_r = self.model.observation_noise(kind);
                        &default_r
                    }
                };
                let mut reports = self.predict_and_update_batch(
                    timestamp,
                    kind,
                    std::slice::from_ref(z),
                    std::slice::from_ref(r),
                    None,
                )?;
                Ok(reports.pop().map_or(Processed::Advanced, Processed::Updated))
            }
        }
    }

    fn estimate(&self) -> &Estimate {
        &self.estimate
    }

    fn snapshot(&self) -> FilterSnapshot {
        ErrorStateKalmanFilter::snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::gating::GateProbability;
    use crate::models::car::{self, CarObservation, CAR_STATE_DIM};
    use crate::models::live::{self, LiveObservation, LIVE_ERROR_DIM, LIVE_STATE_DIM};
    use crate::models::{MeasurementModel, ProcessModel};
    use crate::utils::linalg::{max_asymmetry, min_eigenvalue};
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, UnitQuaternion};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, StandardNormal};

    const SYMMETRY_EPSILON: f64 = 1e-12;
    const PSD_EPSILON: f64 = 1e-9;

    fn assert_covariance_healthy(p: &Covariance) {
        assert!(max_asymmetry(p) < SYMMETRY_EPSILON, "asymmetry {}", max_asymmetry(p));
        assert!(min_eigenvalue(p) > -PSD_EPSILON, "min eigenvalue {}", min_eigenvalue(p));
    }

    /// `z = h(x) + v`, with `v` drawn from the model's default noise.
    fn noisy_observation<M: FilterModel>(
        model: &M,
        kind: M::Kind,
        x: &State,
        rng: &mut ChaCha8Rng,
    ) -> (Observation, Covariance) {
        let r = model.observation_noise(kind);
        let mut z = model.predict_measurement(kind, x, None);
        for i in 0..z.len() {
            let noise: f64 = StandardNormal.sample(rng);
            z[i] += noise * r[(i, i)].sqrt();
        }
        (z, r)
    }

    fn random_walk<M: FilterModel>(mut filter: ErrorStateKalmanFilter<M>, seed: u64, steps: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let q = filter.process_noise().clone();
        for _ in 0..steps {
            if rng.gen_bool(0.5) {
                let dt = rng.gen_range(0.0..0.05);
                filter.predict(dt, &q).unwrap();
            } else {
                let kind = <M::Kind>::ALL[rng.gen_range(0..<M::Kind>::ALL.len())];
                let (z, r) = noisy_observation(filter.model(), kind, filter.state(), &mut rng);
                filter.update(kind, &z, &r).unwrap();
            }
            assert_covariance_healthy(filter.covariance());
        }
    }

    #[test]
    fn filters_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CarFilter>();
        assert_send_sync::<LiveFilter>();
    }

    #[test]
    fn covariance_stays_symmetric_psd_car() {
        random_walk(CarFilter::new(CarModel::default()), 11, 300);
    }

    #[test]
    fn covariance_stays_symmetric_psd_live() {
        random_walk(LiveFilter::new(LiveModel::new()), 12, 200);
    }

    #[test]
    fn zero_dt_predict_is_identity() {
        let mut car = CarFilter::new(CarModel::default());
        let before = car.estimate().clone();
        let q = car.process_noise().clone();
        car.predict(0.0, &q).unwrap();
        assert_eq!(car.estimate(), &before);

        let mut live = LiveFilter::new(LiveModel::new());
        let before = live.estimate().clone();
        let q = live.process_noise().clone();
        live.predict(0.0, &q).unwrap();
        assert_eq!(live.estimate(), &before);
    }

    #[test]
    fn zero_innovation_update_keeps_mean_and_shrinks_covariance() {
        let mut filter = CarFilter::new(CarModel::default());
        let kind = CarObservation::RoadFrameXySpeed;
        let z = filter.model().predict_measurement(kind, filter.state(), None);
        let r = filter.model().observation_noise(kind);
        let before = filter.estimate().clone();

        let report = filter.update(kind, &z, &r).unwrap();

        assert_eq!(report.mahalanobis, 0.0);
        assert_eq!(filter.state(), &before.x);
        assert!(min_eigenvalue(&(&before.covariance - filter.covariance())) > -PSD_EPSILON);
        assert!(filter.covariance()[(car::VELOCITY_U, car::VELOCITY_U)] < before.covariance[(car::VELOCITY_U, car::VELOCITY_U)]);
    }

    #[test]
    fn zero_innovation_update_on_the_manifold() {
        let mut filter = LiveFilter::new(LiveModel::new());
        let kind = LiveObservation::EcefOrientationFromGps;
        let z = filter.model().predict_measurement(kind, filter.state(), None);
        let r = filter.model().observation_noise(kind);
        let before = filter.estimate().clone();

        filter.update(kind, &z, &r).unwrap();

        assert_abs_diff_eq!((filter.state() - &before.x).amax(), 0.0, epsilon = 1e-12);
        assert!(min_eigenvalue(&(&before.covariance - filter.covariance())) > -PSD_EPSILON);
    }

    #[test]
    fn rejected_updates_leave_estimate_bit_identical() {
        let mut filter = CarFilter::new(CarModel::default())
            .with_gate(GateConfig::new(GateProbability::P95, vec![CarObservation::RoadFrameXSpeed]));
        let before = filter.estimate().clone();

        // Wrong z length.
        let err = filter.update(CarObservation::RoadFrameXySpeed, &DVector::zeros(3), &DMatrix::identity(2, 2));
        assert!(matches!(err, Err(EkfError::DimensionMismatch { what: "z", .. })));

        // Wrong R shape.
        let err = filter.update(CarObservation::SteerAngle, &DVector::zeros(1), &DMatrix::identity(2, 2));
        assert!(matches!(err, Err(EkfError::DimensionMismatch { what: "R", .. })));

        // Non-finite z.
        let err = filter.update(CarObservation::SteerAngle, &DVector::from_element(1, f64::NAN), &DMatrix::identity(1, 1));
        assert_eq!(err, Err(EkfError::NonFiniteInput { what: "z" }));

        // S = P + R = 0.
        let p_steer = before.covariance[(car::STEER_ANGLE, car::STEER_ANGLE)];
        let err = filter.update(
            CarObservation::SteerAngle,
            &DVector::from_element(1, 0.1),
            &DMatrix::from_element(1, 1, -p_steer),
        );
        assert_eq!(err, Err(EkfError::SingularInnovationCovariance { kind: "SteerAngle" }));

        // Gated outlier.
        let err = filter.update(
            CarObservation::RoadFrameXSpeed,
            &DVector::from_element(1, 500.0),
            &DMatrix::from_element(1, 1, 0.01),
        );
        assert!(matches!(err, Err(EkfError::InnovationGated { .. })));

        // Bad predict.
        let q = filter.process_noise().clone();
        assert!(filter.predict(-1.0, &q).is_err());

        assert_eq!(filter.estimate(), &before);
    }

    #[test]
    fn ungated_kinds_still_report_distance() {
        let mut filter = CarFilter::new(CarModel::default())
            .with_gate(GateConfig::new(GateProbability::P95, vec![CarObservation::RoadFrameXSpeed]));
        let report = filter
            .update(CarObservation::SteerAngle, &DVector::from_element(1, 5.0), &DMatrix::from_element(1, 1, 0.01))
            .unwrap();
        assert!(report.mahalanobis > 20.0);
    }

    fn trace_grows_from_zero_state<M: FilterModel>(model: M) -> State {
        let mut filter = ErrorStateKalmanFilter::new(model);
        filter
            .init_state(
                DVector::zeros(M::STATE_DIM),
                DMatrix::identity(M::ERROR_DIM, M::ERROR_DIM),
                None,
            )
            .unwrap();
        let q = DMatrix::identity(M::ERROR_DIM, M::ERROR_DIM) * 1e-4;

        let mut last_trace = filter.estimate().trace();
        for _ in 0..100 {
            filter.predict(0.01, &q).unwrap();
            let trace = filter.estimate().trace();
            assert!(trace > last_trace, "trace went from {last_trace} to {trace}");
            last_trace = trace;
            assert_covariance_healthy(filter.covariance());
        }
        filter.state().clone()
    }

    #[test]
    fn zero_state_scenario_is_deterministic_and_trace_grows() {
        let first = trace_grows_from_zero_state(CarModel::default());
        let second = trace_grows_from_zero_state(CarModel::default());
        assert_eq!(first, second);
        assert!(first.iter().all(|v| v.is_finite()));

        let first = trace_grows_from_zero_state(LiveModel::new());
        let second = trace_grows_from_zero_state(LiveModel::new());
        assert_eq!(first, second);
        assert_eq!(first.nrows(), LIVE_STATE_DIM);
    }

    #[test]
    fn repeated_measurement_has_smaller_innovation() {
        let mut filter = CarFilter::new(CarModel::default());
        let z = DVector::from_element(1, 0.3);
        let r = DMatrix::from_element(1, 1, 1e-4);

        let first = filter.update(CarObservation::RoadFrameYawRate, &z, &r).unwrap();
        let second = filter.update(CarObservation::RoadFrameYawRate, &z, &r).unwrap();
        assert!(second.innovation.norm() < first.innovation.norm());
        assert!(second.mahalanobis < first.mahalanobis);
    }

    #[test]
    fn predict_to_stamps_then_advances_and_refuses_stale_times() {
        let mut filter = CarFilter::new(CarModel::default());
        let initial = filter.estimate().clone();

        filter.predict_to(10.0).unwrap();
        assert_eq!(filter.filter_time(), Some(10.0));
        assert_eq!(filter.state(), &initial.x);
        assert_eq!(filter.covariance(), &initial.covariance);

        filter.predict_to(10.5).unwrap();
        assert_eq!(filter.filter_time(), Some(10.5));
        assert!(filter.estimate().trace() > initial.trace());

        let before = filter.estimate().clone();
        let err = filter.predict_to(10.2);
        assert_eq!(
            err,
            Err(EkfError::StaleTimestamp {
                timestamp: 10.2,
                filter_time: 10.5
            })
        );
        assert_eq!(filter.estimate(), &before);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut filter = CarFilter::new(CarModel::default());
        filter.predict_to(0.0).unwrap();
        let before = filter.estimate().clone();

        let kind = CarObservation::RoadFrameXSpeed;
        let r = filter.model().observation_noise(kind);
        let zs = vec![DVector::from_element(1, 12.0), DVector::zeros(2)];
        let rs = vec![r.clone(), r.clone()];
        assert!(filter.predict_and_update_batch(0.1, kind, &zs, &rs, None).is_err());
        assert_eq!(filter.estimate(), &before);

        let err = filter.predict_and_update_batch(0.1, kind, &zs[..1], &rs, None);
        assert!(matches!(err, Err(EkfError::DimensionMismatch { what: "batch", .. })));

        let zs = vec![DVector::from_element(1, 12.0), DVector::from_element(1, 12.1)];
        let reports = filter.predict_and_update_batch(0.1, kind, &zs, &rs, None).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(filter.filter_time(), Some(0.1));
        assert!(filter.state()[car::VELOCITY_U] > 11.5);
    }

    #[test]
    fn process_decodes_tags_and_uses_default_noise() {
        let mut filter = LiveFilter::new(LiveModel::new());
        assert_eq!(filter.process(&FilterInput::Advance { timestamp: 1.0 }), Ok(Processed::Advanced));

        let z = DVector::from_column_slice(&[0.01, -0.02, 0.3]);
        let processed = filter
            .process(&FilterInput::Observation { timestamp: 1.1, tag: 4, z: &z, r: None })
            .unwrap();
        match processed {
            Processed::Updated(report) => {
                assert_eq!(report.kind, LiveObservation::PhoneGyro);
                assert_eq!(report.innovation.len(), 3);
            }
            Processed::Advanced => panic!("observation was not fused"),
        }
        assert_eq!(filter.filter_time(), Some(1.1));

        let before = filter.estimate().clone();
        let err = filter.process(&FilterInput::Observation { timestamp: 1.2, tag: 26, z: &z, r: None });
        assert_eq!(err, Err(EkfError::UnknownKind { model: "live", tag: 26 }));
        assert_eq!(filter.estimate(), &before);
    }

    #[test]
    fn init_state_validates_input() {
        let mut filter = CarFilter::new(CarModel::default());
        let before = filter.estimate().clone();
        let p = DMatrix::identity(CAR_STATE_DIM, CAR_STATE_DIM);

        assert!(filter.init_state(DVector::zeros(8), p.clone(), None).is_err());
        assert!(filter.init_state(DVector::zeros(CAR_STATE_DIM), DMatrix::identity(8, 8), None).is_err());
        let mut bad = DVector::zeros(CAR_STATE_DIM);
        bad[3] = f64::INFINITY;
        assert_eq!(
            filter.init_state(bad, p.clone(), None),
            Err(EkfError::NonFiniteInput { what: "x" })
        );
        assert_eq!(filter.estimate(), &before);

        filter.init_state(DVector::zeros(CAR_STATE_DIM), p, Some(3.0)).unwrap();
        assert_eq!(filter.filter_time(), Some(3.0));
    }

    #[test]
    fn car_parameters_take_effect_on_next_predict() {
        let mut stiff = CarFilter::new(CarModel::default());
        let mut x = stiff.state().clone();
        x[car::STEER_ANGLE] = 0.2;
        let p = stiff.covariance().clone();
        stiff.init_state(x.clone(), p.clone(), None).unwrap();
        let mut heavy = stiff.clone();

        assert!(heavy.set_mass(-1.0).is_err());
        assert_eq!(heavy.params().mass, CarParams::default().mass);
        heavy.set_mass(4000.0).unwrap();
        heavy.set_rotational_inertia(6000.0).unwrap();

        let q = stiff.process_noise().clone();
        stiff.predict(0.1, &q).unwrap();
        heavy.predict(0.1, &q).unwrap();
        assert!(heavy.state()[car::VELOCITY_V] < stiff.state()[car::VELOCITY_V]);

        let mut params = *heavy.params();
        params.center_to_front = f64::NAN;
        assert!(heavy.set_params(params).is_err());
        assert_eq!(heavy.params().mass, 4000.0);
    }

    #[test]
    fn orientation_fix_keeps_unit_quaternion() {
        let mut filter = LiveFilter::new(LiveModel::new());
        let mut p = filter.covariance().clone();
        for i in 3..6 {
            p[(i, i)] = 1.0;
        }
        filter.init_state(filter.state().clone(), p, None).unwrap();

        let q = UnitQuaternion::from_euler_angles(0.2, 0.1, -0.4);
        let z = DVector::from_column_slice(&[q.w, q.i, q.j, q.k]);
        let r = filter.model().observation_noise(LiveObservation::EcefOrientationFromGps);
        for _ in 0..5 {
            filter.update(LiveObservation::EcefOrientationFromGps, &z, &r).unwrap();
        }
        let stored = filter.state().rows(live::ECEF_ORIENTATION, 4).into_owned();
        assert_abs_diff_eq!(stored.norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!((stored - &z).amax(), 0.0, epsilon = 0.05);
        assert_eq!(filter.covariance().nrows(), LIVE_ERROR_DIM);
    }

    #[test]
    fn error_to_reference_uses_the_error_basis() {
        let filter = LiveFilter::new(LiveModel::new());
        let mut truth = filter.state().clone();
        truth[0] += 2.0;
        let err = filter.error_to(&truth).unwrap();
        assert_eq!(err.len(), LIVE_ERROR_DIM);
        assert_abs_diff_eq!(err[0], 2.0, epsilon = 1e-9);
        assert!(filter.error_to(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn snapshot_names_every_block() {
        let mut filter = CarFilter::new(CarModel::default());
        filter.predict_to(4.0).unwrap();
        let snapshot = filter.snapshot();
        assert_eq!(snapshot.model, "car");
        assert_eq!(snapshot.filter_time, Some(4.0));
        assert_eq!(snapshot.state.len(), CAR_STATE_DIM);
        let velocity = snapshot.block("velocity").unwrap();
        assert_eq!(velocity.values, vec![10.0, 0.0]);
        assert_abs_diff_eq!(velocity.std_dev[0], 10.0, epsilon = 1e-12);

        let live = LiveFilter::new(LiveModel::new()).snapshot();
        let orientation = live.block("ecef_orientation").unwrap();
        assert_eq!(orientation.values.len(), 4);
        assert_eq!(orientation.std_dev.len(), 3);
    }

    #[test]
    fn model_is_reachable_through_the_process_interface() {
        let filter = CarFilter::new(CarModel::default());
        let next = filter.model().transition(filter.state(), 0.01);
        assert_eq!(next.len(), CAR_STATE_DIM);
    }
}
