// locus_core/src/models/mod.rs

//! Capability interfaces every filter model implements, plus the two concrete
//! models ([`car::CarModel`] and [`live::LiveModel`]).
//!
//! A model is pure math: it owns no estimate, never allocates state that
//! outlives a call, and is `Send + Sync` so independent filter instances can live
//! on separate threads.

use std::fmt::Debug;
use std::hash::Hash;

use nalgebra::DVector;

use crate::error::EkfError;
use crate::types::{Covariance, ErrorState, Jacobian, Observation, State};

pub mod layout;

/// Standard gravity [m/s²], shared by both models.
pub const GRAVITY: f64 = 9.81;

use layout::StateBlock;

/// A closed set of observation kinds belonging to one model.
///
/// Implemented by the enums generated with [`observation_kinds!`]. Typed call
/// sites can never name a kind the model does not have; raw integer tags coming
/// from outside go through `TryFrom<u8>` and fail with
/// [`EkfError::UnknownKind`].
pub trait ObservationKind:
    Copy + Debug + Eq + Hash + Send + Sync + 'static + TryFrom<u8, Error = EkfError>
{
    /// Every kind of the model, in declaration order.
    const ALL: &'static [Self];

    /// The integer tag used on the wire.
    fn tag(self) -> u8;

    /// The fixed dimension of `z` for this kind.
    fn dim(self) -> usize;

    fn name(self) -> &'static str;
}

/// Declares a model's observation-kind enum with its tags and dimensions.
macro_rules! observation_kinds {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $model:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $tag:literal => $dim:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[repr(u8)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $tag, )+
        }

        impl $crate::models::ObservationKind for $name {
            const ALL: &'static [Self] = &[$( $name::$variant, )+];

            fn tag(self) -> u8 {
                self as u8
            }

            fn dim(self) -> usize {
                match self {
                    $( $name::$variant => $dim, )+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant), )+
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::error::EkfError;

            fn try_from(tag: u8) -> Result<Self, Self::Error> {
                match tag {
                    $( $tag => Ok($name::$variant), )+
                    _ => Err($crate::error::EkfError::UnknownKind { model: $model, tag }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(kind: $name) -> u8 {
                kind as u8
            }
        }
    };
}

pub(crate) use observation_kinds;

// --- ERROR STATE MAP ---
/// Mapping between the full state and the reduced error state.
///
/// The defaults describe a purely Euclidean model where the two bases coincide
/// and `compose` is vector addition. Models with a manifold component override
/// all three methods.
pub trait ErrorStateMap {
    /// Length of `x`.
    const STATE_DIM: usize;
    /// Length of `δx`, and the side of `P`.
    const ERROR_DIM: usize;

    /// Applies a perturbation to a nominal state: `x_true = x ⊞ δ`.
    fn compose(&self, nominal: &State, delta: &ErrorState) -> State {
        nominal + delta
    }

    /// Extracts the perturbation between two states: `δ = x_true ⊟ x_nominal`.
    ///
    /// Left-inverse of [`ErrorStateMap::compose`] for perturbations inside the
    /// model's valid domain.
    fn difference(&self, nominal: &State, true_state: &State) -> ErrorState {
        true_state - nominal
    }

    /// `∂compose(x, δ)/∂δ` at `δ = 0`, a `STATE_DIM x ERROR_DIM` matrix that maps
    /// state-space Jacobians onto the error basis.
    fn h_mod(&self, _x: &State) -> Jacobian {
        Jacobian::identity(Self::STATE_DIM, Self::ERROR_DIM)
    }
}

// --- PROCESS MODEL ---
/// How the state evolves over `dt`. `x_next = f(x, dt)`.
pub trait ProcessModel: ErrorStateMap {
    /// The nonlinear transition `f(x, dt)`.
    fn transition(&self, x: &State, dt: f64) -> State;

    /// `F = ∂f/∂δx`, an `ERROR_DIM x ERROR_DIM` matrix evaluated at `x`.
    fn transition_jacobian(&self, x: &State, dt: f64) -> Jacobian;
}

// --- MEASUREMENT MODEL ---
/// The registry of observation functions of a model. `z = h_k(x) + v`.
pub trait MeasurementModel: ErrorStateMap {
    type Kind: ObservationKind;

    /// `h_k(x, extra)`. `extra` is a side channel; kinds that do not need it ignore it.
    fn predict_measurement(
        &self,
        kind: Self::Kind,
        x: &State,
        extra: Option<&DVector<f64>>,
    ) -> Observation;

    /// `H_k = ∂h_k/∂x`, a `dim(kind) x STATE_DIM` matrix. The update step maps it
    /// onto the error basis with [`ErrorStateMap::h_mod`].
    fn measurement_jacobian(
        &self,
        kind: Self::Kind,
        x: &State,
        extra: Option<&DVector<f64>>,
    ) -> Jacobian;
}

/// A complete model a filter can be instantiated with.
pub trait FilterModel: ProcessModel + MeasurementModel + Debug + Send + Sync {
    const NAME: &'static str;

    /// Named sub-blocks of the state, in order.
    fn state_layout(&self) -> &'static [StateBlock];

    /// The state a freshly constructed filter starts from.
    fn initial_state(&self) -> State;

    /// The covariance a freshly constructed filter starts from.
    fn initial_covariance(&self) -> Covariance;

    /// Per-unit-time process noise `Q`; predict adds `Q·dt`.
    fn process_noise(&self) -> Covariance;

    /// A reasonable default `R` for a kind, for callers without a sensor-reported one.
    fn observation_noise(&self, kind: Self::Kind) -> Covariance;
}

pub mod car;
pub mod live;
