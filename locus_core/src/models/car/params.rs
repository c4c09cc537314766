// locus_core/src/models/car/params.rs

use serde::{Deserialize, Serialize};

use crate::error::{EkfError, EkfResult};

/// Physical constants read by the car process model.
///
/// Every instance of the car filter owns its own copy, so two filters tuned for
/// different vehicles never share state. Values take effect on the next
/// predict or update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CarParams {
    /// Vehicle mass [kg].
    pub mass: f64,
    /// Yaw moment of inertia [kg·m²].
    pub rotational_inertia: f64,
    /// Distance from the center of gravity to the front axle [m].
    pub center_to_front: f64,
    /// Distance from the center of gravity to the rear axle [m].
    pub center_to_rear: f64,
    /// Front axle cornering stiffness at a stiffness factor of 1 [N/rad].
    pub stiffness_front: f64,
    /// Rear axle cornering stiffness at a stiffness factor of 1 [N/rad].
    pub stiffness_rear: f64,
}

impl Default for CarParams {
    fn default() -> Self {
        Self {
            mass: 1500.0,
            rotational_inertia: 2500.0,
            center_to_front: 1.2,
            center_to_rear: 1.5,
            stiffness_front: 1.9e5,
            stiffness_rear: 2.0e5,
        }
    }
}

/// Mass and inertia must be strictly positive.
fn require_positive(name: &'static str, value: f64) -> EkfResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EkfError::InvalidParameter { name, value })
    }
}

/// Geometry and stiffness only need to be finite; a zero lever arm is a valid
/// (if odd) vehicle.
fn require_finite(name: &'static str, value: f64) -> EkfResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EkfError::InvalidParameter { name, value })
    }
}

impl CarParams {
    pub fn set_mass(&mut self, value: f64) -> EkfResult<()> {
        self.mass = require_positive("mass", value)?;
        Ok(())
    }

    pub fn set_rotational_inertia(&mut self, value: f64) -> EkfResult<()> {
        self.rotational_inertia = require_positive("rotational_inertia", value)?;
        Ok(())
    }

    pub fn set_center_to_front(&mut self, value: f64) -> EkfResult<()> {
        self.center_to_front = require_finite("center_to_front", value)?;
        Ok(())
    }

    pub fn set_center_to_rear(&mut self, value: f64) -> EkfResult<()> {
        self.center_to_rear = require_finite("center_to_rear", value)?;
        Ok(())
    }

    pub fn set_stiffness_front(&mut self, value: f64) -> EkfResult<()> {
        self.stiffness_front = require_finite("stiffness_front", value)?;
        Ok(())
    }

    pub fn set_stiffness_rear(&mut self, value: f64) -> EkfResult<()> {
        self.stiffness_rear = require_finite("stiffness_rear", value)?;
        Ok(())
    }

    /// Checks a whole record, e.g. one deserialized from a config file.
    pub fn validate(&self) -> EkfResult<()> {
        require_positive("mass", self.mass)?;
        require_positive("rotational_inertia", self.rotational_inertia)?;
        require_finite("center_to_front", self.center_to_front)?;
        require_finite("center_to_rear", self.center_to_rear)?;
        require_finite("stiffness_front", self.stiffness_front)?;
        require_finite("stiffness_rear", self.stiffness_rear)?;
        Ok(())
    }
}
