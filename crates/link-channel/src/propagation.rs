//! Loss and delay models
//!
//! Both models are evaluated against the endpoints' positions at the
//! instant of transmission; nothing is cached between calls.

use crate::{ChannelError, Result};
use orbital_mechanics::{Vec3, SPEED_OF_LIGHT};
use std::f64::consts::PI;
use std::fmt;
use std::time::Duration;

/// Attenuation between two points, in dB.
pub trait LossModel: fmt::Debug {
    fn loss_db(&self, from: &Vec3, to: &Vec3) -> f64;
}

/// Propagation delay between two points.
pub trait DelayModel: fmt::Debug {
    fn delay(&self, from: &Vec3, to: &Vec3) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantSpeedDelay {
    speed_mps: f64,
}

impl ConstantSpeedDelay {
    /// Rejects speeds that are not finite and positive.
    pub fn new(speed_mps: f64) -> Result<Self> {
        if !(speed_mps.is_finite() && speed_mps > 0.0) {
            return Err(ChannelError::InvalidSpeed(speed_mps));
        }
        Ok(Self { speed_mps })
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }
}

impl Default for ConstantSpeedDelay {
    fn default() -> Self {
        Self {
            speed_mps: SPEED_OF_LIGHT,
        }
    }
}

impl DelayModel for ConstantSpeedDelay {
    fn delay(&self, from: &Vec3, to: &Vec3) -> Duration {
        // Saturates for distances too long to represent
        Duration::try_from_secs_f64((from - to).norm() / self.speed_mps).unwrap_or(Duration::MAX)
    }
}

/// Friis free-space path loss at a carrier frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeSpaceLoss {
    pub frequency_hz: f64,
}

impl FreeSpaceLoss {
    /// Ka-band downlink.
    pub const KA_BAND_HZ: f64 = 20.0e9;

    pub fn new(frequency_hz: f64) -> Self {
        Self { frequency_hz }
    }
}

impl Default for FreeSpaceLoss {
    fn default() -> Self {
        Self::new(Self::KA_BAND_HZ)
    }
}

impl LossModel for FreeSpaceLoss {
    fn loss_db(&self, from: &Vec3, to: &Vec3) -> f64 {
        let distance = (from - to).norm().max(1.0);
        20.0 * (4.0 * PI * distance * self.frequency_hz / SPEED_OF_LIGHT).log10()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedLoss {
    pub db: f64,
}

impl LossModel for FixedLoss {
    fn loss_db(&self, _from: &Vec3, _to: &Vec3) -> f64 {
        self.db
    }
}

/// Any attenuation function of the two endpoint positions.
pub struct FnLoss<F>(pub F);

impl<F> fmt::Debug for FnLoss<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnLoss")
    }
}

impl<F> LossModel for FnLoss<F>
where
    F: Fn(&Vec3, &Vec3) -> f64,
{
    fn loss_db(&self, from: &Vec3, to: &Vec3) -> f64 {
        (self.0)(from, to)
    }
}
