//! Flow, current and voltage quantities.
//!
//! Cnec thresholds may be given in amperes while the linear problem is always
//! written in megawatts. Threshold values are converted once, when a cnec's
//! bounds are read:
//!
//! ```
//! use rao_core::units::{Amperes, Kilovolts};
//!
//! let limit = Amperes(1000.0).to_megawatts(Kilovolts(400.0));
//! assert!((limit.value() - 692.82).abs() < 0.01);
//! ```

use serde::{Deserialize, Serialize};

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

/// Current in amperes (A)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Amperes(pub f64);

/// Line-to-line voltage in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl Megawatts {
    #[inline]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl Amperes {
    /// P = I · V · √3 / 1000 (unity power factor)
    #[inline]
    pub fn to_megawatts(self, nominal_voltage: Kilovolts) -> Megawatts {
        Megawatts(self.0 * megawatts_per_ampere(nominal_voltage))
    }
}

/// MW carried by one ampere on a three-phase branch at the given voltage.
#[inline]
pub fn megawatts_per_ampere(nominal_voltage: Kilovolts) -> f64 {
    nominal_voltage.0 * 3f64.sqrt() / 1000.0
}
