//! Risk gating and anomaly defense.

mod anomaly;
mod manager;

pub use anomaly::{AnomalyEvent, AnomalyGuard, AnomalyGuardConfig, AnomalyKind, ResponseAction};
pub use manager::{RiskInputs, RiskLimits, RiskManager};
