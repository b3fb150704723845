/// Gadget status and its transition rules
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a gadget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GadgetStatus {
    Available,
    Deployed,
    Destroyed,
    Decommissioned,
}

impl GadgetStatus {
    pub const ALL: [GadgetStatus; 4] = [
        GadgetStatus::Available,
        GadgetStatus::Deployed,
        GadgetStatus::Destroyed,
        GadgetStatus::Decommissioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GadgetStatus::Available => "Available",
            GadgetStatus::Deployed => "Deployed",
            GadgetStatus::Destroyed => "Destroyed",
            GadgetStatus::Decommissioned => "Decommissioned",
        }
    }

    /// Exact, case-sensitive match against the four wire values
    pub fn from_str(s: &str) -> ApiResult<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ApiError::Validation(
                    "Invalid status. Must be one of: Available, Deployed, Destroyed, Decommissioned"
                        .to_string(),
                )
            })
    }

    /// Destroyed and Decommissioned admit no further lifecycle transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, GadgetStatus::Destroyed | GadgetStatus::Decommissioned)
    }

    /// Guard for both phases of the self-destruct protocol
    pub fn ensure_can_self_destruct(&self) -> ApiResult<()> {
        match self {
            GadgetStatus::Destroyed => Err(ApiError::InvalidState(
                "Gadget has already been destroyed".to_string(),
            )),
            GadgetStatus::Decommissioned => Err(ApiError::InvalidState(
                "Gadget has been decommissioned".to_string(),
            )),
            GadgetStatus::Available | GadgetStatus::Deployed => Ok(()),
        }
    }

    /// Guard for a plain `update` status change.
    ///
    /// Without `lock_terminal` any listed status may be written over any
    /// current one, which lets an update resurrect a destroyed gadget. With
    /// it, terminal gadgets keep their status.
    pub fn ensure_can_update_to(&self, next: GadgetStatus, lock_terminal: bool) -> ApiResult<()> {
        if lock_terminal && self.is_terminal() && *self != next {
            return Err(ApiError::InvalidState(format!(
                "Gadget is {} and its status can no longer change",
                self.as_str()
            )));
        }

        Ok(())
    }
}

impl fmt::Display for GadgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
