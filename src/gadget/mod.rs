/// Gadget inventory and lifecycle
///
/// Owns gadget status transitions, codename allocation at creation and the
/// two-phase self-destruct confirmation protocol.

pub mod codename;
mod manager;
pub mod status;

pub use codename::CodenameGenerator;
pub use manager::{GadgetManager, SelfDestructOutcome};
pub use status::GadgetStatus;

use crate::{
    db::{models::Gadget, GadgetChanges},
    error::{ApiError, ApiResult},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Gadget creation request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateGadgetRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Gadget name is required"))]
    pub name: String,
}

/// Gadget update request; absent or blank fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateGadgetRequest {
    pub name: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<UpdateGadgetRequest> for GadgetChanges {
    type Error = ApiError;

    fn try_from(req: UpdateGadgetRequest) -> ApiResult<Self> {
        let status = non_blank(req.status.as_deref())
            .map(GadgetStatus::from_str)
            .transpose()?;

        Ok(GadgetChanges {
            name: non_blank(req.name.as_deref()).map(str::to_string),
            status,
        })
    }
}

/// Trimmed value, or `None` when nothing is left
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Self-destruct request; the presence of a code selects phase 2
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfDestructRequest {
    pub confirmation_code: Option<String>,
}

impl SelfDestructRequest {
    /// An empty code counts as no code
    pub fn code(&self) -> Option<&str> {
        self.confirmation_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Query parameters for listing gadgets
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListGadgetsQuery {
    pub status: Option<String>,
}

impl ListGadgetsQuery {
    pub fn status_filter(&self) -> ApiResult<Option<GadgetStatus>> {
        non_blank(self.status.as_deref())
            .map(GadgetStatus::from_str)
            .transpose()
    }
}

/// Phase-1 response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfDestructCodeResponse {
    pub code: String,
}

/// A gadget as returned by read endpoints, with a transient success
/// probability that is recomputed on every read and never stored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GadgetView {
    #[serde(flatten)]
    pub gadget: Gadget,
    pub success_probability: String,
}

impl GadgetView {
    pub fn new(gadget: Gadget) -> Self {
        let probability = codename::success_probability(&mut rand::thread_rng());
        Self {
            gadget,
            success_probability: format!("{}%", probability),
        }
    }
}
