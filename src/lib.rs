/// IMF Gadgets - gadget inventory API
///
/// Token-authenticated REST service for tracking field gadgets through their
/// lifecycle, including a two-phase self-destruct protocol.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod gadget;
pub mod rate_limit;
pub mod response;
pub mod server;

pub use context::AppContext;
pub use error::{ApiError, ApiResult};
