//! # squadrun-proto
//!
//! Shared types, error definitions, and traits for talking to the squad API.
//!
//! This crate provides the vocabulary used across all squadrun crates:
//! - `ApiRequest` and `Method` describing a single call
//! - The `Transport` trait that carries requests to the server
//! - `ApiError`, the failure kinds a call can end in
//! - Typed response schemas for every endpoint the bot consumes

mod error;
mod request;
mod schema;
mod transport;

pub use error::{ApiError, ApiResult};
pub use request::{ApiRequest, Method};
pub use schema::{
    AssistanceList, AssistanceRequest, AuthResponse, EntityId, Mission, MissionGroup,
    MissionList, RewardItem, RewardResponse, Timestamp, UserStatus,
};
pub use transport::Transport;
