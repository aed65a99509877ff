//! # squadrun-core
//!
//! Session processing for the squad reward bot.
//!
//! This crate provides:
//! - Configuration loading and validation
//! - The session file reader and line parser
//! - The paced API client and its HTTP transport
//! - Reward claim primitives and the mission and assistance sweeps
//! - The per-session processor and the pass scheduler with its countdown

mod client;
mod config;
mod countdown;
mod processor;
mod rewards;
mod scheduler;
mod session;
mod sweep;
pub mod testing;

pub use client::{ApiClient, HttpTransport};
pub use config::{
    ApiConfig, ConfigError, ConfigWarning, SchedulerConfig, SquadConfig, SquadSettings,
};
pub use countdown::{Countdown, CountdownOutcome, format_remaining};
pub use processor::{SessionOutcome, SessionProcessor, SessionSummary};
pub use rewards::SquadApi;
pub use scheduler::{PassContext, PassReport, RunSummary, Scheduler, StopReason};
pub use session::{SessionDescriptor, SessionError, SessionSource, SessionUser, parse_session_line};
pub use sweep::{SweepOptions, SweepReport, assistance_sweep, is_request_expired, mission_sweep};
