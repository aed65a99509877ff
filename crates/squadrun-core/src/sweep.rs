//! Convergence loops: claim everything claimable, re-fetch, repeat.
//!
//! Each successful claim flips a flag server-side, so the claimable set
//! shrinks every round and the loop settles. A round with no successful
//! claim ends the sweep, as does a failed fetch. `max_rounds` bounds the
//! sweep against a server whose flags never flip.

use chrono::Utc;
use squadrun_proto::Transport;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::rewards::SquadApi;

/// Bounds for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    pub max_rounds: u32,
    /// Assistance requests with less time left than this count as expired.
    pub expiry_margin: Duration,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SweepOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_rounds: config.max_sweep_rounds,
            expiry_margin: config.expiry_margin(),
        }
    }
}

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Successful list fetches.
    pub rounds: u32,
    /// Successful claims or acceptances.
    pub claims: u32,
    /// The sweep stopped at `max_rounds` while still making progress.
    pub capped: bool,
}

/// `expired_at - now < margin`.
///
/// A request with less than `margin` left is treated as already expired;
/// exactly `margin` left is still live.
pub fn is_request_expired(expired_at_ms: i64, now_ms: i64, margin: Duration) -> bool {
    let margin_ms = i64::try_from(margin.as_millis()).unwrap_or(i64::MAX);
    expired_at_ms.saturating_sub(now_ms) < margin_ms
}

/// Claims completed missions and fully completed mission groups until a
/// fetch shows nothing left to claim.
pub async fn mission_sweep<T: Transport>(
    api: &SquadApi<T>,
    token: &str,
    options: SweepOptions,
) -> SweepReport {
    let mut report = SweepReport::default();

    while report.rounds < options.max_rounds {
        let Some(list) = api.list_missions(token).await else {
            return report;
        };
        report.rounds += 1;

        let mut claimed = 0;
        for group in &list.mission_list {
            if group.is_claimable() {
                info!(group = %group.mission_group_name, "Claiming mission group");
                if api
                    .claim_group_mission(token, &group.mission_group_id)
                    .await
                    .is_some()
                {
                    claimed += 1;
                }
            }

            for mission in &group.user_has_mission_list {
                if mission.is_claimable() {
                    info!(
                        mission = %mission.mission_name,
                        id = %mission.mission_id,
                        "Claiming mission"
                    );
                    if api.claim_mission(token, &mission.mission_id).await.is_some() {
                        claimed += 1;
                    }
                }
            }
        }

        report.claims += claimed;
        if claimed == 0 {
            return report;
        }
    }

    if report.rounds > 0 {
        report.capped = true;
        warn!(
            rounds = report.rounds,
            claims = report.claims,
            "Mission sweep hit its round limit while still claiming"
        );
    }
    report
}

/// Accepts every live assistance request that is neither ours nor already
/// accepted, until a fetch shows none left.
pub async fn assistance_sweep<T: Transport>(
    api: &SquadApi<T>,
    token: &str,
    options: SweepOptions,
) -> SweepReport {
    let mut report = SweepReport::default();

    while report.rounds < options.max_rounds {
        let Some(list) = api.list_assistance(token).await else {
            return report;
        };
        report.rounds += 1;

        let mut accepted = 0;
        for request in &list.squad_assistance_info_list {
            let expired = is_request_expired(
                request.expired_at.as_millis(),
                Utc::now().timestamp_millis(),
                options.expiry_margin,
            );

            if !request.is_accepted && !request.is_request_mine && !expired {
                info!(from = %request.nick_name, "Accepting assistance request");
                if api
                    .accept_assistance(token, &request.squad_assistance_request_id)
                    .await
                    .is_some()
                {
                    accepted += 1;
                }
            } else if expired {
                info!(from = %request.nick_name, "Assistance request has expired");
            }
        }

        report.claims += accepted;
        if accepted == 0 {
            return report;
        }
    }

    if report.rounds > 0 {
        report.capped = true;
        warn!(
            rounds = report.rounds,
            accepted = report.claims,
            "Assistance sweep hit its round limit while still accepting"
        );
    }
    report
}
