//! Session processor: one credential through one full pass.
//!
//! ```text
//! AUTH → STATUS → BOOST(fuel>0) → CLAIM_RANK → ASSIST_SWEEP → ASSIST_REQUEST
//!      → MISSION_SWEEP → SQUAD_MISSIONS
//!      → [STATUS → BOOST → CLAIM_DAILY → MISSION_SWEEP]* while fuel>0
//!      → CLAIM_DAILY → DONE
//! ```
//!
//! Only a failed login stops the session early. Every other step degrades to
//! a logged no-op and the next step runs regardless; the freshest fuel value
//! is the only thing that steers the flow.

use squadrun_proto::Transport;
use tracing::{info, warn};

use crate::config::SquadConfig;
use crate::rewards::SquadApi;
use crate::session::SessionDescriptor;
use crate::sweep::{SweepOptions, assistance_sweep, mission_sweep};

/// How a session's pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No usable session on this line.
    Skipped,
    /// Login returned no token; nothing else was called.
    AuthFailed,
    /// The full step sequence ran.
    Completed(SessionSummary),
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }
}

/// Counters for one completed session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub boosts: u32,
    pub daily_claims: u32,
    pub missions_claimed: u32,
    pub assistance_accepted: u32,
    pub squad_missions_claimed: u32,
    /// Boost/claim rounds after the first mission sweep.
    pub fuel_rounds: u32,
    /// The fuel loop stopped at its round limit with fuel still left.
    pub fuel_loop_capped: bool,
}

/// Drives one session through the step sequence.
pub struct SessionProcessor<'a, T> {
    api: &'a SquadApi<T>,
    sweep: SweepOptions,
    max_fuel_rounds: u32,
}

impl<'a, T: Transport> SessionProcessor<'a, T> {
    pub fn new(api: &'a SquadApi<T>, sweep: SweepOptions, max_fuel_rounds: u32) -> Self {
        Self {
            api,
            sweep,
            max_fuel_rounds,
        }
    }

    pub fn from_config(api: &'a SquadApi<T>, config: &SquadConfig) -> Self {
        Self::new(
            api,
            SweepOptions::from(&config.scheduler),
            config.scheduler.max_boost_rounds,
        )
    }

    pub async fn process(&self, session: &SessionDescriptor) -> SessionOutcome {
        let api = self.api;
        let Some(token) = api.login(session).await else {
            return SessionOutcome::AuthFailed;
        };
        let token = token.as_str();
        let mut summary = SessionSummary::default();

        if let Some(user) = api.fetch_user(token).await
            && user.has_fuel()
            && api.boost(token, user.fuel).await.is_some()
        {
            summary.boosts += 1;
        }

        api.claim_rank(token).await;
        summary.assistance_accepted += assistance_sweep(api, token, self.sweep).await.claims;
        api.request_assistance(token).await;
        summary.missions_claimed += mission_sweep(api, token, self.sweep).await.claims;

        for id in &api.squad().squad_missions {
            if api.claim_squad_mission(token, id).await.is_some() {
                summary.squad_missions_claimed += 1;
            }
        }

        let mut user = api.fetch_user(token).await;
        loop {
            let fuel = match &user {
                Some(status) if status.has_fuel() => status.fuel,
                _ => break,
            };
            if summary.fuel_rounds >= self.max_fuel_rounds {
                summary.fuel_loop_capped = true;
                warn!(
                    rounds = summary.fuel_rounds,
                    fuel, "Fuel loop hit its round limit with fuel remaining"
                );
                break;
            }
            summary.fuel_rounds += 1;

            if api.boost(token, fuel).await.is_some() {
                summary.boosts += 1;
            }
            if api.claim_daily(token).await.is_some() {
                summary.daily_claims += 1;
            }
            summary.missions_claimed += mission_sweep(api, token, self.sweep).await.claims;
            user = api.fetch_user(token).await;
        }

        if api.claim_daily(token).await.is_some() {
            summary.daily_claims += 1;
        }

        info!(
            user = %session.user.display_name(),
            boosts = summary.boosts,
            daily_claims = summary.daily_claims,
            missions_claimed = summary.missions_claimed,
            assistance_accepted = summary.assistance_accepted,
            "Session complete"
        );
        SessionOutcome::Completed(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use crate::config::SquadSettings;
    use crate::session::parse_session_line;
    use crate::testing::{
        FakeAssistance, FakeSquadServer, FakeUser, fake_api, mission, mission_group, session_line,
    };
    use squadrun_proto::EntityId;
    use std::sync::Arc;
    use std::time::Duration;

    fn session(id: i64) -> SessionDescriptor {
        parse_session_line(&session_line(id, "pilot")).unwrap()
    }

    fn processor<T: Transport>(api: &SquadApi<T>) -> SessionProcessor<'_, T> {
        SessionProcessor::new(api, SweepOptions::default(), 100)
    }

    #[tokio::test]
    async fn test_auth_failure_makes_no_further_calls() {
        let server = Arc::new(FakeSquadServer::new());
        server.reject_login(1);
        let api = fake_api(&server);

        let outcome = processor(&api).process(&session(1)).await;
        assert_eq!(outcome, SessionOutcome::AuthFailed);
        assert_eq!(server.endpoints(), vec!["auth/telegram".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_fuel_never_boosts_but_claims_daily() {
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(1, "one").fuel(0));
        let api = fake_api(&server);

        let outcome = processor(&api).process(&session(1)).await;
        let SessionOutcome::Completed(summary) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(summary.boosts, 0);
        assert_eq!(summary.daily_claims, 1);
        assert_eq!(server.count("squad/fill/fuel"), 0);
        assert_eq!(server.count("squad/claim/daily"), 1);
    }

    #[tokio::test]
    async fn test_step_order_without_fuel_loop() {
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(1, "one").fuel(5));
        let api = fake_api(&server);

        processor(&api).process(&session(1)).await;
        assert_eq!(
            server.endpoints(),
            vec![
                "auth/telegram",
                "user",
                "squad/fill/fuel",
                "squad/claim/rank",
                "squad/assistance",
                "squad/assistance/request",
                "mission",
                "user",
                "squad/claim/daily",
            ]
        );
    }

    #[tokio::test]
    async fn test_null_nickname_still_boosts_with_fuel() {
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(1, "one").fuel(5));
        server.set_null_nicknames(true);
        let api = fake_api(&server);

        let outcome = processor(&api).process(&session(1)).await;
        let SessionOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.boosts, 1);
        assert_eq!(server.count("squad/fill/fuel"), 1);
        assert_eq!(server.user(1).unwrap().fuel, 0);
    }

    #[tokio::test]
    async fn test_fuel_loop_runs_while_fuel_remains() {
        let server = Arc::new(FakeSquadServer::new());
        // First boost leaves 3 fuel, second leaves 2, third drains it.
        server.add_user(FakeUser::new(1, "one").fuel(10).refills([3, 2]));
        let api = fake_api(&server);

        let outcome = processor(&api).process(&session(1)).await;
        let SessionOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.boosts, 3);
        assert_eq!(summary.fuel_rounds, 2);
        // One per fuel round plus the final claim.
        assert_eq!(summary.daily_claims, 3);
        assert!(!summary.fuel_loop_capped);
        assert_eq!(server.user(1).unwrap().fuel, 0);
        assert_eq!(server.count("squad/fill/fuel"), 3);
        // Initial sweep plus one per fuel round.
        assert_eq!(server.count("mission"), 3);
    }

    #[tokio::test]
    async fn test_fuel_loop_is_capped() {
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(1, "one").fuel(4));
        // Boost always fails, so fuel never drains.
        server.fail_endpoint("squad/fill/fuel");
        let api = fake_api(&server);

        let outcome = SessionProcessor::new(&api, SweepOptions::default(), 3)
            .process(&session(1))
            .await;
        let SessionOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert!(summary.fuel_loop_capped);
        assert_eq!(summary.fuel_rounds, 3);
        assert_eq!(summary.boosts, 0);
        assert_eq!(summary.daily_claims, 4);
    }

    #[tokio::test]
    async fn test_status_failure_ends_fuel_loop_and_still_claims_daily() {
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(1, "one").fuel(9));
        server.fail_endpoint("user");
        let api = fake_api(&server);

        let outcome = processor(&api).process(&session(1)).await;
        assert!(outcome.is_completed());
        assert_eq!(server.count("squad/fill/fuel"), 0);
        assert_eq!(server.count("squad/claim/daily"), 1);
    }

    #[tokio::test]
    async fn test_failing_steps_do_not_stop_the_session() {
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(1, "one"));
        server.fail_endpoint("squad/claim/rank");
        server.fail_endpoint("squad/assistance");
        server.fail_endpoint("squad/assistance/request");
        server.fail_endpoint("mission");
        let api = fake_api(&server);

        let outcome = processor(&api).process(&session(1)).await;
        assert!(outcome.is_completed());
        assert_eq!(server.count("squad/claim/daily"), 1);
    }

    #[tokio::test]
    async fn test_full_session_collects_everything() {
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(1, "one").fuel(2).missions(vec![mission_group(
            1,
            "Daily",
            false,
            vec![mission(1, "Login", true, false), mission(2, "Boost", true, false)],
        )]));
        server.add_assistance(FakeAssistance::expiring_in(50, 7, "mate", 3 * 3600));
        let api = SquadApi::new(
            ApiClient::new(Arc::clone(&server), Duration::ZERO),
            SquadSettings {
                squad_missions: vec![EntityId::Num(77)],
                ..SquadSettings::default()
            },
        );

        let outcome = processor(&api).process(&session(1)).await;
        let SessionOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.boosts, 1);
        assert_eq!(summary.assistance_accepted, 1);
        assert_eq!(summary.missions_claimed, 3);
        assert_eq!(summary.squad_missions_claimed, 1);
        assert_eq!(summary.daily_claims, 1);

        let user = server.user(1).unwrap();
        assert_eq!(user.rank_claims, 1);
        assert_eq!(user.assistance_requests, 1);
        assert_eq!(user.squad_mission_claims, 1);
    }
}
