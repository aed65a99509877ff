//! Testing utilities for deterministic session and scheduler tests.

pub mod fake_server;

pub use fake_server::{FakeAssistance, FakeSquadServer, FakeUser};

use reqwest::Url;
use serde_json::json;
use squadrun_proto::{EntityId, Mission, MissionGroup};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ApiClient;
use crate::config::{SquadConfig, SquadSettings};
use crate::rewards::SquadApi;

/// A session line for user `id`, shaped like a launcher's init data.
pub fn session_line(id: i64, username: &str) -> String {
    let user = json!({
        "id": id,
        "first_name": "Pilot",
        "username": username,
        "language_code": "en",
        "allows_write_to_pm": true
    });
    let mut url = Url::parse("http://session.invalid/").expect("static base URL parses");
    url.query_pairs_mut()
        .append_pair("query_id", &format!("AAH{id}"))
        .append_pair("user", &user.to_string())
        .append_pair("auth_date", "1717000000")
        .append_pair("hash", &format!("deadbeef{id}"));
    url.query().unwrap_or_default().to_string()
}

pub fn mission(id: i64, name: &str, completed: bool, claimed: bool) -> Mission {
    Mission {
        mission_id: EntityId::Num(id),
        mission_name: name.to_string(),
        is_completed: completed,
        is_mission_reward_claimed: claimed,
    }
}

pub fn mission_group(id: i64, name: &str, claimed: bool, missions: Vec<Mission>) -> MissionGroup {
    MissionGroup {
        mission_group_id: EntityId::Num(id),
        mission_group_name: name.to_string(),
        is_group_reward_claimed: claimed,
        user_has_mission_list: missions,
    }
}

/// Configuration with pacing and cooldown switched off.
pub fn instant_config() -> SquadConfig {
    let mut config = SquadConfig::default();
    config.api.pacing_ms = 0;
    config.scheduler.cooldown_secs = 0;
    config
}

/// A `SquadApi` talking to `server` with no pacing delay.
pub fn fake_api(server: &Arc<FakeSquadServer>) -> SquadApi<Arc<FakeSquadServer>> {
    SquadApi::new(
        ApiClient::new(Arc::clone(server), Duration::ZERO),
        SquadSettings::default(),
    )
}
