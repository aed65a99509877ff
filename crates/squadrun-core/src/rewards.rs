//! Reward claim primitives.
//!
//! Each operation is exactly one API call. On success the returned rewards
//! are logged one per line; on failure a single notice goes to the error
//! channel and the operation yields `None`. Nothing here retries: callers
//! treat `None` as "nothing changed" and move on.

use reqwest::Url;
use serde_json::json;
use squadrun_proto::{
    ApiRequest, AssistanceList, AuthResponse, EntityId, MissionList, RewardItem, RewardResponse,
    Transport, UserStatus,
};
use tracing::{error, info};

use crate::client::ApiClient;
use crate::config::SquadSettings;
use crate::session::SessionDescriptor;

/// API client bound to one squad's identity and claim parameters.
pub struct SquadApi<T> {
    client: ApiClient<T>,
    squad: SquadSettings,
}

impl<T: Transport> SquadApi<T> {
    pub fn new(client: ApiClient<T>, squad: SquadSettings) -> Self {
        Self { client, squad }
    }

    pub fn squad(&self) -> &SquadSettings {
        &self.squad
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    /// Exchanges a session for an access token.
    pub async fn login(&self, session: &SessionDescriptor) -> Option<String> {
        info!(user = %session.user.display_name(), "Authenticating");
        let request = ApiRequest::post("auth/telegram", session.auth_payload());
        match self.client.call::<AuthResponse>(request).await {
            Ok(auth) => {
                info!(user = %session.user.display_name(), "Login succeeded");
                Some(auth.access_token)
            }
            Err(_) => {
                error!(user = %session.user.display_name(), "Login failed");
                None
            }
        }
    }

    /// Fetches nickname, level, coin balance and fuel.
    pub async fn fetch_user(&self, token: &str) -> Option<UserStatus> {
        info!("Fetching user status");
        match self
            .client
            .call::<UserStatus>(ApiRequest::get("user").with_token(token))
            .await
        {
            Ok(user) => {
                info!(
                    nickname = %user.nick_name,
                    level = %user.level,
                    squad_coin = %user.squad_coin,
                    fuel = user.fuel,
                    "User status"
                );
                Some(user)
            }
            Err(_) => {
                error!("Failed to fetch user status");
                None
            }
        }
    }

    /// Contributes `fuel` to the squad ("boost").
    pub async fn boost(&self, token: &str, fuel: i64) -> Option<Vec<RewardItem>> {
        let body = json!({ "squadName": self.squad.name, "fuelAmount": fuel });
        let request = ApiRequest::post("squad/fill/fuel", body).with_token(token);
        self.claim("squad boost", request).await
    }

    pub async fn claim_daily(&self, token: &str) -> Option<Vec<RewardItem>> {
        let body = json!({ "squadName": self.squad.name, "grade": self.squad.daily_grade });
        let request = ApiRequest::post("squad/claim/daily", body).with_token(token);
        self.claim("daily squad reward", request).await
    }

    pub async fn claim_rank(&self, token: &str) -> Option<Vec<RewardItem>> {
        let body = json!({ "squadName": self.squad.name });
        let request = ApiRequest::post("squad/claim/rank", body).with_token(token);
        self.claim("rank reward", request).await
    }

    pub async fn claim_mission(
        &self,
        token: &str,
        mission_id: &EntityId,
    ) -> Option<Vec<RewardItem>> {
        let body = json!({ "missionId": mission_id });
        let request = ApiRequest::post("mission/claim", body).with_token(token);
        self.claim("mission reward", request).await
    }

    pub async fn claim_group_mission(
        &self,
        token: &str,
        group_id: &EntityId,
    ) -> Option<Vec<RewardItem>> {
        let body = json!({ "missionGroupId": group_id });
        let request = ApiRequest::post("mission/claim/group", body).with_token(token);
        self.claim("mission group reward", request).await
    }

    pub async fn claim_squad_mission(
        &self,
        token: &str,
        squad_mission_id: &EntityId,
    ) -> Option<Vec<RewardItem>> {
        let body = json!({
            "squadName": self.squad.name,
            "squadMissionId": squad_mission_id,
            "targetStepCount": self.squad.mission_target_steps,
        });
        let request = ApiRequest::post("squadMission/claim", body).with_token(token);
        self.claim("squad mission reward", request).await
    }

    pub async fn accept_assistance(
        &self,
        token: &str,
        request_id: &EntityId,
    ) -> Option<Vec<RewardItem>> {
        let body = json!({
            "squadName": self.squad.name,
            "squadAssistanceRequestId": request_id,
        });
        let request = ApiRequest::post("squad/assistance/accept", body).with_token(token);
        self.claim("assistance acceptance", request).await
    }

    pub async fn request_assistance(&self, token: &str) -> Option<Vec<RewardItem>> {
        let body = json!({ "squadName": self.squad.name });
        let request = ApiRequest::post("squad/assistance/request", body).with_token(token);
        self.claim("assistance request", request).await
    }

    /// Lists the squad's open assistance requests.
    pub async fn list_assistance(&self, token: &str) -> Option<AssistanceList> {
        info!(squad = %self.squad.name, "Fetching assistance requests");
        let request = ApiRequest::get(assistance_path(&self.squad.name)).with_token(token);
        match self.client.call::<AssistanceList>(request).await {
            Ok(list) => Some(list),
            Err(_) => {
                error!("Failed to fetch assistance requests");
                None
            }
        }
    }

    /// Lists mission groups and their missions.
    pub async fn list_missions(&self, token: &str) -> Option<MissionList> {
        info!("Fetching missions");
        match self
            .client
            .call::<MissionList>(ApiRequest::get("mission").with_token(token))
            .await
        {
            Ok(list) => Some(list),
            Err(_) => {
                error!("Failed to fetch missions");
                None
            }
        }
    }

    async fn claim(&self, action: &str, request: ApiRequest) -> Option<Vec<RewardItem>> {
        info!("Claiming {action}");
        match self.client.call::<RewardResponse>(request).await {
            Ok(resp) => {
                if resp.reward_item_list.is_empty() {
                    info!("{action}: accepted, no rewards listed");
                }
                for reward in &resp.reward_item_list {
                    info!("  {reward}");
                }
                Some(resp.reward_item_list)
            }
            Err(_) => {
                error!("Failed: {action}");
                None
            }
        }
    }
}

/// `squad/assistance?squadName=<name>` with the name form-encoded.
fn assistance_path(squad: &str) -> String {
    match Url::parse_with_params("http://squad.invalid/", &[("squadName", squad)]) {
        Ok(url) => format!("squad/assistance?{}", url.query().unwrap_or_default()),
        Err(_) => format!("squad/assistance?squadName={squad}"),
    }
}
