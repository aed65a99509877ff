//! In-memory squad API for deterministic tests.
//!
//! `FakeSquadServer` implements [`Transport`] and keeps just enough state for
//! the claim flags to flip the way the real server's do: a claimed mission
//! stays claimed, an accepted request stays accepted, a boost drains fuel.
//! Every request is recorded so tests can assert on call order and bodies.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use squadrun_proto::{
    ApiError, ApiRequest, ApiResult, EntityId, Method, MissionGroup, Transport,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Per-user state held by the fake server.
#[derive(Debug, Clone)]
pub struct FakeUser {
    pub id: i64,
    pub nick_name: String,
    pub level: i64,
    pub squad_coin: i64,
    pub fuel: i64,
    /// Fuel values the user is left with after each successive boost. Once
    /// empty, a boost leaves zero fuel.
    pub fuel_refills: VecDeque<i64>,
    pub missions: Vec<MissionGroup>,
    pub boosts: u32,
    pub daily_claims: u32,
    pub rank_claims: u32,
    pub squad_mission_claims: u32,
    pub assistance_requests: u32,
}

impl FakeUser {
    pub fn new(id: i64, nick_name: impl Into<String>) -> Self {
        Self {
            id,
            nick_name: nick_name.into(),
            level: 1,
            squad_coin: 0,
            fuel: 0,
            fuel_refills: VecDeque::new(),
            missions: Vec::new(),
            boosts: 0,
            daily_claims: 0,
            rank_claims: 0,
            squad_mission_claims: 0,
            assistance_requests: 0,
        }
    }

    pub fn fuel(mut self, fuel: i64) -> Self {
        self.fuel = fuel;
        self
    }

    pub fn refills(mut self, refills: impl IntoIterator<Item = i64>) -> Self {
        self.fuel_refills = refills.into_iter().collect();
        self
    }

    pub fn missions(mut self, missions: Vec<MissionGroup>) -> Self {
        self.missions = missions;
        self
    }
}

/// An assistance request posted to the squad.
#[derive(Debug, Clone)]
pub struct FakeAssistance {
    pub id: EntityId,
    pub requester: i64,
    pub nick_name: String,
    pub expired_at_ms: i64,
    pub accepted_by: HashSet<i64>,
}

impl FakeAssistance {
    /// A request from `requester` expiring `secs` seconds from now.
    pub fn expiring_in(
        id: i64,
        requester: i64,
        nick_name: impl Into<String>,
        secs: i64,
    ) -> Self {
        Self {
            id: EntityId::Num(id),
            requester,
            nick_name: nick_name.into(),
            expired_at_ms: Utc::now().timestamp_millis() + secs * 1000,
            accepted_by: HashSet::new(),
        }
    }

    pub fn accepted_by(mut self, user: i64) -> Self {
        self.accepted_by.insert(user);
        self
    }
}

#[derive(Debug, Default)]
struct ServerState {
    users: HashMap<i64, FakeUser>,
    assistance: Vec<FakeAssistance>,
    rejected_logins: HashSet<i64>,
    failing: HashSet<String>,
    sticky_claims: bool,
    null_nicknames: bool,
    next_assistance_id: i64,
    requests: Vec<ApiRequest>,
}

/// Stateful stand-in for the squad API.
#[derive(Debug)]
pub struct FakeSquadServer {
    state: Mutex<ServerState>,
}

impl Default for FakeSquadServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSquadServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState {
                next_assistance_id: 9000,
                ..ServerState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, user: FakeUser) {
        self.lock().users.insert(user.id, user);
    }

    pub fn add_assistance(&self, request: FakeAssistance) {
        self.lock().assistance.push(request);
    }

    /// Makes login fail with 401 for this user id.
    pub fn reject_login(&self, user_id: i64) {
        self.lock().rejected_logins.insert(user_id);
    }

    /// Makes every call to `endpoint` (path without query) fail with 500.
    pub fn fail_endpoint(&self, endpoint: &str) {
        self.lock().failing.insert(endpoint.to_string());
    }

    /// Claims succeed but never flip their claimed flags.
    pub fn set_sticky_claims(&self, sticky: bool) {
        self.lock().sticky_claims = sticky;
    }

    /// Sends `nickName: null` in user and assistance responses.
    pub fn set_null_nicknames(&self, null: bool) {
        self.lock().null_nicknames = null;
    }

    /// Snapshot of a user's state.
    pub fn user(&self, user_id: i64) -> Option<FakeUser> {
        self.lock().users.get(&user_id).cloned()
    }

    /// Snapshot of the squad's assistance requests.
    pub fn assistance(&self) -> Vec<FakeAssistance> {
        self.lock().assistance.clone()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests made to `endpoint` (path without query).
    pub fn count(&self, endpoint: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.endpoint() == endpoint)
            .count()
    }

    /// Most recent request made to `endpoint`.
    pub fn last_request(&self, endpoint: &str) -> Option<ApiRequest> {
        self.lock()
            .requests
            .iter()
            .rev()
            .find(|r| r.endpoint() == endpoint)
            .cloned()
    }

    /// Endpoints of every request, in order.
    pub fn endpoints(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .map(|r| r.endpoint().to_string())
            .collect()
    }
}

fn status(path: &str, status: u16, body: &str) -> ApiError {
    ApiError::Status {
        path: path.to_string(),
        status,
        body: body.to_string(),
    }
}

fn rewards(name: &str, amount: i64) -> Value {
    json!({ "rewardItemList": [{ "rewardName": name, "rewardAmount": amount }] })
}

fn body_field<'a>(request: &'a ApiRequest, field: &str) -> Option<&'a Value> {
    request.body.as_ref().and_then(|b| b.get(field))
}

fn body_id(request: &ApiRequest, field: &str) -> Option<EntityId> {
    body_field(request, field).and_then(|v| serde_json::from_value(v.clone()).ok())
}

impl ServerState {
    fn handle(&mut self, request: &ApiRequest) -> ApiResult<Value> {
        let path = request.path.as_str();
        let endpoint = request.endpoint();

        if self.failing.contains(endpoint) {
            return Err(status(path, 500, "internal error"));
        }

        if (request.method, endpoint) == (Method::Post, "auth/telegram") {
            let user_id = request
                .body
                .as_ref()
                .and_then(|b| b.pointer("/initDataUnsafe/user/id"))
                .and_then(Value::as_i64)
                .ok_or_else(|| status(path, 400, "bad init data"))?;
            if self.rejected_logins.contains(&user_id) {
                return Err(status(path, 401, "invalid hash"));
            }
            self.users
                .entry(user_id)
                .or_insert_with(|| FakeUser::new(user_id, format!("user{user_id}")));
            return Ok(json!({ "accessToken": format!("token-{user_id}") }));
        }

        let user_id = request
            .token
            .as_deref()
            .and_then(|t| t.strip_prefix("token-"))
            .and_then(|id| id.parse::<i64>().ok())
            .filter(|id| self.users.contains_key(id))
            .ok_or_else(|| status(path, 401, "unauthorized"))?;
        let sticky = self.sticky_claims;
        let null_nicknames = self.null_nicknames;
        let nick = |name: &str| {
            if null_nicknames {
                Value::Null
            } else {
                json!(name)
            }
        };

        match (request.method, endpoint) {
            (Method::Get, "user") => {
                let user = &self.users[&user_id];
                Ok(json!({
                    "nickName": nick(&user.nick_name),
                    "level": user.level,
                    "squadCoin": user.squad_coin,
                    "fuel": user.fuel,
                }))
            }
            (Method::Post, "squad/fill/fuel") => {
                let amount = body_field(request, "fuelAmount")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| status(path, 400, "missing fuelAmount"))?;
                let user = self
                    .users
                    .get_mut(&user_id)
                    .ok_or_else(|| status(path, 404, "no user"))?;
                if amount <= 0 || amount > user.fuel {
                    return Err(status(path, 400, "not enough fuel"));
                }
                user.boosts += 1;
                user.squad_coin += amount;
                user.fuel = user.fuel_refills.pop_front().unwrap_or(0);
                Ok(rewards("SquadPoint", amount))
            }
            (Method::Post, "squad/claim/daily") => {
                if let Some(user) = self.users.get_mut(&user_id) {
                    user.daily_claims += 1;
                }
                Ok(rewards("SquadCoin", 100))
            }
            (Method::Post, "squad/claim/rank") => {
                if let Some(user) = self.users.get_mut(&user_id) {
                    user.rank_claims += 1;
                }
                Ok(rewards("RankChest", 1))
            }
            (Method::Post, "squadMission/claim") => {
                if let Some(user) = self.users.get_mut(&user_id) {
                    user.squad_mission_claims += 1;
                }
                Ok(rewards("Fuel", 5))
            }
            (Method::Get, "mission") => {
                let user = &self.users[&user_id];
                Ok(json!({ "missionList": user.missions }))
            }
            (Method::Post, "mission/claim") => {
                let id = body_id(request, "missionId")
                    .ok_or_else(|| status(path, 400, "missing missionId"))?;
                let user = self
                    .users
                    .get_mut(&user_id)
                    .ok_or_else(|| status(path, 404, "no user"))?;
                let mission = user
                    .missions
                    .iter_mut()
                    .flat_map(|g| g.user_has_mission_list.iter_mut())
                    .find(|m| m.mission_id == id)
                    .ok_or_else(|| status(path, 404, "unknown mission"))?;
                if !mission.is_claimable() {
                    return Err(status(path, 400, "mission not claimable"));
                }
                if !sticky {
                    mission.is_mission_reward_claimed = true;
                }
                Ok(rewards("SquadCoin", 50))
            }
            (Method::Post, "mission/claim/group") => {
                let id = body_id(request, "missionGroupId")
                    .ok_or_else(|| status(path, 400, "missing missionGroupId"))?;
                let user = self
                    .users
                    .get_mut(&user_id)
                    .ok_or_else(|| status(path, 404, "no user"))?;
                let group = user
                    .missions
                    .iter_mut()
                    .find(|g| g.mission_group_id == id)
                    .ok_or_else(|| status(path, 404, "unknown group"))?;
                if !group.is_claimable() {
                    return Err(status(path, 400, "group not claimable"));
                }
                if !sticky {
                    group.is_group_reward_claimed = true;
                }
                Ok(rewards("Fuel", 10))
            }
            (Method::Get, "squad/assistance") => {
                let list: Vec<Value> = self
                    .assistance
                    .iter()
                    .map(|a| {
                        json!({
                            "squadAssistanceRequestId": a.id,
                            "nickName": nick(&a.nick_name),
                            "expiredAt": a.expired_at_ms,
                            "isRequestMine": a.requester == user_id,
                            "isAccepted": a.accepted_by.contains(&user_id),
                        })
                    })
                    .collect();
                Ok(json!({ "squadAssistanceInfoList": list }))
            }
            (Method::Post, "squad/assistance/accept") => {
                let id = body_id(request, "squadAssistanceRequestId")
                    .ok_or_else(|| status(path, 400, "missing request id"))?;
                let entry = self
                    .assistance
                    .iter_mut()
                    .find(|a| a.id == id)
                    .ok_or_else(|| status(path, 404, "unknown request"))?;
                if entry.requester == user_id || entry.accepted_by.contains(&user_id) {
                    return Err(status(path, 400, "cannot accept"));
                }
                if !sticky {
                    entry.accepted_by.insert(user_id);
                }
                Ok(rewards("SquadCoin", 20))
            }
            (Method::Post, "squad/assistance/request") => {
                let id = self.next_assistance_id;
                self.next_assistance_id += 1;
                let nick = self.users[&user_id].nick_name.clone();
                self.assistance
                    .push(FakeAssistance::expiring_in(id, user_id, nick, 24 * 3600));
                if let Some(user) = self.users.get_mut(&user_id) {
                    user.assistance_requests += 1;
                }
                Ok(rewards("Fuel", 1))
            }
            _ => Err(status(path, 404, "not found")),
        }
    }
}

#[async_trait]
impl Transport for FakeSquadServer {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        state.handle(request)
    }
}
