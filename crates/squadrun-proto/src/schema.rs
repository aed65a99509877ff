//! Response schemas for the squad API.
//!
//! Field names follow the server's camelCase JSON. Every struct is decoded
//! fresh from a response and dropped once the caller has derived its next
//! action; nothing here is cached or written back.
//!
//! Only the fields the bot acts on are strict: ids, flags, `fuel`,
//! `expiredAt` and `accessToken`. Fields that are only logged accept a
//! missing or `null` value, so a cosmetic gap never discards a response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Decodes `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identifier as the server sent it, number or string.
///
/// Echoed back in claim bodies in the same form it was received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Num(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Num(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Num(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

/// Point in time sent as epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Rfc3339(DateTime<Utc>),
}

impl Timestamp {
    /// Epoch milliseconds.
    pub fn as_millis(&self) -> i64 {
        match self {
            Timestamp::Millis(ms) => *ms,
            Timestamp::Rfc3339(dt) => dt.timestamp_millis(),
        }
    }
}

/// `POST auth/telegram`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
}

/// `GET user`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub nick_name: String,
    /// Shown as sent; the server has used both numbers and strings.
    #[serde(default)]
    pub level: Value,
    #[serde(default)]
    pub squad_coin: Value,
    pub fuel: i64,
}

impl UserStatus {
    /// Whether there is fuel left to contribute.
    pub fn has_fuel(&self) -> bool {
        self.fuel > 0
    }
}

/// One reward line returned by a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reward_name: String,
    #[serde(default)]
    pub reward_amount: Value,
}

impl fmt::Display for RewardItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reward_amount {
            Value::String(amount) => write!(f, "{} +{amount}", self.reward_name),
            amount => write!(f, "{} +{amount}", self.reward_name),
        }
    }
}

/// Body shared by every claim-style endpoint.
///
/// Some endpoints (the daily claim in particular) answer without a reward
/// list; that decodes as an empty list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reward_item_list: Vec<RewardItem>,
}

/// A single mission inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub mission_id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mission_name: String,
    pub is_completed: bool,
    pub is_mission_reward_claimed: bool,
}

impl Mission {
    /// Completed but reward not yet collected.
    pub fn is_claimable(&self) -> bool {
        self.is_completed && !self.is_mission_reward_claimed
    }
}

/// A group of missions with its own completion reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionGroup {
    pub mission_group_id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mission_group_name: String,
    pub is_group_reward_claimed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_has_mission_list: Vec<Mission>,
}

impl MissionGroup {
    /// Group reward unclaimed and every mission in it completed.
    pub fn is_claimable(&self) -> bool {
        !self.is_group_reward_claimed && self.user_has_mission_list.iter().all(|m| m.is_completed)
    }
}

/// `GET mission`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub mission_list: Vec<MissionGroup>,
}

/// A help request posted by a squad member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistanceRequest {
    pub squad_assistance_request_id: EntityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nick_name: String,
    pub expired_at: Timestamp,
    pub is_request_mine: bool,
    pub is_accepted: bool,
}

/// `GET squad/assistance?squadName=...`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistanceList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub squad_assistance_info_list: Vec<AssistanceRequest>,
}
