//! Typed payloads decoded from server messages.
//!
//! These are the values the rest of the client works with once a raw
//! message has been framed, decoded, and parsed. They are immutable
//! snapshots: a new server message produces new values rather than
//! mutating old ones.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// Client version announced in the `verChk` action.
pub const CLIENT_VERSION: u32 = 165;

/// Zone name sent with every login.
pub const LOGIN_ZONE: &str = "VW";

/// Password prefix used when re-authenticating after a server switch.
pub const CLUSTER_PASSWORD_PREFIX: &str = "cluster_";

/// Command that asks the game server to place the avatar in a room.
pub const JOIN_ROOM_COMMAND: &str = "avt_joinRoom";

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

/// One entry of the cluster's server list.
///
/// The wire keys are kept as the server spells them (`capicity`, `dt`),
/// so this type deserializes straight from a parsed list entry. `id` and
/// `port` accept numeric strings as well as numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// `0` when the entry doesn't carry one.
    #[serde(default, deserialize_with = "lenient_int")]
    pub id: i64,
    /// Display name, trimmed. The wire form sometimes has trailing spaces.
    pub name: String,
    pub ip: String,
    #[serde(deserialize_with = "lenient_int")]
    pub port: u16,
    /// Load as a fraction of capacity. Negative for servers that don't
    /// report load.
    #[serde(rename = "capicity", default)]
    pub capacity: f64,
    /// Server-side timestamp of the list, `YYYYMMDDhhmm`.
    #[serde(rename = "dt", default)]
    pub timestamp: i64,
    /// Safe-chat-only server, when the server says so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe: Option<bool>,
}

/// Integer field that may arrive as a number (`443`, `443.0`) or a
/// numeric string (`"443"`), checked against the target type's range.
fn lenient_int<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: TryFrom<i64>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    let n = match &value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| D::Error::custom(format!("expected integer, got {value}")))?;

    T::try_from(n).map_err(|_| D::Error::custom(format!("integer {n} out of range")))
}

/// The servers the cluster is known to advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownServer {
    Kiwi,
    Krembo,
    Admins,
}

impl KnownServer {
    pub const ALL: [KnownServer; 3] = [Self::Kiwi, Self::Krembo, Self::Admins];

    /// The name as it appears in the server list.
    pub fn name(self) -> &'static str {
        match self {
            Self::Kiwi => "קיווי",
            Self::Krembo => "קרמבו",
            Self::Admins => "מנהלים",
        }
    }
}

impl fmt::Display for KnownServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed `server_list` response: the servers plus the account details
/// the login server sends alongside them.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerListReport {
    pub servers: Vec<ServerDescriptor>,
    pub safe_chat: bool,
    pub rank: i64,
    pub user_name: String,
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// One `<rm>` element of a room list.
///
/// The optional flags are only set when the server sent the matching
/// attribute (`priv`, `temp`, `game`, `lmb`, `maxs`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomDescriptor {
    pub id: Option<i64>,
    pub name: String,
    pub user_count: i64,
    pub max_user_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_temporary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_game: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_spectators: Option<i64>,
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

/// Identifies one step of one achievement. Displays as `"ach:step"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AchievementKey {
    pub achievement_id: i64,
    pub step_id: i64,
}

impl fmt::Display for AchievementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.achievement_id, self.step_id)
    }
}

/// Progress on one achievement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementEntry {
    pub achievement_id: i64,
    pub step_id: i64,
    pub progress: i64,
    pub points: i64,
}

impl AchievementEntry {
    pub fn key(&self) -> AchievementKey {
        AchievementKey {
            achievement_id: self.achievement_id,
            step_id: self.step_id,
        }
    }
}

/// Parsed `achivment_res` response.
///
/// `is_update == false` means `achievements` is a full snapshot;
/// `true` means it only lists the entries that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementReport {
    pub user_id: Option<i64>,
    pub level: Option<i64>,
    pub points_total: Option<i64>,
    pub is_update: bool,
    pub achievements: Vec<AchievementEntry>,
}

// ---------------------------------------------------------------------------
// Login result and inventory
// ---------------------------------------------------------------------------

/// The fields of a `login_res` response, kept as the server sent them.
pub type LoginResult = serde_json::Map<String, serde_json::Value>;

/// One inventory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: i64,
    pub quantity: i64,
}
