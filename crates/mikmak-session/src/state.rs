//! What the client has learned about its account and the world.
//!
//! [`SessionState`] is owned by the orchestrator and only ever changes by
//! applying a [`SessionPatch`]. Transition handlers never touch the state
//! directly; they read it and return a patch.

use mikmak_protocol::{
    AchievementEntry, InventoryItem, LoginResult, RoomDescriptor, ServerDescriptor,
};

/// Accumulated account and world state. `None` means "not received yet".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub username: Option<String>,
    pub user_id: Option<i64>,
    /// Account level. Set from the server list, then kept in sync with
    /// achievement reports.
    pub rank: Option<i64>,
    pub xp: Option<i64>,
    pub safe_chat: Option<bool>,
    pub server_list: Option<Vec<ServerDescriptor>>,
    pub room_list: Option<Vec<RoomDescriptor>>,
    pub login_result: Option<LoginResult>,
    pub inventory: Option<Vec<InventoryItem>>,
    /// Merged achievement progress; empty until the first report.
    pub achievements: Vec<AchievementEntry>,
}

/// A set of field updates. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub username: Option<String>,
    pub user_id: Option<i64>,
    pub rank: Option<i64>,
    pub xp: Option<i64>,
    pub safe_chat: Option<bool>,
    pub server_list: Option<Vec<ServerDescriptor>>,
    pub room_list: Option<Vec<RoomDescriptor>>,
    pub login_result: Option<LoginResult>,
    pub inventory: Option<Vec<InventoryItem>>,
    pub achievements: Option<Vec<AchievementEntry>>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl SessionState {
    pub fn apply(&mut self, patch: SessionPatch) {
        fn set<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set(&mut self.username, patch.username);
        set(&mut self.user_id, patch.user_id);
        set(&mut self.rank, patch.rank);
        set(&mut self.xp, patch.xp);
        set(&mut self.safe_chat, patch.safe_chat);
        set(&mut self.server_list, patch.server_list);
        set(&mut self.room_list, patch.room_list);
        set(&mut self.login_result, patch.login_result);
        set(&mut self.inventory, patch.inventory);
        if let Some(achievements) = patch.achievements {
            self.achievements = achievements;
        }
    }
}
