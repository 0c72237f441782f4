//! The login handshake as pure transition functions.
//!
//! The handshake runs over two connections. The login server checks the
//! client version, authenticates, and hands out the server list. The
//! chosen game server authenticates again and streams the world state:
//!
//! ```text
//! login server                        game server
//! ───────────                         ───────────
//! → verChk                            → verChk
//! ← apiOK                             ← apiOK
//! → login (password)                  → login (cluster_ + password)
//! ← server_list ──(switch server)──→  ← rmList, login_res
//!                                     ← achivment_res
//!                                     → avt_joinRoom      (only here)
//! ```
//!
//! [`step`] looks at the current state and one inbound message and says
//! what should happen: a [`SessionPatch`] to apply, messages to send,
//! notifications to publish, and optionally a [`Directive`] for the
//! connection itself. It never does any of it; the orchestrator does.
//!
//! Messages are recognised by content markers rather than fully decoded
//! first, the same way the server's own clients tell them apart.

use std::fmt;

use mikmak_protocol::{
    parse_achievements, parse_inventory, parse_login_result, parse_room_list, parse_server_list,
    Envelope, ServerDescriptor, CLIENT_VERSION, CLUSTER_PASSWORD_PREFIX, JOIN_ROOM_COMMAND,
    LOGIN_ZONE,
};
use serde_json::json;

use crate::events::SessionEvent;
use crate::merge::merge;
use crate::state::{SessionPatch, SessionState};

const CROSS_DOMAIN_POLICY: &str = "<cross-domain-policy>";
const MARK_API_OK: &str = "action='apiOK'";
const MARK_SERVER_LIST: &str = r#""_cmd":"server_list""#;
const MARK_ROOM_LIST: &str = "action='rmList'";
const MARK_LOGIN_RES: &str = r#""_cmd":"login_res""#;
const MARK_ACHIEVEMENTS: &str = r#""_cmd":"achivment_res""#;
const MARK_INVENTORY: &str = r#""_cmd":"inv_list""#;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where the session is in the login sequence.
///
/// ```text
/// Connecting → VersionCheckSent → AwaitingServerList → ServerChosen
///     → Reconnecting → Connecting → VersionCheckSent → AuthSent
///     → AwaitingRoomJoin → InGame
/// ```
///
/// Any unexpected disconnect goes to `Reconnecting`; `Stopped` is final.
///
/// On the login server the server list is the reply to the login itself,
/// so sending the login there moves straight to `AwaitingServerList`.
/// `AuthSent` is only used on the game server, where the login is
/// answered by `login_res` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    VersionCheckSent,
    /// Login sent to the game server, waiting for `login_res`.
    AuthSent,
    /// Login sent to the login server, waiting for the server list.
    AwaitingServerList,
    ServerChosen,
    Reconnecting,
    /// Login accepted by the game server; the join goes out once the
    /// achievement report arrives.
    AwaitingRoomJoin,
    InGame,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Read-only inputs a transition needs besides the state.
#[derive(Debug, Clone)]
pub struct HandshakeContext<'a> {
    pub username: &'a str,
    pub password: &'a str,
    /// `true` while talking to the login server.
    pub first_connection: bool,
    pub server_to_join: Option<&'a str>,
    pub clean_ingame: bool,
}

/// What the connection should do next, beyond sending messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Leave this server and log in to `server`.
    SwitchServer(ServerDescriptor),
    /// No server to join; stop the session.
    Terminate,
}

/// The outcome of one transition, applied by the orchestrator in order:
/// patch, events, outgoing messages, directive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub patch: SessionPatch,
    pub outgoing: Vec<String>,
    pub events: Vec<SessionEvent>,
    pub directive: Option<Directive>,
    pub phase: Option<Phase>,
}

impl Step {
    fn send(&mut self, message: String) {
        self.outgoing.push(message);
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// The first thing sent on every connection.
pub fn on_connect() -> Step {
    Step {
        outgoing: vec![
            Envelope::system("verChk", format!("<ver v='{CLIENT_VERSION}' />")).encode(),
        ],
        phase: Some(Phase::VersionCheckSent),
        ..Step::default()
    }
}

/// Handles one inbound message.
///
/// A message that fails to parse is logged and ends handling of that
/// message; whatever the step had gathered up to that point still
/// applies.
pub fn step(state: &SessionState, ctx: &HandshakeContext<'_>, msg: &str) -> Step {
    let mut step = Step::default();
    if msg.starts_with(CROSS_DOMAIN_POLICY) {
        return step;
    }

    if msg.contains(MARK_API_OK) {
        let password = if ctx.first_connection {
            ctx.password.to_string()
        } else {
            format!("{CLUSTER_PASSWORD_PREFIX}{}", ctx.password)
        };
        step.send(login_message(ctx.username, &password));
        step.phase = Some(if ctx.first_connection {
            Phase::AwaitingServerList
        } else {
            Phase::AuthSent
        });
    }

    if ctx.first_connection && msg.contains(MARK_SERVER_LIST) {
        let report = match parse_server_list(msg) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse server list");
                return step;
            }
        };

        step.patch.username = Some(report.user_name);
        step.patch.rank = Some(report.rank);
        step.patch.safe_chat = Some(report.safe_chat);
        step.patch.server_list = Some(report.servers.clone());

        let chosen = ctx.server_to_join.and_then(|wanted| {
            report
                .servers
                .iter()
                .find(|server| server.name.contains(wanted))
                .cloned()
        });
        step.events.push(SessionEvent::ServerList(report.servers));

        match chosen {
            Some(server) => {
                step.phase = Some(Phase::ServerChosen);
                step.directive = Some(Directive::SwitchServer(server));
            }
            None => {
                step.phase = Some(Phase::Stopped);
                step.directive = Some(Directive::Terminate);
            }
        }
    }

    if msg.contains(MARK_ROOM_LIST) {
        match parse_room_list(msg, ctx.clean_ingame) {
            Ok(rooms) => {
                step.patch.room_list = Some(rooms.clone());
                step.events.push(SessionEvent::RoomList(rooms));
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse room list");
                return step;
            }
        }
    }

    if msg.contains(MARK_LOGIN_RES) {
        match parse_login_result(msg) {
            Ok(result) => {
                step.patch.login_result = Some(result.clone());
                step.events.push(SessionEvent::LoginResult(result));
                step.phase = Some(Phase::AwaitingRoomJoin);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse login result");
                return step;
            }
        }
    }

    if msg.contains(MARK_ACHIEVEMENTS) {
        let report = match parse_achievements(msg) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse achievements");
                return step;
            }
        };

        if let (Some(known), Some(level)) = (state.rank, report.level) {
            if known != level {
                tracing::warn!(level, rank = known, "achievement level differs from login rank");
            }
        }

        step.patch.user_id = report.user_id;
        step.patch.rank = report.level;
        step.patch.xp = report.points_total;
        step.patch.achievements = Some(merge(
            &state.achievements,
            &report.achievements,
            report.is_update,
        ));
        step.events.push(SessionEvent::AchievementResult {
            achievements: report.achievements,
            is_update: report.is_update,
        });

        step.send(Envelope::command(JOIN_ROOM_COMMAND, json!({ "auto": 1 })).encode());
        step.phase = Some(Phase::InGame);
    }

    if msg.contains(MARK_INVENTORY) {
        match parse_inventory(msg) {
            Ok(items) => {
                step.patch.inventory = Some(items.clone());
                step.events.push(SessionEvent::Inventory(items));
            }
            Err(e) => tracing::warn!(error = %e, "failed to parse inventory"),
        }
    }

    step
}

fn login_message(username: &str, password: &str) -> String {
    Envelope::system(
        "login",
        format!(
            "<login z='{LOGIN_ZONE}'><nick><![CDATA[{username}]]></nick>\
             <pword><![CDATA[{password}]]></pword></login>"
        ),
    )
    .encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    const API_OK: &str = "<msg t='sys'><body action='apiOK' r='0'></body></msg>";

    const SERVER_LIST: &str = r#"{"b":{"r":-1,"o":{"safeChat":false,"_cmd":"server_list","rank":1,"userName":"בוט11011","list":"[{\"id\":4,\"name\":'קיווי',\"ip\":'213.8.147.198',\"port\":443,\"capicity\":0.2,\"dt\":202602231555},{\"id\":7,\"name\":'קרמבו ',\"ip\":'213.8.147.201',\"port\":443,\"capicity\":0.0,\"safe\":true,\"dt\":202602231555}]"}},"t":"xt"}"#;

    const ROOM_LIST: &str = "<msg t='sys'><body action='rmList' r='0'><rmList><rm id='1' priv='0' temp='0' game='0' ucnt='1' lmb='1' maxu='10000' maxs='0'><n><![CDATA[game_lobby]]></n></rm><rm id='2' priv='0' temp='0' game='0' ucnt='0' lmb='1' maxu='100000' maxs='0'><n><![CDATA[lobby]]></n></rm></rmList></body></msg>";

    const LOGIN_RES: &str = r#"{"b":{"r":-1,"o":{"_cmd":"login_res","ok":true,"id":16340305}},"t":"xt"}"#;

    const ACHIEVEMENTS: &str = r#"{"b":{"r":-1,"o":{"level":2,"_cmd":"achivment_res","list":"[{'ach':1,'ass':1,'p':0,'prg':100},{'ach':26,'ass':1,'p':0,'prg':16}]","userId":16340305,"points":160}},"t":"xt"}"#;

    const ACHIEVEMENT_UPDATE: &str = r#"{"b":{"r":-1,"o":{"level":2,"_cmd":"achivment_res","update":"true","list":"[{'ach':26,'ass':1,'p':0,'prg':18},{'ach':30,'ass':1,'p':10,'prg':100}]","userId":16340305,"points":170}},"t":"xt"}"#;

    const INVENTORY: &str = r#"{"b":{"r":-1,"o":{"_cmd":"inv_list","list":"3501,1895,3461-2"}},"t":"xt"}"#;

    const JOIN: &str = r#"{"b":{"c":"avt_joinRoom","p":{"auto":1},"r":-1,"x":"ExtManager"},"t":"xt"}"#;

    fn ctx(first_connection: bool) -> HandshakeContext<'static> {
        HandshakeContext {
            username: "בוט11011",
            password: "secret",
            first_connection,
            server_to_join: Some("קרמבו"),
            clean_ingame: true,
        }
    }

    // =========================================================================
    // Login
    // =========================================================================

    #[test]
    fn test_on_connect_sends_version_check() {
        let step = on_connect();
        assert_eq!(
            step.outgoing,
            ["<msg t='sys'><body action='verChk' r='0'><ver v='165' /></body></msg>"]
        );
        assert_eq!(step.phase, Some(Phase::VersionCheckSent));
    }

    #[test]
    fn test_api_ok_logs_in_with_plain_password_first() {
        let step = step(&SessionState::default(), &ctx(true), API_OK);
        assert_eq!(
            step.outgoing,
            ["<msg t='sys'><body action='login' r='0'><login z='VW'><nick><![CDATA[בוט11011]]></nick><pword><![CDATA[secret]]></pword></login></body></msg>"]
        );
        assert_eq!(step.phase, Some(Phase::AwaitingServerList));
    }

    #[test]
    fn test_api_ok_uses_cluster_password_after_switch() {
        let step = step(&SessionState::default(), &ctx(false), API_OK);
        assert_eq!(step.outgoing.len(), 1);
        assert!(step.outgoing[0].contains("<pword><![CDATA[cluster_secret]]></pword>"));
        assert_eq!(step.phase, Some(Phase::AuthSent));
    }

    #[test]
    fn test_cross_domain_policy_is_ignored() {
        let msg = "<cross-domain-policy><allow-access-from domain='*' to-ports='443' /> action='apiOK'</cross-domain-policy>";
        assert_eq!(step(&SessionState::default(), &ctx(true), msg), Step::default());
    }

    #[test]
    fn test_unknown_message_does_nothing() {
        let msg = r#"{"b":{"r":-1,"o":{"_cmd":"something_else"}},"t":"xt"}"#;
        assert_eq!(step(&SessionState::default(), &ctx(false), msg), Step::default());
    }

    // =========================================================================
    // Server list
    // =========================================================================

    #[test]
    fn test_server_list_selects_by_substring() {
        let step = step(&SessionState::default(), &ctx(true), SERVER_LIST);

        assert_eq!(step.patch.username.as_deref(), Some("בוט11011"));
        assert_eq!(step.patch.rank, Some(1));
        assert_eq!(step.patch.safe_chat, Some(false));
        assert_eq!(step.patch.server_list.as_ref().map(Vec::len), Some(2));
        assert!(matches!(&step.events[..], [SessionEvent::ServerList(servers)] if servers.len() == 2));

        let Some(Directive::SwitchServer(server)) = &step.directive else {
            panic!("expected a switch, got {:?}", step.directive);
        };
        assert_eq!(server.id, 7);
        assert_eq!((server.ip.as_str(), server.port), ("213.8.147.201", 443));
        assert_eq!(step.phase, Some(Phase::ServerChosen));
        assert!(step.outgoing.is_empty());
    }

    #[test]
    fn test_server_list_without_match_terminates() {
        let context = HandshakeContext {
            server_to_join: Some("nowhere"),
            ..ctx(true)
        };
        let step = step(&SessionState::default(), &context, SERVER_LIST);
        assert_eq!(step.directive, Some(Directive::Terminate));
        assert_eq!(step.events.len(), 1);
        assert_eq!(step.phase, Some(Phase::Stopped));
    }

    #[test]
    fn test_server_list_with_no_server_wanted_terminates() {
        let context = HandshakeContext {
            server_to_join: None,
            ..ctx(true)
        };
        let step = step(&SessionState::default(), &context, SERVER_LIST);
        assert_eq!(step.directive, Some(Directive::Terminate));
    }

    #[test]
    fn test_server_list_ignored_on_game_server() {
        let step = step(&SessionState::default(), &ctx(false), SERVER_LIST);
        assert_eq!(step, Step::default());
    }

    #[test]
    fn test_broken_server_list_is_skipped() {
        let msg = r#"{"b":{"r":-1,"o":{"_cmd":"server_list","rank":1}},"t":"xt"}"#;
        let step = step(&SessionState::default(), &ctx(true), msg);
        assert!(step.patch.is_empty());
        assert!(step.events.is_empty());
        assert_eq!(step.directive, None);
    }

    // =========================================================================
    // Game server state
    // =========================================================================

    #[test]
    fn test_room_list_is_cleaned_and_published() {
        let step = step(&SessionState::default(), &ctx(false), ROOM_LIST);
        let rooms = step.patch.room_list.expect("room list patched");
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "game_lobby");
        assert!(step.outgoing.is_empty());
    }

    #[test]
    fn test_login_result_does_not_join_yet() {
        let step = step(&SessionState::default(), &ctx(false), LOGIN_RES);
        assert!(step.patch.login_result.is_some());
        assert!(matches!(&step.events[..], [SessionEvent::LoginResult(_)]));
        assert!(step.outgoing.is_empty());
        assert_eq!(step.phase, Some(Phase::AwaitingRoomJoin));
    }

    #[test]
    fn test_achievements_trigger_the_join() {
        let state = SessionState {
            rank: Some(1),
            ..SessionState::default()
        };
        let step = step(&state, &ctx(false), ACHIEVEMENTS);

        assert_eq!(step.patch.user_id, Some(16340305));
        assert_eq!(step.patch.rank, Some(2));
        assert_eq!(step.patch.xp, Some(160));
        assert_eq!(step.patch.achievements.as_ref().map(Vec::len), Some(2));
        assert!(matches!(
            &step.events[..],
            [SessionEvent::AchievementResult { is_update: false, achievements }] if achievements.len() == 2
        ));
        assert_eq!(step.outgoing, [JOIN]);
        assert_eq!(step.phase, Some(Phase::InGame));
    }

    #[test]
    fn test_rank_disagreement_only_warns() {
        let known = |rank| SessionState {
            rank: Some(rank),
            ..SessionState::default()
        };
        // Login said rank 1, the achievement report says level 2.
        let mismatched = step(&known(1), &ctx(false), ACHIEVEMENTS);
        let matching = step(&known(2), &ctx(false), ACHIEVEMENTS);

        assert_eq!(mismatched, matching);
        assert_eq!(mismatched.outgoing, [JOIN]);
        assert_eq!(mismatched.patch.rank, Some(2));
        assert_eq!(mismatched.directive, None);
    }

    #[test]
    fn test_achievement_update_merges_into_state() {
        let mut state = SessionState::default();
        state.apply(step(&state, &ctx(false), ACHIEVEMENTS).patch);

        let update = step(&state, &ctx(false), ACHIEVEMENT_UPDATE);
        let merged = update.patch.achievements.expect("achievements patched");
        let keys: Vec<String> = merged.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, ["1:1", "26:1", "30:1"]);
        assert_eq!(merged[1].progress, 18);

        // The event carries only the delta.
        assert!(matches!(
            &update.events[..],
            [SessionEvent::AchievementResult { is_update: true, achievements }] if achievements.len() == 2
        ));
        assert_eq!(update.outgoing, [JOIN]);
    }

    #[test]
    fn test_broken_achievements_do_not_join() {
        let msg = r#"{"b":{"r":-1,"o":{"_cmd":"achivment_res","list":"[{'ach':"}},"t":"xt"}"#;
        let step = step(&SessionState::default(), &ctx(false), msg);
        assert!(step.outgoing.is_empty());
        assert!(step.events.is_empty());
    }

    #[test]
    fn test_inventory_is_stored() {
        let step = step(&SessionState::default(), &ctx(false), INVENTORY);
        let items = step.patch.inventory.expect("inventory patched");
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].quantity, 2);
        assert!(matches!(&step.events[..], [SessionEvent::Inventory(_)]));
    }
}
