//! Payload parsers for the server messages the client understands.
//!
//! Each parser takes one complete, framed message and returns a typed
//! value or a [`ProtocolError`] saying what was wrong with it. None of
//! them panic on malformed input; the caller decides whether a failure
//! means "skip this message" or something stronger.
//!
//! Inbound xt messages look like:
//!
//! ```text
//! {"b":{"r":-1,"o":{"_cmd":"server_list", ...fields...}},"t":"xt"}
//! ```
//!
//! and the interesting part is always the `b.o` object.

use serde_json::{Map, Value};
use tracing::warn;

use crate::codec::{decode_xml, decode_xt};
use crate::loose::decode_loose_list;
use crate::types::{
    AchievementEntry, AchievementReport, InventoryItem, LoginResult, RoomDescriptor,
    ServerDescriptor, ServerListReport,
};
use crate::ProtocolError;

/// Decodes an xt message and returns its `b.o` object.
fn xt_fields(msg: &str, what: &str) -> Result<Map<String, Value>, ProtocolError> {
    let mut root = decode_xt(msg)?;
    match root.pointer_mut("/b/o").map(Value::take) {
        Some(Value::Object(fields)) => Ok(fields),
        _ => Err(invalid(what, "invalid 'b.o'")),
    }
}

fn invalid(what: &str, detail: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::InvalidMessage(format!("{what}: {detail}"))
}

/// Returns the non-blank `list` string field.
fn list_field<'a>(fields: &'a Map<String, Value>, what: &str) -> Result<&'a str, ProtocolError> {
    match fields.get("list") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => Err(invalid(what, "missing/invalid 'list'")),
    }
}

/// Decodes a loose `list` field that must hold an array.
fn loose_array(
    raw: &str,
    field: &'static str,
) -> Result<Vec<Value>, ProtocolError> {
    match decode_loose_list(raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(invalid(field, "parsed 'list' not list")),
        Err(source) => Err(ProtocolError::Loose { field, source }),
    }
}

/// Lenient integer conversion: numbers (floats truncate), numeric
/// strings, and booleans all count. Anything else is `None`.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// server_list
// ---------------------------------------------------------------------------

/// Parses a `server_list` response.
///
/// `safeChat`, `rank`, and `userName` must be present with their exact
/// JSON types. Server names are trimmed. Entries without a usable `name`,
/// `ip`, or `port` are logged and left out; the rest of the list is kept.
pub fn parse_server_list(msg: &str) -> Result<ServerListReport, ProtocolError> {
    const WHAT: &str = "server_list";
    let fields = xt_fields(msg, WHAT)?;

    let safe_chat = fields
        .get("safeChat")
        .and_then(Value::as_bool)
        .ok_or_else(|| invalid(WHAT, "'safeChat' not bool"))?;
    let rank = fields
        .get("rank")
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid(WHAT, "'rank' not int"))?;
    let user_name = match fields.get("userName") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(invalid(WHAT, "'userName' not str")),
    };

    let raw = list_field(&fields, WHAT)?;
    let servers = loose_array(raw, WHAT)?
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<ServerDescriptor>(item) {
            Ok(mut server) => {
                server.name = server.name.trim().to_string();
                Some(server)
            }
            Err(e) => {
                warn!(index = i, error = %e, "skipping unusable server list entry");
                None
            }
        })
        .collect();

    Ok(ServerListReport {
        servers,
        safe_chat,
        rank,
        user_name,
    })
}

// ---------------------------------------------------------------------------
// rmList
// ---------------------------------------------------------------------------

/// Parses a sys `rmList` action.
///
/// ```text
/// <msg t='sys'><body action='rmList' r='0'><rmList>
///   <rm id='1' priv='0' temp='0' game='0' ucnt='1' lmb='1' maxu='10000' maxs='0'>
///     <n><![CDATA[game_lobby]]></n>
///   </rm>
/// </rmList></body></msg>
/// ```
///
/// With `clean` set, rooms with no users are dropped.
pub fn parse_room_list(msg: &str, clean: bool) -> Result<Vec<RoomDescriptor>, ProtocolError> {
    const WHAT: &str = "room_list";
    let root = decode_xml(msg)?;

    let rm_list = root
        .child("body")
        .ok_or_else(|| invalid(WHAT, "missing <body>"))?
        .child("rmList")
        .ok_or_else(|| invalid(WHAT, "missing <rmList>"))?;

    let int_attr = |rm: &crate::XmlElement, name: &str| {
        rm.attr(name).and_then(|v| v.trim().parse::<i64>().ok())
    };
    let flag_attr = |rm: &crate::XmlElement, name: &str| rm.attr(name).map(|v| v == "1");

    let rooms = rm_list
        .children_named("rm")
        .map(|rm| RoomDescriptor {
            id: int_attr(rm, "id"),
            name: rm.child_text("n").unwrap_or_default().trim().to_string(),
            user_count: int_attr(rm, "ucnt").unwrap_or(0),
            max_user_count: int_attr(rm, "maxu").unwrap_or(0),
            is_private: flag_attr(rm, "priv"),
            is_temporary: flag_attr(rm, "temp"),
            is_game: flag_attr(rm, "game"),
            min_level: int_attr(rm, "lmb"),
            max_spectators: int_attr(rm, "maxs"),
        })
        .filter(|room| !clean || room.user_count > 0)
        .collect();

    Ok(rooms)
}

// ---------------------------------------------------------------------------
// login_res
// ---------------------------------------------------------------------------

/// Parses a `login_res` response, keeping every field as sent.
pub fn parse_login_result(msg: &str) -> Result<LoginResult, ProtocolError> {
    xt_fields(msg, "login_res")
}

// ---------------------------------------------------------------------------
// achivment_res
// ---------------------------------------------------------------------------

/// Parses an `achivment_res` response (the server's spelling).
///
/// List entries use `ach` (achievement id), `ass` (step id), `prg`
/// (progress) and `p` (points). Entries without `ach` and `ass` can't be
/// keyed and are skipped; missing progress or points count as 0.
pub fn parse_achievements(msg: &str) -> Result<AchievementReport, ProtocolError> {
    const WHAT: &str = "achievement_res";
    let fields = xt_fields(msg, WHAT)?;
    let raw = list_field(&fields, WHAT)?;

    let is_update = match fields.get("update") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Bool(b)) => *b,
        _ => false,
    };

    let achievements = loose_array(raw, WHAT)?
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let field = |key: &str| item.get(key).and_then(as_int);
            Some(AchievementEntry {
                achievement_id: field("ach")?,
                step_id: field("ass")?,
                progress: field("prg").unwrap_or(0),
                points: field("p").unwrap_or(0),
            })
        })
        .collect();

    Ok(AchievementReport {
        user_id: fields.get("userId").and_then(as_int),
        level: fields.get("level").and_then(as_int),
        points_total: fields.get("points").and_then(as_int),
        is_update,
        achievements,
    })
}

// ---------------------------------------------------------------------------
// inv_list
// ---------------------------------------------------------------------------

/// Parses an `inv_list` response.
///
/// The list is a comma-separated string where each part is either an
/// item id (quantity 1) or `id-quantity`. Malformed parts are skipped.
pub fn parse_inventory(msg: &str) -> Result<Vec<InventoryItem>, ProtocolError> {
    const WHAT: &str = "inv_list";
    let fields = xt_fields(msg, WHAT)?;
    let raw = list_field(&fields, WHAT)?;

    let items = raw
        .split(',')
        .filter_map(|part| {
            let (id, quantity) = match part.split_once('-') {
                Some((id, qty)) => (id, qty.trim().parse().ok()?),
                None => (part, 1),
            };
            Some(InventoryItem {
                item_id: id.trim().parse().ok()?,
                quantity,
            })
        })
        .collect();

    Ok(items)
}
