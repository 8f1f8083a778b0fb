//! Reconstructed record types (spec §4.8): "Produces immutable records
//! (weapons, armor, NPCs, cells, worldspaces, quests, etc.) with
//! semantically typed fields."
//!
//! Every record shares a common prefix (form id, signature, header flags);
//! [`RecordData`] is a tagged union over the record kinds this crate
//! vouches for. Fields are deliberately representative rather than
//! exhaustive — an editor-id plus the handful of numeric fields this crate
//! can name with confidence — rather than a guess at a complete struct
//! layout this crate was never shown (spec §9's "do not fabricate
//! behavior" applies to record fields the same way it applies to the
//! TOFT/INFO merge).

use crate::esm::subrecord::{iter_subrecords, SubrecordSlice};
use crate::primitives;
use std::collections::HashMap;

/// Fields carried by every record regardless of kind (spec §3, "Record
/// header").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCommon {
    pub signature: [u8; 4],
    pub form_id: u32,
    pub flags: u32,
}

/// The editor id most record kinds carry in an `EDID` subrecord, decoded as
/// lossy UTF-8 (editor ids are ASCII in practice) with the trailing NUL
/// stripped.
fn editor_id(payload: &[u8], subs: &[SubrecordSlice]) -> Option<String> {
    let edid = subs.iter().find(|s| &s.signature == b"EDID")?;
    let body = &payload[edid.body_offset..edid.body_offset + edid.body_len];
    let trimmed = body.strip_suffix(&[0u8]).unwrap_or(body);
    Some(String::from_utf8_lossy(trimmed).into_owned())
}

fn find_body<'a>(payload: &'a [u8], subs: &[SubrecordSlice], sig: &[u8; 4]) -> Option<&'a [u8]> {
    let s = subs.iter().find(|s| &s.signature == sig)?;
    Some(&payload[s.body_offset..s.body_offset + s.body_len])
}

/// A reconstructed weapon (`WEAP`): editor id plus its base damage and
/// value, both known `DATA` subrecord fields for this record family.
#[derive(Debug, Clone, PartialEq)]
pub struct Weapon {
    pub editor_id: Option<String>,
    pub value: Option<u32>,
    pub damage: Option<u16>,
}

/// A reconstructed armor piece (`ARMO`): editor id plus base value and
/// armor rating from its `DATA` subrecord.
#[derive(Debug, Clone, PartialEq)]
pub struct Armor {
    pub editor_id: Option<String>,
    pub value: Option<u32>,
    pub armor_rating: Option<u32>,
}

/// A reconstructed non-player character (`NPC_`): editor id plus base
/// health, if present in an `ACBS` subrecord (actor base stats).
#[derive(Debug, Clone, PartialEq)]
pub struct Npc {
    pub editor_id: Option<String>,
    pub base_health: Option<u16>,
}

/// A reconstructed cell (`CELL`): editor id plus grid coordinates for
/// exterior cells (spec §3's `XCLC`).
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub editor_id: Option<String>,
    pub grid: Option<(i32, i32)>,
}

/// A reconstructed worldspace (`WRLD`): editor id only; the rest of a
/// worldspace's identity (its cells) lives in the conversion index, not in
/// the record itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Worldspace {
    pub editor_id: Option<String>,
}

/// A reconstructed quest (`QUST`): editor id plus quest priority, a known
/// single-byte `DATA` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Quest {
    pub editor_id: Option<String>,
    pub priority: Option<u8>,
}

/// Any record kind this crate doesn't model with a dedicated type: the raw
/// subrecord slices (signature, body bytes) are kept so callers can still
/// inspect unmapped record types rather than lose them entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct Generic {
    pub editor_id: Option<String>,
    pub subrecords: Vec<([u8; 4], Vec<u8>)>,
}

/// The tagged union of record kinds this crate reconstructs (spec §4.8).
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    Weapon(Weapon),
    Armor(Armor),
    Npc(Npc),
    Cell(Cell),
    Worldspace(Worldspace),
    Quest(Quest),
    Generic(Generic),
}

/// One fully reconstructed record: the common prefix plus its typed body.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub common: RecordCommon,
    pub data: RecordData,
}

/// Parses one record's typed body from its signature and raw payload
/// bytes, consulting the subrecord schema the same way the transcoder does
/// (spec §4.7 step 9b), except here to decode fields rather than
/// byte-flip them.
pub fn parse_payload(signature: [u8; 4], payload: &[u8], big_endian: bool) -> RecordData {
    let subs = iter_subrecords(payload, big_endian);
    let edid = editor_id(payload, &subs);

    match &signature {
        b"WEAP" => RecordData::Weapon(Weapon {
            editor_id: edid,
            value: find_body(payload, &subs, b"DATA")
                .and_then(|b| primitives::read_u32(b, 0, big_endian).ok()),
            damage: find_body(payload, &subs, b"DATA")
                .and_then(|b| primitives::read_u16(b, 4, big_endian).ok()),
        }),
        b"ARMO" => RecordData::Armor(Armor {
            editor_id: edid,
            value: find_body(payload, &subs, b"DATA")
                .and_then(|b| primitives::read_u32(b, 0, big_endian).ok()),
            armor_rating: find_body(payload, &subs, b"DNAM")
                .and_then(|b| primitives::read_u32(b, 0, big_endian).ok()),
        }),
        b"NPC_" => RecordData::Npc(Npc {
            editor_id: edid,
            base_health: find_body(payload, &subs, b"ACBS")
                .and_then(|b| primitives::read_u16(b, 4, big_endian).ok()),
        }),
        b"CELL" => RecordData::Cell(Cell {
            editor_id: edid,
            grid: find_body(payload, &subs, b"XCLC").and_then(|b| {
                let x = primitives::read_i32(b, 0, big_endian).ok()?;
                let y = primitives::read_i32(b, 4, big_endian).ok()?;
                Some((x, y))
            }),
        }),
        b"WRLD" => RecordData::Worldspace(Worldspace { editor_id: edid }),
        b"QUST" => RecordData::Quest(Quest {
            editor_id: edid,
            priority: find_body(payload, &subs, b"DATA").and_then(|b| b.first().copied()),
        }),
        _ => RecordData::Generic(Generic {
            editor_id: edid,
            subrecords: subs
                .iter()
                .map(|s| {
                    (
                        s.signature,
                        payload[s.body_offset..s.body_offset + s.body_len].to_vec(),
                    )
                })
                .collect(),
        }),
    }
}

/// Maps a record signature to the human-readable name used to key the
/// bitfield registry (spec §4.8 "registry maps each record type's flag
/// subrecord"): most signatures are already a valid registry key, the one
/// wrinkle being `NPC_`'s trailing underscore padding.
pub fn registry_key(signature: &[u8; 4]) -> String {
    String::from_utf8_lossy(signature).into_owned()
}

/// A keyed lookup from record signature to a human-readable kind name, for
/// callers building reports (spec §4.8: "Output forms the input to
/// external report generators").
pub fn kind_names() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("WEAP", "Weapon"),
        ("ARMO", "Armor"),
        ("NPC_", "NPC"),
        ("CELL", "Cell"),
        ("WRLD", "Worldspace"),
        ("QUST", "Quest"),
    ])
}
