//! Builds typed, human-inspectable records out of either a transcoded ESM
//! buffer or a live runtime struct in a memory dump (spec §4.8, component
//! C8): [`record`] holds the tagged-union record types and the payload
//! parser, [`bitfield`] and [`offsets`] are the two data-driven registries
//! that keep flag bits and struct field offsets out of hardcoded constants,
//! and [`source`] unifies both input representations behind one type.

pub mod bitfield;
pub mod offsets;
pub mod record;
pub mod source;

pub use bitfield::{BitfieldRegistry, FlagBit, FlagSet};
pub use offsets::{FieldOffset, OffsetTable, StructLayout};
pub use record::{Record, RecordCommon, RecordData};
pub use source::{RecordSource, MAX_POINTER_CHASE_DEPTH};
