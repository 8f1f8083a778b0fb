//! Black-box ESM conversion tests driven only through the public API
//! ([`relicforge::esm::convert`]), building a real big-endian master file
//! byte-for-byte the way a source dump would contain it rather than
//! hand-feeding a pre-built conversion index.

use relicforge::esm::{convert, ConvertOptions};

const RECORD_HEADER_LEN: usize = 24;
const GROUP_HEADER_LEN: usize = 24;

fn be_subrecord(sig: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(sig);
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn be_record(sig: &[u8; 4], form_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(sig);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // flags
    out.extend_from_slice(&form_id.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // timestamp
    out.extend_from_slice(&[0u8; 4]); // version control
    out.extend_from_slice(payload);
    out
}

fn be_group(label: [u8; 4], group_type: i32, children: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"GRUP");
    out.extend_from_slice(&((GROUP_HEADER_LEN + children.len()) as u32).to_be_bytes());
    out.extend_from_slice(&label);
    out.extend_from_slice(&group_type.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // timestamp
    out.extend_from_slice(&[0u8; 4]); // reserved
    out.extend(children);
    out
}

fn tes4_header() -> Vec<u8> {
    let mut version = [0u8; 12];
    version[0..4].copy_from_slice(&1.0f32.to_be_bytes());
    let hedr = be_subrecord(b"HEDR", &version);
    be_record(b"TES4", 0, &hedr)
}

#[test]
fn converts_a_real_master_file_with_an_interior_cell_to_little_endian() {
    let cell = be_record(b"CELL", 0x77, &[]);
    let top_cell_group = be_group(*b"CELL", 0, &cell);

    let mut input = tes4_header();
    input.extend(&top_cell_group);

    let options = ConvertOptions::default();
    let converted = convert(&input, &options).unwrap();

    assert!(converted.src_big_endian);
    assert!(!converted.dst_big_endian);
    assert_eq!(&converted.bytes[0..4], b"TES4");
    // TES4 plus the reconstructed CELL record.
    assert_eq!(converted.stats.records_converted, 2);
    assert_eq!(converted.stats.groups_converted, 1);

    // The converted CELL record's form id round-trips, now little-endian.
    let cell_offset = converted
        .bytes
        .windows(4)
        .position(|w| w == b"CELL")
        .expect("CELL signature present in output");
    let form_id_offset = cell_offset + 12;
    let form_id = u32::from_le_bytes(
        converted.bytes[form_id_offset..form_id_offset + 4]
            .try_into()
            .unwrap(),
    );
    assert_eq!(form_id, 0x77);
}

#[test]
fn orphaned_bytes_after_the_header_trigger_a_resync_and_still_convert() {
    let cell = be_record(b"CELL", 0x99, &[]);
    let top_cell_group = be_group(*b"CELL", 0, &cell);

    let mut input = tes4_header();
    input.extend_from_slice(&[0xffu8; 16]); // garbage between the header and the next GRUP
    input.extend(&top_cell_group);

    let options = ConvertOptions::default();
    let converted = convert(&input, &options).unwrap();

    assert_eq!(converted.stats.resyncs, 1);
    assert_eq!(converted.stats.records_converted, 2);
}

#[test]
fn rejects_a_buffer_without_a_tes4_signature() {
    let input = vec![0u8; RECORD_HEADER_LEN + 4];
    let options = ConvertOptions::default();
    assert!(convert(&input, &options).is_err());
}
