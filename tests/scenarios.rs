// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The concrete S1-S6 scenarios, each driving the full writer -> container
//! -> reader/signature path through public API only.

use std::cmp::Ordering;
use std::io::{Read as _, Write as _};

use forest_adb::block::{write_block, BlockKind};
use forest_adb::container::{self, Header, XfrmAction, MAGIC};
use forest_adb::reader::{self, obj};
use forest_adb::schema::{ArraySchema, Field, FieldKind, ObjectSchema, ScalarRef, ScalarSchema};
use forest_adb::signature::sign;
use forest_adb::testing::{hmac_keypair, HmacTrustStore};
use forest_adb::value::Tag;
use forest_adb::writer::Writer;
use forest_adb::Database;
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct PlainBlob;

impl ScalarSchema for PlainBlob {
    fn name(&self) -> &'static str {
        "plain_blob"
    }

    fn compare(&self, a: ScalarRef<'_>, b: ScalarRef<'_>) -> Ordering {
        reader::blob(a.arena, a.val).cmp(reader::blob(b.arena, b.val))
    }
}

static PLAIN_BLOB: PlainBlob = PlainBlob;

static PAIR_FIELDS: [Field; 2] = [
    Field { name: "num", kind: FieldKind::Int },
    Field { name: "text", kind: FieldKind::Blob(&PLAIN_BLOB) },
];

#[derive(Debug)]
struct PairSchema;

impl ObjectSchema for PairSchema {
    fn name(&self) -> &'static str {
        "pair"
    }

    fn fields(&self) -> &[Field] {
        &PAIR_FIELDS
    }
}

static PAIR_SCHEMA: PairSchema = PairSchema;
static INTS: ArraySchema = ArraySchema::new("ints", FieldKind::Int);

#[test]
fn s1_object_roundtrip_and_vector_length() {
    let mut w = Writer::new_writable();
    let mut b = w.object_builder(&PAIR_SCHEMA);
    b.set_int(1, 7).unwrap();
    b.set_blob(2, b"hi").unwrap();
    let root = b.commit().unwrap();
    w.w_root(root).unwrap();

    assert_eq!(root.tag(), Some(Tag::Object));
    let arena = w.arena_snapshot();
    let view = obj(arena, root, &PAIR_SCHEMA);
    assert_eq!(view.n, 3); // length slot + 2 fields
    assert_eq!(view.ro_int(1), 7);
    assert_eq!(view.ro_blob(2), b"hi");
    assert_eq!(reader::root(arena).unwrap(), root);
}

#[test]
fn s2_interning_same_bytes_same_offset() {
    let mut w = Writer::new_writable();
    let a = w.w_blob(b"abc").unwrap();
    let b = w.w_blob(b"abc").unwrap();
    assert_eq!(a, b);
}

#[test]
fn s3_sort_unique_yields_strictly_increasing() {
    let mut w = Writer::new_writable();
    let mut b = w.array_builder(&INTS);
    for v in [5u32, 2, 2, 9] {
        b.push_int(v).unwrap();
    }
    let arr = b.commit().unwrap();
    w.wa_sort_unique(arr, &INTS).unwrap();

    let arena = w.arena_snapshot();
    let values: Vec<u32> = obj(arena, arr, &INTS)
        .ra_iter()
        .map(|v| reader::int(arena, v))
        .collect();
    assert_eq!(values, vec![2, 5, 9]);
}

#[test]
fn s4_int32_boundary() {
    let mut w = Writer::new_writable();
    let inline = w.w_int((1u32 << 28) - 1).unwrap();
    assert_eq!(inline.tag(), Some(Tag::Int));
    let boxed = w.w_int(1u32 << 28).unwrap();
    assert_eq!(boxed.tag(), Some(Tag::Int32));
    assert_eq!(boxed.payload() % 4, 0);
}

#[test]
fn s5_sign_verify_then_tamper_header() {
    let (signing, verifying) = hmac_keypair(*b"0123456789abcdef");
    let header = Header { magic: MAGIC, schema: 3 }.to_bytes();
    let payload = b"arena-bytes".to_vec();
    let record = sign(&header, &payload, &signing);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&header);
    write_block(&mut bytes, BlockKind::Adb, &payload);
    write_block(&mut bytes, BlockKind::Sig, &record.to_bytes());

    let store = HmacTrustStore::new(vec![verifying]);
    let ok = container::map(&bytes, Some(3), &store).unwrap();
    assert_eq!(ok.trusted_key_id, Some(signing.key_id()));

    // Flip a byte in the header (part of the signed input, not just the
    // ADB payload).
    bytes[4] ^= 0xff;
    assert!(matches!(
        container::map(&bytes, None, &store),
        Err(forest_adb::Error::KeyRejected(_))
    ));
}

#[test]
fn s6_stream_data_block_partial_consume_then_resync() {
    let (signing, verifying) = hmac_keypair(*b"0123456789abcdef");
    let header = Header { magic: MAGIC, schema: 1 }.to_bytes();
    let payload = b"arena".to_vec();
    let record = sign(&header, &payload, &signing);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&header);
    write_block(&mut bytes, BlockKind::Adb, &payload);
    write_block(&mut bytes, BlockKind::Sig, &record.to_bytes());
    write_block(&mut bytes, BlockKind::Data, &[3u8; 100]);

    let store = HmacTrustStore::new(vec![verifying]);
    let mut lengths = Vec::new();
    let result = container::stream(std::io::Cursor::new(&bytes), None, &store, |len, r| {
        lengths.push(len);
        let mut buf = vec![0u8; 40];
        r.read_exact(&mut buf)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(lengths, vec![100]);
    assert_eq!(result.arena, payload);
    assert_eq!(result.trusted_key_id, Some(signing.key_id()));
}

#[test]
fn mapped_database_reads_through_a_real_file() {
    let (signing, verifying) = hmac_keypair(*b"fedcba9876543210");
    let mut w = Writer::new_writable();
    let mut b = w.object_builder(&PAIR_SCHEMA);
    b.set_int(1, 42).unwrap();
    b.set_blob(2, b"package").unwrap();
    let root = b.commit().unwrap();
    w.w_root(root).unwrap();
    let arena_bytes = w.arena_snapshot().to_vec();

    let header = Header { magic: MAGIC, schema: 9 }.to_bytes();
    let record = sign(&header, &arena_bytes, &signing);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&header).unwrap();
    let mut body = Vec::new();
    write_block(&mut body, BlockKind::Adb, &arena_bytes);
    write_block(&mut body, BlockKind::Sig, &record.to_bytes());
    file.write_all(&body).unwrap();
    file.flush().unwrap();

    let store = HmacTrustStore::new(vec![verifying]);
    let db = Database::open_mapped(file.path(), Some(9), &store).unwrap();
    assert_eq!(db.trusted_key_id(), Some(signing.key_id()));

    let root = reader::root(db.arena()).unwrap();
    let view = obj(db.arena(), root, &PAIR_SCHEMA);
    assert_eq!(view.ro_int(1), 42);
    assert_eq!(view.ro_blob(2), b"package");
}

#[test]
fn transform_drops_data_blocks() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&Header { magic: MAGIC, schema: 1 }.to_bytes());
    write_block(&mut bytes, BlockKind::Adb, b"arena");
    write_block(&mut bytes, BlockKind::Data, &[1u8; 16]);

    let mut out = Vec::new();
    container::transform(std::io::Cursor::new(&bytes), &mut out, |h, _| {
        if h.kind == BlockKind::Data {
            Ok(XfrmAction::Drop)
        } else {
            Ok(XfrmAction::PassThrough)
        }
    })
    .unwrap();

    let store = HmacTrustStore::new(vec![]);
    let result = container::map(&out, None, &store).unwrap();
    assert_eq!(result.arena, b"arena");
}
