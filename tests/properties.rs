// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Round-trip, interning, and sort-idempotence properties (spec.md §8).

use forest_adb::reader::{self, obj};
use forest_adb::schema::{ArraySchema, FieldKind};
use forest_adb::writer::Writer;
use quickcheck_macros::quickcheck;

static INTS: ArraySchema = ArraySchema::new("ints", FieldKind::Int);

/// Writing then reading back an arbitrary blob always yields the same bytes.
#[quickcheck]
fn blob_write_then_read_roundtrips(bytes: Vec<u8>) -> bool {
    let mut w = Writer::new_writable();
    let val = w.w_blob(&bytes).unwrap();
    let arena = w.arena_snapshot();
    if bytes.is_empty() {
        val.is_null()
    } else {
        reader::blob(arena, val) == bytes.as_slice()
    }
}

/// Writing the same bytes twice always interns to the same offset,
/// regardless of what else was written first.
#[quickcheck]
fn identical_blobs_always_intern(prefix: Vec<u8>, payload: Vec<u8>) -> bool {
    if payload.is_empty() {
        return true;
    }
    let mut w = Writer::new_writable();
    if !prefix.is_empty() {
        let _ = w.w_blob(&prefix);
    }
    let a = w.w_blob(&payload).unwrap();
    let b = w.w_blob(&payload).unwrap();
    a == b
}

/// An int always round-trips through the writer/reader boundary, whether it
/// ends up inlined or boxed as `INT_32`.
#[quickcheck]
fn int_roundtrips_inline_or_boxed(v: u32) -> bool {
    let mut w = Writer::new_writable();
    let val = w.w_int(v).unwrap();
    reader::int(w.arena_snapshot(), val) == v
}

/// `wa_sort_unique` always yields a strictly increasing sequence, and running
/// it again changes nothing.
#[quickcheck]
fn sort_unique_is_idempotent_and_sorted(mut values: Vec<u32>) -> bool {
    values.truncate(64); // keep shrinking fast; size isn't what's under test
    let mut w = Writer::new_writable();
    let mut b = w.array_builder(&INTS);
    for v in &values {
        b.push_int(*v).unwrap();
    }
    let arr = b.commit().unwrap();
    w.wa_sort_unique(arr, &INTS).unwrap();

    let once: Vec<u32> = {
        let arena = w.arena_snapshot();
        obj(arena, arr, &INTS).ra_iter().map(|v| reader::int(arena, v)).collect()
    };
    let sorted_and_strictly_increasing = once.windows(2).all(|w| w[0] < w[1]);

    w.wa_sort_unique(arr, &INTS).unwrap();
    let twice: Vec<u32> = {
        let arena = w.arena_snapshot();
        obj(arena, arr, &INTS).ra_iter().map(|v| reader::int(arena, v)).collect()
    };

    sorted_and_strictly_increasing && once == twice
}
