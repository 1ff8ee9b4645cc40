// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The reader (`R`): navigates a value arena guided by an object schema,
//! producing typed views. Every operation here is total — a malformed
//! offset, a tag mismatch, or an out-of-range field index degrades to a
//! null/empty/degenerate result rather than panicking, so a reader can
//! safely walk an unsigned or adversarial arena before any signature has
//! been checked.

use std::cmp::Ordering;

use crate::schema::{FieldKind, ObjectSchema, ScalarRef};
use crate::value::{Tag, Val};

/// Bottom 4 bytes of the arena, the canonical entry point into the tree.
pub fn root(arena: &[u8]) -> crate::error::Result<Val> {
    crate::arena::read_root(arena)
}

/// Returns the integer payload of an `INT`/`INT_32` value, `0` for anything
/// else (including out-of-bounds offsets).
pub fn int(arena: &[u8], val: Val) -> u32 {
    match val.tag() {
        Some(Tag::Int) => val.payload(),
        Some(Tag::Int32) => {
            let off = val.payload() as usize;
            match arena.get(off..off + 4) {
                Some(b) => u32::from_le_bytes(b.try_into().unwrap()),
                None => 0,
            }
        }
        _ => 0,
    }
}

/// Decodes a `BLOB_8`/`BLOB_16`/`BLOB_32` value. Returns an empty slice for
/// any other tag or on bounds failure.
pub fn blob<'a>(arena: &'a [u8], val: Val) -> &'a [u8] {
    let width = match val.tag() {
        Some(Tag::Blob8) => 1usize,
        Some(Tag::Blob16) => 2,
        Some(Tag::Blob32) => 4,
        _ => return &[],
    };
    let off = val.payload() as usize;
    let Some(len_bytes) = arena.get(off..off + width) else {
        return &[];
    };
    let len = match width {
        1 => len_bytes[0] as usize,
        2 => u16::from_le_bytes(len_bytes.try_into().unwrap()) as usize,
        4 => u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize,
        _ => unreachable!(),
    };
    arena.get(off + width..off + width + len).unwrap_or(&[])
}

/// Decodes the value vector (object or array) at `offset`: slot 0 is the
/// slot count `n`, slots `1..n` are the object's/array's values.
fn decode_vector(arena: &[u8], offset: usize) -> Option<Vec<Val>> {
    let count = u32::from_le_bytes(arena.get(offset..offset + 4)?.try_into().ok()?) as usize;
    if count == 0 {
        return None;
    }
    let needed = 4 + (count - 1) * 4;
    if arena.get(offset..offset + needed).is_none() {
        return None;
    }
    let mut slots = Vec::with_capacity(count);
    slots.push(Val::NULL); // slot 0 is the length slot, never read as a field
    for i in 1..count {
        let at = offset + 4 + (i - 1) * 4;
        let raw = u32::from_le_bytes(arena[at..at + 4].try_into().unwrap());
        slots.push(Val::from_raw(raw));
    }
    Some(slots)
}

/// A navigable view over an `OBJECT` or `ARRAY` value.
pub struct ObjView<'a> {
    pub arena: &'a [u8],
    pub schema: &'static dyn ObjectSchema,
    slots: Vec<Val>,
    pub n: u32,
}

impl<'a> ObjView<'a> {
    fn degenerate(arena: &'a [u8], schema: &'static dyn ObjectSchema) -> Self {
        ObjView {
            arena,
            schema,
            slots: vec![Val::NULL],
            n: 1,
        }
    }

    /// Returns the vector slot at `i`, or `NULL` if `i == 0` or `i >= n`.
    pub fn ro_val(&self, i: usize) -> Val {
        if i == 0 || i as u32 >= self.n {
            Val::NULL
        } else {
            self.slots[i]
        }
    }

    /// `int(field i)`, substituting the schema's declared default when the
    /// slot is `NULL`.
    pub fn ro_int(&self, i: usize) -> u32 {
        let v = self.ro_val(i);
        if v.is_null() {
            self.schema.default_int(i)
        } else {
            int(self.arena, v)
        }
    }

    pub fn ro_blob(&self, i: usize) -> &'a [u8] {
        blob(self.arena, self.ro_val(i))
    }

    /// Nested `OBJECT`/`ARRAY` field. Returns a degenerate view (not a
    /// panic) if field `i` isn't one of those kinds.
    pub fn ro_obj(&self, i: usize) -> ObjView<'a> {
        match field_kind_at(self.schema, i) {
            Some(FieldKind::Object(s)) | Some(FieldKind::Array(s)) => obj(self.arena, self.ro_val(i), s),
            _ => ObjView::degenerate(self.arena, self.schema),
        }
    }

    /// Nested ADB container field: the field's bytes are themselves an
    /// arena, entered via its own root value.
    pub fn ro_adb(&self, i: usize) -> Option<ObjView<'a>> {
        match field_kind_at(self.schema, i) {
            Some(FieldKind::Adb(s)) => nested_adb(self.arena, self.ro_val(i), s),
            _ => None,
        }
    }

    /// Orders field `i` of `self` against field `i` of `other`. Both views
    /// must share the same object schema — a caller bug, not an input
    /// error, so this asserts in debug builds per the engine's "unknown
    /// kinds are a programming error" rule (spec §4.6, §9).
    pub fn ro_cmp(&self, other: &ObjView<'_>, i: usize) -> Ordering {
        debug_assert_eq!(
            self.schema.name(),
            other.schema.name(),
            "ro_cmp requires both views to share an object schema"
        );
        let kind = field_kind_at(self.schema, i).expect("ro_cmp requires a valid field index");
        compare_val(&kind, self.arena, self.ro_val(i), other.arena, other.ro_val(i))
    }

    /// Iterates an array view's elements in order (field index 1..n).
    pub fn ra_iter(&self) -> impl Iterator<Item = Val> + '_ {
        (1..self.n as usize).map(move |i| self.slots[i])
    }

    /// Recursively renders the value tree rooted at this view, for
    /// debugging and the inspector applet.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;
        let indent = "  ".repeat(depth);
        if self.schema.is_array() {
            let kind = self.schema.fields()[0].kind;
            let _ = writeln!(out, "{indent}{} [", self.schema.name());
            for i in 1..self.n as usize {
                dump_field(out, depth + 1, &kind, self.arena, self.slots[i]);
            }
            let _ = writeln!(out, "{indent}]");
        } else {
            let _ = writeln!(out, "{indent}{} {{", self.schema.name());
            for (idx, field) in self.schema.fields().iter().enumerate() {
                let i = idx + 1;
                let _ = write!(out, "{indent}  {}: ", field.name);
                dump_field(out, depth + 1, &field.kind, self.arena, self.ro_val(i));
            }
            let _ = writeln!(out, "{indent}}}");
        }
    }
}

fn dump_field(out: &mut String, depth: usize, kind: &FieldKind, arena: &[u8], val: Val) {
    use std::fmt::Write;
    match kind {
        FieldKind::Int => {
            let _ = writeln!(out, "{}", int(arena, val));
        }
        FieldKind::Blob(_) => {
            let _ = writeln!(out, "{:?}", blob(arena, val));
        }
        FieldKind::Object(s) | FieldKind::Array(s) => {
            if val.is_null() {
                let _ = writeln!(out, "null");
            } else {
                let _ = writeln!(out);
                obj(arena, val, s).dump_into(out, depth);
            }
        }
        FieldKind::Adb(s) => match nested_adb(arena, val, s) {
            Some(v) => {
                let _ = writeln!(out);
                v.dump_into(out, depth);
            }
            None => {
                let _ = writeln!(out, "null");
            }
        },
    }
}

/// Builds a view over an `OBJECT`/`ARRAY` value under `schema`. Any tag
/// mismatch or bounds failure yields a degenerate view (`n == 1`) so
/// subsequent field reads yield `NULL` rather than panicking.
pub fn obj<'a>(arena: &'a [u8], val: Val, schema: &'static dyn ObjectSchema) -> ObjView<'a> {
    match val.tag() {
        Some(Tag::Object) | Some(Tag::Array) => match decode_vector(arena, val.payload() as usize) {
            Some(slots) => {
                let n = slots.len() as u32;
                ObjView { arena, schema, slots, n }
            }
            None => ObjView::degenerate(arena, schema),
        },
        _ => ObjView::degenerate(arena, schema),
    }
}

/// Interprets `val`'s blob bytes as a nested arena and enters it at its
/// root. Returns `None` if the blob is empty or its root can't be read.
pub fn nested_adb<'a>(arena: &'a [u8], val: Val, schema: &'static dyn ObjectSchema) -> Option<ObjView<'a>> {
    let inner = blob(arena, val);
    if inner.is_empty() {
        return None;
    }
    let root_val = root(inner).ok()?;
    Some(obj(inner, root_val, schema))
}

fn field_kind_at(schema: &'static dyn ObjectSchema, i: usize) -> Option<FieldKind> {
    let fields = schema.fields();
    if schema.is_array() {
        fields.first().map(|f| f.kind)
    } else {
        if i == 0 {
            return None;
        }
        fields.get(i - 1).map(|f| f.kind)
    }
}

/// The single comparator primitive every sort/compare path funnels through:
/// orders `a_val` (in `a_arena`) against `b_val` (in `b_arena`, possibly a
/// different database) under `kind`.
pub fn compare_val(kind: &FieldKind, a_arena: &[u8], a_val: Val, b_arena: &[u8], b_val: Val) -> Ordering {
    match kind {
        FieldKind::Int => int(a_arena, a_val).cmp(&int(b_arena, b_val)),
        FieldKind::Blob(s) => s.compare(
            ScalarRef { arena: a_arena, val: a_val },
            ScalarRef { arena: b_arena, val: b_val },
        ),
        FieldKind::Object(s) | FieldKind::Array(s) => {
            s.compare(&obj(a_arena, a_val, s), &obj(b_arena, b_val, s))
        }
        FieldKind::Adb(s) => match (nested_adb(a_arena, a_val, s), nested_adb(b_arena, b_val, s)) {
            (Some(a), Some(b)) => s.compare(&a, &b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        },
    }
}

/// Orders field `ai` of `a` against field `bi` of `b` under `kind`. A thin
/// wrapper over [`compare_val`] for callers, such as [`crate::schema::ArraySchema`],
/// that hold views rather than raw (arena, value) pairs.
pub fn compare_field(kind: &FieldKind, a: &ObjView<'_>, ai: usize, b: &ObjView<'_>, bi: usize) -> Ordering {
    compare_val(kind, a.arena, a.ro_val(ai), b.arena, b.ro_val(bi))
}

/// Binary-searches a sorted array view for `needle` (from a possibly
/// different database). `cursor == 0` starts a fresh search and walks left
/// to the first equal element; otherwise advances from `cursor` and
/// confirms equality. Returns the 1-based index, or `-1` if not found.
pub fn ra_find(arr: &ObjView<'_>, cursor: i64, needle_arena: &[u8], needle: Val) -> i64 {
    let Some(elem_kind) = arr.schema.fields().first().map(|f| f.kind) else {
        return -1;
    };
    let last = arr.n as i64 - 1; // highest valid 1-based index, or 0 if empty
    if cursor == 0 {
        let mut lo = 1i64;
        let mut hi = last;
        let mut found = -1i64;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            match compare_val(&elem_kind, arr.arena, arr.ro_val(mid as usize), needle_arena, needle) {
                Ordering::Equal => {
                    found = mid;
                    hi = mid - 1;
                }
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid - 1,
            }
        }
        found
    } else {
        let next = cursor + 1;
        if next < 1 || next > last {
            return -1;
        }
        if compare_val(&elem_kind, arr.arena, arr.ro_val(next as usize), needle_arena, needle) == Ordering::Equal {
            next
        } else {
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ArraySchema;
    use crate::writer::Writer;

    static INT_ARRAY: ArraySchema = ArraySchema::new("ints", FieldKind::Int);

    #[test]
    fn int_payload_inline_and_boxed() {
        let mut w = Writer::new_writable();
        let small = w.w_int(3).unwrap();
        let big = w.w_int(1 << 28).unwrap();
        let arena = w.arena_snapshot();
        assert_eq!(int(arena, small), 3);
        assert_eq!(int(arena, big), 1 << 28);
    }

    #[test]
    fn blob_roundtrip_and_bounds_checked() {
        let mut w = Writer::new_writable();
        let b = w.w_blob(b"hi").unwrap();
        let arena = w.arena_snapshot();
        assert_eq!(blob(arena, b), b"hi");
        // Garbage offset degrades to empty, never panics.
        assert_eq!(blob(arena, Val::blob_ref(crate::value::Tag::Blob8, 1_000_000)), b"");
    }

    #[test]
    fn degenerate_view_on_tag_mismatch() {
        let view = obj(&[], Val::inline_int(5).unwrap(), &INT_ARRAY);
        assert_eq!(view.n, 1);
        assert_eq!(view.ro_val(1), Val::NULL);
    }

    #[test]
    fn sorted_array_find() {
        let mut w = Writer::new_writable();
        let mut b = w.array_builder(&INT_ARRAY);
        for v in [2i64, 5, 9] {
            b.push_int(v as u32).unwrap();
        }
        let arr_val = b.commit().unwrap();
        let arena = w.arena_snapshot();
        let view = obj(arena, arr_val, &INT_ARRAY);

        let needle = Val::inline_int(5).unwrap();
        let idx = ra_find(&view, 0, arena, needle);
        assert_eq!(idx, 2);
        assert_eq!(ra_find(&view, 0, arena, Val::inline_int(4).unwrap()), -1);
    }
}
