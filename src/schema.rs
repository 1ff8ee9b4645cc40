// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Schema descriptors. These are read-only, caller-supplied catalogues the
//! engine never defines itself (spec: "the engine consumes them, it does not
//! define which packages look like what").
//!
//! A field's kind is a tagged variant rather than the kind-byte-plus-pointer-
//! arithmetic trick of the original C implementation, so the reader, writer,
//! comparator, and sort paths dispatch by matching on [`FieldKind`] instead
//! of recovering an enclosing record from a discriminator byte.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::value::Val;
use crate::writer::Writer;

/// One field of an object schema, or the synthetic single "field" of an
/// array schema (its element kind).
#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The kind of value a field (or array element) holds.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Int,
    Blob(&'static dyn ScalarSchema),
    Object(&'static dyn ObjectSchema),
    /// An array whose element kind is described by `schema`'s single field
    /// (`schema.fields()[0]`), per spec: "the field schema is always the
    /// array's element schema".
    Array(&'static dyn ObjectSchema),
    /// A nested container blob; `schema` describes its root object.
    Adb(&'static dyn ObjectSchema),
}

/// A borrowed (arena, value) pair, the unit scalar comparators operate on.
#[derive(Clone, Copy)]
pub struct ScalarRef<'a> {
    pub arena: &'a [u8],
    pub val: Val,
}

/// Descriptor for a scalar (`INT`/`BLOB`) field that needs custom ordering
/// or string parsing beyond plain integer/byte comparison.
pub trait ScalarSchema: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Orders two scalar values, each potentially in a different database.
    fn compare(&self, a: ScalarRef<'_>, b: ScalarRef<'_>) -> Ordering;

    /// Parses `text` into a `Val` committed into `w`.
    fn from_string(&self, w: &mut Writer, text: &str) -> Result<Val> {
        let _ = (w, text);
        Err(Error::NotSupported(format!(
            "{} has no string parser",
            self.name()
        )))
    }
}

/// Descriptor for an `OBJECT` (or, via the array convenience below, `ARRAY`)
/// schema: an ordered field list plus optional callbacks.
pub trait ObjectSchema: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn fields(&self) -> &[Field];

    /// True for schemas built with [`array_schema`], whose single field is
    /// the element kind rather than field 1 of a real object.
    fn is_array(&self) -> bool {
        false
    }

    /// Orders two object views under this schema. Returns `None` when the
    /// schema declares no ordering (the engine then treats the values as
    /// incomparable for sort purposes, matching §4.6's "unknown kinds are a
    /// programming error" only for field *kinds*, not for unordered objects).
    fn compare(&self, a: &crate::reader::ObjView<'_>, b: &crate::reader::ObjView<'_>) -> Ordering {
        let _ = (a, b);
        Ordering::Equal
    }

    /// Runs just before a builder commits; may fill in derived fields.
    fn pre_commit(&self, builder: &mut crate::writer::Builder<'_>) -> Result<()> {
        let _ = builder;
        Ok(())
    }

    /// Default value substituted for a `NULL` int field on read.
    fn default_int(&self, field_index: usize) -> u32 {
        let _ = field_index;
        0
    }

    fn from_string(&self, builder: &mut crate::writer::Builder<'_>, text: &str) -> Result<()> {
        let _ = (builder, text);
        Err(Error::NotSupported(format!(
            "{} has no string parser",
            self.name()
        )))
    }
}

/// A minimal [`ObjectSchema`] wrapping a single element [`FieldKind`], used
/// as the "schema" of an array per spec §4.2: field index lookups on an
/// array always resolve to field 1, i.e. this single entry.
#[derive(Debug)]
pub struct ArraySchema {
    pub name: &'static str,
    pub element: Field,
}

impl ArraySchema {
    pub const fn new(name: &'static str, element_kind: FieldKind) -> Self {
        ArraySchema {
            name,
            element: Field {
                name: "element",
                kind: element_kind,
            },
        }
    }
}

impl ObjectSchema for ArraySchema {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fields(&self) -> &[Field] {
        std::slice::from_ref(&self.element)
    }

    fn is_array(&self) -> bool {
        true
    }

    /// Lexicographic order: elements are compared pairwise from index 1,
    /// first mismatch decides; if one array is a prefix of the other, the
    /// shorter one sorts first.
    fn compare(&self, a: &crate::reader::ObjView<'_>, b: &crate::reader::ObjView<'_>) -> Ordering {
        let shared = a.n.min(b.n);
        for i in 1..shared as usize {
            let ord = crate::reader::compare_field(&self.element.kind, a, i, b, i);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.n.cmp(&b.n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ELEM_SCHEMA: ArraySchema = ArraySchema::new("ints", FieldKind::Int);

    #[test]
    fn array_schema_reports_single_field() {
        assert!(ELEM_SCHEMA.is_array());
        assert_eq!(ELEM_SCHEMA.fields().len(), 1);
    }

    fn int_array(w: &mut Writer, values: &[u32]) -> Val {
        let mut b = w.array_builder(&ELEM_SCHEMA);
        for v in values {
            b.push_int(*v).unwrap();
        }
        b.commit().unwrap()
    }

    #[test]
    fn array_compare_considers_every_element_not_just_the_first() {
        let mut w = Writer::new_writable();
        let a = int_array(&mut w, &[1, 2, 3]);
        let b = int_array(&mut w, &[1, 9]);
        let arena = w.arena_snapshot();
        let view_a = crate::reader::obj(arena, a, &ELEM_SCHEMA);
        let view_b = crate::reader::obj(arena, b, &ELEM_SCHEMA);

        // Slot 1 is `1` in both, so a comparator that only looked at the
        // first element would wrongly call these equal.
        assert_eq!(ELEM_SCHEMA.compare(&view_a, &view_b), Ordering::Less);
        assert_eq!(ELEM_SCHEMA.compare(&view_b, &view_a), Ordering::Greater);
    }

    #[test]
    fn array_compare_treats_a_prefix_as_smaller() {
        let mut w = Writer::new_writable();
        let a = int_array(&mut w, &[1, 2]);
        let b = int_array(&mut w, &[1, 2, 3]);
        let arena = w.arena_snapshot();
        let view_a = crate::reader::obj(arena, a, &ELEM_SCHEMA);
        let view_b = crate::reader::obj(arena, b, &ELEM_SCHEMA);

        assert_eq!(ELEM_SCHEMA.compare(&view_a, &view_b), Ordering::Less);
        assert_eq!(ELEM_SCHEMA.compare(&view_a, &view_a), Ordering::Equal);
    }
}
