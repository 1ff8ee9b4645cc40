// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The writer (`W`): appends to a growable arena, interns identical payloads
//! by hash bucket, and builds objects/arrays.

use std::cmp::Ordering;

use crate::arena::pad_len;
use crate::dedup::{hash_fragments, DedupTable};
use crate::error::{Error, Result};
use crate::reader::compare_val;
use crate::schema::{FieldKind, ObjectSchema};
use crate::value::{Tag, Val, MAX_INLINE_INT};

/// Tunable parameters for a writable database. Defaults match the values
/// named in the format: an 8 KiB initial arena and 251 dedup buckets.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub initial_capacity: usize,
    pub num_buckets: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            initial_capacity: 8 * 1024,
            num_buckets: 251,
        }
    }
}

/// Caps how deep `w_copy` will recurse into nested objects/arrays before
/// refusing with [`Error::TooLarge`], matching spec's "at most 512 slots
/// per level".
const COPY_FIELD_CAP: usize = 512;

/// Caps how many nesting levels `w_copy` will descend before refusing with
/// [`Error::TooLarge`]. `COPY_FIELD_CAP` only bounds fan-out at one level;
/// without this, a crafted or self-referencing source arena (not
/// necessarily produced by this writer) could recurse without bound and
/// overflow the stack.
const COPY_DEPTH_CAP: usize = 64;

#[derive(Debug)]
enum Storage {
    Owned(Vec<u8>),
    Static(&'static [u8]),
}

/// A writable (or static, read-only) arena plus its dedup table.
#[derive(Debug)]
pub struct Writer {
    storage: Storage,
    dedup: Option<DedupTable>,
    poisoned: bool,
}

impl Writer {
    pub fn new_writable() -> Self {
        Self::with_options(WriterOptions::default())
    }

    pub fn with_options(options: WriterOptions) -> Self {
        Writer {
            storage: Storage::Owned(Vec::with_capacity(options.initial_capacity)),
            dedup: Some(DedupTable::new(options.num_buckets)),
            poisoned: false,
        }
    }

    /// A non-growable database backed by caller-provided storage. Any
    /// append attempt fails fast, per spec §3.6.
    pub fn new_static(bytes: &'static [u8]) -> Self {
        Writer {
            storage: Storage::Static(bytes),
            dedup: None,
            poisoned: false,
        }
    }

    pub fn arena_snapshot(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(v) => v,
            Storage::Static(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.arena_snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn arena_mut(&mut self) -> Result<&mut Vec<u8>> {
        match &mut self.storage {
            Storage::Owned(v) => Ok(v),
            Storage::Static(_) => Err(Error::NotSupported(
                "cannot mutate a static database's arena".into(),
            )),
        }
    }

    fn poison<T>(&mut self, err: Error) -> Result<T> {
        self.poisoned = true;
        Err(err)
    }

    /// Pads to `align`, appends each fragment in order, and returns the
    /// offset of the first fragment. Growth is whatever `Vec<u8>`'s own
    /// amortized doubling does — the spec's "grows geometrically, doubling
    /// when full" is exactly std's growth strategy, so there is nothing
    /// bespoke to implement here.
    pub fn raw_append(&mut self, fragments: &[&[u8]], align: usize) -> Result<usize> {
        if self.poisoned {
            return Err(Error::Malformed("writer is poisoned".into()));
        }
        let buf = match self.arena_mut() {
            Ok(buf) => buf,
            Err(e) => return self.poison(e),
        };
        let pad = pad_len(buf.len(), align);
        buf.resize(buf.len() + pad, 0);
        let offset = buf.len();
        for frag in fragments {
            buf.extend_from_slice(frag);
        }
        Ok(offset)
    }

    /// Interns `fragments` (concatenated) under dedup, or appends a fresh
    /// copy if no match exists at the requested alignment.
    pub fn w_data(&mut self, fragments: &[&[u8]], align: usize) -> Result<usize> {
        if self.poisoned {
            return Err(Error::Malformed("writer is poisoned".into()));
        }
        let hash = hash_fragments(fragments);
        if let Some(table) = &self.dedup {
            if let Some(offset) = table.find(self.arena_snapshot(), hash, fragments, align) {
                return Ok(offset);
            }
        }
        let offset = self.raw_append(fragments, align)?;
        if let Some(table) = &mut self.dedup {
            let len: usize = fragments.iter().map(|f| f.len()).sum();
            table.insert(hash, len, offset, align);
        }
        Ok(offset)
    }

    pub fn w_int(&mut self, v: u32) -> Result<Val> {
        if v <= MAX_INLINE_INT {
            return Val::inline_int(v);
        }
        let bytes = v.to_le_bytes();
        let offset = self.w_data(&[&bytes], 4)?;
        Ok(Val::int32_ref(offset))
    }

    pub fn w_blob(&mut self, bytes: &[u8]) -> Result<Val> {
        if bytes.is_empty() {
            return Ok(Val::NULL);
        }
        let (tag, prefix): (Tag, Vec<u8>) = if bytes.len() <= u8::MAX as usize {
            (Tag::Blob8, vec![bytes.len() as u8])
        } else if bytes.len() <= u16::MAX as usize {
            (Tag::Blob16, (bytes.len() as u16).to_le_bytes().to_vec())
        } else {
            (Tag::Blob32, (bytes.len() as u32).to_le_bytes().to_vec())
        };
        let align = prefix.len();
        let offset = self.w_data(&[&prefix, bytes], align)?;
        Ok(Val::blob_ref(tag, offset))
    }

    /// Parses `text` into a value of the given field kind, delegating to the
    /// scalar schema's parser, or building and committing a transient
    /// object/array for `OBJECT`/`ARRAY` kinds.
    pub fn w_fromstring(&mut self, kind: FieldKind, text: &str) -> Result<Val> {
        match kind {
            FieldKind::Int => text
                .parse::<u32>()
                .map_err(|e| Error::Malformed(format!("not an integer: {e}")))
                .and_then(|v| self.w_int(v)),
            FieldKind::Blob(s) => s.from_string(self, text),
            FieldKind::Object(s) => {
                let mut b = self.object_builder(s);
                s.from_string(&mut b, text)?;
                b.commit()
            }
            FieldKind::Array(s) => {
                let mut b = self.array_builder(s);
                s.from_string(&mut b, text)?;
                b.commit()
            }
            FieldKind::Adb(_) => Err(Error::NotSupported("ADB fields have no string form".into())),
        }
    }

    pub fn object_builder(&mut self, schema: &'static dyn ObjectSchema) -> Builder<'_> {
        debug_assert!(!schema.is_array());
        let n = schema.fields().len();
        Builder {
            writer: self,
            schema,
            slots: vec![Val::NULL; n + 1],
        }
    }

    pub fn array_builder(&mut self, schema: &'static dyn ObjectSchema) -> Builder<'_> {
        debug_assert!(schema.is_array());
        Builder {
            writer: self,
            schema,
            slots: vec![Val::NULL],
        }
    }

    /// Appends the root value as the final 4 bytes of the arena. Callers
    /// must do this exactly once, after all object/array commits.
    pub fn w_root(&mut self, val: Val) -> Result<()> {
        self.raw_append(&[&val.raw().to_le_bytes()], 4)?;
        Ok(())
    }

    /// Recursively copies `src_val` (read from `src_arena`) into this
    /// writer's arena.
    pub fn w_copy(&mut self, src_arena: &[u8], src_val: Val) -> Result<Val> {
        let result = self.w_copy_depth(src_arena, src_val, 0);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn w_copy_depth(&mut self, src_arena: &[u8], src_val: Val, depth: usize) -> Result<Val> {
        if depth > COPY_DEPTH_CAP {
            return Err(Error::TooLarge { cap: COPY_DEPTH_CAP });
        }
        match src_val.tag() {
            Some(Tag::Special) | Some(Tag::Int) => Ok(src_val),
            Some(Tag::Int32) => {
                let off = src_val.payload() as usize;
                let bytes = src_arena
                    .get(off..off + 4)
                    .ok_or_else(|| Error::Malformed("INT_32 offset out of range".into()))?;
                let offset = self.w_data(&[bytes], 4)?;
                Ok(Val::int32_ref(offset))
            }
            Some(Tag::Blob8) => self.copy_blob(src_arena, src_val, 1, Tag::Blob8),
            Some(Tag::Blob16) => self.copy_blob(src_arena, src_val, 2, Tag::Blob16),
            Some(Tag::Blob32) => Err(Error::NotImplemented("BLOB_32 cross-database copy".into())),
            Some(Tag::Int64) => Err(Error::NotImplemented("INT_64 cross-database copy".into())),
            Some(Tag::Object) | Some(Tag::Array) => {
                let is_array = src_val.tag() == Some(Tag::Array);
                let offset = src_val.payload() as usize;
                let count = u32::from_le_bytes(
                    src_arena
                        .get(offset..offset + 4)
                        .ok_or_else(|| Error::Malformed("vector offset out of range".into()))?
                        .try_into()
                        .unwrap(),
                ) as usize;
                if count > 0 && count - 1 > COPY_FIELD_CAP {
                    return Err(Error::TooLarge { cap: COPY_FIELD_CAP });
                }
                let mut out = Vec::with_capacity(count.max(1));
                out.push(Val::NULL);
                for i in 1..count {
                    let at = offset + 4 + (i - 1) * 4;
                    let raw_bytes = src_arena
                        .get(at..at + 4)
                        .ok_or_else(|| Error::Malformed("vector slot out of range".into()))?;
                    let raw = u32::from_le_bytes(raw_bytes.try_into().unwrap());
                    let copied = self.w_copy_depth(src_arena, Val::from_raw(raw), depth + 1)?;
                    out.push(copied);
                }
                let n = out.len() as u32;
                let mut bytes = Vec::with_capacity(out.len() * 4);
                bytes.extend_from_slice(&n.to_le_bytes());
                for v in &out[1..] {
                    bytes.extend_from_slice(&v.raw().to_le_bytes());
                }
                let new_offset = self.w_data(&[&bytes], 4)?;
                Ok(if is_array {
                    Val::array_ref(new_offset)
                } else {
                    Val::object_ref(new_offset)
                })
            }
            None => Err(Error::Malformed("unknown value tag".into())),
        }
    }

    fn copy_blob(&mut self, src_arena: &[u8], val: Val, width: usize, tag: Tag) -> Result<Val> {
        let off = val.payload() as usize;
        let len_bytes = src_arena
            .get(off..off + width)
            .ok_or_else(|| Error::Malformed("blob length prefix out of range".into()))?;
        let len = match width {
            1 => len_bytes[0] as usize,
            2 => u16::from_le_bytes(len_bytes.try_into().unwrap()) as usize,
            _ => unreachable!(),
        };
        let total = width + len;
        let bytes = src_arena
            .get(off..off + total)
            .ok_or_else(|| Error::Malformed("blob payload out of range".into()))?;
        let offset = self.w_data(&[bytes], width)?;
        Ok(Val::blob_ref(tag, offset))
    }

    fn decode_array_slots(&self, offset: usize) -> Vec<Val> {
        let arena = self.arena_snapshot();
        let count = u32::from_le_bytes(arena[offset..offset + 4].try_into().unwrap()) as usize;
        (1..count)
            .map(|i| {
                let at = offset + 4 + (i - 1) * 4;
                Val::from_raw(u32::from_le_bytes(arena[at..at + 4].try_into().unwrap()))
            })
            .collect()
    }

    /// Sorts an array's elements in place under its element schema's
    /// comparator. A no-op for non-array values or arrays of 0/1 elements.
    pub fn wa_sort(&mut self, array_val: Val, schema: &'static dyn ObjectSchema) -> Result<()> {
        let offset = match array_val.tag() {
            Some(Tag::Array) => array_val.payload() as usize,
            _ => return Ok(()),
        };
        let elem_kind = schema
            .fields()
            .first()
            .map(|f| f.kind)
            .ok_or_else(|| Error::Malformed("array schema declares no element kind".into()))?;

        let snapshot = self.arena_snapshot().to_vec();
        let mut vals = self.decode_array_slots(offset);
        if vals.len() <= 1 {
            return Ok(());
        }
        vals.sort_by(|a, b| compare_val(&elem_kind, &snapshot, *a, &snapshot, *b));

        let arena = self.arena_mut()?;
        for (i, v) in vals.into_iter().enumerate() {
            let at = offset + 4 + i * 4;
            arena[at..at + 4].copy_from_slice(&v.raw().to_le_bytes());
        }
        Ok(())
    }

    /// Sorts, then deduplicates adjacent equal elements in place, shrinking
    /// the array's recorded length. Trailing slots beyond the new length
    /// are left as unreferenced arena bytes, per the append-only model.
    pub fn wa_sort_unique(&mut self, array_val: Val, schema: &'static dyn ObjectSchema) -> Result<()> {
        self.wa_sort(array_val, schema)?;
        let offset = match array_val.tag() {
            Some(Tag::Array) => array_val.payload() as usize,
            _ => return Ok(()),
        };
        let elem_kind = schema
            .fields()
            .first()
            .map(|f| f.kind)
            .ok_or_else(|| Error::Malformed("array schema declares no element kind".into()))?;

        let snapshot = self.arena_snapshot().to_vec();
        let mut vals = self.decode_array_slots(offset);
        vals.dedup_by(|a, b| compare_val(&elem_kind, &snapshot, *a, &snapshot, *b) == Ordering::Equal);

        let arena = self.arena_mut()?;
        let new_count = (vals.len() + 1) as u32;
        arena[offset..offset + 4].copy_from_slice(&new_count.to_le_bytes());
        for (i, v) in vals.into_iter().enumerate() {
            let at = offset + 4 + i * 4;
            arena[at..at + 4].copy_from_slice(&v.raw().to_le_bytes());
        }
        Ok(())
    }
}

/// Builds one object or array. Field writes go to 1-based slots; array
/// elements are appended with `push_*`.
pub struct Builder<'w> {
    writer: &'w mut Writer,
    schema: &'static dyn ObjectSchema,
    slots: Vec<Val>,
}

impl<'w> Builder<'w> {
    pub fn writer(&mut self) -> &mut Writer {
        self.writer
    }

    pub fn set(&mut self, field: usize, val: Val) -> Result<()> {
        if field == 0 || field >= self.slots.len() {
            return Err(Error::Malformed(format!("field index {field} out of range")));
        }
        self.slots[field] = val;
        Ok(())
    }

    pub fn set_int(&mut self, field: usize, v: u32) -> Result<()> {
        let val = self.writer.w_int(v)?;
        self.set(field, val)
    }

    pub fn set_blob(&mut self, field: usize, bytes: &[u8]) -> Result<()> {
        let val = self.writer.w_blob(bytes)?;
        self.set(field, val)
    }

    pub fn push(&mut self, val: Val) -> Result<()> {
        self.slots.push(val);
        Ok(())
    }

    pub fn push_int(&mut self, v: u32) -> Result<()> {
        let val = self.writer.w_int(v)?;
        self.push(val)
    }

    pub fn push_blob(&mut self, bytes: &[u8]) -> Result<()> {
        let val = self.writer.w_blob(bytes)?;
        self.push(val)
    }

    /// Runs `pre_commit`, truncates trailing `NULL` slots (leaving at least
    /// the length slot), and interns the resulting vector. An
    /// all-`NULL` builder commits to `NULL`.
    pub fn commit(mut self) -> Result<Val> {
        let schema = self.schema;
        schema.pre_commit(&mut self)?;

        while self.slots.len() > 1 && self.slots.last() == Some(&Val::NULL) {
            self.slots.pop();
        }
        if self.slots.len() == 1 {
            return Ok(Val::NULL);
        }

        let n = self.slots.len() as u32;
        let mut bytes = Vec::with_capacity(self.slots.len() * 4);
        bytes.extend_from_slice(&n.to_le_bytes());
        for v in &self.slots[1..] {
            bytes.extend_from_slice(&v.raw().to_le_bytes());
        }
        let offset = self.writer.w_data(&[&bytes], 4)?;
        Ok(if schema.is_array() {
            Val::array_ref(offset)
        } else {
            Val::object_ref(offset)
        })
    }
}
