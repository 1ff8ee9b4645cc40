// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The three lifecycle states a database can be in (spec §3.6): mapped
//! (read-only mmap), writable (growable arena + dedup), and static
//! (caller-provided, non-growable). Resource release rides on Rust's own
//! `Drop` — `Mmap` unmaps itself, `Vec`/`DedupTable` free themselves — so
//! there is no custom `Drop` impl here beyond what the compiler already
//! generates field-by-field.

use std::ops::Range;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;
use crate::signature::TrustStore;
use crate::writer::{Writer, WriterOptions};

pub enum Database {
    Mapped {
        mmap: Mmap,
        schema: u32,
        trusted_key_id: Option<[u8; 16]>,
        adb_range: Range<usize>,
    },
    Writable(Writer),
    Static(&'static [u8]),
}

impl Database {
    /// Maps `path` read-only, validates the header/schema, and verifies its
    /// signatures against `store`. On any failure the mmap is dropped (and
    /// so unmapped) before the error is returned.
    pub fn open_mapped(path: &Path, expected_schema: Option<u32>, store: &dyn TrustStore) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let result = crate::container::map(&mmap, expected_schema, store)?;
        let offset = result.arena.as_ptr() as usize - mmap.as_ptr() as usize;
        let len = result.arena.len();
        let schema = result.schema;
        let trusted_key_id = result.trusted_key_id;
        Ok(Database::Mapped {
            mmap,
            schema,
            trusted_key_id,
            adb_range: offset..offset + len,
        })
    }

    pub fn writable() -> Self {
        Database::Writable(Writer::new_writable())
    }

    pub fn writable_with_options(options: WriterOptions) -> Self {
        Database::Writable(Writer::with_options(options))
    }

    pub fn static_db(bytes: &'static [u8]) -> Self {
        Database::Static(bytes)
    }

    pub fn arena(&self) -> &[u8] {
        match self {
            Database::Mapped { mmap, adb_range, .. } => &mmap[adb_range.clone()],
            Database::Writable(w) => w.arena_snapshot(),
            Database::Static(bytes) => bytes,
        }
    }

    pub fn schema(&self) -> Option<u32> {
        match self {
            Database::Mapped { schema, .. } => Some(*schema),
            _ => None,
        }
    }

    pub fn trusted_key_id(&self) -> Option<[u8; 16]> {
        match self {
            Database::Mapped { trusted_key_id, .. } => *trusted_key_id,
            _ => None,
        }
    }

    pub fn writer_mut(&mut self) -> Option<&mut Writer> {
        match self {
            Database::Writable(w) => Some(w),
            _ => None,
        }
    }
}
