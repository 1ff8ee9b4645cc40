// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Error type for the ADB container engine.
///
/// Covers both the read path (malformed containers, signature failures) and
/// the write path (arena growth limits, unimplemented value kinds).
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed container: {0}")]
    Malformed(String),

    #[error("container schema {found} does not match expected schema {expected}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("no signature verified the container")]
    NoKey,

    #[error("{0} signature(s) attempted, all failed verification")]
    KeyRejected(usize),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("value exceeds the per-level object/array size cap of {cap}")]
    TooLarge { cap: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
