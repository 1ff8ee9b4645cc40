// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Container I/O: header validation, block-stream verification, and the
//! transform pass. Three read entry modes (map, blob, stream) share the same
//! signature-verification walk; only where the bytes come from differs.

use std::io::{Read, Write};

use crate::block::{decode_header_word, write_block, BlockHeader, BlockKind};
use crate::error::{Error, Result};
use crate::signature::{SigRecord, TrustStore, VerifyContext};

pub const MAGIC: u32 = 0x2e42_4441;
pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub magic: u32,
    pub schema: u32,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Header> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Malformed("container header truncated".into()));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let schema = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::Malformed(format!("bad container magic {magic:#x}")));
        }
        Ok(Header { magic, schema })
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.schema.to_le_bytes());
        out
    }
}

/// Result of a successful map or blob read: a borrowed view into the
/// caller's byte buffer, plus whatever trust was established.
pub struct MapResult<'a> {
    pub schema: u32,
    pub arena: &'a [u8],
    pub trusted_key_id: Option<[u8; 16]>,
}

/// Walks the block stream in `body` (everything after any header), requiring
/// `ADB` first, verifying every `SIG` that follows. `DATA` blocks are
/// tolerated and ignored, per spec's map-mode rule; a second `ADB` block or
/// any `Reserved` (unknown block type) is malformed.
fn verify_block_stream(
    header_bytes: &[u8],
    body: &[u8],
    store: &dyn TrustStore,
) -> Result<(&[u8], Option<[u8; 16]>)> {
    let mut cursor = crate::block::BlockCursor::new(body);
    let (first, adb_payload) = cursor
        .next()
        .ok_or_else(|| Error::Malformed("container has no blocks".into()))??;
    if first.kind != BlockKind::Adb {
        return Err(Error::Malformed("first block is not ADB".into()));
    }

    let mut vctx = VerifyContext::new(header_bytes.to_vec(), adb_payload.to_vec());
    let mut sig_count = 0usize;
    for next in cursor {
        let (blk, payload) = next?;
        match blk.kind {
            BlockKind::Sig => {
                sig_count += 1;
                let record = SigRecord::parse(payload)?;
                let _ = vctx.verify_record(&record, store);
            }
            BlockKind::Adb => {
                log::warn!("rejecting container: a second ADB block follows the first");
                return Err(Error::Malformed("ADB block must be first and unique".into()));
            }
            BlockKind::Reserved => {
                log::warn!("rejecting container: reserved block type is not a recognized block kind");
                return Err(Error::Malformed("unknown (reserved) block type".into()));
            }
            BlockKind::Data => {}
        }
    }

    if sig_count > 0 && vctx.trusted_key_id().is_none() {
        log::warn!("container carried {sig_count} signature(s) but none verified against the trust store");
        return Err(Error::KeyRejected(sig_count));
    }
    Ok((adb_payload, vctx.trusted_key_id()))
}

/// Map mode: `bytes` is the whole container file (already memory-mapped or
/// otherwise fully in memory), beginning with the 8-byte header.
pub fn map<'a>(bytes: &'a [u8], expected_schema: Option<u32>, store: &dyn TrustStore) -> Result<MapResult<'a>> {
    let header = Header::parse(bytes)?;
    if let Some(expected) = expected_schema {
        if header.schema != expected {
            return Err(Error::SchemaMismatch {
                expected,
                found: header.schema,
            });
        }
    }
    let header_bytes = &bytes[..HEADER_LEN];
    let body = &bytes[HEADER_LEN..];
    let (arena, trusted_key_id) = verify_block_stream(header_bytes, body, store)?;
    Ok(MapResult {
        schema: header.schema,
        arena,
        trusted_key_id,
    })
}

/// Blob mode: `bytes` is a caller-supplied block-framed range with no
/// 8-byte header, so the signed message's header portion is empty.
pub fn map_blob(bytes: &[u8], store: &dyn TrustStore) -> Result<MapResult<'_>> {
    let (arena, trusted_key_id) = verify_block_stream(&[], bytes, store)?;
    Ok(MapResult {
        schema: 0,
        arena,
        trusted_key_id,
    })
}

/// Result of a successful streamed read: the `ADB` block's payload, owned,
/// since it was never backed by a borrowable buffer in the first place.
pub struct StreamResult {
    pub schema: u32,
    pub arena: Vec<u8>,
    pub trusted_key_id: Option<[u8; 16]>,
}

fn try_read_header<R: Read>(input: &mut R) -> Result<Option<BlockHeader>> {
    let mut buf = [0u8; 4];
    let mut got = 0;
    while got < 4 {
        let n = input.read(&mut buf[got..])?;
        if n == 0 {
            if got == 0 {
                return Ok(None);
            }
            return Err(Error::Malformed("stream ended mid block header".into()));
        }
        got += n;
    }
    let raw = u32::from_le_bytes(buf);
    Ok(Some(decode_header_word(raw)?))
}

fn skip_padding<R: Read>(input: &mut R, header: BlockHeader) -> Result<()> {
    let pad = header.padded_len() - header.size as usize;
    if pad == 0 {
        return Ok(());
    }
    let mut buf = vec![0u8; pad];
    input.read_exact(&mut buf)?;
    Ok(())
}

/// Stream mode: pulls one block at a time from `input`. `ADB` must be first.
/// Every `SIG` is verified as it arrives; every `DATA` block requires a
/// signature to have already verified, or fails with `NoKey`. `DATA`
/// payloads are handed to `datacb` as a bounded reader; any portion the
/// callback doesn't consume is discarded before moving to the next block.
pub fn stream<R: Read>(
    mut input: R,
    expected_schema: Option<u32>,
    store: &dyn TrustStore,
    mut datacb: impl FnMut(u64, &mut dyn Read) -> Result<()>,
) -> Result<StreamResult> {
    let mut header_bytes = [0u8; HEADER_LEN];
    input.read_exact(&mut header_bytes)?;
    let header = Header::parse(&header_bytes)?;
    if let Some(expected) = expected_schema {
        if header.schema != expected {
            return Err(Error::SchemaMismatch {
                expected,
                found: header.schema,
            });
        }
    }

    let adb_header = try_read_header(&mut input)?
        .ok_or_else(|| Error::Malformed("container has no blocks".into()))?;
    if adb_header.kind != BlockKind::Adb {
        return Err(Error::Malformed("first block is not ADB".into()));
    }
    let mut adb_payload = vec![0u8; adb_header.payload_len()];
    input.read_exact(&mut adb_payload)?;
    skip_padding(&mut input, adb_header)?;

    let mut vctx = VerifyContext::new(header_bytes.to_vec(), adb_payload.clone());
    let mut trusted = false;
    let mut sig_count = 0usize;

    while let Some(blk) = try_read_header(&mut input)? {
        match blk.kind {
            BlockKind::Sig => {
                let mut payload = vec![0u8; blk.payload_len()];
                input.read_exact(&mut payload)?;
                skip_padding(&mut input, blk)?;
                sig_count += 1;
                let record = SigRecord::parse(&payload)?;
                if vctx.verify_record(&record, store).is_ok() {
                    trusted = true;
                }
            }
            BlockKind::Data => {
                if !trusted {
                    log::warn!("rejecting DATA block: no signature has verified yet");
                    return Err(Error::NoKey);
                }
                let len = blk.payload_len() as u64;
                let mut segment = (&mut input).take(len);
                datacb(len, &mut segment)?;
                std::io::copy(&mut segment, &mut std::io::sink())?;
                skip_padding(&mut input, blk)?;
            }
            BlockKind::Adb => {
                log::warn!("rejecting stream: a second ADB block follows the first");
                return Err(Error::Malformed("ADB block must be first and unique".into()));
            }
            BlockKind::Reserved => {
                log::warn!("rejecting stream: reserved block type is not a recognized block kind");
                return Err(Error::Malformed("unknown (reserved) block type".into()));
            }
        }
    }

    if sig_count > 0 && !trusted {
        log::warn!("streamed container carried {sig_count} signature(s) but none verified against the trust store");
        return Err(Error::KeyRejected(sig_count));
    }

    Ok(StreamResult {
        schema: header.schema,
        arena: adb_payload,
        trusted_key_id: vctx.trusted_key_id(),
    })
}

/// What the transform callback decides to do with one block.
pub enum XfrmAction {
    /// Copy the block through unchanged (header, payload, and padding).
    PassThrough,
    /// Replace the block's payload; its header is re-emitted with the new
    /// size, same kind.
    Replace(Vec<u8>),
    /// Omit the block from the output entirely.
    Drop,
}

/// Rewrites a container block-by-block from `input` to `output`. The header
/// is copied verbatim. `xfrm_cb` sees each block's header and payload and
/// decides whether to pass it through, replace it, or drop it; an error from
/// the callback stops the transform immediately, leaving `output` with
/// whatever was already written (spec's "cancels the output stream").
pub fn transform<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    mut xfrm_cb: impl FnMut(&BlockHeader, &[u8]) -> Result<XfrmAction>,
) -> Result<()> {
    let mut header_bytes = [0u8; HEADER_LEN];
    input.read_exact(&mut header_bytes)?;
    output.write_all(&header_bytes)?;

    while let Some(blk) = try_read_header(&mut input)? {
        let mut payload = vec![0u8; blk.payload_len()];
        input.read_exact(&mut payload)?;
        skip_padding(&mut input, blk)?;

        match xfrm_cb(&blk, &payload)? {
            XfrmAction::PassThrough => {
                let mut buf = Vec::new();
                write_block(&mut buf, blk.kind, &payload);
                output.write_all(&buf)?;
            }
            XfrmAction::Replace(new_payload) => {
                let mut buf = Vec::new();
                write_block(&mut buf, blk.kind, &new_payload);
                output.write_all(&buf)?;
            }
            XfrmAction::Drop => {}
        }
    }
    Ok(())
}
