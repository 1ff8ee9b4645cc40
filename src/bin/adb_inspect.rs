// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Read-only inspector for ADB containers: maps a file, verifies its
//! signatures against a directory of toy trust-store keys, and dumps the
//! raw value tree. Ambient developer tooling, not a package-manager applet
//! — it has no notion of what a particular container's fields mean.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use forest_adb::testing::HmacTrustStore;
use forest_adb::value::{Tag, Val};
use forest_adb::{reader, Database};

#[derive(Parser)]
#[command(about = "Map and dump an ADB container")]
struct Args {
    /// Path to the container file.
    path: PathBuf,

    /// Expected container schema tag; mismatches fail with schema-mismatch.
    #[arg(long)]
    schema: Option<u32>,

    /// Directory of toy trust-store key files (32 hex char filename = key
    /// id, file contents = shared secret). Omit to verify against no keys
    /// (the container is still dumped if it has no required signatures).
    #[arg(long)]
    trust_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = match &args.trust_dir {
        Some(dir) => HmacTrustStore::load_dir(dir).context("loading trust store directory")?,
        None => HmacTrustStore::new(Vec::new()),
    };

    let db = Database::open_mapped(&args.path, args.schema, &store)
        .with_context(|| format!("opening {}", args.path.display()))?;

    println!("schema: {:?}", db.schema());
    match db.trusted_key_id() {
        Some(id) => println!("trusted key: {}", hex(&id)),
        None => println!("trusted key: <none>"),
    }

    let arena = db.arena();
    let root = reader::root(arena).context("reading root value")?;
    let mut out = String::new();
    dump_raw(arena, root, 0, &mut out);
    print!("{out}");
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn dump_raw(arena: &[u8], val: Val, depth: usize, out: &mut String) {
    use std::fmt::Write;
    let indent = "  ".repeat(depth);
    match val.tag() {
        Some(Tag::Special) => {
            if val.is_null() {
                let _ = writeln!(out, "{indent}null");
            } else {
                let _ = writeln!(out, "{indent}<error {:?}>", val.error_code());
            }
        }
        Some(Tag::Int) | Some(Tag::Int32) => {
            let _ = writeln!(out, "{indent}int {}", reader::int(arena, val));
        }
        Some(Tag::Int64) => {
            let _ = writeln!(out, "{indent}<int64, not implemented>");
        }
        Some(Tag::Blob8) | Some(Tag::Blob16) | Some(Tag::Blob32) => {
            let bytes = reader::blob(arena, val);
            let _ = writeln!(out, "{indent}blob[{}] {:?}", bytes.len(), String::from_utf8_lossy(bytes));
        }
        Some(tag @ (Tag::Object | Tag::Array)) => {
            let label = if tag == Tag::Array { "array" } else { "object" };
            let _ = writeln!(out, "{indent}{label} {{");
            let offset = val.payload() as usize;
            if let Some(count_bytes) = arena.get(offset..offset + 4) {
                let count = u32::from_le_bytes(count_bytes.try_into().unwrap()) as usize;
                for i in 1..count {
                    let at = offset + 4 + (i - 1) * 4;
                    if let Some(slot_bytes) = arena.get(at..at + 4) {
                        let slot = Val::from_raw(u32::from_le_bytes(slot_bytes.try_into().unwrap()));
                        dump_raw(arena, slot, depth + 1, out);
                    }
                }
            }
            let _ = writeln!(out, "{indent}}}");
        }
        None => {
            let _ = writeln!(out, "{indent}<unknown tag>");
        }
    }
}
