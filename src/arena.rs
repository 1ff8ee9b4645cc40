// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Alignment helpers shared by the writer (padding on append) and the block
//! framer (padding blocks to the container alignment).

/// Rounds `offset` up to the next multiple of `align`. `align` must be a
/// power of two.
pub fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Number of zero padding bytes needed after `size` bytes to reach the next
/// multiple of `align`.
pub fn pad_len(size: usize, align: usize) -> usize {
    align_up(size, align) - size
}

/// Reads the root `Val` from the final 4 bytes of an arena.
pub fn read_root(arena: &[u8]) -> crate::error::Result<crate::value::Val> {
    if arena.len() < 4 {
        return Err(crate::error::Error::Malformed(
            "arena shorter than one root value".into(),
        ));
    }
    let bytes = &arena[arena.len() - 4..];
    Ok(crate::value::Val::from_raw(u32::from_le_bytes(
        bytes.try_into().unwrap(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(5, 32), 32);
        assert_eq!(align_up(32, 32), 32);
    }

    #[test]
    fn pad_len_matches_spec_formula() {
        // (align - size) mod align
        for size in 0..40usize {
            let expected = (32 - size % 32) % 32;
            assert_eq!(pad_len(size, 32), expected);
        }
    }
}
