//! SPARSE is a serialization-only view over a COMPRESSED register array: a
//! sequence of `(index, value)` pairs for the non-zero registers, each
//! packed into one `(log_2m + reg_width)`-bit chunk. It is never retained
//! in memory as a distinct `Hll` state (§3, §9) — `Hll::from_bytes` decodes
//! a SPARSE payload straight into a `DenseRegisters`, and `Hll::to_bytes`
//! only considers the SPARSE encoding as one of two ways to serialize an
//! already-live `Hll::Dense` value.

use crate::Registers;
use crate::dense::DenseRegisters;
use crate::error::HllError;
use crate::settings::Settings;
use crate::utils::{calc_position, divide_by_8_round_up, read_bits, write_bits};

fn chunk_bits(settings: &Settings) -> Result<u8, HllError> {
    let bits = settings.log_2m + settings.reg_width;
    if bits > 32 {
        return Err(HllError::malformed(
            "sparse chunk width exceeds 32 bits for these parameters",
        ));
    }
    Ok(bits as u8)
}

/// Size in bytes of the sparse encoding of `nfilled` non-zero registers.
pub(crate) fn bytes_size(nfilled: usize, settings: &Settings) -> usize {
    let bits = (settings.log_2m + settings.reg_width) as u64;
    divide_by_8_round_up(bits * nfilled as u64) as usize
}

/// The SPARSE-vs-COMPRESSED decision (§4.6), factored into the one place
/// both the size computation and the pack function consult, so they cannot
/// disagree about the chosen encoding (§9, last open question).
pub(crate) fn prefers_sparse(
    nfilled: usize,
    settings: &Settings,
    max_sparse: i64,
) -> bool {
    if !settings.sparseon {
        return false;
    }
    if chunk_bits(settings).is_err() {
        return false;
    }

    if max_sparse >= 0 {
        return (nfilled as i64) <= max_sparse;
    }

    let sparse_bits = (settings.log_2m + settings.reg_width) as u64 * nfilled as u64;
    let compressed_bits = settings.m() as u64 * settings.reg_width as u64;
    sparse_bits < compressed_bits
}

/// Writes the non-zero registers of `dense` as consecutive
/// `(log_2m + reg_width)`-bit `(index << reg_width) | value` chunks.
pub(crate) fn encode(dense: &DenseRegisters, buf: &mut [u8]) -> Result<(), HllError> {
    let settings = &dense.settings;
    let bits = chunk_bits(settings)?;

    let mut i = 0u32;
    for (reg_num, value) in dense.iter().filter(|(_, v)| *v != 0) {
        let (idx, pos) = calc_position(i, bits);
        let chunk = (reg_num << settings.reg_width) | value as u32;
        write_bits(buf, idx, pos, chunk, bits);
        i += 1;
    }

    Ok(())
}

/// Decodes a SPARSE payload directly into a fresh `DenseRegisters`.
pub(crate) fn decode(settings: &Settings, buf: &[u8]) -> Result<DenseRegisters, HllError> {
    let bits = chunk_bits(settings)?;
    let bits32 = bits as u32;

    let unpacked_size =
        divide_by_8_round_up(settings.m() as u64 * settings.reg_width as u64) as usize;
    if unpacked_size > crate::MAX_PAYLOAD_BYTES {
        return Err(HllError::malformed(
            "sparse payload unpacks to a dense size exceeding the maximum sketch size",
        ));
    }

    let max_offset = buf.len() as u32 * u8::BITS;
    let reg_mask: u32 = (1 << settings.reg_width) - 1;

    let mut dense = DenseRegisters::with_settings(settings);
    let mut offset = 0u32;
    let mut i = 0u32;
    while offset + bits32 <= max_offset {
        let (idx, pos) = calc_position(i, bits);
        let chunk = read_bits(buf, idx, pos, bits);
        let reg_num = chunk >> settings.reg_width;
        let reg_value = chunk & reg_mask;

        dense.set_if_greater(reg_num, reg_value as u8);

        offset += bits32;
        i += 1;
    }

    let remaining = max_offset - offset;
    if remaining >= bits32 {
        return Err(HllError::malformed(
            "sparse payload length is inconsistent with its chunk width",
        ));
    }
    if remaining > 0 {
        let (idx, pos) = calc_position(i, bits);
        if read_bits(buf, idx, pos, remaining as u8) != 0 {
            return Err(HllError::malformed("sparse payload trailing pad is not zero"));
        }
    }

    Ok(dense)
}
