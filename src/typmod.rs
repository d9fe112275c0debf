//! Packing and unpacking the DDL-surface type modifier (§6): a 32-bit token
//! whose low 15 bits hold `[log_2m:5][reg_width:3][expthresh:6][sparseon:1]`,
//! most significant field first. Grounded in `original_source/hll.c`'s
//! `hll_typmod_in`/`hll_typmod_out` (`TYPMOD_BITS`, `LOG2M_BITS`,
//! `REGWIDTH_BITS`, `EXPTHRESH_BITS`, `SPARSEON_BITS`).

use crate::error::HllError;
use crate::settings::Settings;

const LOG2M_BITS: u32 = 5;
const REGWIDTH_BITS: u32 = 3;
const EXPTHRESH_BITS: u32 = 6;
const SPARSEON_BITS: u32 = 1;

const SPARSEON_SHIFT: u32 = 0;
const EXPTHRESH_SHIFT: u32 = SPARSEON_SHIFT + SPARSEON_BITS;
const REGWIDTH_SHIFT: u32 = EXPTHRESH_SHIFT + EXPTHRESH_BITS;
const LOG2M_SHIFT: u32 = REGWIDTH_SHIFT + REGWIDTH_BITS;

fn mask(bits: u32) -> u32 {
    (1 << bits) - 1
}

/// Packs `(log_2m, reg_width, expthresh, sparseon)` into a type-modifier
/// token, validating them the same way `Settings::new` would (the
/// parameters must describe a constructible sketch before a DDL column can
/// be declared with them).
pub fn pack(log_2m: u32, reg_width: u32, expthresh: i64, sparseon: bool) -> Result<i32, HllError> {
    // reg_width is stored as `reg_width - 1`, same as the wire header.
    let settings = Settings::new(log_2m, reg_width, expthresh, sparseon)?;

    if log_2m > mask(LOG2M_BITS) {
        return Err(HllError::invalid("log_2m does not fit the typmod field"));
    }
    let stored_reg_width = reg_width - 1;
    if stored_reg_width > mask(REGWIDTH_BITS) {
        return Err(HllError::invalid("reg_width does not fit the typmod field"));
    }

    let encoded_expthresh = Settings::encode_expthresh(settings.explicit_threshold) as u32;

    let token = (log_2m << LOG2M_SHIFT)
        | (stored_reg_width << REGWIDTH_SHIFT)
        | (encoded_expthresh << EXPTHRESH_SHIFT)
        | ((sparseon as u32) << SPARSEON_SHIFT);

    Ok(token as i32)
}

/// Unpacks a type-modifier token back into `(log_2m, reg_width, expthresh,
/// sparseon)`.
pub fn unpack(token: i32) -> Result<(u32, u32, i64, bool), HllError> {
    let token = token as u32;

    let log_2m = (token >> LOG2M_SHIFT) & mask(LOG2M_BITS);
    let reg_width = ((token >> REGWIDTH_SHIFT) & mask(REGWIDTH_BITS)) + 1;
    let encoded_expthresh = ((token >> EXPTHRESH_SHIFT) & mask(EXPTHRESH_BITS)) as u8;
    let sparseon = ((token >> SPARSEON_SHIFT) & mask(SPARSEON_BITS)) == 1;

    let expthresh = Settings::decode_expthresh(encoded_expthresh);

    // Validates the unpacked fields describe a constructible sketch.
    Settings::new(log_2m, reg_width, expthresh, sparseon)?;

    Ok((log_2m, reg_width, expthresh, sparseon))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        for (log_2m, reg_width, expthresh, sparseon) in [
            (11u32, 5u32, -1i64, true),
            (4, 1, 0, false),
            (10, 8, 1024, true),
            (0, 5, 0, false),
        ] {
            let token = pack(log_2m, reg_width, expthresh, sparseon).unwrap();
            let (got_log2m, got_regwidth, got_expthresh, got_sparseon) = unpack(token).unwrap();
            assert_eq!(got_log2m, log_2m);
            assert_eq!(got_regwidth, reg_width);
            assert_eq!(got_expthresh, expthresh);
            assert_eq!(got_sparseon, sparseon);
        }
    }

    #[test]
    fn pack_rejects_invalid_parameters() {
        assert!(pack(32, 5, 0, false).is_err());
        assert!(pack(10, 9, 0, false).is_err());
        assert!(pack(10, 5, 3, false).is_err());
    }
}
