use crate::error::HllError;
use crate::utils::divide_by_8_round_up;

// minimum and maximum values for the log-base-2 of the number of registers
// in the Hll. Matches the 5-bit typmod field (`check_modifiers` in the
// reference implementation allows the full unsigned 5-bit range).
const MINIMUM_LOG_2M_PARAM: u32 = 0;
const MAXIMUM_LOG_2M_PARAM: u32 = 31;

// minimum and maximum values for the register width of the Hll (logical,
// not the on-wire `reg_width - 1` encoding).
const MINIMUM_REG_WIDTH_PARAM: u32 = 1;
const MAXIMUM_REG_WIDTH_PARAM: u32 = 8;

/// AUTO_EXPLICIT_THRESHOLD indicates that the threshold at which a sketch
/// goes from an explicit to a probabilistic representation should be
/// calculated from `(log_2m, reg_width)`. Using the calculated threshold is
/// generally preferable; a fixed value is mostly useful when reproducing an
/// existing data set that used a particular explicit threshold.
pub const AUTO_EXPLICIT_THRESHOLD: i64 = -1;

/// Largest `expthresh` the 6-bit wire encoding can represent (`e` maxes out
/// at 62, giving `2^(62-1)`; `e = 63` is reserved for "auto").
const MAXIMUM_WIRE_EXPTHRESH: i64 = 1 << 61;

/// `Settings` are the immutable parameters of a sketch: register count,
/// register width, explicit-set capacity, and whether sparse serialization
/// is permitted. Everything else about cardinality estimation is derived
/// from these four values once, at construction time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Settings {
    /// log_2m determines the number of registers in the Hll: `m = 1 << log_2m`.
    pub(crate) log_2m: u32,

    /// reg_width is the number of bits dedicated to each register value,
    /// logical range `1..=8`.
    pub(crate) reg_width: u32,

    /// explicit_threshold is the declared (wire-form) `expthresh`: `-1`
    /// (auto), `0` (explicit storage disabled), or a power of two up to
    /// `2^61`.
    pub(crate) explicit_threshold: i64,

    /// sparseon controls whether the serializer may choose the sparse
    /// (index, value)-list wire encoding when it is smaller.
    pub(crate) sparseon: bool,

    /// pw_max_mask is a mask that prevents overflow of Hll registers.
    pub(crate) pw_max_mask: u64,

    /// m_bits_mask is a precomputed mask where the bottom-most log_2m bits are set.
    pub(crate) m_bits_mask: u64,

    /// alpha * m^2 (the constant in the "raw" HyperLogLog estimator)
    pub(crate) alpha_msquared: f64,

    /// small_estimator_cutoff is the cutoff value of the estimator for using
    /// the "small range correction" formula.
    pub(crate) small_estimator_cutoff: f64,

    /// large_estimator_cutoff is the cutoff value of the estimator for using
    /// the "large range correction" formula.
    pub(crate) large_estimator_cutoff: f64,
    pub(crate) two_to_l: f64,
}

impl Settings {
    pub fn new(
        log_2m: u32,
        reg_width: u32,
        explicit_threshold: i64,
        sparseon: bool,
    ) -> Result<Self, HllError> {
        let settings = Self {
            log_2m,
            reg_width,
            explicit_threshold,
            sparseon,
            pw_max_mask: Settings::pw_max_mask(reg_width),
            m_bits_mask: (1u64 << log_2m) - 1,
            alpha_msquared: Settings::alpha_m_squared(log_2m),
            small_estimator_cutoff: Settings::small_estimator_cutoff(1 << log_2m),
            large_estimator_cutoff: Settings::large_estimator_cutoff(Settings::two_to_l(
                log_2m, reg_width,
            )),
            two_to_l: Settings::two_to_l(log_2m, reg_width),
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), HllError> {
        if !(MINIMUM_LOG_2M_PARAM..=MAXIMUM_LOG_2M_PARAM).contains(&self.log_2m) {
            return Err(HllError::invalid(format!(
                "log_2m must be between {MINIMUM_LOG_2M_PARAM} and {MAXIMUM_LOG_2M_PARAM}"
            )));
        }

        if !(MINIMUM_REG_WIDTH_PARAM..=MAXIMUM_REG_WIDTH_PARAM).contains(&self.reg_width) {
            return Err(HllError::invalid(format!(
                "reg_width must be between {MINIMUM_REG_WIDTH_PARAM} and {MAXIMUM_REG_WIDTH_PARAM}"
            )));
        }

        if self.explicit_threshold != AUTO_EXPLICIT_THRESHOLD {
            if self.explicit_threshold < 0 || self.explicit_threshold > MAXIMUM_WIRE_EXPTHRESH {
                return Err(HllError::invalid(format!(
                    "expthresh must be -1, 0, or a power of two up to {MAXIMUM_WIRE_EXPTHRESH}"
                )));
            }

            if self.explicit_threshold > 0 && !self.explicit_threshold.is_power_of_two() {
                return Err(HllError::invalid("expthresh must be a power of two"));
            }
        }

        Ok(())
    }

    pub fn settings_check(&self, other: &Self) -> Result<(), HllError> {
        if self.log_2m == other.log_2m && self.reg_width == other.reg_width {
            return Ok(());
        }

        Err(HllError::IncompatibleMetadata)
    }

    pub fn m(&self) -> u32 {
        1 << self.log_2m
    }

    /// The resolved (effective) explicit-set capacity: `declared` unless
    /// `declared == -1`, in which case it is the number of 64-bit hashes
    /// that fit in this sketch's compressed payload size.
    pub fn explicit_threshold(&self) -> u64 {
        match self.explicit_threshold {
            AUTO_EXPLICIT_THRESHOLD => {
                Self::calculate_explicit_threshold(self.log_2m, self.reg_width)
            }
            _ => self.explicit_threshold as u64,
        }
    }

    /// (declared, effective) pair surfaced by the `expthresh` operation.
    pub fn expthresh(&self) -> (i64, u64) {
        (self.explicit_threshold, self.explicit_threshold())
    }

    /// Determines the auto explicit-set cutoff: how many 64-bit hashes fit
    /// in the compressed representation of this sketch. Matches the size
    /// calculation in the reference implementation.
    pub fn calculate_explicit_threshold(log_2m: u32, reg_width: u32) -> u64 {
        let m: u64 = 1u64 << log_2m;
        let cmp_bits = (reg_width as u64) * m;
        let cmp_bytes = divide_by_8_round_up(cmp_bits);

        cmp_bytes / 8
    }

    // pw_max_mask calculates the mask that is used to prevent overflow of
    // Hll registers.
    pub(crate) fn pw_max_mask(reg_width: u32) -> u64 {
        let shift: u64 = (((1u64 << reg_width) - 1) - 1) % (u64::BITS as u64);
        !((1u64 << shift) - 1)
    }

    /// alpha_m_squared calculates the 'alpha-m-squared' constant (gamma
    /// times registerCount squared, where gamma depends on registerCount)
    /// used by the HyperLogLog algorithm.
    pub(crate) fn alpha_m_squared(log_2m: u32) -> f64 {
        let m: f64 = (1u64 << log_2m) as f64;

        match log_2m {
            4 => 0.673 * m * m,
            5 => 0.697 * m * m,
            6 => 0.709 * m * m,
            _ => (0.7213 / (1.0 + 1.079 / m)) * m * m,
        }
    }

    // small_estimator_cutoff calculates the "small range correction" cutoff,
    // (5/2) * m.
    pub(crate) fn small_estimator_cutoff(m: u32) -> f64 {
        let m: f64 = m.into();
        (m * 5.0) / 2.0
    }

    // large_estimator_cutoff calculates the cutoff for using the "large
    // range correction" formula, adapted for 64-bit hashes.
    pub(crate) fn large_estimator_cutoff(two_to_l: f64) -> f64 {
        two_to_l / 30.0
    }

    // two_to_l calculates 2^L where L is the "large range correction
    // boundary".
    pub(crate) fn two_to_l(log_2m: u32, reg_width: u32) -> f64 {
        let max_register_value = (1u32 << reg_width) - 1;

        // Since 1 is added to p(w) in the insertion algorithm, only
        // (max_register_value - 1) bits are inspected, hence the hash
        // space is one power of two smaller.
        let pw_bits = max_register_value - 1;
        let total_bits = pw_bits + log_2m;

        2_f64.powf(total_bits.into())
    }

    /// Encodes a declared `expthresh` into the 6-bit wire form: `0 -> 0`,
    /// `-1 -> 63`, else `log2(value) + 1`.
    pub(crate) fn encode_expthresh(explicit_threshold: i64) -> u8 {
        if explicit_threshold == AUTO_EXPLICIT_THRESHOLD {
            63
        } else if explicit_threshold == 0 {
            0
        } else {
            64 - (explicit_threshold as u64).leading_zeros() as u8 - 1
        }
    }

    /// Decodes the 6-bit wire form back into a declared `expthresh`.
    pub(crate) fn decode_expthresh(e: u8) -> i64 {
        let e = e & 0x3F;
        if e == 0 {
            0
        } else if e == 63 {
            AUTO_EXPLICIT_THRESHOLD
        } else {
            1i64 << (e - 1)
        }
    }

    pub(crate) fn pack_cutoff_byte(&self) -> u8 {
        let mut res = Self::encode_expthresh(self.explicit_threshold);
        if self.sparseon {
            res |= 1 << 6
        }
        res
    }

    /// (sparseon, declared expthresh)
    pub(crate) fn unpack_cutoff_byte(b: u8) -> (bool, i64) {
        let sparseon = (b >> 6) & 1 == 1;
        (sparseon, Self::decode_expthresh(b))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_out_of_range_log2m() {
        assert!(Settings::new(32, 5, 0, false).is_err());
    }

    #[test]
    fn rejects_out_of_range_reg_width() {
        assert!(Settings::new(10, 0, 0, false).is_err());
        assert!(Settings::new(10, 9, 0, false).is_err());
    }

    #[test]
    fn rejects_non_power_of_two_expthresh() {
        assert!(Settings::new(10, 5, 3, false).is_err());
    }

    #[test]
    fn accepts_boundary_log2m() {
        assert!(Settings::new(0, 5, 0, false).is_ok());
        assert!(Settings::new(31, 1, 0, false).is_ok());
    }

    #[test]
    fn cutoff_byte_round_trips() {
        for (explicit_threshold, sparseon) in [
            (AUTO_EXPLICIT_THRESHOLD, true),
            (0, false),
            (1024, true),
            (1, false),
        ] {
            let settings = Settings::new(10, 5, explicit_threshold, sparseon).unwrap();
            let packed = settings.pack_cutoff_byte();
            let (got_sparseon, got_threshold) = Settings::unpack_cutoff_byte(packed);
            assert_eq!(got_sparseon, sparseon);
            assert_eq!(got_threshold, explicit_threshold);
        }
    }

    #[test]
    fn settings_check_requires_matching_log2m_and_reg_width() {
        let a = Settings::new(10, 5, 0, false).unwrap();
        let b = Settings::new(11, 5, 0, false).unwrap();
        assert!(a.settings_check(&b).is_err());

        let c = Settings::new(10, 5, -1, true).unwrap();
        assert!(a.settings_check(&c).is_ok());
    }
}
