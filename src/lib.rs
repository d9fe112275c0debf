//! A HyperLogLog cardinality sketch engine compatible with the Aggregate
//! Knowledge HLL Storage Spec. The sketch moves monotonically through four
//! states as data accumulates — EMPTY, EXPLICIT, COMPRESSED — plus an
//! absorbing UNDEFINED state reachable only from malformed or incompatible
//! input (`Hll::from_bytes`, `Hll::union` in strict mode). SPARSE is a wire
//! encoding only, never an in-memory state; see the `sparse` module.

pub use aggregator::{AddAggregator, UnionAggregator};
pub use config::Config;
pub use error::HllError;
pub use settings::{AUTO_EXPLICIT_THRESHOLD, Settings};

use dense::DenseRegisters;
use explicit::ExplicitStorage;

mod aggregator;
pub mod config;
mod dense;
mod error;
mod explicit;
pub mod hashing;
#[cfg(test)]
mod property_test;
mod settings;
mod sparse;
pub mod typmod;
mod utils;

/// Largest wire payload `from_bytes` will accept. Guards against a corrupt
/// or hostile length field forcing an unbounded allocation; 128KiB covers
/// the largest practical COMPRESSED sketch several times over.
const MAX_PAYLOAD_BYTES: usize = 128 * 1024;

const SCHEMA_VERSION: u8 = 1;

const TYPE_UNDEFINED: u8 = 0;
const TYPE_EMPTY: u8 = 1;
const TYPE_EXPLICIT: u8 = 2;
const TYPE_SPARSE: u8 = 3;
const TYPE_DENSE: u8 = 4;

/// `Registers` is an add-on interface to storage implemented by the
/// probabilistic (register-array) representations.
trait Registers {
    fn log_2m(&self) -> u32;
    fn pw_max_mask(&self) -> u64;
    fn m_bits_mask(&self) -> u64;

    /// set_if_greater sets the register value of register reg_num to the provided value if and only if it's greater than
    /// the current value.
    fn set_if_greater(&mut self, reg_num: u32, value: u8);

    /// indicator computes the "indicator function" (Z in the HLL paper).  It additionally returns the number of
    /// registers whose value is zero (V in the paper).  The returned values are used to drive cardinality calculations.
    ///
    /// For reference, Z = indicator(2^(-M[j])) for all j from 0 -> num registers where M[j] is the register value.
    fn indicator(&self) -> (f64, u32);

    /// calculates the register and value to use when calling `set_if_greater`. Returns None if
    /// value is 0.
    fn set(&mut self, value: u64) {
        // following documentation courtesy of the java implementation:
        //
        // p(w): position of the least significant set bit (one-indexed)
        // By contract: p(w) <= 2^(registerValueInBits) - 1 (the max register
        // value)
        //
        // By construction of pw_max_mask,
        //      lsb(pw_max_mask) = 2^(registerValueInBits) - 2,
        // thus lsb(any_long | pw_max_mask) <= 2^(registerValueInBits) - 2,
        // thus 1 + lsb(any_long | pw_max_mask) <= 2^(registerValueInBits) -1.
        let substream_value = value >> self.log_2m();
        if substream_value == 0 {
            // The paper does not cover p(0x0), so the special value 0 is used.
            // 0 is the original initialization value of the registers, so by
            // doing this the multiset simply ignores it. This is acceptable
            // because the probability is 1/(2^(2^registerSizeInBits)).
            return;
        }

        // NOTE : trailing zeros == the 0-based index of the least significant 1
        //        bit.
        let p_w = (1 + (substream_value | self.pw_max_mask()).trailing_zeros()) as u8;
        // NOTE:  no +1 as in paper since 0-based indexing
        let i = value & self.m_bits_mask();

        // this is safe because the m_bits_mask is 1 less bit in length than log_2m bits
        self.set_if_greater(i as u32, p_w);
    }
}

pub(crate) trait Storage {
    fn bytes_size(&self) -> usize;
    fn to_bytes(&self, buf: &mut [u8]);
    fn from_bytes(settings: &Settings, buf: &[u8]) -> Self;
    fn clear(&mut self);
}

/// A sketch, at any point in its lifecycle. There is deliberately no
/// `Sparse` variant: SPARSE is a wire-only encoding of a `Dense` sketch,
/// never a retained in-memory state (see `sparse` module doc comment).
#[derive(Clone, Debug)]
pub enum Hll {
    Empty(Settings),
    Explicit(ExplicitStorage),
    Dense(DenseRegisters),
    /// An absorbing state reached only by malformed wire input or a strict
    /// union between sketches with mismatched metadata. Every subsequent
    /// operation on an `Undefined` sketch is a no-op or propagates
    /// `Undefined` onward; it never panics and never silently recovers.
    Undefined,
}

impl Hll {
    pub fn new(settings: Settings) -> Self {
        Hll::Empty(settings)
    }

    /// `Hll::new` using the process-wide default parameters (§5), the way a
    /// column declared without an explicit type modifier would behave.
    pub fn with_defaults() -> Self {
        Hll::Empty(config::global().defaults)
    }

    /// Feeds one raw (already hashed) value into the sketch, driving the
    /// EMPTY -> EXPLICIT -> COMPRESSED state machine forward. A value of
    /// `0` carries no information (§1) and is always ignored. Undefined
    /// sketches absorb every input without change.
    pub fn add_raw(&mut self, value: u64) {
        if value == 0 || matches!(self, Hll::Undefined) {
            return;
        }

        if let Hll::Empty(settings) = self {
            if settings.explicit_threshold() > 0 {
                *self = Hll::Explicit(ExplicitStorage::with_settings(settings));
            } else {
                *self = Hll::Dense(DenseRegisters::with_settings(settings));
            }
        }

        match self {
            Hll::Explicit(explicit_storage) => {
                explicit_storage.set(value);
                if explicit_storage.is_full() {
                    *self = explicit_storage.as_registers();
                }
            }
            Hll::Dense(dense_registers) => {
                dense_registers.set(value);
            }
            _ => {}
        }
    }

    /// Merges `other` into `self` in place. In `strict` mode, sketches
    /// whose `(log_2m, reg_width)` differ cannot be combined and the
    /// receiver becomes `Undefined` instead of erroring outright — this
    /// mirrors the reference implementation's aggregate transition
    /// behavior, where a metadata mismatch mid-aggregation poisons the
    /// running state rather than aborting the whole query. `Undefined` is
    /// absorbing on either side regardless of `strict`.
    pub fn union(&mut self, strict: bool, other: &Self) -> Result<(), HllError> {
        if matches!(self, Hll::Undefined) {
            return Ok(());
        }
        if matches!(other, Hll::Undefined) {
            *self = Hll::Undefined;
            return Ok(());
        }

        if strict {
            if let Err(e) = self.settings_check(other) {
                *self = Hll::Undefined;
                return Err(e);
            }
        }

        match self {
            Hll::Empty(_settings) => {
                *self = other.clone();
            }
            Hll::Explicit(lhs) => match other {
                Hll::Empty(_) => {}
                Hll::Explicit(rhs) => {
                    lhs.union_explicit(rhs);
                }
                Hll::Dense(_) => {
                    let mut promoted = lhs.as_registers();
                    promoted.union(strict, other)?;
                    *self = promoted;
                }
                Hll::Undefined => unreachable!("handled above"),
            },
            Hll::Dense(lhs) => match other {
                Hll::Empty(_) => {}
                Hll::Explicit(rhs) => {
                    lhs.union_explicit(rhs);
                }
                Hll::Dense(rhs) => {
                    lhs.union_dense(rhs);
                }
                Hll::Undefined => unreachable!("handled above"),
            },
            Hll::Undefined => unreachable!("handled above"),
        }

        if self.is_full() {
            self.upgrade();
        }

        Ok(())
    }

    /// The estimated (or, for EXPLICIT, exact) number of distinct elements
    /// added so far. Returns `Ok(None)` for an `Undefined` sketch — there
    /// is no cardinality to report, the same way a `NULL` propagates
    /// through SQL aggregates. Returns `Err(EstimatorDomain)` if the
    /// register count is too small for the raw HyperLogLog estimator to
    /// be meaningful.
    pub fn cardinality(&self) -> Result<Option<f64>, HllError> {
        let (sum, num_of_zeros) = match self {
            Hll::Undefined => return Ok(None),
            Hll::Empty(_) => return Ok(Some(0.0)),
            Hll::Explicit(explicit_storage) => return Ok(Some(explicit_storage.len() as f64)),
            Hll::Dense(dense_registers) => {
                if dense_registers.settings.m() <= 8 {
                    return Err(HllError::EstimatorDomain);
                }
                dense_registers.indicator()
            }
        };

        let settings = self.settings().expect("non-undefined sketch has settings");

        // apply the estimate and correction to the indicator function
        let estimator = settings.alpha_msquared / sum;

        if (num_of_zeros != 0) && (estimator < settings.small_estimator_cutoff) {
            // following documentation courtesy of the java implementation:
            // The "small range correction" formula from the HyperLogLog
            // algorithm. Only appropriate if both the estimator is smaller than
            // (5/2) * m and there are still registers that have the zero value.
            let num_of_zeros = num_of_zeros as f64;
            let m: f64 = settings.m().into();
            let small_estimator = m * (m / num_of_zeros).ln();
            return Ok(Some(small_estimator));
        }

        if estimator <= settings.large_estimator_cutoff {
            return Ok(Some(estimator));
        }

        // following documentation courtesy of the java implementation:
        // The "large range correction" formula from the HyperLogLog algorithm,
        // adapted for 64 bit hashes. Only appropriate for estimators whose
        // value exceeds the calculated cutoff.
        let large_estimator =
            -1.0 * settings.two_to_l * (1.0 - (estimator / settings.two_to_l)).ln();
        Ok(Some(large_estimator))
    }

    fn is_full(&self) -> bool {
        match self {
            Hll::Undefined => false,
            Hll::Empty(_) => false,
            Hll::Explicit(explicit_storage) => explicit_storage.is_full(),
            Hll::Dense(_) => false,
        }
    }

    fn upgrade(&mut self) {
        if let Hll::Explicit(explicit_storage) = self {
            *self = explicit_storage.as_registers();
        }
    }

    pub fn settings_check(&self, other: &Self) -> Result<(), HllError> {
        match (self.settings(), other.settings()) {
            (Some(a), Some(b)) => a.settings_check(b),
            _ => Ok(()),
        }
    }

    /// The sketch's construction parameters, or `None` for `Undefined`.
    pub fn settings(&self) -> Option<&Settings> {
        match self {
            Hll::Undefined => None,
            Hll::Empty(settings) => Some(settings),
            Hll::Explicit(explicit_storage) => Some(&explicit_storage.settings),
            Hll::Dense(dense_registers) => Some(&dense_registers.settings),
        }
    }

    pub fn log_2m(&self) -> Option<u32> {
        self.settings().map(|s| s.log_2m)
    }

    pub fn reg_width(&self) -> Option<u32> {
        self.settings().map(|s| s.reg_width)
    }

    pub fn expthresh(&self) -> Option<(i64, u64)> {
        self.settings().map(Settings::expthresh)
    }

    pub fn sparseon(&self) -> Option<bool> {
        self.settings().map(|s| s.sparseon)
    }

    pub fn schema_version(&self) -> u8 {
        SCHEMA_VERSION
    }

    pub fn clone_with_settings(&self, settings: &Settings) -> Self {
        match self {
            Hll::Undefined => Hll::Undefined,
            Hll::Empty(_) => Hll::Empty(*settings),
            Hll::Explicit(explicit_storage) => {
                Hll::Explicit(explicit_storage.clone_with_settings(settings))
            }
            Hll::Dense(dense_registers) => {
                Hll::Dense(dense_registers.clone_with_settings(settings))
            }
        }
    }

    pub fn type_id(&self) -> u8 {
        match self {
            Hll::Undefined => TYPE_UNDEFINED,
            Hll::Empty(_) => TYPE_EMPTY,
            Hll::Explicit(_) => TYPE_EXPLICIT,
            Hll::Dense(_) => TYPE_DENSE,
        }
    }

    /// Serializes this sketch to its wire form, per the 3-byte-header
    /// storage spec. A live `Dense` sketch is serialized as SPARSE instead
    /// of COMPRESSED whenever `sparse::prefers_sparse` says the
    /// `(index, value)`-list encoding is smaller (or `max_sparse` says to
    /// prefer it); this is the only place that decision is made (§9).
    /// `Undefined` serializes to the bare 3-byte header with no payload,
    /// same as `Empty` — there is no representation-free 1-byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let cfg = config::global();
        let version = cfg.output_version;

        if matches!(self, Hll::Undefined) {
            return vec![(version << 4) | TYPE_UNDEFINED, 0, 0];
        }

        let (settings, type_id, payload_size) = match self {
            Hll::Undefined => unreachable!("handled above"),
            Hll::Empty(settings) => (settings, TYPE_EMPTY, 0),
            Hll::Explicit(explicit_storage) => (
                &explicit_storage.settings,
                TYPE_EXPLICIT,
                explicit_storage.bytes_size(),
            ),
            Hll::Dense(dense_registers) => {
                if sparse::prefers_sparse(
                    dense_registers.nfilled(),
                    &dense_registers.settings,
                    cfg.max_sparse,
                ) {
                    (
                        &dense_registers.settings,
                        TYPE_SPARSE,
                        sparse::bytes_size(dense_registers.nfilled(), &dense_registers.settings),
                    )
                } else {
                    (
                        &dense_registers.settings,
                        TYPE_DENSE,
                        dense_registers.bytes_size(),
                    )
                }
            }
        };

        let mut res: Vec<u8> = vec![0; 3 + payload_size];
        res[0] = (version << 4) | type_id;
        res[1] = (((settings.reg_width - 1) << 5) as u8) | settings.log_2m as u8;
        res[2] = settings.pack_cutoff_byte();

        match self {
            Hll::Undefined => unreachable!("handled above"),
            Hll::Empty(_) => {}
            Hll::Explicit(explicit_storage) => explicit_storage.to_bytes(&mut res[3..]),
            Hll::Dense(dense_registers) => {
                if type_id == TYPE_SPARSE {
                    sparse::encode(dense_registers, &mut res[3..])
                        .expect("sparse encoding was chosen because it was representable");
                } else {
                    dense_registers.to_bytes(&mut res[3..]);
                }
            }
        }

        res
    }

    /// Parses a wire-form sketch. SPARSE payloads (type 3) are decoded
    /// straight into a `Dense` sketch, they are never reified as a
    /// separate in-memory representation.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, HllError> {
        if buf.len() > MAX_PAYLOAD_BYTES {
            return Err(HllError::malformed("payload exceeds the maximum sketch size"));
        }
        if buf.is_empty() {
            return Err(HllError::malformed("empty payload"));
        }

        let version = buf[0] >> 4;
        let type_id = buf[0] & 0x0F;

        if version != SCHEMA_VERSION {
            return Err(HllError::malformed(format!(
                "unsupported schema version {version}"
            )));
        }
        if buf.len() < 3 {
            return Err(HllError::malformed("payload is shorter than the header"));
        }

        if type_id == TYPE_UNDEFINED {
            if buf.len() != 3 {
                return Err(HllError::malformed(
                    "undefined payload must be exactly 3 bytes",
                ));
            }
            return Ok(Hll::Undefined);
        }

        let reg_width = (buf[1] >> 5) + 1;
        let log_2m = buf[1] & 0x1F;
        let (sparseon, explicit_threshold) = Settings::unpack_cutoff_byte(buf[2]);

        let settings = Settings::new(
            log_2m as u32,
            reg_width as u32,
            explicit_threshold,
            sparseon,
        )?;

        let payload = &buf[3..];

        let storage = match type_id {
            TYPE_EMPTY => Self::Empty(settings),
            TYPE_EXPLICIT => {
                if payload.len() % size_of::<i64>() != 0 {
                    return Err(HllError::malformed(
                        "explicit payload length is not a multiple of 8",
                    ));
                }
                let values: Vec<i64> = payload
                    .chunks_exact(size_of::<i64>())
                    .map(|chunk| i64::from_be_bytes(chunk.try_into().unwrap()))
                    .collect();
                if !explicit::validate_strictly_ascending(&values) {
                    return Err(HllError::malformed(
                        "explicit payload values are not strictly ascending",
                    ));
                }
                Self::Explicit(ExplicitStorage::from_bytes(&settings, payload))
            }
            TYPE_SPARSE => Self::Dense(sparse::decode(&settings, payload)?),
            TYPE_DENSE => {
                let expected_len = utils::divide_by_8_round_up(
                    settings.m() as u64 * settings.reg_width as u64,
                ) as usize;
                if payload.len() != expected_len {
                    return Err(HllError::malformed(
                        "dense payload length is inconsistent with log_2m/reg_width",
                    ));
                }
                Self::Dense(DenseRegisters::from_bytes(&settings, payload))
            }
            other => {
                return Err(HllError::malformed(format!("unknown sketch type {other}")));
            }
        };

        Ok(storage)
    }

    pub fn clear(&mut self) {
        match self {
            Hll::Undefined => {}
            Hll::Empty(_) => {}
            Hll::Explicit(explicit_storage) => explicit_storage.clear(),
            Hll::Dense(dense_registers) => dense_registers.clear(),
        }
    }

    /// A short human-readable summary, for debugging and logging — not a
    /// stable serialization format (use `to_bytes`/`from_bytes` for that).
    pub fn print(&self) -> String {
        if let Hll::Undefined = self {
            return "Hll(undefined)".to_string();
        }

        let settings = self.settings().expect("non-undefined sketch has settings");
        let (declared, effective) = settings.expthresh();
        format!(
            "Hll(type={}, log_2m={}, reg_width={}, expthresh={}/{}, sparseon={}, bytes={})",
            match self {
                Hll::Empty(_) => "empty",
                Hll::Explicit(_) => "explicit",
                Hll::Dense(_) => "dense",
                Hll::Undefined => unreachable!(),
            },
            settings.log_2m,
            settings.reg_width,
            declared,
            effective,
            settings.sparseon,
            hex::encode(self.to_bytes()),
        )
    }
}

/// Two sketches are equal iff they serialize identically — comparing raw
/// wire bytes, not in-memory representation, means a COMPRESSED sketch and
/// a SPARSE-preferring COMPRESSED sketch of the same data only compare
/// equal when the serializer would actually choose the same encoding for
/// both, matching what a round trip through storage would observe.
impl PartialEq for Hll {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Hll {}
