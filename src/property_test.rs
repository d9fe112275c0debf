//! Invariant and scenario coverage mirroring the storage spec's testable
//! properties: empty cardinality, monotonicity, idempotence, union identity/
//! commutativity/associativity, add/union consistency, round-tripping,
//! promotion timing, and header exactness, plus the concrete S1-S6
//! scenarios. Random inputs use a fixed seed (`rand::rngs::StdRng`), same
//! convention the teacher repo used for its sparse-registers fuzz test.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::{Hll, Settings};

fn rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

fn default_settings() -> Settings {
    Settings::new(11, 5, -1, true).unwrap()
}

#[test]
fn invariant_1_empty_cardinality_is_zero() {
    for (log_2m, reg_width) in [(4, 5), (11, 5), (16, 8)] {
        let settings = Settings::new(log_2m, reg_width, -1, true).unwrap();
        assert_eq!(Hll::new(settings).cardinality().unwrap(), Some(0.0));
    }
}

#[test]
fn invariant_2_monotonicity() {
    let mut rng = rng();
    let mut hll = Hll::new(default_settings());
    let mut last = 0.0;

    for _ in 0..500 {
        hll.add_raw(rng.next_u64());
        let current = hll.cardinality().unwrap().unwrap();
        assert!(current >= last, "cardinality decreased: {current} < {last}");
        last = current;
    }
}

#[test]
fn invariant_3_idempotence_explicit() {
    let settings = Settings::new(10, 5, 64, false).unwrap();
    let mut once = Hll::new(settings);
    once.add_raw(123456789);

    let mut twice = Hll::new(settings);
    twice.add_raw(123456789);
    twice.add_raw(123456789);

    assert!(matches!(once, Hll::Explicit(_)));
    assert_eq!(once, twice);
}

#[test]
fn invariant_3_idempotence_compressed() {
    let settings = Settings::new(10, 5, 0, false).unwrap();
    let mut once = Hll::new(settings);
    once.add_raw(987654321);

    let mut twice = Hll::new(settings);
    twice.add_raw(987654321);
    twice.add_raw(987654321);

    assert!(matches!(once, Hll::Dense(_)));
    assert_eq!(once, twice);
}

#[test]
fn invariant_4_union_identity() {
    let settings = default_settings();
    let mut rng = rng();
    let mut s = Hll::new(settings);
    for _ in 0..50 {
        s.add_raw(rng.next_u64());
    }

    let empty = Hll::new(settings);
    let mut unioned = s.clone();
    unioned.union(true, &empty).unwrap();

    assert_eq!(s, unioned);
}

#[test]
fn invariant_5_union_commutativity() {
    let settings = default_settings();
    let mut rng = rng();

    let mut a = Hll::new(settings);
    let mut b = Hll::new(settings);
    for _ in 0..200 {
        a.add_raw(rng.next_u64());
    }
    for _ in 0..200 {
        b.add_raw(rng.next_u64());
    }

    let mut ab = a.clone();
    ab.union(true, &b).unwrap();
    let mut ba = b.clone();
    ba.union(true, &a).unwrap();

    assert_eq!(ab.cardinality().unwrap(), ba.cardinality().unwrap());
}

#[test]
fn invariant_6_union_associativity() {
    let settings = default_settings();
    let mut rng = rng();

    let mut a = Hll::new(settings);
    let mut b = Hll::new(settings);
    let mut c = Hll::new(settings);
    for _ in 0..100 {
        a.add_raw(rng.next_u64());
        b.add_raw(rng.next_u64());
        c.add_raw(rng.next_u64());
    }

    let mut ab_c = a.clone();
    ab_c.union(true, &b).unwrap();
    ab_c.union(true, &c).unwrap();

    let mut bc = b.clone();
    bc.union(true, &c).unwrap();
    let mut a_bc = a.clone();
    a_bc.union(true, &bc).unwrap();

    assert_eq!(ab_c.cardinality().unwrap(), a_bc.cardinality().unwrap());
}

#[test]
fn invariant_7_add_union_consistency() {
    let settings = Settings::new(10, 5, 8, false).unwrap();
    let mut rng = rng();

    let mut s = Hll::new(settings);
    for _ in 0..20 {
        s.add_raw(rng.next_u64());
    }
    let h = rng.next_u64();

    let mut via_union = s.clone();
    let mut singleton = Hll::new(settings);
    singleton.add_raw(h);
    via_union.union(true, &singleton).unwrap();

    let mut via_add = s.clone();
    via_add.add_raw(h);

    assert_eq!(via_union, via_add);
}

#[test]
fn invariant_8_round_trip() {
    let mut rng = rng();

    for settings in [
        Settings::new(10, 5, 8, false).unwrap(),
        Settings::new(11, 5, -1, true).unwrap(),
        Settings::new(10, 5, 0, true).unwrap(),
    ] {
        let mut s = Hll::new(settings);
        for _ in 0..300 {
            s.add_raw(rng.next_u64());
        }

        let decoded = Hll::from_bytes(&s.to_bytes()).unwrap();
        assert_eq!(s, decoded);
    }

    let undefined = Hll::Undefined;
    let decoded = Hll::from_bytes(&undefined.to_bytes()).unwrap();
    assert_eq!(undefined, decoded);
}

#[test]
fn invariant_9_promotion_timing() {
    let settings = Settings::new(10, 5, 8, false).unwrap();
    let mut rng = rng();
    let mut s = Hll::new(settings);

    for i in 1..=8u32 {
        s.add_raw(rng.next_u64());
        assert!(
            matches!(s, Hll::Explicit(_)),
            "expected EXPLICIT after {i} inserts"
        );
    }

    s.add_raw(rng.next_u64());
    assert!(matches!(s, Hll::Dense(_)), "expected COMPRESSED after 9 inserts");
}

#[test]
fn invariant_10_header_exactness() {
    let settings = Settings::new(10, 5, -1, true).unwrap();
    let mut s = Hll::new(settings);
    s.add_raw(1);

    let bytes = s.to_bytes();
    assert_eq!(bytes[0] >> 4, 1, "schema version nibble");
    assert_eq!(bytes[1] & 0x1F, 10, "log_2m field");
    assert_eq!((bytes[1] >> 5) + 1, 5, "reg_width field");
}

#[test]
fn scenario_s1_estimate_within_ten_percent_of_1000() {
    let settings = Settings::new(11, 5, -1, true).unwrap();
    let mut rng = rng();
    let mut s = Hll::new(settings);

    for _ in 0..1000 {
        s.add_raw(rng.next_u64());
    }

    let estimate = s.cardinality().unwrap().unwrap();
    assert!(
        (estimate - 1000.0).abs() <= 100.0,
        "estimate {estimate} not within 10% of 1000"
    );
}

#[test]
fn scenario_s2_repeated_hash_stays_near_one() {
    let settings = Settings::new(11, 5, -1, true).unwrap();
    let mut s = Hll::new(settings);

    for _ in 0..10_000 {
        s.add_raw(123456789);
    }

    let estimate = s.cardinality().unwrap().unwrap();
    assert!((estimate - 1.0).abs() <= 5.0, "estimate {estimate} not within 5 of 1");
}

#[test]
fn scenario_s3_expthresh_zero_never_serializes_explicit() {
    let settings = Settings::new(11, 5, 0, true).unwrap();
    let mut s = Hll::new(settings);
    s.add_raw(1);

    let type_tag = s.to_bytes()[0] & 0x0F;
    assert!(type_tag == 3 || type_tag == 4, "type tag was {type_tag}");
}

#[test]
fn scenario_s4_single_register_prefers_sparse() {
    let settings = Settings::new(11, 5, 0, true).unwrap();
    let mut s = Hll::new(settings);
    s.add_raw(1);

    assert!(matches!(s, Hll::Dense(_)));
    let type_tag = s.to_bytes()[0] & 0x0F;
    assert_eq!(type_tag, 3, "expected SPARSE for a single filled register");
}

#[test]
fn scenario_s5_mismatched_log2m_is_incompatible_metadata() {
    let a_settings = Settings::new(10, 5, -1, true).unwrap();
    let b_settings = Settings::new(11, 5, -1, true).unwrap();

    let mut a = Hll::new(a_settings);
    a.add_raw(1);
    let mut b = Hll::new(b_settings);
    b.add_raw(2);

    let err = a.union(true, &b).unwrap_err();
    assert_eq!(err, crate::HllError::IncompatibleMetadata);
}

#[test]
fn scenario_s6_explicit_payload_not_multiple_of_8_is_malformed() {
    // version=1, type=EXPLICIT(2), log_2m=10, reg_width=5, expthresh=0, one stray byte.
    let header = [(1 << 4) | 2u8, (4 << 5) | 10, 0u8];
    let buf = [header[0], header[1], header[2], 0xAB];

    let err = Hll::from_bytes(&buf).unwrap_err();
    assert!(matches!(err, crate::HllError::MalformedInput(_)));
}
