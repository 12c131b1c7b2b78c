use super::*;
use std::io::Cursor;

// -------------------- Construction --------------------

#[test]
fn new_creates_valid_filter() {
    let filter = MembershipFilter::new(100, 0.01);
    assert!(filter.num_bits() > 0);
    assert!(filter.num_hashes() > 0);
}

#[test]
#[should_panic(expected = "capacity must be > 0")]
fn new_panics_on_zero_capacity() {
    MembershipFilter::new(0, 0.01);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_zero_fpr() {
    MembershipFilter::new(100, 0.0);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_one_fpr() {
    MembershipFilter::new(100, 1.0);
}

// -------------------- Insert / Contains --------------------

#[test]
fn inserted_key_is_found() {
    let mut filter = MembershipFilter::new(100, 0.01);
    filter.insert(b"hello");
    assert!(filter.may_contain(b"hello"));
}

#[test]
fn missing_key_is_not_found() {
    let filter = MembershipFilter::new(100, 0.01);
    assert!(!filter.may_contain(b"hello"));
}

#[test]
fn no_false_negatives() {
    let mut filter = MembershipFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        filter.insert(&i.to_le_bytes());
    }
    for i in 0..1000u64 {
        assert!(
            filter.may_contain(&i.to_le_bytes()),
            "key {} should be found",
            i
        );
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    let n = 10_000;
    let fpr = 0.01;
    let mut filter = MembershipFilter::new(n, fpr);

    for i in 0..n as u64 {
        filter.insert(&i.to_le_bytes());
    }

    // Probe n keys that were NOT inserted.
    let mut false_positives = 0;
    let probe_count = 10_000;
    for i in (n as u64)..(n as u64 + probe_count) {
        if filter.may_contain(&i.to_le_bytes()) {
            false_positives += 1;
        }
    }

    let actual_fpr = false_positives as f64 / probe_count as f64;
    // Allow up to 3x the target FPR (statistical variance)
    assert!(
        actual_fpr < fpr * 3.0,
        "FPR too high: {:.4} (target {:.4})",
        actual_fpr,
        fpr
    );
}

#[test]
fn empty_key() {
    let mut filter = MembershipFilter::new(10, 0.01);
    filter.insert(b"");
    assert!(filter.may_contain(b""));
}

#[test]
fn binary_key() {
    let mut filter = MembershipFilter::new(10, 0.01);
    let key = vec![0u8, 1, 2, 255, 254, 253];
    filter.insert(&key);
    assert!(filter.may_contain(&key));
}

// -------------------- Serialization --------------------

#[test]
fn roundtrip_serialize_deserialize() {
    let mut filter = MembershipFilter::new(500, 0.01);
    for i in 0..500u64 {
        filter.insert(&i.to_le_bytes());
    }

    let mut buf = Vec::new();
    filter.write_to(&mut buf).unwrap();

    let restored = MembershipFilter::read_from(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(restored, filter);

    for i in 0..500u64 {
        assert!(
            restored.may_contain(&i.to_le_bytes()),
            "key {} missing after roundtrip",
            i
        );
    }
}

#[test]
fn identical_contents_produce_identical_bytes() {
    let mut a = MembershipFilter::new(200, 0.01);
    let mut b = MembershipFilter::new(200, 0.01);
    // Insertion order must not matter for the serialized form.
    for i in 0..50u64 {
        a.insert(&i.to_le_bytes());
    }
    for i in (0..50u64).rev() {
        b.insert(&i.to_le_bytes());
    }

    let mut bytes_a = Vec::new();
    let mut bytes_b = Vec::new();
    a.write_to(&mut bytes_a).unwrap();
    b.write_to(&mut bytes_b).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn deserialize_rejects_oversized_filter() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&64u64.to_le_bytes()); // num_bits
    buf.extend_from_slice(&3u32.to_le_bytes()); // num_hashes
    buf.extend_from_slice(&(128 * 1024 * 1024u32).to_le_bytes()); // bits_len past the cap

    let result = MembershipFilter::read_from(&mut Cursor::new(&buf));
    assert!(result.is_err());
}

#[test]
fn deserialize_rejects_truncated_bits() {
    // Claims 100 bits but supplies no bit bytes at all.
    let mut buf = Vec::new();
    buf.extend_from_slice(&100u64.to_le_bytes());
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());

    let result = MembershipFilter::read_from(&mut Cursor::new(&buf));
    assert!(result.is_err());
}

// -------------------- Edge cases --------------------

#[test]
fn single_key_capacity() {
    let mut filter = MembershipFilter::new(1, 0.01);
    filter.insert(b"only");
    assert!(filter.may_contain(b"only"));
}

#[test]
fn very_low_fpr_grows_the_filter() {
    let filter = MembershipFilter::new(100, 0.0001);
    assert!(filter.num_bits() > 1000);
    assert!(filter.num_hashes() > 5);
}

#[test]
fn debug_impl_hides_the_bit_vector() {
    let filter = MembershipFilter::new(100, 0.01);
    let debug = format!("{:?}", filter);
    assert!(debug.contains("MembershipFilter"));
    assert!(debug.contains("num_bits"));
}
