//! Tests for digest parsing.
//!
//! Validates the strict `sha256:<64 lowercase hex>` format used for every
//! stored blob.

use imgpull::{Digest, Error};

// =============================================================================
// Parse Tests
// =============================================================================

#[test]
fn test_digest_parse_accepts_lowercase_hex() {
    let s = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    let digest: Digest = s.parse().unwrap();

    assert_eq!(digest, Digest::of(b"hello"));
    assert_eq!(digest.to_string(), s);
}

#[test]
fn test_digest_parse_rejects_bad_input() {
    let upper = format!("sha256:{}", "A".repeat(64));
    let short = "sha256:abc".to_string();
    let other_algo = format!("sha512:{}", "a".repeat(64));
    let no_prefix = "a".repeat(64);

    for bad in [upper, short, other_algo, no_prefix] {
        assert!(bad.parse::<Digest>().is_err(), "{bad} should be rejected");
    }
}

#[test]
fn test_digest_parse_error_names_the_reason() {
    let err = format!("sha512:{}", "a".repeat(64))
        .parse::<Digest>()
        .unwrap_err();

    match err {
        Error::InvalidDigest { reason, .. } => assert!(reason.contains("sha512"), "{reason}"),
        other => panic!("expected InvalidDigest, got {other:?}"),
    }
}

#[test]
fn test_pinned_shape_check() {
    let pinned = Digest::of(b"x").to_string();

    assert!(Digest::is_pinned(&pinned));
    assert!(!Digest::is_pinned("sha256:abc"));
    assert!(!Digest::is_pinned(&pinned.replace("sha256:", "sha257:")));
    assert!(!Digest::is_pinned(&format!("{pinned}0")));
}

#[test]
fn test_digest_serializes_as_string() {
    let digest = Digest::of(b"json");

    let json = serde_json::to_string(&digest).unwrap();

    assert_eq!(json, format!("\"{digest}\""));
    assert_eq!(serde_json::from_str::<Digest>(&json).unwrap(), digest);
}
