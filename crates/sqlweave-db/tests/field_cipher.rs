//! Integration tests for the field cipher.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sqlweave_core::WeaveError;
use sqlweave_db::cipher::{CipherSpec, FieldCipher, KeySize};

// ═════════════════════════════════════════════════════════════════════
// 1. Round trips
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_round_trip_for_every_key_size() {
    for size in KeySize::ALL {
        let cipher = FieldCipher::new("round-trip", size).unwrap();
        for text in ["a", "hello", "exactly sixteen!", "ünïcødé ✓"] {
            let blob = cipher.encrypt(text.as_bytes()).unwrap();
            assert_eq!(cipher.decrypt(&blob).unwrap(), text.as_bytes(), "{size:?}");
            let stored = cipher.encrypt_str(text).unwrap();
            assert_eq!(cipher.decrypt_str(&stored).unwrap(), text, "{size:?}");
        }
    }
}

#[test]
fn test_blob_carries_salt_and_iv_header() {
    let cipher = FieldCipher::new("layout", KeySize::Key128).unwrap();
    let blob = cipher.encrypt(b"hello").unwrap();
    assert_eq!(&blob[..16], b"kljsdkkdlo4454GG");
    assert_eq!(&blob[16..32], b"SSljsdkkdlo4454M");
    assert_eq!(blob.len(), 48);

    let cipher = FieldCipher::new("layout", KeySize::Key256).unwrap();
    let blob = cipher.encrypt(b"hello").unwrap();
    assert_eq!(blob.len(), 32 + 32 + 16);
}

#[test]
fn test_equal_plaintexts_encrypt_equally() {
    let a = FieldCipher::new("same", KeySize::Key256).unwrap();
    let b = FieldCipher::new("same", KeySize::Key256).unwrap();
    assert_eq!(a.encrypt_str("x").unwrap(), b.encrypt_str("x").unwrap());

    let other = FieldCipher::new("different", KeySize::Key256).unwrap();
    assert_ne!(a.encrypt_str("x").unwrap(), other.encrypt_str("x").unwrap());
}

// ═════════════════════════════════════════════════════════════════════
// 2. Legacy and corrupt input
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_input_is_unchanged() {
    let cipher = FieldCipher::new("empty", KeySize::Key128).unwrap();
    assert!(cipher.encrypt(b"").unwrap().is_empty());
    assert!(cipher.decrypt(b"").unwrap().is_empty());
    assert_eq!(cipher.encrypt_str("").unwrap(), "");
}

#[test]
fn test_unknown_prefix_passes_through() {
    let cipher = FieldCipher::new("legacy", KeySize::Key128).unwrap();
    assert_eq!(cipher.decrypt(b"plain old value").unwrap(), b"plain old value");
    assert_eq!(cipher.decrypt_str("not base64 at all!").unwrap(), "not base64 at all!");

    let encoded_plain = STANDARD.encode("plain but encoded");
    assert_eq!(cipher.decrypt_str(&encoded_plain).unwrap(), encoded_plain);
}

#[test]
fn test_salt_of_other_key_size_passes_through() {
    let wide = FieldCipher::new("k", KeySize::Key256).unwrap();
    let narrow = FieldCipher::new("k", KeySize::Key128).unwrap();
    let blob = narrow.encrypt(b"v").unwrap();
    assert_eq!(wide.decrypt(&blob).unwrap(), blob);
}

#[test]
fn test_truncated_blob_is_error() {
    let cipher = FieldCipher::new("trunc", KeySize::Key128).unwrap();
    let blob = cipher.encrypt(b"hello world").unwrap();
    let err = cipher.decrypt(&blob[..40]).unwrap_err();
    assert!(matches!(err, WeaveError::CipherError(_)));
    let err = cipher.decrypt(&blob[..20]).unwrap_err();
    assert!(matches!(err, WeaveError::CipherError(_)));
}

#[test]
fn test_wrong_key_is_error_or_garbage() {
    let writer = FieldCipher::new("writer", KeySize::Key128).unwrap();
    let reader = FieldCipher::new("reader", KeySize::Key128).unwrap();
    let blob = writer.encrypt(b"secret").unwrap();
    match reader.decrypt(&blob) {
        Err(err) => assert!(matches!(err, WeaveError::CipherError(_))),
        Ok(plain) => assert_ne!(plain, b"secret"),
    }
}

// ═════════════════════════════════════════════════════════════════════
// 3. Construction
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_blank_passphrase_is_configuration_error() {
    let err = FieldCipher::new("   ", KeySize::Key128).unwrap_err();
    assert!(matches!(err, WeaveError::ConfigurationError(_)));
}

#[test]
fn test_from_spec_with_key() {
    let spec = CipherSpec::new("annotated", KeySize::Key256);
    let cipher = FieldCipher::from_spec(&spec).unwrap();
    assert_eq!(cipher.key_size(), KeySize::Key256);
    let direct = FieldCipher::new("annotated", KeySize::Key256).unwrap();
    assert_eq!(cipher.encrypt_str("v").unwrap(), direct.encrypt_str("v").unwrap());
}

#[test]
fn test_key_size_from_bits() {
    assert_eq!(KeySize::try_from(128_u16).unwrap(), KeySize::Key128);
    assert_eq!(KeySize::try_from(256_u16).unwrap(), KeySize::Key256);
    assert!(matches!(
        KeySize::try_from(192_u16),
        Err(WeaveError::ConfigurationError(_))
    ));
}
