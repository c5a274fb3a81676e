//! Cryptographic primitives for both vault formats
//!
//! AES-256-GCM with a 16-byte IV throughout. The password vault derives its
//! key with PBKDF2-HMAC-SHA512 over a fresh 64-byte salt on every save and
//! stores `base64(salt || iv || tag || ciphertext)`. The legacy store uses a
//! generated 32-byte key directly and keeps ciphertext, IV and tag per field.

use crate::error::{Result, VaultError};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

/// AES-256-GCM with a 128-bit IV
type VaultCipher = AesGcm<Aes256, U16>;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 64;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

/// PBKDF2 rounds for the password vault. Readers and writers must agree.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

/// Generate a random 256-bit key
pub fn generate_key() -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(key.as_mut());
    key
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Derive a 256-bit key from a password and salt
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut out = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha512>(password, salt, iterations, out.as_mut());
    out
}

fn cipher(key: &[u8]) -> Result<VaultCipher> {
    VaultCipher::new_from_slice(key)
        .map_err(|_| VaultError::Encryption(format!("key must be {} bytes", KEY_LEN)))
}

/// Encrypt in place, returning the detached tag
fn encrypt_detached(key: &[u8], iv: &[u8; IV_LEN], buffer: &mut [u8]) -> Result<[u8; TAG_LEN]> {
    let tag = cipher(key)?
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(iv), b"", buffer)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Verify the tag and decrypt in place. Any failure is `Decryption`.
fn decrypt_detached(key: &[u8], iv: &[u8], tag: &[u8], buffer: &mut [u8]) -> Result<()> {
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::Decryption);
    }
    let cipher = cipher(key).map_err(|_| VaultError::Decryption)?;
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(iv),
            b"",
            buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| VaultError::Decryption)
}

/// Encrypt a password-vault payload into its base64 blob
pub fn seal(plaintext: &[u8], password: &[u8], iterations: u32) -> Result<String> {
    let salt: [u8; SALT_LEN] = random_bytes();
    let iv: [u8; IV_LEN] = random_bytes();
    let key = derive_key(password, &salt, iterations);

    let mut buffer = plaintext.to_vec();
    let tag = encrypt_detached(key.as_ref(), &iv, &mut buffer)?;

    let mut blob = Vec::with_capacity(HEADER_LEN + buffer.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&tag);
    blob.extend_from_slice(&buffer);

    Ok(BASE64.encode(blob))
}

/// Decrypt a password-vault blob
pub fn open(blob: &str, password: &[u8], iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
    let raw = BASE64
        .decode(blob.trim())
        .map_err(|_| VaultError::Decryption)?;
    if raw.len() < HEADER_LEN {
        return Err(VaultError::Decryption);
    }

    let (salt, rest) = raw.split_at(SALT_LEN);
    let (iv, rest) = rest.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let key = derive_key(password, salt, iterations);
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    decrypt_detached(key.as_ref(), iv, tag, &mut buffer)?;
    Ok(buffer)
}

/// One encrypted legacy field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedField {
    /// Hex ciphertext
    pub ciphertext: String,
    /// Base64 IV
    pub iv: String,
    /// Base64 authentication tag
    pub tag: String,
}

/// Encrypt a single value with a raw 256-bit key
pub fn seal_field(plaintext: &str, key: &[u8]) -> Result<SealedField> {
    let iv: [u8; IV_LEN] = random_bytes();
    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = encrypt_detached(key, &iv, &mut buffer)?;

    Ok(SealedField {
        ciphertext: hex::encode(buffer),
        iv: BASE64.encode(iv),
        tag: BASE64.encode(tag),
    })
}

/// Decrypt a single value with a raw 256-bit key
pub fn open_field(field: &SealedField, key: &[u8]) -> Result<String> {
    let mut buffer = hex::decode(&field.ciphertext).map_err(|_| VaultError::Decryption)?;
    let iv = BASE64.decode(&field.iv).map_err(|_| VaultError::Decryption)?;
    let tag = BASE64.decode(&field.tag).map_err(|_| VaultError::Decryption)?;

    decrypt_detached(key, &iv, &tag, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| VaultError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 10;

    #[test]
    fn test_seal_open() {
        let blob = seal(br#"{"a":"b"}"#, b"hunter22", FAST).unwrap();
        let plain = open(&blob, b"hunter22", FAST).unwrap();
        assert_eq!(plain.as_slice(), br#"{"a":"b"}"#);
    }

    #[test]
    fn test_blob_layout() {
        let blob = seal(b"payload", b"pw", FAST).unwrap();
        let raw = BASE64.decode(&blob).unwrap();
        assert_eq!(raw.len(), HEADER_LEN + b"payload".len());
    }

    #[test]
    fn test_fresh_salt_and_iv_per_seal() {
        let a = seal(b"same", b"pw", FAST).unwrap();
        let b = seal(b"same", b"pw", FAST).unwrap();
        assert_ne!(a, b);

        let raw_a = BASE64.decode(&a).unwrap();
        let raw_b = BASE64.decode(&b).unwrap();
        assert_ne!(raw_a[..SALT_LEN], raw_b[..SALT_LEN]);
        assert_ne!(
            raw_a[SALT_LEN..SALT_LEN + IV_LEN],
            raw_b[SALT_LEN..SALT_LEN + IV_LEN]
        );
    }

    #[test]
    fn test_wrong_password() {
        let blob = seal(b"secret", b"right", FAST).unwrap();
        assert!(matches!(
            open(&blob, b"wrong", FAST),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn test_iteration_mismatch_fails() {
        let blob = seal(b"secret", b"pw", FAST).unwrap();
        assert!(matches!(
            open(&blob, b"pw", FAST + 1),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn test_every_tag_and_ciphertext_byte_is_authenticated() {
        let blob = seal(b"tamper me", b"pw", FAST).unwrap();
        let raw = BASE64.decode(&blob).unwrap();

        for i in SALT_LEN + IV_LEN..raw.len() {
            let mut flipped = raw.clone();
            flipped[i] ^= 0x01;
            let result = open(&BASE64.encode(&flipped), b"pw", FAST);
            assert!(
                matches!(result, Err(VaultError::Decryption)),
                "byte {} not authenticated",
                i
            );
        }
    }

    #[test]
    fn test_garbage_and_truncation() {
        assert!(matches!(open("not base64!!", b"pw", FAST), Err(VaultError::Decryption)));
        assert!(matches!(
            open(&BASE64.encode([0u8; HEADER_LEN - 1]), b"pw", FAST),
            Err(VaultError::Decryption)
        ));
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let a = derive_key(b"pw", b"salt", 2);
        let b = derive_key(b"pw", b"salt", 2);
        let c = derive_key(b"pw", b"salt", 3);
        assert_eq!(a.as_ref(), b.as_ref());
        assert_ne!(a.as_ref(), c.as_ref());
    }

    #[test]
    fn test_field_roundtrip_and_tamper() {
        let key = generate_key();
        let field = seal_field("pāss🔐wörd", key.as_ref()).unwrap();
        assert_eq!(open_field(&field, key.as_ref()).unwrap(), "pāss🔐wörd");

        let mut tampered = field.clone();
        let mut tag = BASE64.decode(&tampered.tag).unwrap();
        tag[0] ^= 0x80;
        tampered.tag = BASE64.encode(tag);
        assert!(matches!(
            open_field(&tampered, key.as_ref()),
            Err(VaultError::Decryption)
        ));

        let other = generate_key();
        assert!(matches!(
            open_field(&field, other.as_ref()),
            Err(VaultError::Decryption)
        ));
    }
}
