//! Trust password verification hashes
//!
//! The daemon never reports its trust password back, so the last password we
//! set is remembered as a salted PBKDF2 hash and re-derived on every run.
//! Stored form: `hex(derived key)` followed by `hex(salt)`, both lowercase.

use rand::RngCore;
use sha2::Sha512;

const ITERATIONS: u32 = 21453;
/// Key and salt length, matching the SHA-512 digest size
const KEY_LEN: usize = 64;

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    hash_with_salt(password, &salt)
}

/// Hash a password with the given salt
pub fn hash_with_salt(password: &str, salt: &[u8]) -> String {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, ITERATIONS, &mut key);
    format!("{}{}", hex::encode(key), hex::encode(salt))
}

/// Check a password against a stored hash.
///
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some(salt_hex) = stored.get(KEY_LEN * 2..) else {
        return false;
    };
    match hex::decode(salt_hex) {
        Ok(salt) if !salt.is_empty() => hash_with_salt(password, &salt) == stored,
        _ => false,
    }
}
