//! Password hashing and token generation

use rand::Rng;
use sha2::{Digest, Sha256};

/// Salt length in bytes
const SALT_LENGTH: usize = 16;

/// Token length in bytes (64 hex characters)
const TOKEN_LENGTH: usize = 32;

/// Hash a password with a fresh random salt
///
/// Stored as `<salt hex>$<sha256(salt || password) hex>`.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let salt = random_bytes(SALT_LENGTH);
    format!("{}${}", hex::encode(&salt), digest(&salt, password))
}

/// Check a password against a stored hash (timing-safe comparison)
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    constant_time_eq(digest(&salt, password).as_bytes(), expected.as_bytes())
}

/// Generate a random bearer token
#[must_use]
pub fn generate_token() -> String {
    hex::encode(random_bytes(TOKEN_LENGTH))
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_bytes(length: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..length).map(|_| rng.r#gen()).collect()
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let stored = hash_password("correct horse");
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("battery staple", &stored));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("x", "no-separator"));
        assert!(!verify_password("x", "zz$abcd"));
        assert!(!verify_password("x", ""));
    }

    #[test]
    fn tokens_are_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LENGTH * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
