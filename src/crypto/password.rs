use base64::engine::general_purpose::STANDARD_NO_PAD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 32;

const SCHEME: &str = "pbkdf2-sha256";

/// Slow salted one-way password storage.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CryptoError>;

    /// `Ok(false)` on mismatch; `Err` only when `stored` cannot be parsed.
    fn verify(&self, password: &str, stored: &str) -> Result<bool, CryptoError>;
}

/// PBKDF2-HMAC-SHA256. Encoded as `pbkdf2-sha256$<iterations>$<salt>$<hash>`
/// so the iteration count can be raised without invalidating stored hashes.
#[derive(Debug, Clone)]
pub struct Pbkdf2PasswordHasher {
    iterations: u32,
}

impl Pbkdf2PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

impl Default for Pbkdf2PasswordHasher {
    fn default() -> Self {
        Self::new(PBKDF2_ITERATIONS)
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Generate a cryptographically random salt
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

impl PasswordHasher for Pbkdf2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, CryptoError> {
        let salt = generate_salt();
        let mut key = derive(password, &salt, self.iterations);
        let encoded = format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            B64.encode(salt),
            B64.encode(key)
        );
        key.zeroize();
        Ok(encoded)
    }

    fn verify(&self, password: &str, stored: &str) -> Result<bool, CryptoError> {
        let mut parts = stored.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(CryptoError::MalformedHash);
        };

        let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
        let salt = B64.decode(salt).map_err(|_| CryptoError::MalformedHash)?;
        let expected = B64.decode(expected).map_err(|_| CryptoError::MalformedHash)?;
        if iterations == 0 || expected.len() != HASH_LENGTH {
            return Err(CryptoError::MalformedHash);
        }

        let mut key = derive(password, &salt, iterations);
        let matches: bool = key[..].ct_eq(&expected[..]).into();
        key.zeroize();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Pbkdf2PasswordHasher {
        Pbkdf2PasswordHasher::new(1_000)
    }

    #[test]
    fn hash_then_verify() {
        let hasher = fast();
        let stored = hasher.hash("password123").unwrap();
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(hasher.verify("password123", &stored).unwrap());
        assert!(!hasher.verify("password124", &stored).unwrap());
    }

    #[test]
    fn same_password_gets_different_salts() {
        let hasher = fast();
        let a = hasher.hash("password123").unwrap();
        let b = hasher.hash("password123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_uses_stored_iteration_count() {
        let stored = Pbkdf2PasswordHasher::new(500).hash("password123").unwrap();
        assert!(fast().verify("password123", &stored).unwrap());
    }

    #[test]
    fn plaintext_is_not_stored() {
        let stored = fast().hash("password123").unwrap();
        assert!(!stored.contains("password123"));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let hasher = fast();
        for bad in ["", "password123", "bcrypt$10$abc$def", "pbkdf2-sha256$x$YQ$YQ", "pbkdf2-sha256$10$YQ$YQ$extra"] {
            assert!(matches!(hasher.verify("pw", bad), Err(CryptoError::MalformedHash)), "{bad}");
        }
    }

    #[test]
    fn default_iterations_match_constant() {
        let stored = Pbkdf2PasswordHasher::default().hash("pw").unwrap();
        assert!(stored.starts_with(&format!("pbkdf2-sha256${PBKDF2_ITERATIONS}$")));
    }
}
