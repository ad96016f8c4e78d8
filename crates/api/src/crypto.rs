//! Credential hashing and session token generation.
//!
//! - SHA-256 digests (unsalted, matches rows written by the legacy service)
//! - PBKDF2-SHA256 digests with a per-user salt (600k iterations)
//!
//! Callers treat a digest as an opaque comparison token, so the hasher can be
//! swapped without touching the registration or session code.

use std::str::FromStr;
use std::sync::Arc;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};

use crate::ServiceError;

const PBKDF2_ITERATIONS: u32 = 600_000;
const PBKDF2_PREFIX: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const TOKEN_LEN: usize = 32;

/// One-way transform from a plaintext password to a storable digest.
pub trait CredentialHasher: Send + Sync {
    /// Digest to store for `plaintext`.
    fn hash(&self, plaintext: &str) -> Result<String, ServiceError>;

    /// Whether `plaintext` produces `digest`. Malformed digests never match.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

// ── SHA-256 ─────────────────────────────────────────────────────────────────

/// Hex SHA-256 of the UTF-8 password, no salt.
///
/// Identical passwords yield identical digests across users.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    fn digest(plaintext: &str) -> String {
        hex::encode(Sha256::digest(plaintext.as_bytes()))
    }
}

impl CredentialHasher for Sha256Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, ServiceError> {
        Ok(Self::digest(plaintext))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        constant_time_eq(Self::digest(plaintext).as_bytes(), digest.as_bytes())
    }
}

// ── PBKDF2 ──────────────────────────────────────────────────────────────────

/// Salted PBKDF2-HMAC-SHA256.
///
/// Digests are encoded as `pbkdf2-sha256$<iterations>$<salt_hex>$<hash_hex>`
/// so the iteration count can be raised without invalidating old rows.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Hasher {
    iterations: u32,
}

impl Pbkdf2Hasher {
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::with_iterations(PBKDF2_ITERATIONS)
    }
}

impl CredentialHasher for Pbkdf2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, ServiceError> {
        let mut salt = [0u8; SALT_LEN];
        getrandom::getrandom(&mut salt)
            .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, self.iterations, &mut hash);

        Ok(format!(
            "{PBKDF2_PREFIX}${}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(hash)
        ))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let mut parts = digest.split('$');
        let (Some(PBKDF2_PREFIX), Some(iterations), Some(salt_hex), Some(hash_hex), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        let Ok(iterations) = iterations.parse::<u32>() else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
            return false;
        };
        if iterations == 0 || expected.len() != HASH_LEN {
            return false;
        }

        let mut hash = [0u8; HASH_LEN];
        pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), &salt, iterations, &mut hash);
        constant_time_eq(&hash, &expected)
    }
}

// ── Selection ───────────────────────────────────────────────────────────────

/// Hasher selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HasherKind {
    #[default]
    Sha256,
    Pbkdf2,
}

impl HasherKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sha256 => "sha256",
            Self::Pbkdf2 => "pbkdf2",
        }
    }

    pub fn build(&self) -> Arc<dyn CredentialHasher> {
        match self {
            Self::Sha256 => Arc::new(Sha256Hasher),
            Self::Pbkdf2 => Arc::new(Pbkdf2Hasher::default()),
        }
    }
}

impl std::fmt::Display for HasherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HasherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "pbkdf2" | "pbkdf2-sha256" => Ok(Self::Pbkdf2),
            other => Err(format!("unknown password hasher: {other}")),
        }
    }
}

// ── Tokens ──────────────────────────────────────────────────────────────────

/// Generate an opaque session token: 32 random bytes, hex-encoded.
pub fn generate_token() -> Result<String, ServiceError> {
    let mut bytes = [0u8; TOKEN_LEN];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok(hex::encode(bytes))
}

/// Compare two byte strings without short-circuiting on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
