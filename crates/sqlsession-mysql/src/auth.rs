//! Password scrambles for the MySQL authentication plugins.
//!
//! - `mysql_native_password`:
//!   `SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))`
//! - `caching_sha2_password` fast path:
//!   `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + seed)`
//! - `caching_sha2_password` full path over plain TCP: the NUL-terminated
//!   password, XORed with the seed, encrypted with the server's RSA key.

use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub mod plugins {
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    pub const SHA256_PASSWORD: &str = "sha256_password";
}

/// Status bytes exchanged during `caching_sha2_password` authentication.
pub mod caching_sha2 {
    /// Client asks the server for its RSA public key.
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// First response byte of `sha256_password` without TLS: send the key.
const SHA256_REQUEST_PUBLIC_KEY: u8 = 0x01;

/// Authentication plugins this driver can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    NativePassword,
    CachingSha2Password,
    Sha256Password,
}

impl AuthPlugin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            plugins::MYSQL_NATIVE_PASSWORD => Some(Self::NativePassword),
            plugins::CACHING_SHA2_PASSWORD => Some(Self::CachingSha2Password),
            plugins::SHA256_PASSWORD => Some(Self::Sha256Password),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NativePassword => plugins::MYSQL_NATIVE_PASSWORD,
            Self::CachingSha2Password => plugins::CACHING_SHA2_PASSWORD,
            Self::Sha256Password => plugins::SHA256_PASSWORD,
        }
    }

    /// The initial auth response for this plugin.
    ///
    /// `sha256_password` sends no scramble up front; it always goes through
    /// the public-key exchange.
    pub fn scramble(self, password: &str, seed: &[u8]) -> Vec<u8> {
        match self {
            Self::NativePassword => mysql_native_password(password, seed),
            Self::CachingSha2Password => caching_sha2_password(password, seed),
            Self::Sha256Password if password.is_empty() => Vec::new(),
            Self::Sha256Password => vec![SHA256_REQUEST_PUBLIC_KEY],
        }
    }
}

/// Servers send a 20-byte scramble, often followed by a NUL.
fn trim_seed(seed: &[u8]) -> &[u8] {
    match seed {
        [head @ .., 0] if head.len() == 20 => head,
        _ if seed.len() > 20 => &seed[..20],
        _ => seed,
    }
}

fn xor<const N: usize>(a: [u8; N], b: [u8; N]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

/// An empty password produces an empty response.
pub fn mysql_native_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();
    let mut hasher = Sha1::new();
    hasher.update(trim_seed(seed));
    hasher.update(stage2);
    xor(stage1, hasher.finalize().into())
}

/// An empty password produces an empty response.
pub fn caching_sha2_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let hash_hash: [u8; 32] = Sha256::digest(hash).into();
    let mut hasher = Sha256::new();
    hasher.update(hash_hash);
    hasher.update(trim_seed(seed));
    xor(hash, hasher.finalize().into())
}

/// Encrypt the password with the server's RSA public key (PEM, SPKI or
/// PKCS#1) using OAEP padding, as MySQL 8 expects.
pub fn encrypt_password_rsa(
    password: &str,
    seed: &[u8],
    public_key_pem: &[u8],
) -> Result<Vec<u8>, String> {
    let seed = trim_seed(seed);
    if seed.is_empty() {
        return Err("server sent an empty scramble".to_string());
    }

    let mut plain = password.as_bytes().to_vec();
    plain.push(0);
    for (b, s) in plain.iter_mut().zip(seed.iter().cycle()) {
        *b ^= s;
    }

    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| format!("server public key is not UTF-8 PEM: {e}"))?;
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| format!("failed to parse server public key: {e}"))?;

    key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
        .map_err(|e| format!("RSA encryption failed: {e}"))
}
