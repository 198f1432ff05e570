//! Authentication plugin responses.
//!
//! - `mysql_native_password`: `SHA1(pw) XOR SHA1(seed + SHA1(SHA1(pw)))`
//! - `caching_sha2_password`: `SHA256(pw) XOR SHA256(SHA256(SHA256(pw)) + seed)`
//!   for fast auth; full auth sends the password in clear text over a Unix
//!   socket, or RSA-encrypted with the server's public key over TCP.

use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Plugin names the client understands.
pub mod plugins {
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Status bytes of the caching_sha2_password exchange.
pub mod caching_sha2 {
    /// Client asks the server for its RSA public key
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    /// Password matched the server cache
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Server needs the full password
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
    /// Prefix of a packet carrying extra auth data (e.g. the public key)
    pub const MORE_DATA: u8 = 0x01;
}

/// Scramble seeds are 20 bytes; servers often append a NUL.
fn seed(auth_data: &[u8]) -> &[u8] {
    match auth_data {
        [head @ .., 0] if head.len() == 20 => head,
        data if data.len() > 20 => &data[..20],
        data => data,
    }
}

fn xor<const N: usize>(a: [u8; N], b: [u8; N]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// Response for `mysql_native_password`. Empty for an empty password.
pub fn mysql_native_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();
    let stage3: [u8; 20] = Sha1::new()
        .chain_update(seed(auth_data))
        .chain_update(stage2)
        .finalize()
        .into();
    xor(stage1, stage3)
}

/// Fast-auth response for `caching_sha2_password`. Empty for an empty password.
pub fn caching_sha2_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let hash_hash: [u8; 32] = Sha256::digest(hash).into();
    let scramble: [u8; 32] = Sha256::new()
        .chain_update(hash_hash)
        .chain_update(seed(auth_data))
        .finalize()
        .into();
    xor(hash, scramble)
}

/// Password followed by a NUL, as sent by clear-text exchanges.
pub fn clear_password(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

/// Full-auth response: `RSA_OAEP(password + NUL XOR seed)` with the server key.
///
/// `public_key_pem` may be SPKI ("BEGIN PUBLIC KEY") or PKCS#1
/// ("BEGIN RSA PUBLIC KEY").
pub fn rsa_encrypt_password(
    password: &str,
    auth_data: &[u8],
    public_key_pem: &[u8],
) -> Result<Vec<u8>, String> {
    let seed = seed(auth_data);
    if seed.is_empty() {
        return Err("authentication seed is empty".to_string());
    }

    let mut plain = clear_password(password);
    for (i, byte) in plain.iter_mut().enumerate() {
        *byte ^= seed[i % seed.len()];
    }

    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| format!("server public key is not valid PEM: {e}"))?;
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| format!("cannot parse server public key: {e}"))?;

    key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
        .map_err(|e| format!("RSA encryption failed: {e}"))
}

/// Response bytes for `plugin`, falling back to native password for unknown plugins.
pub fn scramble_for(plugin: &str, password: &str, auth_data: &[u8]) -> Vec<u8> {
    match plugin {
        plugins::CACHING_SHA2_PASSWORD => caching_sha2_password(password, auth_data),
        plugins::MYSQL_CLEAR_PASSWORD => clear_password(password),
        _ => mysql_native_password(password, auth_data),
    }
}
