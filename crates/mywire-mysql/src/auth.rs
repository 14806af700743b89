//! Password scrambling for the handshake.
//!
//! Supported plugins:
//! - `mysql_native_password`: `SHA1(pw) XOR SHA1(seed + SHA1(SHA1(pw)))`
//! - `caching_sha2_password`: `SHA256(pw) XOR SHA256(SHA256(SHA256(pw)) + seed)`,
//!   falling back to RSA-encrypted full auth when the server asks for it
//! - `sha256_password`: RSA-encrypted password only
//! - `mysql_clear_password`: NUL-terminated plain text
//!
//! There is no TLS, so full authentication always goes through the server's
//! RSA public key.

use mywire_core::error::{ConnectionError, ConnectionErrorKind};
use mywire_core::{Error, Result};
use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Response codes for caching_sha2_password protocol.
pub mod caching_sha2 {
    /// Client asks the server for its RSA public key
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    /// Fast auth success
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Full auth needed
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// `sha256_password` asks for the server key with this byte instead.
pub const SHA256_REQUEST_PUBLIC_KEY: u8 = 0x01;

/// An authentication plugin named by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlugin {
    NativePassword,
    CachingSha2Password,
    Sha256Password,
    ClearPassword,
    Other(String),
}

impl AuthPlugin {
    pub fn from_name(name: &str) -> Self {
        match name {
            "mysql_native_password" | "" => AuthPlugin::NativePassword,
            "caching_sha2_password" => AuthPlugin::CachingSha2Password,
            "sha256_password" => AuthPlugin::Sha256Password,
            "mysql_clear_password" => AuthPlugin::ClearPassword,
            other => AuthPlugin::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AuthPlugin::NativePassword => "mysql_native_password",
            AuthPlugin::CachingSha2Password => "caching_sha2_password",
            AuthPlugin::Sha256Password => "sha256_password",
            AuthPlugin::ClearPassword => "mysql_clear_password",
            AuthPlugin::Other(name) => name,
        }
    }

    /// First auth response for this plugin, sent in the handshake response
    /// or after an auth switch.
    #[allow(clippy::result_large_err)]
    pub fn initial_response(&self, password: &str, seed: &[u8]) -> Result<Vec<u8>> {
        match self {
            AuthPlugin::NativePassword => Ok(scramble_native(password, seed)),
            AuthPlugin::CachingSha2Password => Ok(scramble_caching_sha2(password, seed)),
            // An empty password is sent as-is; anything else needs the key.
            AuthPlugin::Sha256Password if password.is_empty() => Ok(vec![0]),
            AuthPlugin::Sha256Password => Ok(vec![SHA256_REQUEST_PUBLIC_KEY]),
            AuthPlugin::ClearPassword => {
                let mut out = password.as_bytes().to_vec();
                out.push(0);
                Ok(out)
            }
            AuthPlugin::Other(name) => Err(auth_error(format!(
                "unsupported authentication plugin '{}'",
                name
            ))),
        }
    }
}

/// Drop the NUL the server appends to the 20-byte scramble.
fn trim_seed(seed: &[u8]) -> &[u8] {
    match seed {
        [head @ .., 0] if head.len() == 20 => head,
        _ => seed,
    }
}

fn xor_into(target: &mut [u8], mask: &[u8]) {
    for (t, m) in target.iter_mut().zip(mask) {
        *t ^= m;
    }
}

/// `mysql_native_password` response; empty for an empty password.
pub fn scramble_native(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = trim_seed(seed);

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let mask = hasher.finalize();

    let mut out = stage1.to_vec();
    xor_into(&mut out, &mask);
    out
}

/// `caching_sha2_password` fast-auth response; empty for an empty password.
pub fn scramble_caching_sha2(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = trim_seed(seed);

    let digest1 = Sha256::digest(password.as_bytes());
    let digest2 = Sha256::digest(digest1);
    let mut hasher = Sha256::new();
    hasher.update(digest2);
    hasher.update(seed);
    let mask = hasher.finalize();

    let mut out = digest1.to_vec();
    xor_into(&mut out, &mask);
    out
}

/// Encrypt the password for full authentication.
///
/// The NUL-terminated password is XORed with the repeating seed, then
/// encrypted with RSA-OAEP(SHA1) under the server's PEM public key.
#[allow(clippy::result_large_err)]
pub fn encrypt_password(password: &str, seed: &[u8], public_key_pem: &[u8]) -> Result<Vec<u8>> {
    let seed = trim_seed(seed);
    if seed.is_empty() {
        return Err(auth_error("server sent an empty scramble".to_string()));
    }

    let mut plain = password.as_bytes().to_vec();
    plain.push(0);
    for (i, b) in plain.iter_mut().enumerate() {
        *b ^= seed[i % seed.len()];
    }

    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| auth_error(format!("server public key is not PEM text: {}", e)))?;
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| auth_error(format!("invalid server public key: {}", e)))?;

    key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
        .map_err(|e| auth_error(format!("RSA encryption failed: {}", e)))
}

pub(crate) fn auth_error(message: String) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Authentication,
        message,
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn seed() -> Vec<u8> {
        (1..=20).collect()
    }

    #[test]
    fn test_scramble_native_known_vector() {
        assert_eq!(
            scramble_native("secret", &seed()),
            hex("b32bb3a583e1340c0a1108d58b1be49781ad8c2f")
        );
        assert!(scramble_native("", &seed()).is_empty());
    }

    #[test]
    fn test_scramble_caching_sha2_known_vector() {
        assert_eq!(
            scramble_caching_sha2("secret", &seed()),
            hex("746ebe205d56a0707acb3e796e834e0dd7b1d61743b26bd5202c7a623230c7c9")
        );
        assert!(scramble_caching_sha2("", &seed()).is_empty());
    }

    #[test]
    fn test_trailing_nul_in_seed_is_ignored() {
        let mut with_nul = seed();
        with_nul.push(0);
        assert_eq!(
            scramble_native("secret", &with_nul),
            scramble_native("secret", &seed())
        );
        assert_eq!(
            scramble_caching_sha2("secret", &with_nul),
            scramble_caching_sha2("secret", &seed())
        );
    }

    #[test]
    fn test_plugin_names_round_trip() {
        for name in [
            "mysql_native_password",
            "caching_sha2_password",
            "sha256_password",
            "mysql_clear_password",
        ] {
            assert_eq!(AuthPlugin::from_name(name).name(), name);
        }
        assert_eq!(AuthPlugin::from_name(""), AuthPlugin::NativePassword);
    }

    #[test]
    fn test_initial_responses() {
        let s = seed();
        assert_eq!(
            AuthPlugin::ClearPassword.initial_response("pw", &s).unwrap(),
            b"pw\0"
        );
        assert_eq!(
            AuthPlugin::Sha256Password.initial_response("pw", &s).unwrap(),
            vec![SHA256_REQUEST_PUBLIC_KEY]
        );
        let err = AuthPlugin::from_name("auth_gssapi_client")
            .initial_response("pw", &s)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_encrypt_password_rejects_bad_key() {
        let err = encrypt_password("pw", &seed(), b"not a key").unwrap_err();
        assert!(err.to_string().contains("public key"));
    }
}
