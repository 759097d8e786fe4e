//! Cryptographic utilities.
//!
//! - Stable hashing of push endpoint URLs into registry keys
//! - HMAC-SHA256 verification for signed inbound webhooks
//! - VAPID (P-256) key material for the Web Push protocol
//!
//! # Examples
//!
//! ```
//! use herald_common::crypto::{VapidKeypair, hash_endpoint};
//!
//! let hash = hash_endpoint("https://push.example.net/send/abc");
//! assert_eq!(hash.len(), 64);
//!
//! let keypair = VapidKeypair::generate().expect("Failed to generate keypair");
//! let restored = VapidKeypair::from_private_key(&keypair.private_key).expect("Failed to parse");
//! assert_eq!(restored.public_key, keypair.public_key);
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint, PointConversionForm};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use sha2::{Digest, Sha256};

use crate::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Hash a push endpoint URL into its registry key (hex SHA-256).
#[must_use]
pub fn hash_endpoint(endpoint: &str) -> String {
    hex::encode(Sha256::digest(endpoint.as_bytes()))
}

/// Sign a payload with HMAC-SHA256, returning `sha256=<hex>`.
#[allow(clippy::expect_used)] // HMAC accepts any key size, this cannot fail
#[must_use]
pub fn sign_hmac_sha256(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify an HMAC-SHA256 signature in constant time.
///
/// Accepts bare hex or the `sha256=<hex>` form.
#[must_use]
pub fn verify_hmac_sha256(secret: &str, payload: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_part) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// VAPID key pair on the P-256 curve.
#[derive(Clone)]
pub struct VapidKeypair {
    /// Public key (base64url, uncompressed point), handed to browsers.
    pub public_key: String,
    /// Private key (base64url, raw 32-byte scalar).
    pub private_key: String,
    /// Private key as PKCS#8 PEM, consumed by the push signer.
    pub private_key_pem: String,
}

impl std::fmt::Debug for VapidKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl VapidKeypair {
    /// Generate a fresh key pair.
    pub fn generate() -> AppResult<Self> {
        let group = p256_group()?;
        let key = EcKey::generate(&group).map_err(crypto_err)?;
        Self::from_ec_key(&group, key)
    }

    /// Rebuild a key pair from a base64url raw private scalar.
    ///
    /// The public half is derived from the scalar, so a configured public
    /// key can be checked against it.
    pub fn from_private_key(private_key: &str) -> AppResult<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(private_key.trim().trim_end_matches('='))
            .map_err(|e| AppError::Config(format!("VAPID private key is not base64url: {e}")))?;
        if raw.len() != 32 {
            return Err(AppError::Config(format!(
                "VAPID private key must be 32 bytes, got {}",
                raw.len()
            )));
        }

        let group = p256_group()?;
        let scalar = BigNum::from_slice(&raw).map_err(crypto_err)?;
        let ctx = BigNumContext::new().map_err(crypto_err)?;
        let mut point = EcPoint::new(&group).map_err(crypto_err)?;
        point
            .mul_generator(&group, &scalar, &ctx)
            .map_err(crypto_err)?;
        let key = EcKey::from_private_components(&group, &scalar, &point).map_err(crypto_err)?;
        key.check_key()
            .map_err(|e| AppError::Config(format!("Invalid VAPID private key: {e}")))?;

        Self::from_ec_key(&group, key)
    }

    fn from_ec_key(group: &EcGroup, key: EcKey<Private>) -> AppResult<Self> {
        let mut ctx = BigNumContext::new().map_err(crypto_err)?;
        let public = key
            .public_key()
            .to_bytes(group, PointConversionForm::UNCOMPRESSED, &mut ctx)
            .map_err(crypto_err)?;
        let private = key.private_key().to_vec_padded(32).map_err(crypto_err)?;
        let pem = PKey::from_ec_key(key)
            .and_then(|pkey| pkey.private_key_to_pem_pkcs8())
            .map_err(crypto_err)?;
        let private_key_pem = String::from_utf8(pem)
            .map_err(|e| AppError::Internal(format!("PEM is not UTF-8: {e}")))?;

        Ok(Self {
            public_key: URL_SAFE_NO_PAD.encode(public),
            private_key: URL_SAFE_NO_PAD.encode(private),
            private_key_pem,
        })
    }
}

fn p256_group() -> AppResult<EcGroup> {
    EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).map_err(crypto_err)
}

fn crypto_err(e: openssl::error::ErrorStack) -> AppError {
    AppError::Internal(format!("Crypto operation failed: {e}"))
}
