//! CipherCodec: the two symmetric schemes used by the gateways.
//!
//! * [`CbcCipher`] (Airpay): AES-CBC, PKCS#7, key derived from the merchant
//!   login, framed as `IV ascii || base64(ciphertext)`.
//! * [`GcmHmacCipher`] (SabPaisa): AES-GCM with an HMAC-SHA384 over
//!   `nonce || ciphertext || tag`, framed as uppercase hex of `hmac || ...`.

use crate::payments::error::PaymentError;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::Sha384;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha384 = Hmac<Sha384>;

pub const AIRPAY_FIXED_IV: &str = "c0f9e2d16031b0ce";
pub const CBC_IV_LEN: usize = 16;
pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;
pub const HMAC_SHA384_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("padding check failed")]
    BadPadding,

    #[error("HMAC mismatch")]
    Tampered,

    #[error("AEAD authentication failed")]
    AuthenticationFailed,

    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}

impl From<CipherError> for PaymentError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Tampered => PaymentError::TamperDetected,
            CipherError::InvalidKey(message) => PaymentError::Configuration { message },
            other => PaymentError::DecryptFailure {
                message: other.to_string(),
            },
        }
    }
}

// ============================================================================
// Scheme 1: AES-CBC with login-derived key
// ============================================================================

/// The key is the 32 ASCII characters of `md5_hex(username~:~password)`, used
/// as raw bytes, which makes this AES-256.
#[derive(Clone)]
pub struct CbcCipher {
    key: [u8; 32],
    iv: [u8; CBC_IV_LEN],
}

impl std::fmt::Debug for CbcCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbcCipher").finish_non_exhaustive()
    }
}

impl CbcCipher {
    pub fn from_login(username: &str, password: &str) -> Self {
        let digest = Md5::digest(format!("{}~:~{}", username, password).as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(hex::encode(digest).as_bytes());

        let mut iv = [0u8; CBC_IV_LEN];
        iv.copy_from_slice(AIRPAY_FIXED_IV.as_bytes());
        Self { key, iv }
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut framed = String::with_capacity(CBC_IV_LEN + ciphertext.len() * 4 / 3 + 4);
        framed.push_str(AIRPAY_FIXED_IV);
        framed.push_str(&general_purpose::STANDARD.encode(ciphertext));
        framed
    }

    /// Splits at the fixed 16-character offset; the prefix is the IV.
    pub fn decrypt(&self, framed: &str) -> Result<String, CipherError> {
        let framed = framed.trim();
        if framed.len() <= CBC_IV_LEN || !framed.is_char_boundary(CBC_IV_LEN) {
            return Err(CipherError::Malformed(
                "payload shorter than IV prefix".to_string(),
            ));
        }
        let (iv, body) = framed.split_at(CBC_IV_LEN);

        let ciphertext = general_purpose::STANDARD
            .decode(body)
            .map_err(|e| CipherError::Malformed(format!("base64: {}", e)))?;

        let plaintext = Aes256CbcDec::new_from_slices(&self.key, iv.as_bytes())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CipherError::BadPadding)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}

// ============================================================================
// Scheme 2: AES-GCM with detached HMAC-SHA384
// ============================================================================

#[derive(Clone)]
enum GcmKey {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

#[derive(Clone)]
pub struct GcmHmacCipher {
    aead: GcmKey,
    hmac_key: Vec<u8>,
}

impl std::fmt::Debug for GcmHmacCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcmHmacCipher").finish_non_exhaustive()
    }
}

impl GcmHmacCipher {
    pub fn new(aead_key: &[u8], hmac_key: &[u8]) -> Result<Self, CipherError> {
        let aead = match aead_key.len() {
            16 => GcmKey::Aes128(
                Aes128Gcm::new_from_slice(aead_key)
                    .map_err(|e| CipherError::InvalidKey(e.to_string()))?,
            ),
            32 => GcmKey::Aes256(
                Aes256Gcm::new_from_slice(aead_key)
                    .map_err(|e| CipherError::InvalidKey(e.to_string()))?,
            ),
            n => {
                return Err(CipherError::InvalidKey(format!(
                    "AES key must be 16 or 32 bytes, got {}",
                    n
                )))
            }
        };
        if hmac_key.is_empty() {
            return Err(CipherError::InvalidKey("HMAC key is empty".to_string()));
        }
        Ok(Self {
            aead,
            hmac_key: hmac_key.to_vec(),
        })
    }

    /// Both keys arrive base64-encoded.
    pub fn from_base64(aead_key_b64: &str, hmac_key_b64: &str) -> Result<Self, CipherError> {
        let aead_key = general_purpose::STANDARD
            .decode(aead_key_b64.trim())
            .map_err(|e| CipherError::InvalidKey(format!("auth key base64: {}", e)))?;
        let hmac_key = general_purpose::STANDARD
            .decode(hmac_key_b64.trim())
            .map_err(|e| CipherError::InvalidKey(format!("auth iv base64: {}", e)))?;
        Self::new(&aead_key, &hmac_key)
    }

    fn mac(&self) -> Result<HmacSha384, CipherError> {
        <HmacSha384 as Mac>::new_from_slice(&self.hmac_key)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        self.encrypt_with_nonce(plaintext, nonce_bytes)
    }

    fn encrypt_with_nonce(
        &self,
        plaintext: &str,
        nonce_bytes: [u8; GCM_NONCE_LEN],
    ) -> Result<String, CipherError> {
        let nonce = Nonce::from_slice(&nonce_bytes);
        // aes-gcm appends the 16-byte tag to the ciphertext.
        let sealed = match &self.aead {
            GcmKey::Aes128(c) => c.encrypt(nonce, plaintext.as_bytes()),
            GcmKey::Aes256(c) => c.encrypt(nonce, plaintext.as_bytes()),
        }
        .map_err(|_| CipherError::AuthenticationFailed)?;

        let mut message = Vec::with_capacity(GCM_NONCE_LEN + sealed.len());
        message.extend_from_slice(&nonce_bytes);
        message.extend_from_slice(&sealed);

        let mut mac = self.mac()?;
        mac.update(&message);
        let tag = mac.finalize().into_bytes();

        let mut framed = Vec::with_capacity(HMAC_SHA384_LEN + message.len());
        framed.extend_from_slice(&tag);
        framed.extend_from_slice(&message);
        Ok(hex::encode_upper(framed))
    }

    /// HMAC is checked in constant time before any decryption is attempted.
    pub fn decrypt(&self, hex_blob: &str) -> Result<String, CipherError> {
        let framed = hex::decode(hex_blob.trim())
            .map_err(|e| CipherError::Malformed(format!("hex: {}", e)))?;
        if framed.len() < HMAC_SHA384_LEN + GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(CipherError::Malformed("payload too short".to_string()));
        }

        let (received_mac, message) = framed.split_at(HMAC_SHA384_LEN);
        let mut mac = self.mac()?;
        mac.update(message);
        mac.verify_slice(received_mac)
            .map_err(|_| CipherError::Tampered)?;

        let (nonce_bytes, sealed) = message.split_at(GCM_NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = match &self.aead {
            GcmKey::Aes128(c) => c.decrypt(nonce, sealed),
            GcmKey::Aes256(c) => c.decrypt(nonce, sealed),
        }
        .map_err(|_| CipherError::AuthenticationFailed)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}
