//! Password-based encryption of clipboard payloads.
//!
//! Payloads are AES-256-CBC with PKCS#7 padding under a key derived with
//! PBKDF2-HMAC-SHA256. The stored form is base64 of `salt || ciphertext || iv`,
//! both 16-byte fields sampled fresh on every call.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha2::Sha256;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const KEY_LEN: usize = 32;
pub const KDF_ITERATIONS: u32 = 10_000;

/// Text returned by [`decrypt`] when a payload cannot be opened.
pub const DECRYPTION_FAILED: &str = "Decryption failed. Please provide the correct password.";

/// Why a payload could not be decrypted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("payload is not valid base64")]
    InvalidBase64,

    #[error("payload is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("wrong password or corrupted ciphertext")]
    BadPassword,

    #[error("decrypted bytes are not valid UTF-8")]
    InvalidUtf8,
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ITERATIONS, &mut key);
    key
}

/// Encrypt `plaintext` under `password`.
///
/// Two calls with the same input never produce the same output.
pub fn encrypt(plaintext: &str, password: &str) -> String {
    let mut rng = rand::rng();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let key = derive_key(password, &salt);
    let ciphertext =
        Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut combined = Vec::with_capacity(SALT_LEN + ciphertext.len() + IV_LEN);
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&ciphertext);
    combined.extend_from_slice(&iv);
    STANDARD.encode(combined)
}

/// Decrypt a payload produced by [`encrypt`], reporting why it failed.
pub fn try_decrypt(payload: &str, password: &str) -> Result<String, DecryptError> {
    let combined = STANDARD
        .decode(payload.trim())
        .map_err(|_| DecryptError::InvalidBase64)?;

    let len = combined.len();
    if len < SALT_LEN + BLOCK_LEN + IV_LEN || (len - SALT_LEN - IV_LEN) % BLOCK_LEN != 0 {
        return Err(DecryptError::Truncated(len));
    }

    let (salt, rest) = combined.split_at(SALT_LEN);
    let (ciphertext, iv) = rest.split_at(rest.len() - IV_LEN);

    let key = derive_key(password, salt);
    let mut iv_block = [0u8; IV_LEN];
    iv_block.copy_from_slice(iv);

    let plaintext = Aes256CbcDec::new(&key.into(), &iv_block.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DecryptError::BadPassword)?;

    String::from_utf8(plaintext).map_err(|_| DecryptError::InvalidUtf8)
}

/// Decrypt a payload, returning [`DECRYPTION_FAILED`] instead of an error.
///
/// The sentinel cannot be told apart from a plaintext that happens to equal it;
/// use [`try_decrypt`] when that matters.
pub fn decrypt(payload: &str, password: &str) -> String {
    try_decrypt(payload, password).unwrap_or_else(|_| DECRYPTION_FAILED.to_string())
}
