//! Symmetric codec for exported credential blobs.
//!
//! Two on-disk formats share the hex transport encoding:
//!
//! - **Sealed** (current exporter): `hex(salt || iv || ciphertext)` with a
//!   random 16-byte salt, random IV and a PBKDF2-HMAC-SHA256 derived key.
//! - **Legacy**: `hex(ciphertext)` with the passphrase zero-padded to the key
//!   length and a fixed IV. Still accepted on import for old export files.
//!
//! Both use AES-128-CBC with PKCS7 padding. Every failure collapses into the
//! single opaque [`CryptoError`].

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;
/// AES block (and IV) length in bytes.
pub const BLOCK_LEN: usize = 16;
/// Salt length of the sealed envelope.
const SALT_LEN: usize = 16;

/// Fixed IV the legacy exporter used for every message.
pub const LEGACY_IV: [u8; BLOCK_LEN] = *b"11212121\0\0\0\0\0\0\0\0";

/// Encrypt a UTF-8 string, returning raw ciphertext bytes.
pub fn encrypt(
    plaintext: &str,
    key: &[u8; KEY_LEN],
    iv: &[u8; BLOCK_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes128CbcEnc::new(key.into(), iv.into());
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()))
}

/// Encrypt and hex-encode for storage/transport.
pub fn encrypt_hex(
    plaintext: &str,
    key: &[u8; KEY_LEN],
    iv: &[u8; BLOCK_LEN],
) -> Result<String, CryptoError> {
    encrypt(plaintext, key, iv).map(hex::encode)
}

/// Hex-decode, decrypt and UTF-8-validate a ciphertext.
pub fn decrypt_hex(
    ciphertext_hex: &str,
    key: &[u8; KEY_LEN],
    iv: &[u8; BLOCK_LEN],
) -> Result<String, CryptoError> {
    let ciphertext = hex::decode(ciphertext_hex.trim()).map_err(|_| CryptoError)?;
    decrypt_bytes(&ciphertext, key, iv)
}

fn decrypt_bytes(
    ciphertext: &[u8],
    key: &[u8; KEY_LEN],
    iv: &[u8; BLOCK_LEN],
) -> Result<String, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CryptoError);
    }
    let cipher = Aes128CbcDec::new(key.into(), iv.into());
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError)
}

/// Legacy key scheme: passphrase bytes zero-padded / truncated to [`KEY_LEN`].
pub fn legacy_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let bytes = passphrase.as_bytes();
    let len = bytes.len().min(KEY_LEN);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

fn derive_key(passphrase: &SecretString, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(
        passphrase.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut key,
    );
    key
}

/// Seal a plaintext under a passphrase: fresh salt and IV per call,
/// PBKDF2-derived key, output `hex(salt || iv || ciphertext)`.
pub fn seal(
    plaintext: &str,
    passphrase: &SecretString,
    iterations: u32,
) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; BLOCK_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let key = derive_key(passphrase, &salt, iterations);
    let ciphertext = encrypt(plaintext, &key, &iv)?;

    let mut blob = Vec::with_capacity(SALT_LEN + BLOCK_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(hex::encode(blob))
}

/// Open a hex blob under a passphrase.
///
/// Tries the sealed envelope first; if the blob is too short for one or the
/// envelope fails to decrypt, falls back to the legacy transform so old
/// export files still import.
pub fn open(
    blob_hex: &str,
    passphrase: &SecretString,
    iterations: u32,
) -> Result<String, CryptoError> {
    let blob = hex::decode(blob_hex.trim()).map_err(|_| CryptoError)?;

    let header = SALT_LEN + BLOCK_LEN;
    if blob.len() > header && (blob.len() - header) % BLOCK_LEN == 0 {
        let (salt, rest) = blob.split_at(SALT_LEN);
        let (iv, ciphertext) = rest.split_at(BLOCK_LEN);
        let iv: [u8; BLOCK_LEN] = iv.try_into().map_err(|_| CryptoError)?;
        let key = derive_key(passphrase, salt, iterations);
        if let Ok(plaintext) = decrypt_bytes(ciphertext, &key, &iv) {
            return Ok(plaintext);
        }
    }

    let key = legacy_key(passphrase.expose_secret());
    decrypt_bytes(&blob, &key, &LEGACY_IV)
}
