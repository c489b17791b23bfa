//! Field cipher for encryption-annotated columns.
//!
//! Values bound to a column carrying a [`CipherSpec`] are encrypted before
//! they are written into SQL text, so that comparisons run against the
//! stored ciphertext.
//!
//! ## Format
//!
//! AES in CBC mode with PKCS7 padding. The key is derived with
//! PBKDF2-HMAC-SHA1 (1000 iterations) from the passphrase and a fixed salt
//! per key size. The encrypted blob is `salt ++ iv ++ ciphertext`, where both
//! salt and IV header are `key_size / 8` bytes long. The AES block IV is the
//! first 16 bytes of the IV header.
//!
//! The salt and IV are constants, so equal plaintexts under the same key
//! produce equal ciphertexts. That is what makes equality and `IN`
//! comparisons against encrypted columns possible, and it also leaks which
//! rows share a value.
//!
//! ## Legacy values
//!
//! [`FieldCipher::decrypt`] returns its input unchanged when the blob does
//! not start with a known salt, so rows written before a column was
//! annotated still read back. A blob that does carry the salt but is
//! truncated or corrupt is an error.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::Sha1;
use sqlweave_core::{WeaveError, WeaveResult, SETTINGS};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const DERIVATION_ITERATIONS: u32 = 1000;
const BLOCK_LEN: usize = 16;

const SALT_128: &[u8] = b"kljsdkkdlo4454GG";
const SALT_256: &[u8] = b"kljsdkkdlo4454GG00155sajuklmbkdl";
const IV_128: &[u8] = b"SSljsdkkdlo4454M";
const IV_256: &[u8] = b"SSljsdkkdlo4454Maakikjhsd55GaRTP";

/// Supported AES key sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum KeySize {
    /// AES-128.
    #[default]
    Key128,
    /// AES-256.
    Key256,
}

impl KeySize {
    /// Every supported key size.
    pub const ALL: [Self; 2] = [Self::Key128, Self::Key256];

    /// Key size in bits.
    pub const fn bits(self) -> u16 {
        match self {
            Self::Key128 => 128,
            Self::Key256 => 256,
        }
    }

    /// Key size in bytes; also the length of the salt and IV headers.
    pub const fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    const fn salt(self) -> &'static [u8] {
        match self {
            Self::Key128 => SALT_128,
            Self::Key256 => SALT_256,
        }
    }

    const fn iv_header(self) -> &'static [u8] {
        match self {
            Self::Key128 => IV_128,
            Self::Key256 => IV_256,
        }
    }
}

impl TryFrom<u16> for KeySize {
    type Error = WeaveError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        match bits {
            128 => Ok(Self::Key128),
            256 => Ok(Self::Key256),
            other => Err(WeaveError::ConfigurationError(format!(
                "Unsupported cipher key size {other}; expected 128 or 256"
            ))),
        }
    }
}

/// Cipher annotation attached to a column.
///
/// An empty `key` means "use the globally configured default key".
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CipherSpec {
    /// Passphrase the AES key is derived from.
    pub key: String,
    /// AES key size.
    pub key_size: KeySize,
}

impl CipherSpec {
    /// Creates a cipher annotation.
    pub fn new(key: impl Into<String>, key_size: KeySize) -> Self {
        Self {
            key: key.into(),
            key_size,
        }
    }

    /// An annotation that relies on the configured default key and key size.
    ///
    /// Falls back to 128-bit keys when settings are not configured or carry
    /// an unsupported size.
    pub fn configured_default() -> Self {
        let key_size = SETTINGS
            .try_get()
            .and_then(|s| KeySize::try_from(s.cipher.key_size).ok())
            .unwrap_or_default();
        Self::new(String::new(), key_size)
    }
}

/// Symmetric cipher for column values.
///
/// # Examples
///
/// ```
/// use sqlweave_db::cipher::{FieldCipher, KeySize};
///
/// let cipher = FieldCipher::new("passphrase", KeySize::Key128).unwrap();
/// let blob = cipher.encrypt(b"hello").unwrap();
/// assert_eq!(cipher.decrypt(&blob).unwrap(), b"hello");
/// ```
#[derive(Clone)]
pub struct FieldCipher {
    key: Vec<u8>,
    key_size: KeySize,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("key_size", &self.key_size)
            .finish_non_exhaustive()
    }
}

impl FieldCipher {
    /// Derives the AES key from `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns [`WeaveError::ConfigurationError`] for a blank passphrase.
    pub fn new(passphrase: &str, key_size: KeySize) -> WeaveResult<Self> {
        if passphrase.trim().is_empty() {
            return Err(WeaveError::ConfigurationError(
                "Cipher passphrase must not be empty".to_string(),
            ));
        }
        let mut key = vec![0_u8; key_size.bytes()];
        pbkdf2::pbkdf2_hmac::<Sha1>(
            passphrase.as_bytes(),
            key_size.salt(),
            DERIVATION_ITERATIONS,
            &mut key,
        );
        Ok(Self { key, key_size })
    }

    /// Builds the cipher for a column annotation.
    ///
    /// A blank annotation key falls back to `cipher.default_key` from the
    /// global settings.
    pub fn from_spec(spec: &CipherSpec) -> WeaveResult<Self> {
        if !spec.key.trim().is_empty() {
            return Self::new(&spec.key, spec.key_size);
        }
        let default_key = SETTINGS
            .try_get()
            .map(|s| s.cipher.default_key.as_str())
            .unwrap_or_default();
        if default_key.trim().is_empty() {
            return Err(WeaveError::ConfigurationError(
                "Column is cipher-annotated without a key and no default cipher key is configured"
                    .to_string(),
            ));
        }
        Self::new(default_key, spec.key_size)
    }

    /// Returns the key size of this cipher.
    pub const fn key_size(&self) -> KeySize {
        self.key_size
    }

    /// Encrypts `plaintext` into `salt ++ iv ++ ciphertext`.
    ///
    /// Empty input is returned unchanged.
    pub fn encrypt(&self, plaintext: &[u8]) -> WeaveResult<Vec<u8>> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }
        let iv = &self.key_size.iv_header()[..BLOCK_LEN];
        let ciphertext = match self.key_size {
            KeySize::Key128 => Aes128CbcEnc::new_from_slices(&self.key, iv)
                .map_err(|e| WeaveError::CipherError(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            KeySize::Key256 => Aes256CbcEnc::new_from_slices(&self.key, iv)
                .map_err(|e| WeaveError::CipherError(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };

        let mut blob = Vec::with_capacity(self.header_len() + ciphertext.len());
        blob.extend_from_slice(self.key_size.salt());
        blob.extend_from_slice(self.key_size.iv_header());
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Input whose first `key_size / 8` bytes are not a known salt is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`WeaveError::CipherError`] when the salt matches but the
    /// remainder is truncated, not block aligned, or badly padded.
    pub fn decrypt(&self, blob: &[u8]) -> WeaveResult<Vec<u8>> {
        if !self.has_salt_prefix(blob) {
            if !blob.is_empty() {
                tracing::warn!(
                    len = blob.len(),
                    "decrypting value without salt prefix; returning it unchanged"
                );
            }
            return Ok(blob.to_vec());
        }

        let header_len = self.header_len();
        if blob.len() < header_len + BLOCK_LEN {
            return Err(WeaveError::CipherError(format!(
                "ciphertext truncated: {} bytes, expected at least {}",
                blob.len(),
                header_len + BLOCK_LEN
            )));
        }
        let body = &blob[header_len..];
        if body.len() % BLOCK_LEN != 0 {
            return Err(WeaveError::CipherError(format!(
                "ciphertext length {} is not a multiple of the block size",
                body.len()
            )));
        }

        let iv = &self.key_size.iv_header()[..BLOCK_LEN];
        let unpadded = match self.key_size {
            KeySize::Key128 => Aes128CbcDec::new_from_slices(&self.key, iv)
                .map_err(|e| WeaveError::CipherError(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(body),
            KeySize::Key256 => Aes256CbcDec::new_from_slices(&self.key, iv)
                .map_err(|e| WeaveError::CipherError(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(body),
        };
        unpadded.map_err(|_| {
            WeaveError::CipherError(
                "invalid padding; ciphertext is corrupt or the key is wrong".to_string(),
            )
        })
    }

    /// Encrypts a string into the base64 text stored in the column.
    pub fn encrypt_str(&self, text: &str) -> WeaveResult<String> {
        Ok(STANDARD.encode(self.encrypt(text.as_bytes())?))
    }

    /// Decrypts the base64 text stored in the column.
    ///
    /// Text that is not base64, or whose decoded bytes carry no salt prefix,
    /// is treated as legacy plaintext and returned unchanged.
    pub fn decrypt_str(&self, text: &str) -> WeaveResult<String> {
        let Ok(blob) = STANDARD.decode(text) else {
            return Ok(text.to_string());
        };
        if !self.has_salt_prefix(&blob) {
            return Ok(text.to_string());
        }
        let plain = self.decrypt(&blob)?;
        String::from_utf8(plain)
            .map_err(|e| WeaveError::CipherError(format!("decrypted value is not UTF-8: {e}")))
    }

    const fn header_len(&self) -> usize {
        self.key_size.bytes() * 2
    }

    fn has_salt_prefix(&self, blob: &[u8]) -> bool {
        blob.get(..self.key_size.bytes())
            .is_some_and(|prefix| KeySize::ALL.iter().any(|size| size.salt() == prefix))
    }
}
