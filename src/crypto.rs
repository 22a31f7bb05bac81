//! Encryption of the canonical document at rest.
//!
//! The gate runs once per pipeline run, after the lifecycle step, and moves
//! the canonical document from plaintext to ciphertext. The cipher is
//! [Fernet](https://github.com/fernet/spec) (AES-128-CBC with an
//! HMAC-SHA256 tag over 32 key bytes), so files encrypted with a plain
//! Fernet key stay readable by any other Fernet implementation.
//!
//! # Feature Flag
//!
//! Cipher support lives behind the `encryption` cargo feature (on by
//! default). Without it every cipher function returns
//! [`CryptoError::Unavailable`], and [`apply`] turns that into a skip or a
//! hard failure depending on [`EncryptionMode`]. Callers must check
//! [`GateOutcome`] rather than assume the file is encrypted.
//!
//! # Key Material
//!
//! | Configured value | Key | File format |
//! |------------------|-----|-------------|
//! | Fernet key (url-safe base64 of 32 bytes) | used as-is | bare Fernet token |
//! | other text, `argon2id` derivation | Argon2id over a fresh 16-byte salt | `nc1$argon2id$<salt>$<token>` |
//! | other text, `legacy-pad` derivation | text truncated/zero-padded to 32 bytes | bare Fernet token |
//! | nothing | freshly generated Fernet key, logged once | bare Fernet token |
//!
//! `legacy-pad` only exists to read and write files produced by the older
//! tooling; it offers no real protection for short passphrases.

use crate::config::EncryptionConfig;
use crate::error::CryptoError;
use crate::utils::write_atomic;
#[cfg(feature = "encryption")]
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

/// Whether this build can encrypt at all.
pub const AVAILABLE: bool = cfg!(feature = "encryption");

/// Prefix of passphrase-derived envelopes; the salt and token follow.
pub const ENVELOPE_PREFIX: &str = "nc1$argon2id$";

const KEY_LEN: usize = 32;
#[cfg(feature = "encryption")]
const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncryptionMode {
    /// Never encrypt.
    #[value(name = "off")]
    Off,
    /// Encrypt when the cipher is compiled in, otherwise skip with a warning.
    #[value(name = "best-effort")]
    BestEffort,
    /// Fail the run when the document cannot be encrypted.
    #[value(name = "required")]
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyDerivation {
    #[value(name = "argon2id")]
    Argon2id,
    #[value(name = "legacy-pad")]
    LegacyPad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Encrypted {
        path: PathBuf,
        /// Set when no key was configured and one was generated for this run.
        generated_key: Option<String>,
    },
    Skipped(SkipReason),
}

impl GateOutcome {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, GateOutcome::Encrypted { .. })
    }
}

/// Ciphertext plus the key generated for it, if any.
#[derive(Debug)]
pub struct Sealed {
    pub bytes: Vec<u8>,
    pub generated_key: Option<String>,
}

/// Run the encryption gate on the canonical document.
///
/// # Errors
///
/// - [`CryptoError::Unavailable`] in [`EncryptionMode::Required`] when the
///   cipher is not compiled in
/// - [`CryptoError::Missing`] if `path` does not exist
/// - [`CryptoError::NotPlaintext`] if the file is not JSON, e.g. already encrypted
#[instrument(level = "info", skip_all, fields(path = %path.display(), mode = ?config.mode))]
pub async fn apply(path: &Path, config: &EncryptionConfig) -> Result<GateOutcome, CryptoError> {
    match config.mode {
        EncryptionMode::Off => {
            info!("Encryption disabled; document stays plaintext");
            return Ok(GateOutcome::Skipped(SkipReason::Disabled));
        }
        EncryptionMode::BestEffort if !AVAILABLE => {
            warn!("Built without the `encryption` feature; document stays plaintext");
            return Ok(GateOutcome::Skipped(SkipReason::Unavailable));
        }
        EncryptionMode::Required if !AVAILABLE => return Err(CryptoError::Unavailable),
        _ => {}
    }

    let generated_key = encrypt_file(path, config.key.as_deref(), config.derivation).await?;
    Ok(GateOutcome::Encrypted {
        path: path.to_path_buf(),
        generated_key,
    })
}

/// Encrypt `path` in place.
///
/// Returns the generated key when `key` is `None`.
pub async fn encrypt_file(
    path: &Path,
    key: Option<&str>,
    derivation: KeyDerivation,
) -> Result<Option<String>, CryptoError> {
    let plaintext = read_existing(path).await?;
    let sealed = encrypt_bytes(&plaintext, key, derivation)?;
    write_atomic(path, &sealed.bytes).await?;
    info!(bytes = sealed.bytes.len(), "Encrypted document");
    Ok(sealed.generated_key)
}

/// Decrypt `path` and return the plaintext without touching the file.
pub async fn decrypt_file(path: &Path, key: &str) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = read_existing(path).await?;
    decrypt_bytes(&ciphertext, key)
}

/// Whether `data` already looks like plaintext JSON.
pub fn is_plaintext_json(data: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(data).is_ok()
}

/// Whether `material` is a ready-to-use Fernet key.
#[cfg_attr(not(feature = "encryption"), allow(dead_code))]
pub fn is_fernet_key(material: &str) -> bool {
    URL_SAFE
        .decode(material.trim())
        .is_ok_and(|bytes| bytes.len() == KEY_LEN)
}

/// Historical derivation: the text's bytes truncated or zero-padded to 32.
#[cfg_attr(not(feature = "encryption"), allow(dead_code))]
pub fn legacy_pad_key(material: &str) -> String {
    let mut key = [0u8; KEY_LEN];
    let bytes = material.as_bytes();
    let n = bytes.len().min(KEY_LEN);
    key[..n].copy_from_slice(&bytes[..n]);
    URL_SAFE.encode(key)
}

async fn read_existing(path: &Path) -> Result<Vec<u8>, CryptoError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CryptoError::Missing(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Encrypt a plaintext JSON document.
#[cfg(feature = "encryption")]
pub fn encrypt_bytes(
    plaintext: &[u8],
    key: Option<&str>,
    derivation: KeyDerivation,
) -> Result<Sealed, CryptoError> {
    use fernet::Fernet;

    if !is_plaintext_json(plaintext) {
        return Err(CryptoError::NotPlaintext);
    }

    let Some(material) = key.map(str::trim).filter(|k| !k.is_empty()) else {
        let generated = Fernet::generate_key();
        warn!(
            key = %generated,
            "No encryption key configured; generated one. \
             Store it as ENCRYPTION_KEY or the document cannot be decrypted"
        );
        let fernet = Fernet::new(&generated).ok_or(CryptoError::InvalidKey)?;
        return Ok(Sealed {
            bytes: fernet.encrypt(plaintext).into_bytes(),
            generated_key: Some(generated),
        });
    };

    let bytes = if is_fernet_key(material) {
        let fernet = Fernet::new(material).ok_or(CryptoError::InvalidKey)?;
        fernet.encrypt(plaintext).into_bytes()
    } else {
        match derivation {
            KeyDerivation::Argon2id => {
                let salt: [u8; SALT_LEN] = rand::random();
                let fernet = Fernet::new(&argon2_key(material, &salt)?)
                    .ok_or(CryptoError::InvalidKey)?;
                let token = fernet.encrypt(plaintext);
                let salt = URL_SAFE_NO_PAD.encode(salt);
                format!("{ENVELOPE_PREFIX}{salt}${token}").into_bytes()
            }
            KeyDerivation::LegacyPad => {
                warn!("Using legacy pad/truncate key derivation");
                let fernet = Fernet::new(&legacy_pad_key(material))
                    .ok_or(CryptoError::InvalidKey)?;
                fernet.encrypt(plaintext).into_bytes()
            }
        }
    };

    Ok(Sealed {
        bytes,
        generated_key: None,
    })
}

/// Decrypt any of the formats [`encrypt_bytes`] produces.
///
/// Bare tokens with a non-Fernet key can only come from the legacy
/// derivation, so that derivation is used for them.
#[cfg(feature = "encryption")]
pub fn decrypt_bytes(ciphertext: &[u8], key: &str) -> Result<Vec<u8>, CryptoError> {
    use fernet::Fernet;

    let key = key.trim();
    if key.is_empty() {
        return Err(CryptoError::MissingKey);
    }
    let text = std::str::from_utf8(ciphertext)
        .map_err(|_| CryptoError::Envelope)?
        .trim();

    let (fernet_key, token) = match text.strip_prefix(ENVELOPE_PREFIX) {
        Some(rest) => {
            let (salt, token) = rest.split_once('$').ok_or(CryptoError::Envelope)?;
            let salt = URL_SAFE_NO_PAD
                .decode(salt)
                .map_err(|_| CryptoError::Envelope)?;
            (argon2_key(key, &salt)?, token)
        }
        None if is_fernet_key(key) => (key.to_string(), text),
        None => (legacy_pad_key(key), text),
    };

    let fernet = Fernet::new(&fernet_key).ok_or(CryptoError::InvalidKey)?;
    fernet.decrypt(token).map_err(|_| CryptoError::Decrypt)
}

#[cfg(feature = "encryption")]
fn argon2_key(passphrase: &str, salt: &[u8]) -> Result<String, CryptoError> {
    use argon2::Argon2;

    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::Derivation(e.to_string()))?;
    Ok(URL_SAFE.encode(key))
}

/// Encrypt a plaintext JSON document (no-op build: always unavailable).
#[cfg(not(feature = "encryption"))]
pub fn encrypt_bytes(
    _plaintext: &[u8],
    _key: Option<&str>,
    _derivation: KeyDerivation,
) -> Result<Sealed, CryptoError> {
    Err(CryptoError::Unavailable)
}

/// Decrypt a document (no-op build: always unavailable).
#[cfg(not(feature = "encryption"))]
pub fn decrypt_bytes(_ciphertext: &[u8], _key: &str) -> Result<Vec<u8>, CryptoError> {
    Err(CryptoError::Unavailable)
}
