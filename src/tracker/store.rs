//! Token persistence with encrypted-at-rest storage.
//!
//! Each tracker keeps its token in its own encrypted file under the config
//! directory: `~/.config/aniqueue/<tracker>.token` (or
//! `$XDG_CONFIG_HOME/aniqueue/<tracker>.token`). The encryption key comes from
//! `ANIQUEUE_MASTER_KEY` or the system keychain.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::Tracker;

const APP_DIR_NAME: &str = "aniqueue";
const MASTER_KEY_ENV: &str = "ANIQUEUE_MASTER_KEY";
const KEYRING_SERVICE: &str = "aniqueue";
const KEYRING_ENTRY_NAME: &str = "token-master-key-v1";
const MAGIC: &[u8; 4] = b"ANQ1";
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Errors for token storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Could not access keychain and no env fallback key was provided.
    #[error(
        "unable to access system keychain for token encryption key; set ANIQUEUE_MASTER_KEY or configure keychain access"
    )]
    KeychainUnavailable,
    /// Stored encrypted payload is malformed.
    #[error("persisted token payload is invalid")]
    InvalidPayload,
    /// Encryption failed.
    #[error("failed to encrypt persisted token")]
    EncryptionFailed,
    /// Decryption failed.
    #[error("failed to decrypt persisted token")]
    DecryptionFailed,
}

/// Authoritative storage for one tracker's token.
pub trait TokenStore<T>: Send + Sync {
    /// Loads the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage cannot be read.
    fn load_token(&self) -> Result<Option<T>, StorageError>;

    /// Replaces the stored token; `None` removes it (logout).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage cannot be written.
    fn save_token(&self, token: Option<&T>) -> Result<(), StorageError>;

    /// Replaces the stored token and clears the auth-expired marker in one
    /// write, so a login never leaves a stale marker behind.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage cannot be written.
    fn save_login(&self, token: Option<&T>) -> Result<(), StorageError>;
}

/// Persistent "refresh was rejected" marker (MyAnimeList).
///
/// While set, requests fail without touching the network until a new login
/// clears it.
pub trait AuthExpiryFlag: Send + Sync {
    /// Whether the flag is set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage cannot be read.
    fn is_auth_expired(&self) -> Result<bool, StorageError>;

    /// Sets the flag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage cannot be written.
    fn set_auth_expired(&self) -> Result<(), StorageError>;

    /// Clears the flag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage cannot be written.
    fn clear_auth_expired(&self) -> Result<(), StorageError>;
}

impl<T, S: TokenStore<T> + ?Sized> TokenStore<T> for Arc<S> {
    fn load_token(&self) -> Result<Option<T>, StorageError> {
        (**self).load_token()
    }

    fn save_token(&self, token: Option<&T>) -> Result<(), StorageError> {
        (**self).save_token(token)
    }

    fn save_login(&self, token: Option<&T>) -> Result<(), StorageError> {
        (**self).save_login(token)
    }
}

impl<S: AuthExpiryFlag + ?Sized> AuthExpiryFlag for Arc<S> {
    fn is_auth_expired(&self) -> Result<bool, StorageError> {
        (**self).is_auth_expired()
    }

    fn set_auth_expired(&self) -> Result<(), StorageError> {
        (**self).set_auth_expired()
    }

    fn clear_auth_expired(&self) -> Result<(), StorageError> {
        (**self).clear_auth_expired()
    }
}

/// What a token file holds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct StoredTokens<T> {
    token: Option<T>,
    #[serde(default)]
    auth_expired: bool,
}

impl<T> Default for StoredTokens<T> {
    fn default() -> Self {
        Self {
            token: None,
            auth_expired: false,
        }
    }
}

/// Process-local token store.
#[derive(Debug)]
pub struct MemoryTokenStore<T> {
    state: Mutex<StoredTokens<T>>,
}

impl<T> Default for MemoryTokenStore<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(StoredTokens::default()),
        }
    }
}

impl<T> MemoryTokenStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `token`.
    #[must_use]
    pub fn with_token(token: T) -> Self {
        Self {
            state: Mutex::new(StoredTokens {
                token: Some(token),
                auth_expired: false,
            }),
        }
    }
}

impl<T: Clone + Send> TokenStore<T> for MemoryTokenStore<T> {
    fn load_token(&self) -> Result<Option<T>, StorageError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.token.clone())
    }

    fn save_token(&self, token: Option<&T>) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.token = token.cloned();
        Ok(())
    }

    fn save_login(&self, token: Option<&T>) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.token = token.cloned();
        state.auth_expired = false;
        Ok(())
    }
}

impl<T: Send> AuthExpiryFlag for MemoryTokenStore<T> {
    fn is_auth_expired(&self) -> Result<bool, StorageError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.auth_expired)
    }

    fn set_auth_expired(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.auth_expired = true;
        Ok(())
    }

    fn clear_auth_expired(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.auth_expired = false;
        Ok(())
    }
}

/// Token store backed by an XChaCha20-Poly1305 encrypted file.
///
/// Reads and writes within one process are serialized; the file is replaced
/// wholesale on every write and removed once it holds nothing.
pub struct EncryptedFileTokenStore<T> {
    path: PathBuf,
    key_material: String,
    io_lock: Mutex<()>,
    _token: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for EncryptedFileTokenStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileTokenStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T> EncryptedFileTokenStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Opens the default token file for `tracker`, creating the encryption key
    /// in the keychain on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when no config dir or key is available.
    pub fn for_tracker(tracker: Tracker) -> Result<Self, StorageError> {
        let path = default_config_dir()?.join(tracker.token_file_name());
        let key = load_or_create_key()?;
        Ok(Self::with_key(path, key))
    }

    /// Opens the token file at `path` encrypted with `key_material`.
    pub fn with_key(path: impl Into<PathBuf>, key_material: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key_material: key_material.into(),
            io_lock: Mutex::new(()),
            _token: PhantomData,
        }
    }

    /// Location of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredTokens<T>, StorageError> {
        if !self.path.exists() {
            return Ok(StoredTokens::default());
        }
        let bytes = fs::read(&self.path)?;
        let plaintext = decrypt_bytes(&bytes, &self.key_material)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn write(&self, stored: &StoredTokens<T>) -> Result<(), StorageError> {
        if stored.token.is_none() && !stored.auth_expired {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
                debug!(path = %self.path.display(), "Removed token file");
            }
            return Ok(());
        }
        let plaintext = serde_json::to_vec(stored)?;
        let encrypted = encrypt_bytes(&plaintext, &self.key_material)?;
        write_encrypted_payload(&self.path, &encrypted)
    }

    fn update(&self, apply: impl FnOnce(&mut StoredTokens<T>)) -> Result<(), StorageError> {
        let _io = self.io_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stored = self.read()?;
        apply(&mut stored);
        self.write(&stored)
    }
}

impl<T> TokenStore<T> for EncryptedFileTokenStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn load_token(&self) -> Result<Option<T>, StorageError> {
        let _io = self.io_lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.token)
    }

    fn save_token(&self, token: Option<&T>) -> Result<(), StorageError> {
        let token = token.cloned();
        self.update(|stored| stored.token = token)
    }

    fn save_login(&self, token: Option<&T>) -> Result<(), StorageError> {
        let _io = self.io_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(&StoredTokens {
            token: token.cloned(),
            auth_expired: false,
        })
    }
}

impl<T> AuthExpiryFlag for EncryptedFileTokenStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn is_auth_expired(&self) -> Result<bool, StorageError> {
        let _io = self.io_lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.auth_expired)
    }

    fn set_auth_expired(&self) -> Result<(), StorageError> {
        self.update(|stored| stored.auth_expired = true)
    }

    fn clear_auth_expired(&self) -> Result<(), StorageError> {
        self.update(|stored| stored.auth_expired = false)
    }
}

/// Returns the aniqueue config directory (`$XDG_CONFIG_HOME/aniqueue`,
/// `~/.config/aniqueue`, or `%APPDATA%\aniqueue`).
///
/// # Errors
///
/// Returns [`StorageError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_config_dir() -> Result<PathBuf, StorageError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, StorageError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(StorageError::ConfigDirUnavailable)
}

fn load_or_create_key() -> Result<String, StorageError> {
    if let Some(from_env) = env::var_os(MASTER_KEY_ENV) {
        let key = from_env.to_string_lossy().trim().to_string();
        if !key.is_empty() {
            return Ok(key);
        }
    }

    let entry = safe_keyring_entry()?;

    match safe_keyring_get_password(&entry) {
        Ok(existing) if !existing.trim().is_empty() => Ok(existing),
        _ => {
            let generated = generate_key_material();
            safe_keyring_set_password(&entry, &generated)?;
            Ok(generated)
        }
    }
}

fn safe_keyring_entry() -> Result<keyring::Entry, StorageError> {
    catch_unwind(|| keyring::Entry::new(KEYRING_SERVICE, KEYRING_ENTRY_NAME))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)
}

fn safe_keyring_get_password(entry: &keyring::Entry) -> Result<String, StorageError> {
    catch_unwind(AssertUnwindSafe(|| entry.get_password()))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)
}

fn safe_keyring_set_password(entry: &keyring::Entry, password: &str) -> Result<(), StorageError> {
    catch_unwind(AssertUnwindSafe(|| entry.set_password(password)))
        .map_err(|_| StorageError::KeychainUnavailable)?
        .map_err(|_| StorageError::KeychainUnavailable)
}

fn generate_key_material() -> String {
    let mut bytes = [0_u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

fn derive_key_bytes(key_material: &str) -> [u8; KEY_LEN] {
    let digest = Sha256::digest(key_material.as_bytes());
    let mut key = [0_u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    key
}

fn write_encrypted_payload(path: &Path, payload: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, payload)?;
    set_owner_only_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

fn encrypt_bytes(plaintext: &[u8], key_material: &str) -> Result<Vec<u8>, StorageError> {
    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let mut nonce = [0_u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce_ref = XNonce::from_slice(&nonce);

    let ciphertext = cipher
        .encrypt(nonce_ref, plaintext)
        .map_err(|_| StorageError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn decrypt_bytes(payload: &[u8], key_material: &str) -> Result<Vec<u8>, StorageError> {
    if payload.len() < MAGIC.len() + NONCE_LEN || &payload[..MAGIC.len()] != MAGIC {
        return Err(StorageError::InvalidPayload);
    }

    let key_bytes = derive_key_bytes(key_material);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));
    let nonce_start = MAGIC.len();
    let nonce_end = nonce_start + NONCE_LEN;
    let nonce = XNonce::from_slice(&payload[nonce_start..nonce_end]);
    let ciphertext = &payload[nonce_end..];

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| StorageError::DecryptionFailed)
}
