//! Encrypted per-project credential storage.
//!
//! Layout under the store root:
//!
//! ```text
//! master.key                 32 random bytes, created on first use (0600 on Unix)
//! <sha256(project_path)>.json  {"nonce": b64, "ciphertext": b64}
//! ```
//!
//! Each secret is sealed with AES-256-GCM under a fresh 96-bit nonce. Files are
//! staged in the store root and renamed into place, so readers never observe a
//! partial key or entry. The key is only ever created, never replaced.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::errors::SecretsError;

const MASTER_KEY_FILE: &str = "master.key";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// On-disk form of one sealed secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedSecret {
    nonce: String,
    ciphertext: String,
}

/// Credential store rooted at a directory.
#[derive(Debug, Clone)]
pub struct SecretStore {
    root: PathBuf,
}

impl SecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encrypt and persist `secret` for `project_path`, replacing any previous value.
    pub fn store(&self, project_path: &str, secret: &str) -> Result<bool, SecretsError> {
        let entry = self.entry_path(project_path)?;
        let cipher = self.cipher()?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().r#gen();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), secret.as_bytes())
            .map_err(|_| SecretsError::Encrypt)?;

        let sealed = SealedSecret {
            nonce: general_purpose::STANDARD.encode(nonce_bytes),
            ciphertext: general_purpose::STANDARD.encode(ciphertext),
        };
        let json = serde_json::to_string_pretty(&sealed)
            .map_err(|e| SecretsError::CorruptEntry(e.to_string()))?;
        tracing::debug!(entry = %entry.display(), "Storing credential");
        stage_private(&self.root, json.as_bytes())?
            .persist(&entry)
            .map_err(|e| SecretsError::Io {
                path: entry,
                source: e.error,
            })?;
        Ok(true)
    }

    /// Decrypt the secret for `project_path`, or `None` if nothing is stored.
    pub fn retrieve(&self, project_path: &str) -> Result<Option<String>, SecretsError> {
        let entry = self.entry_path(project_path)?;
        let json = match fs::read_to_string(&entry) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SecretsError::Io { path: entry, source }),
        };

        let sealed: SealedSecret =
            serde_json::from_str(&json).map_err(|e| SecretsError::CorruptEntry(e.to_string()))?;
        let nonce = general_purpose::STANDARD
            .decode(&sealed.nonce)
            .map_err(|e| SecretsError::CorruptEntry(e.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(SecretsError::CorruptEntry(format!(
                "nonce is {} bytes",
                nonce.len()
            )));
        }
        let ciphertext = general_purpose::STANDARD
            .decode(&sealed.ciphertext)
            .map_err(|e| SecretsError::CorruptEntry(e.to_string()))?;

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| SecretsError::Decrypt)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| SecretsError::CorruptEntry(e.to_string()))
    }

    /// Remove the secret for `project_path`. Returns whether one existed.
    pub fn delete(&self, project_path: &str) -> Result<bool, SecretsError> {
        let entry = self.entry_path(project_path)?;
        match fs::remove_file(&entry) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SecretsError::Io { path: entry, source }),
        }
    }

    fn entry_path(&self, project_path: &str) -> Result<PathBuf, SecretsError> {
        let trimmed = project_path.trim();
        if trimmed.is_empty() {
            return Err(SecretsError::EmptyProjectPath);
        }
        let digest = Sha256::digest(trimmed.as_bytes());
        Ok(self.root.join(format!("{:x}.json", digest)))
    }

    fn cipher(&self) -> Result<Aes256Gcm, SecretsError> {
        let key = self.master_key()?;
        Aes256Gcm::new_from_slice(&key).map_err(|_| SecretsError::CorruptKey)
    }

    /// Load the master key, creating it on first use.
    fn master_key(&self) -> Result<Vec<u8>, SecretsError> {
        let path = self.root.join(MASTER_KEY_FILE);
        if let Some(key) = read_key(&path)? {
            return Ok(key);
        }

        let key: [u8; KEY_LEN] = rand::thread_rng().r#gen();
        match stage_private(&self.root, &key)?.persist_noclobber(&path) {
            Ok(_) => {
                tracing::info!(path = %path.display(), "Created credential store key");
                Ok(key.to_vec())
            }
            // Lost the race to a concurrent first use; theirs is the key.
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                read_key(&path)?.ok_or(SecretsError::CorruptKey)
            }
            Err(e) => Err(SecretsError::Io {
                path,
                source: e.error,
            }),
        }
    }
}

fn read_key(path: &Path) -> Result<Option<Vec<u8>>, SecretsError> {
    match fs::read(path) {
        Ok(key) if key.len() == KEY_LEN => Ok(Some(key)),
        Ok(_) => Err(SecretsError::CorruptKey),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SecretsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write `bytes` to a fresh temporary file in `dir`, readable only by the
/// owner on Unix. The caller persists it under its final name.
fn stage_private(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile, SecretsError> {
    let io_err = |source| SecretsError::Io {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".staged-")
        .tempfile_in(dir)
        .map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(io_err)?;
    }
    staged.write_all(bytes).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;
    Ok(staged)
}
