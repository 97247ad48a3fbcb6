//! Master keypair management
//!
//! The manager holds a single Ed25519 keypair in OpenSSH format. The private
//! half never leaves the key directory; the public half is what gets pushed to
//! agents during the accept handshake.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use russh_keys::key::KeyPair;
use ssh_key::{Algorithm, HashAlg, LineEnding, PrivateKey, PublicKey};

use sx_core::error::KeyError;

/// Private key file name inside the key directory
pub const PRIVATE_KEY_FILE: &str = "id_ed25519";

/// Public key file name inside the key directory
pub const PUBLIC_KEY_FILE: &str = "id_ed25519.pub";

const KEY_COMMENT: &str = "sentinel-manager";

/// Owner of the manager's keypair
#[derive(Debug, Clone)]
pub struct KeyAuthority {
    key_dir: PathBuf,
}

impl KeyAuthority {
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
        }
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.key_dir.join(PRIVATE_KEY_FILE)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.key_dir.join(PUBLIC_KEY_FILE)
    }

    /// Whether a keypair has been generated
    pub fn exists(&self) -> bool {
        self.private_key_path().exists() && self.public_key_path().exists()
    }

    /// Generate a fresh keypair, replacing any existing one.
    ///
    /// Agents accepted under the previous key stop trusting this manager until
    /// they are re-provisioned. Returns the new key's fingerprint.
    pub fn generate(&self) -> Result<String, KeyError> {
        fs::create_dir_all(&self.key_dir).map_err(|source| KeyError::Io {
            path: self.key_dir.clone(),
            source,
        })?;

        let random = PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        let private = PrivateKey::new(random.key_data().clone(), KEY_COMMENT)
            .map_err(|e| KeyError::Generate(e.to_string()))?;

        let private_pem = private
            .to_openssh(LineEnding::LF)
            .map_err(|e| KeyError::Generate(e.to_string()))?;
        let public_line = private
            .public_key()
            .to_openssh()
            .map_err(|e| KeyError::Generate(e.to_string()))?;

        write_key_file(&self.private_key_path(), private_pem.as_bytes(), 0o600)?;
        write_key_file(
            &self.public_key_path(),
            format!("{}\n", public_line).as_bytes(),
            0o644,
        )?;

        let fingerprint = private.public_key().fingerprint(HashAlg::Sha256).to_string();
        tracing::info!("Generated manager keypair {}", fingerprint);
        Ok(fingerprint)
    }

    /// Public key in OpenSSH text form, as pushed to agents
    pub fn load_public_key(&self) -> Result<Vec<u8>, KeyError> {
        let path = self.public_key_path();
        read_key_file(&path)
    }

    /// Private key for authenticating SSH sessions
    pub fn load_private_key(&self) -> Result<KeyPair, KeyError> {
        let path = self.private_key_path();
        if !path.exists() {
            return Err(KeyError::NotFound(path));
        }
        russh_keys::load_secret_key(&path, None).map_err(|e| KeyError::Invalid {
            path,
            reason: e.to_string(),
        })
    }

    /// SHA256 fingerprint of the current public key
    pub fn fingerprint(&self) -> Result<String, KeyError> {
        let path = self.public_key_path();
        let text = read_key_file(&path)?;
        let text = String::from_utf8_lossy(&text);
        let key = PublicKey::from_openssh(text.trim()).map_err(|e| KeyError::Invalid {
            path,
            reason: e.to_string(),
        })?;
        Ok(key.fingerprint(HashAlg::Sha256).to_string())
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, KeyError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(KeyError::NotFound(path.to_path_buf()))
        }
        Err(source) => Err(KeyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write through a temp file so a crash never leaves half a key behind
fn write_key_file(path: &Path, content: &[u8], mode: u32) -> Result<(), KeyError> {
    let io_err = |source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let tmp_path = path.with_extension("tmp");

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(&tmp_path).map_err(io_err)?;
    file.write_all(content)
        .and_then(|_| file.sync_all())
        .map_err(io_err)?;
    drop(file);

    // The mode passed to open() is filtered by the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(mode)).map_err(io_err)?;
    }

    fs::rename(&tmp_path, path).map_err(io_err)
}
