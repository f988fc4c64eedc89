//! Persistent storage for the bearer token
//!
//! The backend hands out a single token per sign-in. It is persisted under
//! the key `x-auth-token` so the session survives restarts, and it is
//! attached to every authenticated request.
//!
//! # Backends
//!
//! - `KeyringTokenStore`: OS-native secure storage (default)
//! - `FileTokenStore`: owner-only plain file (fallback, headless systems)
//! - `MemoryTokenStore`: process memory (tests, throwaway sessions)
//!
//! Reading a token that was never stored is not an error; `get` returns
//! `Ok(None)`. Errors are reserved for the storage layer itself failing.
//!
//! ```no_run
//! use libjobhive::config::TokenConfig;
//! use libjobhive::token_store::open_token_store;
//!
//! # fn example() -> libjobhive::Result<()> {
//! let store = open_token_store(&TokenConfig::default())?;
//! store.set("eyJhbGciOi...")?;
//! assert!(store.get()?.is_some());
//! store.clear()?;
//! # Ok(())
//! # }
//! ```

use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{TokenConfig, TokenStorage};
use crate::error::{Result, StorageError};

/// Storage key of the bearer token, matching the request header name
pub const TOKEN_KEY: &str = "x-auth-token";

/// Keyring service namespace
const KEYRING_SERVICE: &str = "jobhive";

/// Durable key-value persistence of the bearer token
///
/// Implementations must make `set` and `clear` idempotent. Concurrent
/// writers are not coordinated; a single writer per process is assumed.
pub trait TokenStore: Send + Sync {
    /// Read the stored token, `None` when no token is stored
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` only when the backend cannot be read.
    fn get(&self) -> Result<Option<SecretString>>;

    /// Store a token, replacing any previous one
    fn set(&self, token: &str) -> Result<()>;

    /// Remove the stored token. Clearing an absent token succeeds.
    fn clear(&self) -> Result<()>;

    /// Name of this backend for logging
    fn backend_name(&self) -> &str;
}

/// OS keyring backend
///
/// The token lives under service `jobhive`, user `x-auth-token`.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    /// Create a keyring store, checking that the keyring can be reached
    ///
    /// # Errors
    ///
    /// Returns `StorageError::KeyringUnavailable` when no keyring service
    /// is present (headless Linux without Secret Service, containers).
    pub fn new() -> Result<Self> {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Keyring store under a custom service name (used to isolate tests)
    pub fn with_service(service: &str) -> Result<Self> {
        keyring::Entry::new(service, TOKEN_KEY)
            .map_err(|e| StorageError::KeyringUnavailable(e.to_string()))?;
        Ok(Self {
            service: service.to_string(),
        })
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, TOKEN_KEY)
            .map_err(|e| StorageError::KeyringUnavailable(e.to_string()))?)
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self) -> Result<Option<SecretString>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(SecretString::from(token))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(e.to_string()).into()),
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .map_err(|e| StorageError::Keyring(e.to_string()))?;
        tracing::debug!("Stored auth token in OS keyring ({})", self.service);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) => {
                tracing::debug!("Removed auth token from OS keyring ({})", self.service);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Keyring(e.to_string()).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

/// Plain file backend
///
/// The file holds the raw token and nothing else. On Unix it is created
/// with mode 600. Symlinks are refused so the token cannot be redirected
/// into another file.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Refuse to operate on a token file that is a symbolic link
fn ensure_not_symlink(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_symlink() => Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "token file '{}' is a symbolic link; refusing to use it",
                path.display()
            ),
        ))
        .into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e).into()),
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<SecretString>> {
        ensure_not_symlink(&self.path)?;
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(SecretString::from(token.to_string())))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        ensure_not_symlink(&self.path)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        std::fs::write(&self.path, token).map_err(StorageError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms).map_err(StorageError::Io)?;
        }

        tracing::debug!("Stored auth token at {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        ensure_not_symlink(&self.path)?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Removed auth token file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

/// In-memory backend
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already present
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A poisoned slot still holds a consistent Option
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<SecretString>> {
        Ok(self.slot().clone().map(SecretString::from))
    }

    fn set(&self, token: &str) -> Result<()> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Open the configured token backend
///
/// A keyring that cannot be reached falls back to the token file at
/// `config.path` so headless machines keep working.
pub fn open_token_store(config: &TokenConfig) -> Result<Box<dyn TokenStore>> {
    let file_path = PathBuf::from(shellexpand::tilde(&config.path).to_string());

    match config.storage {
        TokenStorage::Keyring => match KeyringTokenStore::new() {
            Ok(store) => {
                tracing::debug!("Using OS keyring for the auth token");
                Ok(Box::new(store))
            }
            Err(e) => {
                tracing::warn!(
                    "OS keyring unavailable: {}. Falling back to token file {}",
                    e,
                    file_path.display()
                );
                Ok(Box::new(FileTokenStore::new(file_path)))
            }
        },
        TokenStorage::File => Ok(Box::new(FileTokenStore::new(file_path))),
        TokenStorage::Memory => Ok(Box::new(MemoryTokenStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use tempfile::TempDir;

    fn exposed(store: &dyn TokenStore) -> Option<String> {
        store
            .get()
            .unwrap()
            .map(|token| token.expose_secret().to_string())
    }

    #[test]
    fn test_memory_store_set_get_clear() {
        let store = MemoryTokenStore::new();
        assert_eq!(exposed(&store), None);

        store.set("token-1").unwrap();
        assert_eq!(exposed(&store).as_deref(), Some("token-1"));

        store.set("token-2").unwrap();
        assert_eq!(exposed(&store).as_deref(), Some("token-2"));

        store.clear().unwrap();
        assert_eq!(exposed(&store), None);

        // Idempotent
        store.clear().unwrap();
        assert_eq!(exposed(&store), None);
    }

    #[test]
    fn test_file_store_set_get_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(temp_dir.path().join("nested").join("token"));

        assert_eq!(exposed(&store), None);

        store.set("file-token").unwrap();
        assert_eq!(exposed(&store).as_deref(), Some("file-token"));

        store.clear().unwrap();
        assert_eq!(exposed(&store), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_treats_blank_file_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();

        let store = FileTokenStore::new(path);
        assert_eq!(exposed(&store), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(temp_dir.path().join("token"));
        store.set("secret").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_refuses_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("elsewhere");
        std::fs::write(&target, "victim").unwrap();
        let link = temp_dir.path().join("token");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let store = FileTokenStore::new(link);
        let err = store.get().unwrap_err();
        assert!(matches!(
            err,
            crate::JobHiveError::Storage(StorageError::Io(_))
        ));
        assert!(store.set("token").is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "victim");
    }

    #[test]
    fn test_file_store_read_failure_is_an_error_not_absence() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the token file should be cannot be read as a file
        let path = temp_dir.path().join("token");
        std::fs::create_dir(&path).unwrap();

        let store = FileTokenStore::new(path);
        assert!(store.get().is_err());
    }

    #[test]
    fn test_open_token_store_selects_backend() {
        let temp_dir = TempDir::new().unwrap();
        let config = TokenConfig {
            storage: TokenStorage::File,
            path: temp_dir.path().join("token").to_string_lossy().to_string(),
        };
        assert_eq!(open_token_store(&config).unwrap().backend_name(), "file");

        let config = TokenConfig {
            storage: TokenStorage::Memory,
            ..config
        };
        assert_eq!(open_token_store(&config).unwrap().backend_name(), "memory");
    }

    #[test]
    #[serial]
    #[ignore = "requires an OS keyring service"]
    fn test_keyring_store_operations() {
        let store = KeyringTokenStore::with_service("jobhive.test").unwrap();
        store.clear().unwrap();

        store.set("keyring-token").unwrap();
        assert_eq!(exposed(&store).as_deref(), Some("keyring-token"));

        store.clear().unwrap();
        assert_eq!(exposed(&store), None);
    }
}
