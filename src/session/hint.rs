//! Durable "was previously authenticated" hint.
//!
//! The hint is advisory only: it lets a cold start skip the identity check
//! (and its noisy 401) when nobody was logged in. It is never consulted to
//! grant access.
//!
//! [`FileHintStore`] persists to `~/.config/xsrf-session/session-hint` (or
//! `$XDG_CONFIG_HOME/xsrf-session/session-hint`).

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

const HINT_FILE_NAME: &str = "session-hint";
const APP_DIR_NAME: &str = "xsrf-session";
const HINT_MARKER: &str = "true";

/// Errors for hint persistence.
#[derive(Debug, Error)]
pub enum HintError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Filesystem I/O failed.
    #[error("hint file {path}: {source}")]
    Io {
        /// Hint file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Storage for the authentication hint.
pub trait HintStore: Send + Sync {
    /// Returns true when the hint is set. Unreadable storage reads as unset.
    fn was_authenticated(&self) -> bool;

    /// Sets the hint.
    ///
    /// # Errors
    ///
    /// Returns [`HintError`] when the hint cannot be persisted.
    fn set(&self) -> Result<(), HintError>;

    /// Clears the hint. Clearing an unset hint succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`HintError`] when the hint cannot be removed.
    fn clear(&self) -> Result<(), HintError>;
}

/// In-process hint, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryHintStore {
    flag: AtomicBool,
}

impl MemoryHintStore {
    /// Creates a store with the hint initially `set`.
    #[must_use]
    pub fn with_value(set: bool) -> Self {
        Self {
            flag: AtomicBool::new(set),
        }
    }
}

impl HintStore for MemoryHintStore {
    fn was_authenticated(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn set(&self) -> Result<(), HintError> {
        self.flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<(), HintError> {
        self.flag.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Hint persisted as a marker file.
#[derive(Debug, Clone)]
pub struct FileHintStore {
    path: PathBuf,
}

impl FileHintStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at the default location under the user config dir.
    ///
    /// # Errors
    ///
    /// Returns [`HintError::ConfigDirUnavailable`] if no usable config dir is
    /// found.
    pub fn at_default_location() -> Result<Self, HintError> {
        Ok(Self::new(default_hint_path()?))
    }

    /// Path of the marker file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> HintError {
        HintError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl HintStore for FileHintStore {
    fn was_authenticated(&self) -> bool {
        fs::read_to_string(&self.path).is_ok_and(|contents| contents.trim() == HINT_MARKER)
    }

    fn set(&self) -> Result<(), HintError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        fs::write(&self.path, HINT_MARKER).map_err(|e| self.io_error(e))
    }

    fn clear(&self) -> Result<(), HintError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Returns the default hint path (`~/.config/xsrf-session/session-hint`).
///
/// # Errors
///
/// Returns [`HintError::ConfigDirUnavailable`] if no usable config dir is found.
pub fn default_hint_path() -> Result<PathBuf, HintError> {
    Ok(resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
    )?
    .join(HINT_FILE_NAME))
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
) -> Result<PathBuf, HintError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    Err(HintError::ConfigDirUnavailable)
}
