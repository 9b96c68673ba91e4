//! Persistence of the Core's extension authorization token.
//!
//! After the user approves the extension once, the Core hands back a token.
//! Presenting it on the next registration skips re-approval. Only tokens are
//! stored here; no zone or image state survives a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{SessionError, SessionResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    /// Core id → token.
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

/// Token storage. Without a path, tokens live only for the process lifetime.
#[derive(Debug)]
pub struct TokenStore {
    path: Option<PathBuf>,
    tokens: parking_lot::Mutex<BTreeMap<String, String>>,
}

impl TokenStore {
    /// Loads tokens from `path`. A missing or unreadable file starts empty.
    pub fn load(path: Option<PathBuf>) -> Self {
        let tokens = path
            .as_deref()
            .map(Self::read_file)
            .unwrap_or_default();
        Self {
            path,
            tokens: parking_lot::Mutex::new(tokens),
        }
    }

    fn read_file(path: &Path) -> BTreeMap<String, String> {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<TokenFile>(&contents) {
                Ok(file) => file.tokens,
                Err(e) => {
                    log::warn!("[Session] Ignoring unreadable token file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        }
    }

    pub fn get(&self, core_id: &str) -> Option<String> {
        self.tokens.lock().get(core_id).cloned()
    }

    /// Records a token and writes the file when one is configured.
    ///
    /// Uses atomic write (temp file + rename).
    pub fn save(&self, core_id: &str, token: &str) -> SessionResult<()> {
        let file = {
            let mut tokens = self.tokens.lock();
            if tokens.get(core_id).map(String::as_str) == Some(token) {
                return Ok(());
            }
            tokens.insert(core_id.to_string(), token.to_string());
            TokenFile {
                tokens: tokens.clone(),
            }
        };

        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(SessionError::Token)?;
        }
        let contents = serde_json::to_string_pretty(&file)
            .map_err(|e| SessionError::Token(std::io::Error::other(e)))?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, contents).map_err(SessionError::Token)?;
        std::fs::rename(&temp_path, path).map_err(SessionError::Token)
    }
}
