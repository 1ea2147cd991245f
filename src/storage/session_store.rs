use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Storage key for the authenticated user id.
pub const USER_ID_KEY: &str = "userId";
/// Storage key for the active chat session id.
pub const SESSION_KEY: &str = "currentChatSession";
/// Storage key for the API bearer token (written by the login flow).
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

const STORE_FILE: &str = "data/session.json";

/// Key-value store persisted as a JSON object on disk.
///
/// Storage failures are never fatal: reads degrade to "no stored value" and
/// failed writes are logged and dropped.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store at the default location under `data/`.
    pub fn new() -> Self {
        Self::with_path(STORE_FILE)
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, key: &str) -> Option<String> {
        self.read_map().remove(key)
    }

    pub fn save(&self, key: &str, value: &str) {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        if let Err(err) = self.write_map(&map) {
            log::warn!("Failed to persist {key}: {err}");
        }
    }

    pub fn remove(&self, key: &str) {
        let mut map = self.read_map();
        if map.remove(key).is_none() {
            return;
        }
        if let Err(err) = self.write_map(&map) {
            log::warn!("Failed to remove {key}: {err}");
        }
    }

    fn read_map(&self) -> BTreeMap<String, String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => map,
                Err(err) => {
                    log::warn!("Failed to parse session store: {err}");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                log::warn!("Failed to read session store: {err}");
                BTreeMap::new()
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, payload)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
