//! Configuration Vault – reads/writes `~/.lorekeeper/config.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which [`MemoryStore`][lorekeeper_store::MemoryStore] backend commands run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite file at `data_path`.
    #[default]
    Local,
    /// A running bridge at `remote_url`.
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => write!(f, "local"),
            Backend::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "remote" => Ok(Backend::Remote),
            other => Err(format!("unknown backend {other:?} (expected local or remote)")),
        }
    }
}

/// Persisted configuration stored in `~/.lorekeeper/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,

    /// SQLite database used by the local backend and by `serve`.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Base URL of the bridge used by the remote backend.
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    #[serde(default = "default_bridge_host")]
    pub bridge_host: String,

    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,

    /// Vector width of the local hashing embedder. Changing it makes existing
    /// records unsearchable until they are re-upserted.
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,

    /// How long the local backend waits on another process's lock before
    /// reporting the store unavailable.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Per-request timeout for the remote backend. Absent means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./lorekeeper/memories.db")
}
fn default_remote_url() -> String {
    "http://localhost:8001".to_string()
}
fn default_bridge_host() -> String {
    lorekeeper_bridge::DEFAULT_HOST.to_string()
}
fn default_bridge_port() -> u16 {
    lorekeeper_bridge::DEFAULT_PORT
}
fn default_embedding_dims() -> usize {
    lorekeeper_store::embedding::DEFAULT_DIMENSIONS
}
fn default_busy_timeout_ms() -> u64 {
    lorekeeper_store::sqlite::DEFAULT_BUSY_TIMEOUT.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_path: default_data_path(),
            remote_url: default_remote_url(),
            bridge_host: default_bridge_host(),
            bridge_port: default_bridge_port(),
            embedding_dims: default_embedding_dims(),
            busy_timeout_ms: default_busy_timeout_ms(),
            request_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Return the config path: `$LOREKEEPER_CONFIG` if set, else
/// `~/.lorekeeper/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("LOREKEEPER_CONFIG")
        && !p.is_empty()
    {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".lorekeeper").join("config.toml")
}

/// Load the effective configuration: file (or defaults when absent) plus
/// environment overrides.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config file at `path`. Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `LOREKEEPER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LOREKEEPER_BACKEND` | `backend` |
/// | `LOREKEEPER_DATA_PATH` | `data_path` |
/// | `LOREKEEPER_REMOTE_URL` | `remote_url` |
/// | `LOREKEEPER_BRIDGE_PORT` | `bridge_port` |
/// | `LOREKEEPER_TIMEOUT_SECS` | `request_timeout_secs` |
///
/// Unparsable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LOREKEEPER_BACKEND")
        && let Ok(backend) = v.parse::<Backend>()
    {
        cfg.backend = backend;
    }
    if let Ok(v) = std::env::var("LOREKEEPER_DATA_PATH") {
        cfg.data_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("LOREKEEPER_REMOTE_URL") {
        cfg.remote_url = v;
    }
    if let Ok(v) = std::env::var("LOREKEEPER_BRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.bridge_port = port;
    }
    if let Ok(v) = std::env::var("LOREKEEPER_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.request_timeout_secs = Some(secs);
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Write the default configuration to [`config_path`] unless a file exists.
/// Returns the path written (or already present).
pub fn init() -> Result<PathBuf, String> {
    let path = config_path();
    if !path.exists() {
        save_to(&Config::default(), &path)?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── file round trip ──────────────────────────────────────────────────────

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.bridge_port, 8001);
        assert_eq!(loaded.backend, Backend::Local);
        assert!(loaded.request_timeout().is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "backend = \"remote\"\nremote_url = \"http://game-host:9000\"\nrequest_timeout_secs = 3\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.backend, Backend::Remote);
        assert_eq!(cfg.remote_url, "http://game-host:9000");
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(cfg.embedding_dims, 256);
        assert_eq!(cfg.busy_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.data_path, PathBuf::from("./lorekeeper/memories.db"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = \"cloud\"\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_lorekeeper_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.lorekeeper/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    // ── environment overrides ────────────────────────────────────────────────

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Remote".parse::<Backend>(), Ok(Backend::Remote));
        assert_eq!(" local ".parse::<Backend>(), Ok(Backend::Local));
        assert!("cloud".parse::<Backend>().is_err());
    }

    // All env-var cases live in one test so parallel tests never race on the
    // same variables.
    #[test]
    fn apply_env_overrides_updates_and_ignores_invalid() {
        // SAFETY: these variables are only touched by this test.
        unsafe {
            std::env::set_var("LOREKEEPER_BACKEND", "remote");
            std::env::set_var("LOREKEEPER_DATA_PATH", "/tmp/lk.db");
            std::env::set_var("LOREKEEPER_REMOTE_URL", "http://bridge:8001");
            std::env::set_var("LOREKEEPER_BRIDGE_PORT", "not-a-port");
            std::env::set_var("LOREKEEPER_TIMEOUT_SECS", "7");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.backend, Backend::Remote);
        assert_eq!(cfg.data_path, PathBuf::from("/tmp/lk.db"));
        assert_eq!(cfg.remote_url, "http://bridge:8001");
        assert_eq!(cfg.bridge_port, 8001, "invalid port must be ignored");
        assert_eq!(cfg.request_timeout_secs, Some(7));

        unsafe { std::env::set_var("LOREKEEPER_BRIDGE_PORT", "9101") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.bridge_port, 9101);

        unsafe {
            for var in [
                "LOREKEEPER_BACKEND",
                "LOREKEEPER_DATA_PATH",
                "LOREKEEPER_REMOTE_URL",
                "LOREKEEPER_BRIDGE_PORT",
                "LOREKEEPER_TIMEOUT_SECS",
            ] {
                std::env::remove_var(var);
            }
        }
    }
}
