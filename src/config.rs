use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use kdev_browser::ToolLocator;
use kdev_kubectl::{DEFAULT_KUBECTL_PATHS, DEFAULT_LOOKUP_DIRS};

const CONFIG_FILE_NAME: &str = "config.toml";

/// User settings from `~/.config/kdev/config.toml`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct KdevConfig {
    /// Fixed kubectl locations tried before the search path
    pub kubectl_paths: Vec<PathBuf>,
    /// Directories prepended to PATH for every kubectl run
    pub lookup_dirs: Vec<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub log_tail: u32,
    /// Remote directory uploads land in when no destination is given
    pub upload_dir: String,
    /// Local directory downloads land in, the home directory when unset
    pub download_dir: Option<PathBuf>,
}

impl Default for KdevConfig {
    fn default() -> Self {
        Self {
            kubectl_paths: DEFAULT_KUBECTL_PATHS.iter().map(PathBuf::from).collect(),
            lookup_dirs: DEFAULT_LOOKUP_DIRS.iter().map(PathBuf::from).collect(),
            kubeconfig: None,
            cache_path: None,
            log_tail: 500,
            upload_dir: "/tmp".to_string(),
            download_dir: None,
        }
    }
}

/// `~/.config/kdev`, used on every platform
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("kdev")
}

impl KdevConfig {
    /// Load from `path`, or from the default location
    ///
    /// A missing default file yields defaults; an explicitly named file must
    /// exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (config_dir().join(CONFIG_FILE_NAME), false),
        };

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read config {}", path.display()));
            }
        };

        Self::parse(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn locator(&self) -> ToolLocator {
        ToolLocator::new("kubectl", self.kubectl_paths.iter().cloned())
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| config_dir().join(kdev_cache::CACHE_FILE_NAME))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// In-pod destination for uploading `local`: `<upload_dir>/<basename>`
    pub fn upload_target(&self, local: &Path) -> String {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{name}", self.upload_dir.trim_end_matches('/'))
    }

    /// Local destination for downloading `remote`:
    /// `<download_dir>/download<YYYYMMDD>_<basename>`
    pub fn download_target(&self, remote: &str, today: NaiveDate) -> PathBuf {
        let name = remote.trim_end_matches('/').rsplit('/').next().unwrap_or(remote);
        self.download_dir()
            .join(format!("download{}_{name}", today.format("%Y%m%d")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = KdevConfig::parse("").unwrap();
        assert_eq!(config, KdevConfig::default());
        assert_eq!(config.log_tail, 500);
        assert_eq!(config.upload_dir, "/tmp");
        assert_eq!(
            config.locator().candidates(),
            ToolLocator::kubectl().candidates()
        );
        assert!(config.cache_path().ends_with(".config/kdev/.kdev.js"));
    }

    #[test]
    fn test_parse_overrides() {
        let config = KdevConfig::parse(
            r#"
kubectl_paths = ["/opt/k8s/kubectl"]
lookup_dirs = ["/opt/k8s"]
kubeconfig = "/etc/kdev/kubeconfig"
cache_path = "/var/tmp/kdev.json"
log_tail = 50
"#,
        )
        .unwrap();

        assert_eq!(config.kubectl_paths, vec![PathBuf::from("/opt/k8s/kubectl")]);
        assert_eq!(config.lookup_dirs, vec![PathBuf::from("/opt/k8s")]);
        assert_eq!(config.kubeconfig, Some(PathBuf::from("/etc/kdev/kubeconfig")));
        assert_eq!(config.cache_path(), PathBuf::from("/var/tmp/kdev.json"));
        assert_eq!(config.log_tail, 50);
        assert_eq!(config.upload_dir, "/tmp");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(KdevConfig::parse("log_tail = \"many\"").is_err());
        assert!(KdevConfig::parse("colour = true").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(KdevConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "upload_dir = \"/data/\"\n").unwrap();

        let config = KdevConfig::load(Some(&path)).unwrap();
        assert_eq!(config.upload_target(Path::new("/home/me/app.conf")), "/data/app.conf");
    }

    #[test]
    fn test_download_target() {
        let config = KdevConfig {
            download_dir: Some(PathBuf::from("/home/me")),
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        assert_eq!(
            config.download_target("/var/log/app.log", today),
            PathBuf::from("/home/me/download20240309_app.log")
        );
        assert_eq!(
            config.download_target("app.log", today),
            PathBuf::from("/home/me/download20240309_app.log")
        );
    }
}
