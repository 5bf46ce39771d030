//! Host-side configuration for locating and talking to provider plugins

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of every provider plugin executable
pub const DEFAULT_PROVIDER_PREFIX: &str = "lumi-resource";

/// Default installation root when `LUMI_INSTALL_ROOT` is unset
pub const DEFAULT_INSTALL_ROOT: &str = "/usr/local/lumi";

/// Directory under the install root that holds per-package plugin folders
pub const DEFAULT_LIBRARY_DIR: &str = "packs";

/// Environment variable overriding the installation root
pub const INSTALL_ROOT_ENV: &str = "LUMI_INSTALL_ROOT";

/// Configuration used when launching provider plugins
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Executable name prefix, joined to the package name with `-`
    pub provider_prefix: String,
    /// Installation root searched after the executable search path
    pub install_root: PathBuf,
    /// Library directory under the install root
    pub library_dir: String,
    /// Directories searched first, in order
    pub search_path: Vec<PathBuf>,
    /// How long a plugin may take to print its handshake
    pub handshake_timeout: Duration,
    /// How long connecting to a plugin's address may take
    pub connect_timeout: Duration,
    /// Maximum message size in bytes
    pub max_message_size: usize,
}

/// Directories listed in `PATH`, in order
fn executable_search_path() -> Vec<PathBuf> {
    env::var_os("PATH")
        .map(|path| env::split_paths(&path).collect())
        .unwrap_or_default()
}

/// Searches `PATH` and the default install root
impl Default for HostConfig {
    fn default() -> Self {
        Self {
            provider_prefix: DEFAULT_PROVIDER_PREFIX.to_string(),
            install_root: PathBuf::from(DEFAULT_INSTALL_ROOT),
            library_dir: DEFAULT_LIBRARY_DIR.to_string(),
            search_path: executable_search_path(),
            handshake_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_message_size: 256 << 20, // 256MB
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the install root taken from `LUMI_INSTALL_ROOT` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = env::var_os(INSTALL_ROOT_ENV).filter(|v| !v.is_empty()) {
            config.install_root = PathBuf::from(root);
        }
        config
    }

    /// Set the executable prefix
    pub fn with_provider_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.provider_prefix = prefix.into();
        self
    }

    /// Set the installation root
    pub fn with_install_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.install_root = root.into();
        self
    }

    /// Set the library directory under the installation root
    pub fn with_library_dir(mut self, dir: impl Into<String>) -> Self {
        self.library_dir = dir.into();
        self
    }

    /// Replace the directories searched before the installation root
    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = dirs;
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Directory holding the plugins installed for `package`
    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.install_root.join(&self.library_dir).join(package)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults() {
        let config = HostConfig::default();
        assert_eq!(config.provider_prefix, "lumi-resource");
        assert_eq!(
            config.package_dir("aws"),
            PathBuf::from("/usr/local/lumi/packs/aws")
        );
    }

    #[test]
    fn default_searches_path() {
        let expected: Vec<PathBuf> = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        let config = HostConfig::default();
        assert_eq!(config.search_path, expected);
        assert_eq!(HostConfig::new().search_path, expected);
    }

    #[test]
    fn builder_setters() {
        let config = HostConfig::new()
            .with_install_root("/opt/lumi")
            .with_library_dir("lib")
            .with_search_path(vec![PathBuf::from("/bin")])
            .with_handshake_timeout(Duration::from_secs(1));
        assert_eq!(config.package_dir("aws"), PathBuf::from("/opt/lumi/lib/aws"));
        assert_eq!(config.search_path, vec![PathBuf::from("/bin")]);
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn from_env_reads_install_root_and_path() {
        let old_root = env::var_os(INSTALL_ROOT_ENV);
        env::set_var(INSTALL_ROOT_ENV, "/tmp/lumi-root");

        let config = HostConfig::from_env();
        assert_eq!(config.install_root, PathBuf::from("/tmp/lumi-root"));
        if let Some(path) = env::var_os("PATH") {
            assert_eq!(config.search_path.len(), env::split_paths(&path).count());
        }

        match old_root {
            Some(root) => env::set_var(INSTALL_ROOT_ENV, root),
            None => env::remove_var(INSTALL_ROOT_ENV),
        }
    }

    #[test]
    #[serial]
    fn from_env_ignores_empty_install_root() {
        let old_root = env::var_os(INSTALL_ROOT_ENV);
        env::set_var(INSTALL_ROOT_ENV, "");

        assert_eq!(
            HostConfig::from_env().install_root,
            PathBuf::from(DEFAULT_INSTALL_ROOT)
        );

        match old_root {
            Some(root) => env::set_var(INSTALL_ROOT_ENV, root),
            None => env::remove_var(INSTALL_ROOT_ENV),
        }
    }
}
