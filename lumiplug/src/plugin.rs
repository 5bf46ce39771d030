//! Provider plugin processes
//!
//! A [`Plugin`] owns one child process serving a package's resource types. The
//! executable is located by naming convention, launched with piped output, and
//! asked for its address through a one-line handshake on stdout:
//!
//! ```text
//! 1|tcp|127.0.0.1:50123|grpc
//! ```
//!
//! After the handshake the remaining stdout and all stderr output is forwarded
//! into `tracing` so the pipes never fill up.

use crate::config::HostConfig;
use crate::error::{LumiplugError, Result};
use crate::tokens::Package;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time;
use tonic::transport::{Channel, Endpoint};

/// Handshake protocol version plugins must announce
pub const PROTOCOL_VERSION: u32 = 1;

/// A running provider plugin and the channel connected to it
pub struct Plugin {
    package: Package,
    path: PathBuf,
    addr: SocketAddr,
    channel: Channel,
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("package", &self.package)
            .field("path", &self.path)
            .field("addr", &self.addr)
            .finish()
    }
}

impl Plugin {
    /// Executable name for a package, e.g. `lumi-resource-aws`
    pub fn executable_name(config: &HostConfig, package: &Package) -> String {
        format!("{}-{}", config.provider_prefix, package.flattened())
    }

    /// Every path that is tried for a package, in order
    pub fn candidates(config: &HostConfig, package: &Package) -> Vec<PathBuf> {
        let name = Self::executable_name(config, package);
        config
            .search_path
            .iter()
            .map(|dir| dir.join(&name))
            .chain(std::iter::once(
                config.package_dir(package.as_str()).join(&name),
            ))
            .collect()
    }

    /// Resolves the executable for a package
    pub fn find(config: &HostConfig, package: &Package) -> Result<PathBuf> {
        let candidates = Self::candidates(config, package);
        if let Some(found) = candidates.iter().find(|path| is_executable(path)) {
            return Ok(found.clone());
        }
        Err(LumiplugError::PluginNotFound {
            package: package.clone(),
            searched: candidates
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        })
    }

    /// Finds, spawns and connects to the plugin for `package`
    ///
    /// Either a fully connected plugin is returned or the child is killed and
    /// an error is returned.
    pub async fn launch(config: &HostConfig, package: &Package) -> Result<Self> {
        assert!(
            !package.as_str().is_empty(),
            "plugin package must not be empty"
        );

        let path = Self::find(config, package)?;
        tracing::info!(package = %package, path = %path.display(), "Launching provider plugin");

        let mut child = Command::new(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| start_error(package, format!("spawn {}: {}", path.display(), e)))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                abort(&mut child, package).await;
                return Err(start_error(package, "plugin output was not captured"));
            }
        };

        let mut stdout = BufReader::new(stdout).lines();
        let addr = match read_handshake(&mut stdout, config).await {
            Ok(addr) => addr,
            Err(message) => {
                abort(&mut child, package).await;
                return Err(start_error(package, message));
            }
        };

        forward_output(package.clone(), "stdout", stdout);
        forward_output(package.clone(), "stderr", BufReader::new(stderr).lines());

        let channel = match connect(addr, config).await {
            Ok(channel) => channel,
            Err(message) => {
                abort(&mut child, package).await;
                return Err(start_error(package, message));
            }
        };

        tracing::info!(package = %package, addr = %addr, pid = ?child.id(), "Provider plugin ready");

        Ok(Self {
            package: package.clone(),
            path,
            addr,
            channel,
            child: Mutex::new(Some(child)),
        })
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The channel to the plugin; clones share one connection
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Kills the child process and reaps it
    ///
    /// Calling this more than once, or after the process has exited on its
    /// own, is fine.
    pub async fn close(&self) -> Result<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(package = %self.package, %status, "Provider plugin had already exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(package = %self.package, error = %e, "Could not poll provider plugin");
            }
        }

        if let Err(e) = child.kill().await {
            tracing::warn!(package = %self.package, error = %e, "Failed to kill provider plugin");
        } else {
            tracing::info!(package = %self.package, "Provider plugin closed");
        }
        Ok(())
    }
}

fn start_error(package: &Package, message: impl Into<String>) -> LumiplugError {
    LumiplugError::PluginStart {
        package: package.clone(),
        message: message.into(),
    }
}

async fn abort(child: &mut Child, package: &Package) {
    if let Err(e) = child.kill().await {
        tracing::warn!(package = %package, error = %e, "Failed to kill provider plugin");
    }
}

async fn read_handshake<R>(
    lines: &mut Lines<R>,
    config: &HostConfig,
) -> std::result::Result<SocketAddr, String>
where
    R: AsyncBufRead + Unpin,
{
    match time::timeout(config.handshake_timeout, lines.next_line()).await {
        Err(_) => Err(format!(
            "no handshake within {:?}",
            config.handshake_timeout
        )),
        Ok(Err(e)) => Err(format!("reading handshake: {}", e)),
        Ok(Ok(None)) => Err("plugin exited before the handshake".to_string()),
        Ok(Ok(Some(line))) => parse_handshake(&line),
    }
}

/// Parses `<version>|tcp|<host:port>|grpc`
pub fn parse_handshake(line: &str) -> std::result::Result<SocketAddr, String> {
    let parts: Vec<&str> = line.trim().split('|').collect();
    let [version, network, addr, protocol] = parts.as_slice() else {
        return Err(format!("malformed handshake '{}'", line.trim()));
    };

    if version.parse::<u32>().ok() != Some(PROTOCOL_VERSION) {
        return Err(format!(
            "unsupported protocol version '{}', expected {}",
            version, PROTOCOL_VERSION
        ));
    }
    if *network != "tcp" {
        return Err(format!("unsupported network '{}'", network));
    }
    if *protocol != "grpc" {
        return Err(format!("unsupported protocol '{}'", protocol));
    }
    addr.parse()
        .map_err(|e| format!("invalid address '{}': {}", addr, e))
}

async fn connect(addr: SocketAddr, config: &HostConfig) -> std::result::Result<Channel, String> {
    let endpoint = Endpoint::from_shared(format!("http://{}", addr))
        .map_err(|e| format!("invalid endpoint {}: {}", addr, e))?
        .connect_timeout(config.connect_timeout);
    endpoint
        .connect()
        .await
        .map_err(|e| format!("connecting to {}: {}", addr, e))
}

fn forward_output<R>(package: Package, stream: &'static str, mut lines: Lines<R>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "lumiplug::plugin", package = %package, stream, "{}", line);
        }
    });
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
