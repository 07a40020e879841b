//! Network namespace operations

use std::path::{Path, PathBuf};

use netns_rs::{Env, NetNs};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::NamespaceError;
use crate::network::NetworkConfig;

/// Namespace lifecycle trait
pub trait NamespaceLifecycle: Send + Sync {
    /// Locate the namespace named by `config`, or create one.
    /// Returns the path and whether it was created here.
    fn init(&self, config: &NetworkConfig) -> Result<(String, bool), NamespaceError>;

    /// Run `callback` with the calling thread inside the namespace.
    /// The previous namespace is restored whatever the callback returns.
    fn run<T, E, F>(&self, netns_path: &str, callback: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<NamespaceError>;

    /// Release the namespace; `force` also unmounts and deletes it
    fn delete_net_ns(&self, netns_path: &str, force: bool) -> Result<(), NamespaceError>;
}

/// Persistence directory handed to netns-rs
#[derive(Debug, Clone)]
struct PersistDir(PathBuf);

impl Env for PersistDir {
    fn persist_dir(&self) -> PathBuf {
        self.0.clone()
    }
}

/// Namespace manager backed by netns-rs
#[derive(Debug, Clone)]
pub struct NetnsLifecycle {
    netns_dir: PathBuf,
}

impl NetnsLifecycle {
    pub fn new(netns_dir: impl Into<PathBuf>) -> Self {
        Self {
            netns_dir: netns_dir.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.netns_dir)
    }

    fn open(&self, netns_path: &str) -> Result<NetNs<PersistDir>, NamespaceError> {
        let (dir, name) = split_netns_path(Path::new(netns_path))?;
        NetNs::get_from_env(name, PersistDir(dir)).map_err(|e| NamespaceError::Access {
            path: netns_path.to_string(),
            reason: e.to_string(),
        })
    }
}

impl NamespaceLifecycle for NetnsLifecycle {
    fn init(&self, config: &NetworkConfig) -> Result<(String, bool), NamespaceError> {
        if let Some(ref path) = config.netns_path {
            // setns rejects descriptors that are not network namespaces
            self.open(path)?.run(|_| ()).map_err(|e| NamespaceError::Access {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            debug!(netns = %path, "Using existing network namespace");
            return Ok((path.clone(), false));
        }

        let name = format!("sandbox-cni-{}", Uuid::new_v4());
        let ns = NetNs::new_with_env(&name, PersistDir(self.netns_dir.clone())).map_err(|e| {
            NamespaceError::CreateFailed {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;

        let path = ns.path().display().to_string();
        info!(netns = %path, "Created network namespace");
        Ok((path, true))
    }

    fn run<T, E, F>(&self, netns_path: &str, callback: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<NamespaceError>,
    {
        let ns = self.open(netns_path)?;
        ns.run(|_| callback()).map_err(|e| {
            E::from(NamespaceError::Access {
                path: netns_path.to_string(),
                reason: e.to_string(),
            })
        })?
    }

    fn delete_net_ns(&self, netns_path: &str, force: bool) -> Result<(), NamespaceError> {
        let ns = self.open(netns_path)?;
        if !force {
            return Ok(());
        }

        ns.remove().map_err(|e| NamespaceError::RemoveFailed {
            path: netns_path.to_string(),
            reason: e.to_string(),
        })?;
        info!(netns = %netns_path, "Deleted network namespace");
        Ok(())
    }
}

/// Split an absolute namespace path into its directory and file name
fn split_netns_path(path: &Path) -> Result<(PathBuf, String), NamespaceError> {
    let invalid = || NamespaceError::InvalidPath(path.display().to_string());

    if !path.is_absolute() {
        return Err(invalid());
    }

    let dir = path.parent().ok_or_else(invalid)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(invalid)?;

    Ok((dir.to_path_buf(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_netns_path() {
        let (dir, name) = split_netns_path(Path::new("/var/run/netns/sb-1")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/run/netns"));
        assert_eq!(name, "sb-1");

        let (dir, name) = split_netns_path(Path::new("/proc/42/ns/net")).unwrap();
        assert_eq!(dir, PathBuf::from("/proc/42/ns"));
        assert_eq!(name, "net");
    }

    #[test]
    fn test_split_rejects_relative_and_root() {
        assert!(matches!(
            split_netns_path(Path::new("netns/sb-1")),
            Err(NamespaceError::InvalidPath(_))
        ));
        assert!(matches!(
            split_netns_path(Path::new("/")),
            Err(NamespaceError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_missing_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = NetnsLifecycle::new(dir.path());
        let missing = dir.path().join("absent").display().to_string();

        let config = NetworkConfig {
            num_interfaces: 1,
            netns_path: Some(missing.clone()),
        };
        assert!(matches!(lifecycle.init(&config), Err(NamespaceError::Access { .. })));
        assert!(matches!(
            lifecycle.delete_net_ns(&missing, true),
            Err(NamespaceError::Access { .. })
        ));

        let ran = lifecycle.run(&missing, || Ok::<_, NamespaceError>(()));
        assert!(ran.is_err());
    }

    #[test]
    fn test_init_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-netns");
        std::fs::write(&file, "hello").unwrap();

        let config = NetworkConfig {
            num_interfaces: 1,
            netns_path: Some(file.display().to_string()),
        };
        let lifecycle = NetnsLifecycle::new(dir.path());
        assert!(matches!(lifecycle.init(&config), Err(NamespaceError::Access { .. })));
    }

    #[test]
    fn test_create_run_delete() {
        // Needs CAP_SYS_ADMIN; unprivileged environments stop at creation
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = NetnsLifecycle::new(dir.path());

        let (path, created) = match lifecycle.init(&NetworkConfig::default()) {
            Ok(result) => result,
            Err(_) => return,
        };
        assert!(created);
        assert!(path.starts_with(&dir.path().display().to_string()));

        let value = lifecycle.run(&path, || Ok::<_, NamespaceError>(7)).unwrap();
        assert_eq!(value, 7);

        let joined = NetworkConfig {
            num_interfaces: 0,
            netns_path: Some(path.clone()),
        };
        assert_eq!(lifecycle.init(&joined).unwrap(), (path.clone(), false));

        lifecycle.delete_net_ns(&path, true).unwrap();
        assert!(!Path::new(&path).exists());
    }
}
