use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use config as cfg;
use serde::{Deserialize, Serialize};

use crate::layout::{InstallPolicy, VolumeGroup, VolumeLayout};

const DEFAULT_SYSROOT: &str = "/mnt/sysimage";
const DEFAULT_LIVE_ROOT: &str = "/";
const DEFAULT_TMP_DIR: &str = "/tmp";
const DEFAULT_LOG_DIR: &str = "/var/log/anaconda";
const DEFAULT_DAEMON: &[&str] = &["docker", "daemon"];

/// Install context the addon runs in: where things live, what the
/// installer selected and what the partitioning step produced.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: Paths,
    pub daemon: Daemon,
    pub install: InstallPolicy,
    pub layout: VolumeLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root of the system being installed.
    pub sysroot: PathBuf,
    /// Root of the running installer image.
    pub live_root: PathBuf,
    pub tmp_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            sysroot: DEFAULT_SYSROOT.into(),
            live_root: DEFAULT_LIVE_ROOT.into(),
            tmp_dir: DEFAULT_TMP_DIR.into(),
            log_dir: DEFAULT_LOG_DIR.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Daemon {
    /// Program and leading args; storage args are appended after these.
    pub command: Vec<String>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self {
            command: DEFAULT_DAEMON.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let raw: RawConfig = cfg::Config::builder()
            .add_source(cfg::File::from(path))
            .build()
            .with_context(|| format!("load {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("deserialize {}", path.display()))?;

        let n = config_helpers::Normalizer { base_dir };
        let defaults = Paths::default();
        let paths = Paths {
            sysroot: n.path_or(raw.paths.sysroot, defaults.sysroot),
            live_root: n.path_or(raw.paths.live_root, defaults.live_root),
            tmp_dir: n.path_or(raw.paths.tmp_dir, defaults.tmp_dir),
            log_dir: n.path_or(raw.paths.log_dir, defaults.log_dir),
        };

        let daemon = match raw.daemon.command {
            Some(cmd) => {
                let command: Vec<String> = cmd
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if command.is_empty() {
                    bail!("[daemon] command must not be empty");
                }
                Daemon { command }
            }
            None => Daemon::default(),
        };

        let install = InstallPolicy {
            packages: n.dedup(raw.install.packages),
            selinux: raw.install.selinux,
        };

        let layout = Self::build_layout(&n, raw.layout)?;

        Ok(Self {
            paths,
            daemon,
            install,
            layout,
        })
    }

    fn build_layout(n: &config_helpers::Normalizer<'_>, raw: RawLayout) -> Result<VolumeLayout> {
        let mut seen = BTreeSet::new();
        let mut volume_groups = Vec::with_capacity(raw.volume_groups.len());
        for vg in raw.volume_groups {
            let name = vg.name.trim().to_string();
            if name.is_empty() {
                bail!("[[layout.volume_groups]] name must not be empty");
            }
            if !seen.insert(name.clone()) {
                bail!("duplicate volume group '{name}'");
            }
            volume_groups.push(VolumeGroup {
                name,
                logical_volumes: n.dedup(vg.logical_volumes),
            });
        }

        let mut mounts = BTreeMap::new();
        for (mp_raw, fs_raw) in raw.mounts {
            let mp = mp_raw.trim().to_string();
            if !mp.starts_with('/') {
                bail!("[layout.mounts] mount point '{mp}' must be absolute");
            }
            let fstype = fs_raw.trim().to_string();
            if fstype.is_empty() {
                bail!("[layout.mounts] fstype for '{mp}' must not be empty");
            }
            mounts.insert(mp, fstype);
        }

        Ok(VolumeLayout {
            volume_groups,
            mounts,
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        #[derive(Serialize)]
        struct PathsOut<'a> {
            sysroot: &'a Path,
            live_root: &'a Path,
            tmp_dir: &'a Path,
            log_dir: &'a Path,
        }
        #[derive(Serialize)]
        struct DaemonOut<'a> {
            command: &'a [String],
        }
        #[derive(Serialize)]
        struct Out<'a> {
            paths: PathsOut<'a>,
            daemon: DaemonOut<'a>,
            install: &'a InstallPolicy,
            layout: &'a VolumeLayout,
        }

        let out = Out {
            paths: PathsOut {
                sysroot: &self.paths.sysroot,
                live_root: &self.paths.live_root,
                tmp_dir: &self.paths.tmp_dir,
                log_dir: &self.paths.log_dir,
            },
            daemon: DaemonOut {
                command: &self.daemon.command,
            },
            install: &self.install,
            layout: &self.layout,
        };
        Ok(toml::to_string_pretty(&out)?)
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    daemon: RawDaemon,
    #[serde(default)]
    install: RawInstall,
    #[serde(default)]
    layout: RawLayout,
}

#[derive(Debug, Deserialize, Default)]
struct RawPaths {
    sysroot: Option<String>,
    live_root: Option<String>,
    tmp_dir: Option<String>,
    log_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDaemon {
    command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawInstall {
    #[serde(default)]
    packages: Vec<String>,
    #[serde(default)]
    selinux: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RawLayout {
    #[serde(default)]
    volume_groups: Vec<RawVolumeGroup>,
    #[serde(default)]
    mounts: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawVolumeGroup {
    name: String,
    #[serde(default)]
    logical_volumes: Vec<String>,
}

mod config_helpers {
    use std::{
        collections::HashSet,
        path::{Path, PathBuf},
    };

    pub(super) struct Normalizer<'a> {
        pub base_dir: &'a Path,
    }

    impl<'a> Normalizer<'a> {
        #[inline]
        pub fn trim_opt(&self, s: Option<String>) -> Option<String> {
            s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }

        #[inline]
        pub fn resolve(&self, p: &str) -> PathBuf {
            let pb = PathBuf::from(p.trim());
            if pb.is_absolute() {
                pb
            } else {
                self.base_dir.join(pb)
            }
        }

        pub fn path_or(&self, s: Option<String>, default: PathBuf) -> PathBuf {
            self.trim_opt(s)
                .map(|v| self.resolve(&v))
                .unwrap_or(default)
        }

        pub fn dedup(&self, items: Vec<String>) -> Vec<String> {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for s in items
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
            {
                if seen.insert(s.clone()) {
                    out.push(s);
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(path: &Path, s: &str) {
        fs::write(path, s).unwrap();
    }

    #[test]
    fn empty_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg_path = tmp.path().join("config.toml");
        write(&cfg_path, "");

        let cfg = Config::load(&cfg_path).unwrap();
        assert_eq!(cfg.paths, Paths::default());
        assert_eq!(cfg.daemon.command, vec!["docker", "daemon"]);
        assert!(cfg.install.packages.is_empty());
        assert!(cfg.layout.volume_groups.is_empty());
    }

    #[test]
    fn load_full_context() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let cfg_path = dir.join("config.toml");
        write(
            &cfg_path,
            r#"
[paths]
sysroot = "sysimage"
tmp_dir = "/var/tmp"

[daemon]
command = ["/usr/bin/dockerd", " "]

[install]
packages = ["docker", "vim", "docker"]
selinux = true

[[layout.volume_groups]]
name = "docker"
logical_volumes = ["docker-docker-pool"]

[layout.mounts]
"/" = "xfs"
"/var" = "btrfs"
"#,
        );

        let cfg = Config::load(&cfg_path).unwrap();
        assert_eq!(cfg.paths.sysroot, dir.join("sysimage"));
        assert_eq!(cfg.paths.tmp_dir, PathBuf::from("/var/tmp"));
        assert_eq!(cfg.paths.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(cfg.daemon.command, vec!["/usr/bin/dockerd"]);
        assert_eq!(cfg.install.packages, vec!["docker", "vim"]);
        assert!(cfg.install.selinux);
        assert!(
            cfg.layout
                .volume_group("docker")
                .is_some_and(|vg| vg.has_lv("docker-docker-pool"))
        );
        assert_eq!(cfg.layout.fstype_at("/var"), Some("btrfs"));
    }

    #[test]
    fn rejects_bad_layout() {
        let tmp = TempDir::new().unwrap();
        let cfg_path = tmp.path().join("config.toml");

        write(
            &cfg_path,
            "[[layout.volume_groups]]\nname = \"a\"\n[[layout.volume_groups]]\nname = \"a\"\n",
        );
        let err = Config::load(&cfg_path).unwrap_err();
        assert!(err.to_string().contains("duplicate volume group"), "{err}");

        write(&cfg_path, "[layout.mounts]\n\"var\" = \"xfs\"\n");
        assert!(Config::load(&cfg_path).is_err());

        write(&cfg_path, "[daemon]\ncommand = []\n");
        assert!(Config::load(&cfg_path).is_err());
    }

    #[test]
    fn print_config_round_trips_sections() {
        let tmp = TempDir::new().unwrap();
        let cfg_path = tmp.path().join("config.toml");
        write(
            &cfg_path,
            "[install]\npackages = [\"docker\"]\n[layout.mounts]\n\"/var\" = \"btrfs\"\n",
        );

        let cfg = Config::load(&cfg_path).unwrap();
        let printed = cfg.to_toml().unwrap();
        assert!(printed.contains("[paths]"));
        assert!(printed.contains(r#"sysroot = "/mnt/sysimage""#));
        assert!(printed.contains(r#"command = ["#));
        assert!(printed.contains("[layout.mounts]"));
    }
}
