use std::fmt;

use crate::{error::AddonError, layout::VolumeLayout};

/// Mount points that can hold /var/lib/docker, most specific first.
pub const DOCKER_MOUNT_CHAIN: &[&str] = &["/var/lib/docker", "/var/lib", "/var", "/"];

pub const THINPOOL_LV: &str = "docker-pool";

const SELINUX_FLAG: &str = "--selinux-enabled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageDriver {
    /// devicemapper on the `docker-pool` thin pool of `vgname`.
    Lvm { vgname: String, fstype: String },
    Overlay,
    Btrfs,
}

impl fmt::Display for StorageDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageDriver::Lvm { vgname, fstype } => {
                write!(f, "devicemapper(vg={}, fs={})", vgname, fstype)
            }
            StorageDriver::Overlay => write!(f, "overlay"),
            StorageDriver::Btrfs => write!(f, "btrfs"),
        }
    }
}

impl StorageDriver {
    pub fn name(&self) -> &'static str {
        match self {
            StorageDriver::Lvm { .. } => "devicemapper",
            StorageDriver::Overlay => "overlay",
            StorageDriver::Btrfs => "btrfs",
        }
    }

    /// Driver part of the `%addon` header line.
    pub fn header_args(&self) -> String {
        match self {
            StorageDriver::Lvm { vgname, fstype } => {
                format!(r#"--vgname="{vgname}" --fstype="{fstype}""#)
            }
            StorageDriver::Overlay => "--overlay".to_string(),
            StorageDriver::Btrfs => "--btrfs".to_string(),
        }
    }

    pub fn check_layout(&self, layout: &VolumeLayout) -> Result<(), AddonError> {
        match self {
            StorageDriver::Lvm { vgname, .. } => {
                let vg = layout
                    .volume_group(vgname)
                    .ok_or_else(|| AddonError::MissingVolumeGroup(vgname.clone()))?;
                let lv = thinpool_lv_name(vgname);
                if !vg.has_lv(&lv) {
                    return Err(AddonError::MissingThinPool {
                        vg: vgname.clone(),
                        lv,
                    });
                }
                Ok(())
            }
            StorageDriver::Overlay => Ok(()),
            StorageDriver::Btrfs => {
                let (mountpoint, fstype) = DOCKER_MOUNT_CHAIN
                    .iter()
                    .find_map(|mp| layout.fstype_at(mp).map(|fs| (*mp, fs)))
                    .ok_or(AddonError::NoDockerMount)?;
                if fstype != "btrfs" {
                    return Err(AddonError::NotBtrfs {
                        mountpoint: mountpoint.to_string(),
                        fstype: fstype.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    pub fn daemon_args(&self) -> Vec<String> {
        match self {
            StorageDriver::Lvm { vgname, fstype } => vec![
                "--storage-driver".to_string(),
                "devicemapper".to_string(),
                "--storage-opt".to_string(),
                format!("dm.fs={fstype}"),
                "--storage-opt".to_string(),
                format!("dm.thinpooldev={}", thinpool_device(vgname)),
            ],
            StorageDriver::Overlay => {
                vec!["--storage-driver".to_string(), "overlay".to_string()]
            }
            StorageDriver::Btrfs => vec!["--storage-driver".to_string(), "btrfs".to_string()],
        }
    }

    /// Content of /etc/sysconfig/docker-storage.
    pub fn storage_config(&self) -> String {
        format!(
            "DOCKER_STORAGE_OPTIONS=\"{}\"\n",
            self.daemon_args().join(" ")
        )
    }

    /// Rewrites the persisted daemon OPTIONS value for this driver.
    ///
    /// Overlay does not support SELinux, so the flag is removed with a plain
    /// textual replace. It will also hit any longer option that contains it.
    pub fn adjust_options(&self, options: &str) -> String {
        match self {
            StorageDriver::Overlay => options.replace(SELINUX_FLAG, ""),
            StorageDriver::Lvm { .. } | StorageDriver::Btrfs => options.to_string(),
        }
    }

    /// Line appended to /etc/sysconfig/docker-storage-setup, if any.
    pub fn storage_setup_line(&self) -> Option<String> {
        match self {
            StorageDriver::Lvm { vgname, .. } => Some(format!("VG={vgname}\n")),
            StorageDriver::Overlay | StorageDriver::Btrfs => None,
        }
    }
}

#[inline]
pub fn thinpool_lv_name(vg: &str) -> String {
    format!("{vg}-{THINPOOL_LV}")
}

/// device-mapper escapes '-' inside VG and LV names by doubling it.
#[inline]
fn dm_escape(name: &str) -> String {
    name.replace('-', "--")
}

#[inline]
pub fn thinpool_device(vg: &str) -> String {
    format!(
        "/dev/mapper/{}-{}",
        dm_escape(vg),
        dm_escape(THINPOOL_LV)
    )
}
