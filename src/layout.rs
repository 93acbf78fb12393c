use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Volume group as reported by the installer's storage model.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VolumeGroup {
    pub name: String,
    /// Full LV names in "<vg>-<lv>" form (e.g. "docker-docker-pool").
    #[serde(default)]
    pub logical_volumes: Vec<String>,
}

/// Finalized disk layout the addon validates against.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VolumeLayout {
    #[serde(default)]
    pub volume_groups: Vec<VolumeGroup>,
    /// Mount point -> filesystem type ("/var" -> "btrfs").
    #[serde(default)]
    pub mounts: BTreeMap<String, String>,
}

impl VolumeLayout {
    pub fn volume_group(&self, name: &str) -> Option<&VolumeGroup> {
        self.volume_groups.iter().find(|vg| vg.name == name)
    }

    pub fn fstype_at(&self, mountpoint: &str) -> Option<&str> {
        self.mounts.get(mountpoint).map(|s| s.as_str())
    }
}

impl VolumeGroup {
    pub fn has_lv(&self, lv: &str) -> bool {
        self.logical_volumes.iter().any(|l| l == lv)
    }
}

/// Package selection and security policy handed over by the installer.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct InstallPolicy {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub selinux: bool,
}

impl InstallPolicy {
    pub fn has_package(&self, name: &str) -> bool {
        self.packages.iter().any(|p| p == name)
    }
}
