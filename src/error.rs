use thiserror::Error;

pub const ADDON_NAME: &str = "com_redhat_docker";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddonError {
    #[error("line {line}: %addon com_redhat_docker {msg}")]
    Config { line: usize, msg: String },

    #[error("%addon com_redhat_docker is missing VG named {0}")]
    MissingVolumeGroup(String),

    #[error("%addon com_redhat_docker is missing a LV named {lv} in VG {vg}")]
    MissingThinPool { vg: String, lv: String },

    #[error("%addon com_redhat_docker requires btrfs for /var/lib/docker, {mountpoint} is {fstype}")]
    NotBtrfs { mountpoint: String, fstype: String },

    #[error("%addon com_redhat_docker requires btrfs, no mount point holds /var/lib/docker")]
    NoDockerMount,

    #[error("%packages section is missing {0}")]
    MissingPackage(String),

    #[error("%addon com_redhat_docker: {op} called in phase {phase}")]
    Phase { op: &'static str, phase: String },
}

impl AddonError {
    pub fn config(line: usize, msg: impl Into<String>) -> Self {
        AddonError::Config {
            line,
            msg: msg.into(),
        }
    }
}
