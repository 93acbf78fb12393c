use std::fmt;

use clap::Parser;

use crate::error::{ADDON_NAME, AddonError};

pub mod driver;
pub mod lifecycle;

pub use driver::StorageDriver;
pub use lifecycle::Controller;

/// fstype reported for drivers that do not format anything.
pub const PLACEHOLDER_FSTYPE: &str = "xfs";

/// Filesystem types the installer's formatting layer can create.
pub trait FormatCatalog {
    fn is_known(&self, fstype: &str) -> bool;
}

pub struct BuiltinFormats;

impl BuiltinFormats {
    pub const TYPES: &'static [&'static str] = &[
        "xfs", "ext2", "ext3", "ext4", "btrfs", "vfat", "efi", "hfs+", "ntfs", "swap",
    ];
}

impl FormatCatalog for BuiltinFormats {
    fn is_known(&self, fstype: &str) -> bool {
        Self::TYPES.contains(&fstype)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "%addon com_redhat_docker",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct HeaderArgs {
    /// Name of the VG that contains a thinpool named docker-pool
    #[arg(long)]
    vgname: Option<String>,

    /// Filesystem docker puts on the thin devices
    #[arg(long)]
    fstype: Option<String>,

    #[arg(long)]
    overlay: bool,

    #[arg(long)]
    btrfs: bool,

    /// Also persist the extra args into /etc/sysconfig/docker
    #[arg(long)]
    save_args: bool,

    #[arg(last = true)]
    extra: Vec<String>,
}

/// Parsed `%addon com_redhat_docker` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonConfig {
    pub driver: StorageDriver,
    pub extra_args: Vec<String>,
    pub save_args: bool,
    pub script: String,
}

impl AddonConfig {
    /// Parses the header tokens that follow the addon name.
    pub fn from_header<S: AsRef<str>>(
        lineno: usize,
        args: &[S],
        formats: &dyn FormatCatalog,
    ) -> Result<Self, AddonError> {
        let opts = HeaderArgs::try_parse_from(args.iter().map(|a| a.as_ref())).map_err(|e| {
            let rendered = e.to_string();
            let first = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ")
                .to_string();
            AddonError::config(lineno, first)
        })?;

        let vgname = match opts.vgname.map(|s| s.trim().to_string()) {
            Some(v) if v.is_empty() => {
                return Err(AddonError::config(lineno, "--vgname requires a value"));
            }
            v => v,
        };
        let selected = [vgname.is_some(), opts.overlay, opts.btrfs]
            .iter()
            .filter(|b| **b)
            .count();
        if selected != 1 {
            return Err(AddonError::config(
                lineno,
                "requires exactly one of --vgname, --overlay or --btrfs",
            ));
        }

        let driver = match vgname {
            Some(vgname) => {
                let fstype = opts
                    .fstype
                    .ok_or_else(|| AddonError::config(lineno, "--vgname requires --fstype"))?;
                if !formats.is_known(&fstype) {
                    return Err(AddonError::config(
                        lineno,
                        format!("fstype of {fstype} is invalid."),
                    ));
                }
                StorageDriver::Lvm { vgname, fstype }
            }
            None if opts.overlay => StorageDriver::Overlay,
            None => StorageDriver::Btrfs,
        };

        Ok(Self {
            driver,
            extra_args: opts.extra,
            save_args: opts.save_args,
            script: String::new(),
        })
    }

    pub fn vgname(&self) -> Option<&str> {
        match &self.driver {
            StorageDriver::Lvm { vgname, .. } => Some(vgname.as_str()),
            _ => None,
        }
    }

    pub fn fstype(&self) -> &str {
        match &self.driver {
            StorageDriver::Lvm { fstype, .. } => fstype.as_str(),
            _ => PLACEHOLDER_FSTYPE,
        }
    }

    /// Extra args to persist, when `--save-args` was given.
    pub fn saved_args(&self) -> Option<&[String]> {
        self.save_args.then_some(self.extra_args.as_slice())
    }
}

impl fmt::Display for AddonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%addon {} {}", ADDON_NAME, self.driver.header_args())?;
        if self.save_args {
            write!(f, " --save-args")?;
        }
        if !self.extra_args.is_empty() {
            write!(f, " -- {}", self.extra_args.join(" "))?;
        }
        writeln!(f)?;
        let body = self.script.trim();
        if !body.is_empty() {
            writeln!(f, "{body}")?;
        }
        writeln!(f, "%end")
    }
}
