// Link lookups backed by /sys/class/net

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{Link, LinkNameResolver};
use crate::error::LinkError;

pub const DEFAULT_SYSFS_NET: &str = "/sys/class/net";

/// Reads link attributes from a sysfs `class/net` directory.
/// Every lookup hits the filesystem; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct SysfsLinks {
    root: PathBuf,
}

impl SysfsLinks {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SysfsLinks { root: root.into() }
    }

    /// Kernel index of the named interface
    pub fn index_of(&self, name: &str) -> Result<u32, LinkError> {
        let path = self.root.join(name).join("ifindex");
        match fs::read_to_string(&path) {
            Ok(value) => parse_ifindex(name, &value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LinkError::NameNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn read_index(dir: &Path, name: &str) -> Result<Option<u32>, LinkError> {
        match fs::read_to_string(dir.join("ifindex")) {
            Ok(value) => parse_ifindex(name, &value).map(Some),
            // Entries without an ifindex file are not network links
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl LinkNameResolver for SysfsLinks {
    fn link_by_index(&self, index: u32) -> Result<Link, LinkError> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if Self::read_index(&entry.path(), &name)? == Some(index) {
                tracing::trace!("link {} has index {}", name, index);
                return Ok(Link { index, name });
            }
        }
        Err(LinkError::IndexNotFound(index))
    }
}

fn parse_ifindex(name: &str, value: &str) -> Result<u32, LinkError> {
    value.trim().parse().map_err(|_| LinkError::MalformedIndex {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}
