//! Hybrid Path Planner.
//!
//! Decides which OS resolves each path of the buildpack layout and therefore
//! which permission attributes the corresponding archive entry carries.
//!
//! Windows reads everything under `Files/`, but it only checks permissions
//! on the entry itself and its immediate parent directory.  Ancestors above
//! that (`Files/cnb`, `Files/cnb/buildpacks`, ...) are never evaluated by
//! Windows, so they only need Linux attributes.  Linux reaches the same
//! content through the `cnb/` symlink tree and checks every component.

use tracing::debug;

use crate::archive::ArchiveEntry;
use crate::descriptor::BuildpackDescriptor;
use crate::payload::{Payload, LINUX_READ_MODE, WINDOWS_READ_SECURITY_DESCRIPTOR};
use crate::{Error, Result};

/// Which OS resolves a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Linux,
    Windows,
    Shared,
}

impl Access {
    pub fn needs_posix(self) -> bool {
        matches!(self, Access::Linux | Access::Shared)
    }

    pub fn needs_windows(self) -> bool {
        matches!(self, Access::Windows | Access::Shared)
    }
}

/// Attribute values applied per [`Access`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    pub linux_mode: u32,
    pub windows_security_descriptor: String,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            linux_mode: LINUX_READ_MODE,
            windows_security_descriptor: WINDOWS_READ_SECURITY_DESCRIPTOR.to_string(),
        }
    }
}

impl PermissionPolicy {
    /// Attach the attributes `access` calls for to `entry`.
    pub fn apply(&self, entry: ArchiveEntry, access: Access) -> ArchiveEntry {
        let entry = if access.needs_posix() {
            entry.with_posix_mode(self.linux_mode)
        } else {
            entry
        };
        if access.needs_windows() {
            entry.with_windows_security_descriptor(self.windows_security_descriptor.clone())
        } else {
            entry
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory,
    File(Vec<u8>),
    /// Absolute target path.
    Symlink(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNode {
    pub path: String,
    pub node: Node,
    pub access: Access,
}

/// Ordered layout of the hybrid layer.  Parents always precede children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    nodes: Vec<PlannedNode>,
}

impl LayoutPlan {
    /// Plan the layout for `descriptor` with file contents from `payload`.
    pub fn plan(descriptor: &BuildpackDescriptor, payload: &Payload) -> Result<Self> {
        let id = path_component("buildpack id", &descriptor.id)?;
        let version = path_component("buildpack version", &descriptor.version)?;

        let install = format!("Files/cnb/buildpacks/{}/{}", id, version);
        let bin = format!("{}/bin", install);

        let mut plan = Self { nodes: Vec::new() };

        // Windows subtree.
        plan.dir("Files", Access::Linux);
        plan.dir("Hives", Access::Linux);
        plan.dir("Files/cnb", Access::Linux);
        plan.dir("Files/cnb/buildpacks", Access::Linux);
        plan.dir(format!("Files/cnb/buildpacks/{}", id), Access::Linux);
        plan.dir(&install, Access::Shared);
        plan.file(
            format!("{}/buildpack.toml", install),
            &payload.buildpack_toml,
            Access::Shared,
        );
        plan.dir(&bin, Access::Shared);
        plan.file(format!("{}/detect.bat", bin), &payload.detect_bat, Access::Windows);
        plan.file(format!("{}/build.bat", bin), &payload.build_bat, Access::Windows);
        plan.file(format!("{}/detect", bin), &payload.detect_sh, Access::Linux);
        plan.file(format!("{}/build", bin), &payload.build_sh, Access::Linux);

        // Linux subtree.
        plan.dir("cnb", Access::Linux);
        plan.dir("cnb/buildpacks", Access::Linux);
        plan.dir(format!("cnb/buildpacks/{}", id), Access::Linux);
        plan.nodes.push(PlannedNode {
            path: format!("cnb/buildpacks/{}/{}", id, version),
            node: Node::Symlink(format!("/{}", install)),
            access: Access::Linux,
        });

        debug!(id, version, nodes = plan.nodes.len(), "planned hybrid layout");
        Ok(plan)
    }

    pub fn nodes(&self) -> &[PlannedNode] {
        &self.nodes
    }

    /// Lower the plan into archive entries under `policy`.
    pub fn into_entries(self, policy: &PermissionPolicy) -> Vec<ArchiveEntry> {
        self.nodes
            .into_iter()
            .map(|planned| {
                let entry = match planned.node {
                    Node::Directory => ArchiveEntry::directory(planned.path),
                    Node::File(content) => ArchiveEntry::file(planned.path, content),
                    Node::Symlink(target) => ArchiveEntry::symlink(planned.path, target),
                };
                policy.apply(entry, planned.access)
            })
            .collect()
    }

    fn dir(&mut self, path: impl Into<String>, access: Access) {
        self.nodes.push(PlannedNode {
            path: path.into(),
            node: Node::Directory,
            access,
        });
    }

    fn file(&mut self, path: String, content: &str, access: Access) {
        self.nodes.push(PlannedNode {
            path,
            node: Node::File(content.as_bytes().to_vec()),
            access,
        });
    }
}

fn path_component<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(Error::Layout(format!(
            "{} {:?} is not a single path component",
            what, value
        )));
    }
    Ok(value)
}
