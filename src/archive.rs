//! Archive Entry Builder.
//!
//! Writes directory, file and symlink entries into a single in-memory tar
//! stream.  Each entry carries a POSIX mode when Linux resolves its path and
//! a Windows security descriptor (as a `MSWINDOWS.rawsd` PAX record) when
//! Windows does.  The stream is append-only: the first failed write poisons
//! the builder and the partial buffer is never handed out.

use std::collections::HashSet;
use std::io::Read;

use tar::{Builder, EntryType, Header};
use tracing::{debug, trace};

use crate::{Error, Result};

/// PAX record key Windows container runtimes read the raw security
/// descriptor from.
pub const WINDOWS_SD_PAX_KEY: &str = "MSWINDOWS.rawsd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    RegularFile,
    Symlink,
}

/// One filesystem node of the hybrid layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash-separated path relative to the layer root.
    pub path: String,
    pub kind: EntryKind,
    /// File content; empty for directories and symlinks.
    pub content: Vec<u8>,
    /// Present when Linux must resolve this path.
    pub posix_mode: Option<u32>,
    /// Base64 security descriptor; present when Windows must resolve this path.
    pub windows_security_descriptor: Option<String>,
    /// Absolute link target, symlinks only.
    pub symlink_target: Option<String>,
}

impl ArchiveEntry {
    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(path.into(), EntryKind::Directory)
    }

    pub fn file(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            ..Self::new(path.into(), EntryKind::RegularFile)
        }
    }

    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            symlink_target: Some(target.into()),
            ..Self::new(path.into(), EntryKind::Symlink)
        }
    }

    fn new(path: String, kind: EntryKind) -> Self {
        Self {
            path,
            kind,
            content: Vec::new(),
            posix_mode: None,
            windows_security_descriptor: None,
            symlink_target: None,
        }
    }

    pub fn with_posix_mode(mut self, mode: u32) -> Self {
        self.posix_mode = Some(mode);
        self
    }

    pub fn with_windows_security_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.windows_security_descriptor = Some(descriptor.into());
        self
    }

    /// Path of the containing directory, `None` for top-level entries.
    pub fn parent(&self) -> Option<&str> {
        self.path.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Check the entry's own invariants.
    pub fn validate(&self) -> Result<()> {
        let path = &self.path;
        let bad_path = |why: &str| Err(Error::Archive(format!("{:?}: {}", path, why)));

        if path.is_empty() {
            return bad_path("empty path");
        }
        if path.starts_with('/') || path.contains('\\') {
            return bad_path("paths must be relative and slash-separated");
        }
        if path
            .split('/')
            .any(|c| c.is_empty() || c == "." || c == "..")
        {
            return bad_path("empty, '.' or '..' path component");
        }

        if self.posix_mode.is_none() && self.windows_security_descriptor.is_none() {
            return bad_path("entry is resolvable by neither Linux nor Windows");
        }
        if let Some(mode) = self.posix_mode {
            if mode == 0 || mode & !0o7777 != 0 {
                return bad_path(format!("invalid POSIX mode {:o}", mode).as_str());
            }
        }
        if let Some(sd) = &self.windows_security_descriptor {
            if sd.is_empty() || sd.contains(['\n', '\r']) {
                return bad_path("malformed Windows security descriptor");
            }
        }

        match self.kind {
            EntryKind::Directory if !self.content.is_empty() => bad_path("directory with content"),
            EntryKind::Directory | EntryKind::RegularFile if self.symlink_target.is_some() => {
                bad_path("link target on a non-symlink entry")
            }
            EntryKind::Symlink => match &self.symlink_target {
                None => bad_path("symlink without target"),
                Some(target) if !target.starts_with('/') => {
                    bad_path("symlink target must be absolute")
                }
                Some(_) if !self.content.is_empty() => bad_path("symlink with content"),
                Some(_) if self.posix_mode.is_none() => {
                    bad_path("symlink without POSIX mode cannot be traversed by Linux")
                }
                Some(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// The finished layer: an immutable tar byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridLayer {
    bytes: Vec<u8>,
    entries: usize,
}

impl HybridLayer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size of the tar stream in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Number of filesystem entries (PAX records not counted).
    pub fn entry_count(&self) -> usize {
        self.entries
    }
}

/// Append-only writer producing a [`HybridLayer`].
pub struct ArchiveBuilder {
    inner: Builder<Vec<u8>>,
    paths: HashSet<String>,
    directories: HashSet<String>,
    entries: usize,
    poisoned: bool,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            inner: Builder::new(Vec::new()),
            paths: HashSet::new(),
            directories: HashSet::new(),
            entries: 0,
            poisoned: false,
        }
    }

    /// Write one entry.  Its parent directory must already be written.
    pub fn append(&mut self, entry: &ArchiveEntry) -> Result<()> {
        if self.poisoned {
            return Err(Error::Archive(format!(
                "{:?}: archive aborted by an earlier failure",
                entry.path
            )));
        }
        let result = self.write_entry(entry);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn write_entry(&mut self, entry: &ArchiveEntry) -> Result<()> {
        entry.validate()?;

        if self.paths.contains(&entry.path) {
            return Err(Error::Archive(format!(
                "{:?}: path written twice",
                entry.path
            )));
        }
        if let Some(parent) = entry.parent() {
            if !self.directories.contains(parent) {
                return Err(Error::Archive(format!(
                    "{:?}: parent directory {:?} has not been written",
                    entry.path, parent
                )));
            }
        }

        if let Some(sd) = &entry.windows_security_descriptor {
            self.inner
                .append_pax_extensions([(WINDOWS_SD_PAX_KEY, sd.as_bytes())])
                .map_err(|e| write_error(entry, e))?;
        }

        let header = entry_header(entry)?;
        self.inner
            .append(&header, entry.content.as_slice())
            .map_err(|e| write_error(entry, e))?;

        trace!(
            path = %entry.path,
            kind = ?entry.kind,
            posix = entry.posix_mode.is_some(),
            windows = entry.windows_security_descriptor.is_some(),
            "wrote entry",
        );

        if entry.kind == EntryKind::Directory {
            self.directories.insert(entry.path.clone());
        }
        self.paths.insert(entry.path.clone());
        self.entries += 1;
        Ok(())
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Terminate the stream and hand over the finished layer.
    pub fn finish(self) -> Result<HybridLayer> {
        if self.poisoned {
            return Err(Error::Archive(
                "archive aborted by an earlier failure".to_string(),
            ));
        }
        let entries = self.entries;
        let bytes = self
            .inner
            .into_inner()
            .map_err(|e| Error::Archive(format!("finalize archive: {}", e)))?;
        debug!(entries, size = bytes.len(), "archive finished");
        Ok(HybridLayer { bytes, entries })
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `entries` in order; the first failure aborts the whole build.
pub fn build_layer(entries: &[ArchiveEntry]) -> Result<HybridLayer> {
    let mut builder = ArchiveBuilder::new();
    for entry in entries {
        builder.append(entry)?;
    }
    builder.finish()
}

/// Decode a tar stream back into entries.  A zero mode reads as "no POSIX
/// mode", mirroring how [`ArchiveBuilder`] encodes its absence.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = tar::Archive::new(bytes);
    let mut out = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();

        let kind = match entry.header().entry_type() {
            EntryType::Directory => EntryKind::Directory,
            EntryType::Regular => EntryKind::RegularFile,
            EntryType::Symlink => EntryKind::Symlink,
            other => {
                return Err(Error::Archive(format!(
                    "{:?}: unsupported entry type {:?}",
                    path, other
                )))
            }
        };
        let mode = entry.header().mode()?;

        let mut descriptor = None;
        if let Some(extensions) = entry.pax_extensions()? {
            for extension in extensions {
                let extension = extension?;
                if extension.key().ok() == Some(WINDOWS_SD_PAX_KEY) {
                    let value = extension.value().map_err(|e| {
                        Error::Archive(format!("{:?}: non-UTF-8 security descriptor: {}", path, e))
                    })?;
                    descriptor = Some(value.to_string());
                }
            }
        }

        let symlink_target = entry
            .link_name()?
            .map(|target| target.to_string_lossy().into_owned());

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;

        out.push(ArchiveEntry {
            path,
            kind,
            content,
            posix_mode: (mode != 0).then_some(mode),
            windows_security_descriptor: descriptor,
            symlink_target,
        });
    }

    Ok(out)
}

fn entry_header(entry: &ArchiveEntry) -> Result<Header> {
    let mut header = Header::new_ustar();
    header
        .set_path(&entry.path)
        .map_err(|e| write_error(entry, e))?;
    header.set_entry_type(match entry.kind {
        EntryKind::Directory => EntryType::Directory,
        EntryKind::RegularFile => EntryType::Regular,
        EntryKind::Symlink => EntryType::Symlink,
    });
    header.set_mode(entry.posix_mode.unwrap_or(0));
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(entry.content.len() as u64);
    if let Some(target) = &entry.symlink_target {
        header
            .set_link_name(target)
            .map_err(|e| write_error(entry, e))?;
    }
    header.set_cksum();
    Ok(header)
}

fn write_error(entry: &ArchiveEntry, err: std::io::Error) -> Error {
    Error::Archive(format!("{:?}: {}", entry.path, err))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SD: &str = "AQAAgA==";

    #[test]
    fn file_with_both_attributes() {
        let layer = build_layer(&[
            ArchiveEntry::directory("dir").with_posix_mode(0o755),
            ArchiveEntry::file("dir/manifest", "hello")
                .with_posix_mode(0o644)
                .with_windows_security_descriptor(SD),
        ])
        .unwrap();
        assert_eq!(layer.entry_count(), 2);

        let entries = read_entries(layer.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[0].windows_security_descriptor, None);

        let file = &entries[1];
        assert_eq!(file.path, "dir/manifest");
        assert_eq!(file.content, b"hello");
        assert_eq!(file.posix_mode, Some(0o644));
        assert_eq!(file.windows_security_descriptor.as_deref(), Some(SD));
    }

    #[test]
    fn windows_only_file_has_no_mode() {
        let layer = build_layer(&[
            ArchiveEntry::directory("bin").with_windows_security_descriptor(SD),
            ArchiveEntry::file("bin/run.bat", "exit 0").with_windows_security_descriptor(SD),
        ])
        .unwrap();
        let entries = read_entries(layer.as_bytes()).unwrap();
        assert_eq!(entries[1].posix_mode, None);
        assert_eq!(entries[1].windows_security_descriptor.as_deref(), Some(SD));
    }

    #[test]
    fn symlink_target_is_absolute() {
        let layer = build_layer(&[
            ArchiveEntry::directory("cnb").with_posix_mode(0o777),
            ArchiveEntry::symlink("cnb/link", "/Files/target").with_posix_mode(0o777),
        ])
        .unwrap();
        let entries = read_entries(layer.as_bytes()).unwrap();
        assert_eq!(entries[1].kind, EntryKind::Symlink);
        assert_eq!(entries[1].symlink_target.as_deref(), Some("/Files/target"));
        assert_eq!(entries[1].posix_mode, Some(0o777));
    }

    #[test]
    fn decoded_entries_rebuild_identical_bytes() {
        let entries = vec![
            ArchiveEntry::directory("a").with_posix_mode(0o777),
            ArchiveEntry::file("a/f", "data")
                .with_posix_mode(0o777)
                .with_windows_security_descriptor(SD),
            ArchiveEntry::symlink("a/l", "/a/f").with_posix_mode(0o777),
        ];
        let layer = build_layer(&entries).unwrap();
        let decoded = read_entries(layer.as_bytes()).unwrap();
        assert_eq!(decoded, entries);
        assert_eq!(build_layer(&decoded).unwrap(), layer);
    }

    #[test]
    fn entry_without_attributes_is_rejected() {
        let err = build_layer(&[ArchiveEntry::directory("Hives")]).unwrap_err();
        assert!(err.to_string().contains("neither"), "{err}");
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let cases = vec![
            ArchiveEntry::directory("/abs").with_posix_mode(0o777),
            ArchiveEntry::directory("a/../b").with_posix_mode(0o777),
            ArchiveEntry::directory("a//b").with_posix_mode(0o777),
            ArchiveEntry::directory("").with_posix_mode(0o777),
            ArchiveEntry::directory("zero").with_posix_mode(0),
            ArchiveEntry::directory("wide").with_posix_mode(0o170777),
            ArchiveEntry::symlink("rel", "relative/target").with_posix_mode(0o777),
            ArchiveEntry::symlink("nomode", "/target").with_windows_security_descriptor(SD),
            ArchiveEntry::directory("dir")
                .with_posix_mode(0o777)
                .with_windows_security_descriptor(""),
        ];
        for entry in cases {
            assert!(entry.validate().is_err(), "accepted {:?}", entry);
        }

        let mut dir_with_content = ArchiveEntry::directory("d").with_posix_mode(0o777);
        dir_with_content.content = b"x".to_vec();
        assert!(dir_with_content.validate().is_err());
    }

    #[test]
    fn child_before_parent_is_rejected() {
        let err = build_layer(&[
            ArchiveEntry::file("missing/file", "x").with_posix_mode(0o644),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("parent directory"), "{err}");
    }

    #[test]
    fn file_is_not_a_parent() {
        let err = build_layer(&[
            ArchiveEntry::file("f", "x").with_posix_mode(0o644),
            ArchiveEntry::file("f/g", "y").with_posix_mode(0o644),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("parent directory"), "{err}");
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let dir = ArchiveEntry::directory("d").with_posix_mode(0o777);
        let err = build_layer(&[dir.clone(), dir]).unwrap_err();
        assert!(err.to_string().contains("twice"), "{err}");
    }

    #[test]
    fn first_failure_poisons_the_builder() {
        let mut builder = ArchiveBuilder::new();
        builder
            .append(&ArchiveEntry::directory("ok").with_posix_mode(0o777))
            .unwrap();
        assert!(builder.append(&ArchiveEntry::directory("bad")).is_err());

        let err = builder
            .append(&ArchiveEntry::directory("later").with_posix_mode(0o777))
            .unwrap_err();
        assert!(err.to_string().contains("earlier failure"), "{err}");
        assert_eq!(builder.len(), 1);
        assert!(builder.finish().is_err());
    }

    #[test]
    fn size_counts_bytes_and_entry_count_counts_entries() {
        let empty = build_layer(&[]).unwrap();
        assert_eq!(empty.entry_count(), 0);
        // Two zero blocks terminate even an empty stream.
        assert_eq!(empty.size(), 1024);

        let layer = build_layer(&[
            ArchiveEntry::directory("cnb").with_posix_mode(0o777),
            ArchiveEntry::file("cnb/x", b"data".to_vec()).with_posix_mode(0o644),
        ])
        .unwrap();
        assert_eq!(layer.entry_count(), 2);
        assert_eq!(layer.size(), layer.as_bytes().len());
        assert!(layer.size() > empty.size());
    }

    #[test]
    fn output_is_deterministic() {
        let entries = vec![
            ArchiveEntry::directory("x").with_posix_mode(0o777),
            ArchiveEntry::file("x/y", "z").with_windows_security_descriptor(SD),
        ];
        assert_eq!(
            build_layer(&entries).unwrap().as_bytes(),
            build_layer(&entries).unwrap().as_bytes()
        );
    }
}
