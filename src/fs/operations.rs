//! Same-machine file and directory copies
//!
//! [`FileCopier`] copies one file and carries its timestamps and permission
//! bits across. [`LocalCopier`] builds on it to merge whole directory trees
//! into a destination, overwriting files that already exist there.

use crate::error::{IoResultExt, Result, TransferError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Options for file copy operations
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Buffer size for buffered operations
    pub buffer_size: usize,
    /// Preserve file permissions
    pub preserve_permissions: bool,
    /// Preserve modification and access times
    pub preserve_times: bool,
    /// Sync to disk after copy
    pub sync: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024, // 1MB
            preserve_permissions: true,
            preserve_times: true,
            sync: false,
        }
    }
}

/// Single-file copier
#[derive(Debug, Clone, Default)]
pub struct FileCopier {
    options: CopyOptions,
}

impl FileCopier {
    /// Create a new file copier with the given options
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Copy a file from source to destination, replacing any existing file
    ///
    /// Returns the number of bytes copied. Fails with
    /// `SameSourceAndDestination` if `dest` is `source` itself.
    pub fn copy(&self, source: &Path, dest: &Path) -> Result<u64> {
        if same_file(source, dest)? {
            return Err(TransferError::SameSourceAndDestination(dest.to_path_buf()));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).not_writable(parent)?;
        }

        let bytes_copied = self.copy_buffered(source, dest)?;

        if self.options.preserve_permissions {
            self.copy_permissions(source, dest)?;
        }

        if self.options.preserve_times {
            self.copy_times(source, dest)?;
        }

        if self.options.sync {
            let file = File::open(dest).with_path(dest)?;
            file.sync_all().with_path(dest)?;
        }

        Ok(bytes_copied)
    }

    fn copy_buffered(&self, source: &Path, dest: &Path) -> Result<u64> {
        let src_file = File::open(source).with_path(source)?;
        let dst_file = File::create(dest).not_writable(dest)?;

        let mut reader = BufReader::with_capacity(self.options.buffer_size, src_file);
        let mut writer = BufWriter::with_capacity(self.options.buffer_size, dst_file);

        let bytes_copied = std::io::copy(&mut reader, &mut writer)
            .map_err(|e| TransferError::io(source, e))?;

        writer.flush().with_path(dest)?;

        Ok(bytes_copied)
    }

    fn copy_permissions(&self, source: &Path, dest: &Path) -> Result<()> {
        let metadata = std::fs::metadata(source).with_path(source)?;
        std::fs::set_permissions(dest, metadata.permissions()).with_path(dest)?;
        Ok(())
    }

    fn copy_times(&self, source: &Path, dest: &Path) -> Result<()> {
        let metadata = std::fs::metadata(source).with_path(source)?;
        let mtime = filetime::FileTime::from_last_modification_time(&metadata);
        let atime = filetime::FileTime::from_last_access_time(&metadata);
        filetime::set_file_times(dest, atime, mtime).with_path(dest)?;
        Ok(())
    }
}

/// Summary of a local copy
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    /// Where the source ended up
    pub destination: PathBuf,
    /// Files copied
    pub files_copied: u64,
    /// Directories created
    pub dirs_created: u64,
    /// Bytes copied
    pub bytes_copied: u64,
    /// Total duration
    pub duration: Duration,
}

/// Same-machine copier for files and directory trees
#[derive(Debug, Clone, Default)]
pub struct LocalCopier {
    copier: FileCopier,
}

impl LocalCopier {
    /// Create a local copier with the given file options
    pub fn new(options: CopyOptions) -> Self {
        Self {
            copier: FileCopier::new(options),
        }
    }

    /// Copy `source` to `destination`
    ///
    /// A directory source is merged into `destination`; files already there
    /// are overwritten. A file source lands at `destination`, or inside it
    /// when `destination` is an existing directory. A destination that is
    /// the source, or lies inside a directory source, is refused with
    /// `SameSourceAndDestination` before anything is written.
    pub fn copy(&self, source: &Path, destination: &Path) -> Result<CopyReport> {
        let metadata = match std::fs::metadata(source) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::SourceNotFound(source.to_path_buf()));
            }
            Err(e) => return Err(TransferError::io(source, e)),
        };

        let start = Instant::now();
        let mut report = if metadata.is_dir() {
            let real_source = std::fs::canonicalize(source).with_path(source)?;
            if resolve_path(destination)?.starts_with(&real_source) {
                return Err(TransferError::SameSourceAndDestination(
                    destination.to_path_buf(),
                ));
            }
            self.copy_tree(source, destination)?
        } else {
            let target = file_target(source, destination)?;
            let bytes_copied = self.copier.copy(source, &target)?;
            CopyReport {
                destination: target,
                files_copied: 1,
                dirs_created: 0,
                bytes_copied,
                duration: Duration::ZERO,
            }
        };
        report.duration = start.elapsed();

        tracing::info!(
            "Copied {} files ({} bytes) to {}",
            report.files_copied,
            report.bytes_copied,
            report.destination.display()
        );

        Ok(report)
    }

    fn copy_tree(&self, source: &Path, destination: &Path) -> Result<CopyReport> {
        let mut report = CopyReport {
            destination: destination.to_path_buf(),
            ..Default::default()
        };

        for entry in WalkDir::new(source).follow_links(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                match e.into_io_error() {
                    Some(io) => TransferError::io(path, io),
                    None => TransferError::io(
                        path,
                        std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"),
                    ),
                }
            })?;

            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = destination.join(relative);

            if entry.file_type().is_dir() {
                if !target.is_dir() {
                    std::fs::create_dir_all(&target).not_writable(&target)?;
                    report.dirs_created += 1;
                }
            } else {
                report.bytes_copied += self.copier.copy(entry.path(), &target)?;
                report.files_copied += 1;
            }
        }

        Ok(report)
    }
}

/// Resolve where a single file should land
fn file_target(source: &Path, destination: &Path) -> Result<PathBuf> {
    if destination.is_dir() {
        let name = source.file_name().ok_or_else(|| TransferError::UnsupportedSource {
            path: source.to_path_buf(),
            reason: "source has no file name".to_string(),
        })?;
        Ok(destination.join(name))
    } else {
        Ok(destination.to_path_buf())
    }
}

/// Whether `dest` already exists and is the same file as `source`
fn same_file(source: &Path, dest: &Path) -> Result<bool> {
    if !dest.exists() {
        return Ok(false);
    }
    let source = std::fs::canonicalize(source).with_path(source)?;
    let dest = std::fs::canonicalize(dest).with_path(dest)?;
    Ok(source == dest)
}

/// Absolute, symlink-free form of `path`, which need not exist yet
///
/// Components are canonicalized while they exist; the missing tail is
/// resolved lexically.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().with_path(path)?.join(path)
    };

    let mut resolved = PathBuf::new();
    let mut exists = true;
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                if exists {
                    match std::fs::canonicalize(&resolved) {
                        Ok(real) => resolved = real,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => exists = false,
                        Err(e) => return Err(TransferError::io(&resolved, e)),
                    }
                }
            }
            root => resolved.push(root),
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn create_test_tree(root: &Path) {
        create_test_file(root, "top.txt", b"top level");
        create_test_file(root, "sub/mid.txt", b"one level down");
        create_test_file(root, "sub/deeper/leaf.bin", &[0xAB; 10_000]);
        std::fs::create_dir_all(root.join("sub/empty")).unwrap();
    }

    fn relative_files(root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_copy_small_file() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = create_test_file(src_dir.path(), "test.txt", &[0xAB; 1024]);
        let dst = dst_dir.path().join("test.txt");

        let bytes = FileCopier::default().copy(&src, &dst).unwrap();

        assert_eq!(bytes, 1024);
        assert_eq!(std::fs::metadata(&dst).unwrap().len(), 1024);
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = create_test_file(src_dir.path(), "old.txt", b"old data");
        let past = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, past).unwrap();

        let dst = dst_dir.path().join("old.txt");
        FileCopier::default().copy(&src, &dst).unwrap();

        let meta = std::fs::metadata(&dst).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), past);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = create_test_file(src_dir.path(), "run.sh", b"#!/bin/sh\n");
        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o750)).unwrap();

        let dst = dst_dir.path().join("run.sh");
        FileCopier::default().copy(&src, &dst).unwrap();

        let mode = std::fs::metadata(&dst).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_file_into_existing_directory() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = create_test_file(src_dir.path(), "report.pdf", b"%PDF");
        let report = LocalCopier::default().copy(&src, dst_dir.path()).unwrap();

        assert_eq!(report.destination, dst_dir.path().join("report.pdf"));
        assert_eq!(std::fs::read(&report.destination).unwrap(), b"%PDF");
    }

    #[test]
    fn test_tree_copy_matches_source() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_tree(src.path());

        let target = dst.path().join("copy");
        let report = LocalCopier::default().copy(src.path(), &target).unwrap();

        assert_eq!(report.files_copied, 3);
        assert_eq!(relative_files(src.path()), relative_files(&target));
        for rel in relative_files(src.path()) {
            assert_eq!(
                std::fs::read(src.path().join(&rel)).unwrap(),
                std::fs::read(target.join(&rel)).unwrap()
            );
        }
        assert!(target.join("sub/empty").is_dir());
    }

    #[test]
    fn test_tree_recopy_overwrites() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_tree(src.path());

        let target = dst.path().join("copy");
        let copier = LocalCopier::default();
        copier.copy(src.path(), &target).unwrap();

        // Modify destination and source, then copy again
        std::fs::write(target.join("top.txt"), b"stale").unwrap();
        create_test_file(&target, "extra.txt", b"kept");
        std::fs::write(src.path().join("sub/mid.txt"), b"changed").unwrap();

        let report = copier.copy(src.path(), &target).unwrap();
        assert_eq!(report.files_copied, 3);
        assert_eq!(report.dirs_created, 0);

        assert_eq!(std::fs::read(target.join("top.txt")).unwrap(), b"top level");
        assert_eq!(std::fs::read(target.join("sub/mid.txt")).unwrap(), b"changed");
        assert_eq!(std::fs::read(target.join("extra.txt")).unwrap(), b"kept");
        assert_eq!(relative_files(&target).len(), 4);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = LocalCopier::default()
            .copy(&dir.path().join("nope"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, TransferError::SourceNotFound(_)));
    }

    #[test]
    fn test_destination_under_a_file_is_not_writable() {
        let dir = TempDir::new().unwrap();
        let src = create_test_file(dir.path(), "a.txt", b"a");
        let blocker = create_test_file(dir.path(), "blocker", b"file, not dir");

        let err = LocalCopier::default()
            .copy(&src, &blocker.join("a.txt"))
            .unwrap_err();
        assert!(matches!(err, TransferError::DestinationNotWritable { .. }));
    }

    #[test]
    fn test_file_onto_its_own_directory_is_refused() {
        let dir = TempDir::new().unwrap();
        let src = create_test_file(dir.path(), "a.txt", b"keep me");

        let err = LocalCopier::default().copy(&src, dir.path()).unwrap_err();
        assert!(matches!(err, TransferError::SameSourceAndDestination(_)));
        assert_eq!(std::fs::read(&src).unwrap(), b"keep me");
    }

    #[test]
    fn test_file_onto_itself_is_refused() {
        let dir = TempDir::new().unwrap();
        let src = create_test_file(dir.path(), "a.txt", b"keep me");

        // Same file reached through a different spelling
        let alias = dir.path().join(".").join("a.txt");
        let err = FileCopier::default().copy(&src, &alias).unwrap_err();
        assert!(matches!(err, TransferError::SameSourceAndDestination(_)));
        assert_eq!(std::fs::read(&src).unwrap(), b"keep me");
    }

    #[test]
    fn test_tree_into_itself_is_refused() {
        let dir = TempDir::new().unwrap();
        create_test_file(dir.path(), "sub/b.txt", b"data");

        let err = LocalCopier::default().copy(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, TransferError::SameSourceAndDestination(_)));

        let err = LocalCopier::default()
            .copy(dir.path(), &dir.path().join("sub/nested/copy"))
            .unwrap_err();
        assert!(matches!(err, TransferError::SameSourceAndDestination(_)));

        // Missing components and `..` do not hide the overlap
        let err = LocalCopier::default()
            .copy(dir.path(), &dir.path().join("gone/../copy"))
            .unwrap_err();
        assert!(matches!(err, TransferError::SameSourceAndDestination(_)));

        assert_eq!(std::fs::read(dir.path().join("sub/b.txt")).unwrap(), b"data");
        assert!(!dir.path().join("sub/nested").exists());
        assert!(!dir.path().join("copy").exists());
    }

    #[test]
    fn test_tree_into_sibling_is_allowed() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("src");
        create_test_file(&src, "b.txt", b"data");

        // Shares a name prefix with the source but is not inside it
        let report = LocalCopier::default()
            .copy(&src, &root.path().join("src-copy"))
            .unwrap();
        assert_eq!(report.files_copied, 1);
    }
}
