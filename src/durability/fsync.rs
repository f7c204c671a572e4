// File Sync Operations
use std::fs::File;
use std::io;
use std::path::Path;

pub fn sync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

pub fn sync_data(file: &File) -> io::Result<()> {
    file.sync_data()
}

/// Persist directory entries (renames, creations) inside `dir`.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Persist the directory entry for `path` itself. A bare file name syncs the
/// current directory.
pub fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => sync_dir(parent),
        _ => sync_dir(Path::new(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sync_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("wal.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap();

        sync_parent_dir(&path).unwrap();
        sync_parent_dir(path.parent().unwrap()).unwrap();
        sync_parent_dir(Path::new("wal.log")).unwrap();
    }
}
