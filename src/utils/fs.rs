use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Recursively copy a directory, creating `dst` and any missing parents.
/// Symlinks are followed.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    for entry in walkdir::WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

/// Copy a file or a directory tree to `dst`
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        return copy_dir_all(src, dst);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Copy a file or directory tree so that `dst` appears complete or not at
/// all. The copy is staged in a temporary sibling and renamed into place.
pub fn copy_path_atomic(src: &Path, dst: &Path) -> Result<()> {
    let parent = dst
        .parent()
        .with_context(|| format!("No parent directory for {}", dst.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(".jobline-copy-")
        .tempdir_in(parent)
        .with_context(|| format!("Failed to create staging directory in {}", parent.display()))?;
    let staged = staging.path().join("data");
    copy_path(src, &staged)?;
    fs::rename(&staged, dst)
        .with_context(|| format!("Failed to move {} into place", dst.display()))?;
    Ok(())
}

/// Read a text file, keeping at most `line_limit` lines. Invalid UTF-8 is replaced.
pub fn read_lines_limited(path: &Path, line_limit: Option<usize>) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut text = String::new();
    let mut buf = Vec::new();
    let mut lines = 0;

    loop {
        if line_limit.is_some_and(|limit| lines >= limit) {
            break;
        }
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        text.push_str(&String::from_utf8_lossy(&buf));
        lines += 1;
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_all_copies_nested_files() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("process"), "#!/bin/sh\n").unwrap();
        fs::write(src.join("lib").join("helper.txt"), "x").unwrap();

        let dst = temp.path().join("a").join("b");
        copy_dir_all(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("lib").join("helper.txt")).unwrap(), "x");
        assert!(dst.join("process").is_file());
        assert!(src.join("process").is_file());
    }

    #[test]
    fn test_copy_path_handles_single_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("out.txt");
        fs::write(&src, "hello").unwrap();
        let dst = temp.path().join("new").join("out.txt");
        copy_path(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst).unwrap(), "hello");
    }

    #[test]
    fn test_copy_path_atomic_moves_complete_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("legacy");
        fs::create_dir_all(src.join("7")).unwrap();
        fs::write(src.join("7").join("1.txt"), "stage one").unwrap();

        let dst = temp.path().join("current").join("bench");
        copy_path_atomic(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("7").join("1.txt")).unwrap(), "stage one");
        assert_eq!(fs::read_dir(temp.path().join("current")).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_path_atomic_leaves_nothing_on_failure() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("legacy");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(temp.path().join("missing"), src.join("broken")).unwrap();

        let dst = temp.path().join("current").join("bench");
        assert!(copy_path_atomic(&src, &dst).is_err());
        assert!(!dst.exists());
        assert_eq!(fs::read_dir(temp.path().join("current")).unwrap().count(), 0);
    }

    #[test]
    fn test_read_lines_limited() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.txt");
        fs::write(&path, "one\ntwo\nthree\n").unwrap();
        assert_eq!(read_lines_limited(&path, Some(2)).unwrap(), "one\ntwo\n");
        assert_eq!(read_lines_limited(&path, None).unwrap(), "one\ntwo\nthree\n");
        assert_eq!(read_lines_limited(&path, Some(0)).unwrap(), "");
    }
}
