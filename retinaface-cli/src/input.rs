//! Input collection.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use walkdir::WalkDir;

/// File extensions treated as images when walking a directory.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Collect all image paths from a file or directory, sorted.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if has_image_extension(entry.path()) {
            images.push(entry.path().to_path_buf());
        } else {
            debug!("Skipping non-image file {}", entry.path().display());
        }
    }
    images.sort();
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn walks_directories_and_filters_extensions() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        for name in ["b.JPG", "a.png", "notes.txt", "nested/c.webp", "nested/noext"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let images = collect_images(dir.path()).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG", "nested/c.webp"]);
    }

    #[test]
    fn single_file_is_returned_as_is() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("face.txt");
        fs::write(&file, b"").unwrap();
        assert_eq!(collect_images(&file).unwrap(), vec![file]);
    }

    #[test]
    fn missing_path_is_rejected() {
        assert!(collect_images(Path::new("no/such/dir")).is_err());
    }
}
