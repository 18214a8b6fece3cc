//! Enrollment loader: `<root>/<PersonName>/<image>` into labelled RGB images.

use image::RgbImage;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions accepted as enrollment images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One decoded enrollment photo.
#[derive(Debug, Clone)]
pub struct EnrollmentImage {
    /// Person name: the name of the folder holding the photo.
    pub label: String,
    pub path: PathBuf,
    pub image: RgbImage,
}

/// All decoded enrollment photos, in directory scan order.
#[derive(Debug, Clone, Default)]
pub struct Enrollment {
    pub images: Vec<EnrollmentImage>,
}

impl Enrollment {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Person label of each image, index-aligned with `images`.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|i| i.label.as_str())
    }

    /// Distinct person names.
    pub fn classes(&self) -> BTreeSet<&str> {
        self.labels().collect()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Decode an image, sniffing the format from content before trusting the extension.
fn decode_rgb(path: &Path) -> Result<RgbImage, image::ImageError> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.decode()?.to_rgb8())
}

/// Sorted entries of a directory; unreadable directories yield nothing.
fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "failed to read directory");
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    paths
}

/// Load every enrollment image below `root`.
///
/// Each immediate subdirectory is one person. Files that fail to decode are
/// logged and skipped. A missing or empty `root` produces an empty enrollment.
pub fn load_enrollment(root: &Path) -> Enrollment {
    let mut enrollment = Enrollment::default();

    if !root.is_dir() {
        tracing::warn!(path = %root.display(), "dataset directory does not exist");
        return enrollment;
    }

    tracing::info!(path = %root.display(), "loading images from dataset");

    for person_dir in sorted_entries(root) {
        if !person_dir.is_dir() {
            continue;
        }
        let Some(label) = person_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        for file in sorted_entries(&person_dir) {
            if !file.is_file() || !has_image_extension(&file) {
                continue;
            }
            match decode_rgb(&file) {
                Ok(image) => enrollment.images.push(EnrollmentImage {
                    label: label.clone(),
                    path: file,
                    image,
                }),
                Err(e) => {
                    tracing::warn!(
                        path = %file.display(),
                        error = %e,
                        "failed to load image; skipping"
                    );
                }
            }
        }
    }

    tracing::info!(
        images = enrollment.len(),
        classes = ?enrollment.classes(),
        "enrollment loaded"
    );

    enrollment
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_png(path: &Path) {
        RgbImage::from_pixel(8, 8, Rgb([200, 100, 50])).save(path).unwrap();
    }

    #[test]
    fn test_extension_filter() {
        assert!(has_image_extension(Path::new("a/b.png")));
        assert!(has_image_extension(Path::new("a/b.JPG")));
        assert!(has_image_extension(Path::new("a/b.Jpeg")));
        assert!(!has_image_extension(Path::new("a/b.gif")));
        assert!(!has_image_extension(Path::new("a/README")));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let enrollment = load_enrollment(&dir.path().join("absent"));
        assert!(enrollment.is_empty());
    }

    #[test]
    fn test_empty_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_enrollment(dir.path()).is_empty());
    }

    #[test]
    fn test_labels_match_folders() {
        let dir = tempfile::tempdir().unwrap();
        for (person, files) in [("alice", 2), ("bob", 1)] {
            let person_dir = dir.path().join(person);
            fs::create_dir(&person_dir).unwrap();
            for i in 0..files {
                write_png(&person_dir.join(format!("{i}.png")));
            }
        }

        let enrollment = load_enrollment(dir.path());
        assert_eq!(enrollment.len(), 3);
        assert_eq!(enrollment.labels().collect::<Vec<_>>(), vec!["alice", "alice", "bob"]);
        for item in &enrollment.images {
            let folder = item.path.parent().unwrap().file_name().unwrap();
            assert_eq!(folder.to_str().unwrap(), item.label);
        }
        assert_eq!(enrollment.classes().len(), 2);
    }

    #[test]
    fn test_skips_undecodable_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let person_dir = dir.path().join("carol");
        fs::create_dir(&person_dir).unwrap();
        write_png(&person_dir.join("good.png"));
        fs::rename(person_dir.join("good.png"), person_dir.join("good.PNG")).unwrap();
        fs::write(person_dir.join("corrupt.jpg"), b"not a jpeg").unwrap();
        fs::write(person_dir.join("notes.txt"), b"hello").unwrap();
        // Loose files at the top level are not people.
        write_png(&dir.path().join("stray.png"));

        let enrollment = load_enrollment(dir.path());
        assert_eq!(enrollment.len(), 1);
        assert_eq!(enrollment.images[0].label, "carol");
        assert_eq!(enrollment.images[0].image.dimensions(), (8, 8));
    }
}
