use std::path::{Path, PathBuf};

/// Diffuse texture keyed by its source path. The image is filled in once it has been uploaded.
pub struct Texture<I> {
    pub path: PathBuf,
    pub image: Option<I>,
}

impl<I> Texture<I> {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            image: None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.image.is_some()
    }
}
