use std::path::{Path, PathBuf};

use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

use crate::err::Error;

const PROFILE_PICS: &str = "profile_pics";
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// An uploaded file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Writes uploads under the static directory and hands back their public paths.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            url_prefix: "/static".to_string(),
        }
    }

    pub async fn prepare_io(&self) -> std::io::Result<()> {
        create_dir_all(self.root.join(PROFILE_PICS)).await
    }

    /// Stores a profile picture under a fresh name and returns its public path.
    pub async fn save_profile_image(&self, upload: &Upload) -> Result<String, Error> {
        let extension = image_extension(&upload.file_name)?;
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let dir = self.root.join(PROFILE_PICS);
        create_dir_all(&dir).await?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&file_name))
            .await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&upload.bytes).await?;
        writer.flush().await?;

        Ok(format!("{}/{}/{}", self.url_prefix, PROFILE_PICS, file_name))
    }
}

fn image_extension(file_name: &str) -> Result<String, Error> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(Error::bad_request(format!(
            "Unsupported image type for `{}`",
            file_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn images_get_generated_names() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let upload = Upload {
            file_name: "../../etc/me.PNG".to_string(),
            bytes: b"not really a png".to_vec(),
        };

        let first = media.save_profile_image(&upload).await.unwrap();
        let second = media.save_profile_image(&upload).await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("/static/profile_pics/"));
        assert!(first.ends_with(".png"));

        let stored = dir
            .path()
            .join(first.trim_start_matches("/static/"));
        assert_eq!(std::fs::read(stored).unwrap(), upload.bytes);
    }

    #[tokio::test]
    async fn non_images_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let upload = Upload {
            file_name: "script.sh".to_string(),
            bytes: Vec::new(),
        };
        assert!(matches!(
            media.save_profile_image(&upload).await,
            Err(Error::BadRequest { .. })
        ));
    }
}
