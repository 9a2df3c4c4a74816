use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Public prefix under which rendered PDFs are served.
pub const FILES_ROUTE: &str = "/files";

pub fn ensure_dirs(certificates_folder: &Path, upload_folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(certificates_folder)?;
    std::fs::create_dir_all(upload_folder)?;
    Ok(())
}

pub fn artifact_file_name(code: &str) -> String {
    format!("{}.pdf", code)
}

pub fn artifact_url(file_name: &str) -> String {
    format!("{}/{}", FILES_ROUTE, file_name)
}

/// Resolves a stored `certificate_url` back to a file under `folder`.
pub fn artifact_path(folder: &Path, certificate_url: &str) -> Option<PathBuf> {
    let file_name = certificate_url.strip_prefix(FILES_ROUTE)?.trim_start_matches('/');
    if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
        return None;
    }
    Some(folder.join(file_name))
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset reference {0:?} escapes the upload folder")]
    OutsideUploads(String),

    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("reading {path} failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Loads template backgrounds, logos and signatures.
///
/// References are either `http(s)://` URLs or paths relative to the upload folder.
#[derive(Clone)]
pub struct AssetLoader {
    client: reqwest::Client,
    upload_folder: PathBuf,
}

impl AssetLoader {
    pub fn new(upload_folder: PathBuf) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            upload_folder,
        }
    }

    pub async fn load(&self, reference: &str) -> Result<Vec<u8>, AssetError> {
        let reference = reference.trim();
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return self.fetch(reference).await;
        }

        let path = self.local_path(reference)?;
        tokio::fs::read(&path).await.map_err(|source| AssetError::Read {
            path: path.display().to_string(),
            source,
        })
    }

    /// Best-effort variant: logs and returns `None` on any failure.
    pub async fn load_optional(&self, what: &str, reference: Option<&str>) -> Option<Vec<u8>> {
        let reference = reference.map(str::trim).filter(|r| !r.is_empty())?;
        match self.load(reference).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(asset = what, error = %e, "Skipping unavailable asset");
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| AssetError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| AssetError::Fetch {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    fn local_path(&self, reference: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(reference.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(AssetError::OutsideUploads(reference.to_string()));
        }
        Ok(self.upload_folder.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_url_round_trips_to_a_path() {
        let url = artifact_url(&artifact_file_name("CERT-1-ABC"));
        assert_eq!(url, "/files/CERT-1-ABC.pdf");
        assert_eq!(
            artifact_path(Path::new("/data/certs"), &url),
            Some(PathBuf::from("/data/certs/CERT-1-ABC.pdf"))
        );
    }

    #[test]
    fn artifact_path_rejects_foreign_urls() {
        let folder = Path::new("/data/certs");
        assert_eq!(artifact_path(folder, ""), None);
        assert_eq!(artifact_path(folder, "/files/../secret.pdf"), None);
        assert_eq!(artifact_path(folder, "/elsewhere/x.pdf"), None);
    }

    #[tokio::test]
    async fn local_assets_stay_inside_uploads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), b"png").unwrap();
        let loader = AssetLoader::new(dir.path().to_path_buf());

        assert_eq!(loader.load("logo.png").await.unwrap(), b"png".to_vec());
        assert_eq!(loader.load("/logo.png").await.unwrap(), b"png".to_vec());
        assert!(matches!(
            loader.load("../etc/passwd").await,
            Err(AssetError::OutsideUploads(_))
        ));
    }

    #[tokio::test]
    async fn missing_optional_asset_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let loader = AssetLoader::new(dir.path().to_path_buf());

        assert_eq!(loader.load_optional("logo", Some("missing.png")).await, None);
        assert_eq!(loader.load_optional("logo", None).await, None);
        assert_eq!(loader.load_optional("logo", Some("  ")).await, None);
    }
}
