//! Multipart intake for `/predict`: pick out the image field, validate its
//! name, and stream it into a scratch file that lives only as long as the
//! request.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use actix_multipart::Multipart;
use actix_web::error::BlockingError;
use actix_web::web;
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Form field carrying the image.
pub const FILE_FIELD: &str = "file";

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Lower-cased extension of a client supplied filename, if any.
pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Check a client filename and return the extension to store it under.
pub fn validate_filename(filename: &str) -> Result<String, ApiError> {
    if filename.is_empty() {
        return Err(ApiError::NoFileSelected);
    }
    match extension(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(ApiError::InvalidFileType),
    }
}

/// A uniquely named file in the scratch directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    pub fn create(dir: &Path, extension: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&format!(".{extension}"))
            .tempfile_in(dir)?;
        debug!(path = %file.path().display(), "created scratch file");
        Ok(ScratchFile { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }
}

impl Drop for ScratchFile {
    // Removed here so failures get logged; the inner `NamedTempFile` then
    // finds nothing left to delete.
    fn drop(&mut self) {
        let path = self.file.path();
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed scratch file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "failed to remove scratch file: {e}"),
        }
    }
}

/// The accepted image, already on disk.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub size: usize,
    pub file: ScratchFile,
}

/// Read the multipart body, keeping the first `file` field that carries a
/// filename and draining everything else. Fails with
/// [`ApiError::PayloadTooLarge`] as soon as more than `limit` bytes arrive.
pub async fn receive_upload(
    mut payload: Multipart,
    dir: PathBuf,
    limit: usize,
) -> Result<Upload, ApiError> {
    let too_large = || ApiError::PayloadTooLarge { limit_bytes: limit };
    let pool_failed = |e: BlockingError| ApiError::Upload(e.to_string());
    let mut received = 0usize;
    let mut upload: Option<Upload> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| {
            warn!("unreadable multipart body: {e}");
            ApiError::NoFileUploaded
        })?;

        let (name, filename) = {
            let cd = field.content_disposition();
            (
                cd.get_name().map(String::from),
                cd.get_filename().map(String::from),
            )
        };

        let filename = match filename {
            Some(filename) if upload.is_none() && name.as_deref() == Some(FILE_FIELD) => filename,
            _ => {
                while let Some(chunk) = field.next().await {
                    received += chunk.map_err(|_| ApiError::NoFileUploaded)?.len();
                    if received > limit {
                        return Err(too_large());
                    }
                }
                continue;
            }
        };

        debug!(%filename, "file field received");
        let ext = validate_filename(&filename)?;

        let scratch_dir = dir.clone();
        let mut file = web::block(move || ScratchFile::create(&scratch_dir, &ext))
            .await
            .map_err(pool_failed)?
            .map_err(|e| {
                warn!("failed to create scratch file: {e}");
                ApiError::Upload(e.to_string())
            })?;

        let mut size = 0;
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| {
                warn!("upload interrupted: {e}");
                ApiError::NoFileUploaded
            })?;
            received += data.len();
            size += data.len();
            if received > limit {
                return Err(too_large());
            }

            file = web::block(move || file.write_all(&data).map(|_| file))
                .await
                .map_err(pool_failed)?
                .map_err(|e| {
                    warn!("failed to write scratch file: {e}");
                    ApiError::Upload(e.to_string())
                })?;
        }

        upload = Some(Upload {
            filename,
            size,
            file,
        });
    }

    upload.ok_or(ApiError::NoFileUploaded)
}
