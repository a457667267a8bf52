use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::Path;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zip::{result::ZipError, write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::config::is_safe_file_name;
use crate::error::ApiError;
use crate::models::{Article, Category};
use crate::store::StoreError;
use crate::AppState;

pub const ARTICLES_ENTRY: &str = "articles.json";
pub const CATEGORIES_ENTRY: &str = "categories.json";
pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const UPLOADS_PREFIX: &str = "uploads/";

/// Format version written to `manifest.json`
pub const BACKUP_VERSION: u32 = 1;

/// Largest single entry accepted on restore
const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// The restore route takes `max_restore_bytes` in place of the app-wide
/// upload limit
pub fn routes(max_restore_bytes: usize) -> axum::Router<AppState> {
    axum::Router::new()
        .route("/api/backup", axum::routing::get(download_backup))
        .route(
            "/api/restore",
            axum::routing::post(restore_backup).layer(DefaultBodyLimit::max(max_restore_bytes)),
        )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub articles: usize,
    pub categories: usize,
    pub images: usize,
}

/// Everything a backup archive carries
#[derive(Debug, Default)]
pub struct BackupContents {
    pub articles: Vec<Article>,
    pub categories: Vec<Category>,
    /// `(file name, bytes)` for each stored upload
    pub images: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub articles: usize,
    pub categories: usize,
    pub images: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Archive error: {0}")]
    Zip(#[from] ZipError),
    #[error("Backup is missing {0}")]
    MissingEntry(&'static str),
    #[error("Backup entry {name} is invalid: {source}")]
    InvalidEntry {
        name: String,
        source: serde_json::Error,
    },
    #[error("Backup entry {0} is too large")]
    EntryTooLarge(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BackupError> for ApiError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::Zip(_)
            | BackupError::MissingEntry(_)
            | BackupError::InvalidEntry { .. }
            | BackupError::EntryTooLarge(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_backup", e.to_string())
            }
            BackupError::Store(e) => e.into(),
            BackupError::Io(_) => {
                tracing::error!("Backup I/O failure: {}", e);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "backup_failed",
                    e.to_string(),
                )
            }
        }
    }
}

/// GET /api/backup
/// Download both collections and all uploads as a ZIP archive
async fn download_backup(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let (articles, categories) = state.store.snapshot().await?;
    let images = read_upload_dir(&state.config.upload_dir)
        .await
        .map_err(BackupError::from)?;

    let contents = BackupContents {
        articles,
        categories,
        images,
    };
    let now = Utc::now();
    let archive = write_archive(&contents, now)?;

    info!(
        "Created backup: {} articles, {} categories, {} images, {} bytes",
        contents.articles.len(),
        contents.categories.len(),
        contents.images.len(),
        archive.len()
    );

    let file_name = format!("paperboard-backup-{}.zip", now.format("%Y%m%d-%H%M%S"));
    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        archive,
    ))
}

/// POST /api/restore
/// Replace both collections from an uploaded backup archive. Nothing is
/// written unless both collections parse.
async fn restore_backup(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        let named = matches!(field.name(), Some("backup") | Some("file"));
        if named || field.file_name().is_some() {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let Some(bytes) = upload else {
        return Err(ApiError::validation("multipart field 'backup' is required"));
    };

    let contents = read_archive(&bytes)?;

    // Images before collections: restored articles must not reference missing files
    for (name, data) in &contents.images {
        let path = state.config.upload_dir.join(name);
        tokio::fs::write(&path, data)
            .await
            .map_err(BackupError::from)?;
    }

    state
        .store
        .replace_all(&contents.articles, &contents.categories)
        .await?;

    info!(
        "Restored backup: {} articles, {} categories, {} images",
        contents.articles.len(),
        contents.categories.len(),
        contents.images.len()
    );

    Ok(Json(RestoreResponse {
        articles: contents.articles.len(),
        categories: contents.categories.len(),
        images: contents.images.len(),
    }))
}

/// Pack a backup into an in-memory ZIP archive
pub fn write_archive(
    contents: &BackupContents,
    created_at: DateTime<Utc>,
) -> Result<Vec<u8>, BackupError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let manifest = Manifest {
        version: BACKUP_VERSION,
        created_at,
        articles: contents.articles.len(),
        categories: contents.categories.len(),
        images: contents.images.len(),
    };

    write_json(&mut writer, MANIFEST_ENTRY, &manifest, deflated)?;
    write_json(&mut writer, ARTICLES_ENTRY, &contents.articles, deflated)?;
    write_json(&mut writer, CATEGORIES_ENTRY, &contents.categories, deflated)?;

    // Stored images are already JPEG
    for (name, data) in &contents.images {
        writer.start_file(format!("{}{}", UPLOADS_PREFIX, name), stored)?;
        writer.write_all(data)?;
    }

    Ok(writer.finish()?.into_inner())
}

fn write_json<T: Serialize + ?Sized>(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &'static str,
    value: &T,
    options: SimpleFileOptions,
) -> Result<(), BackupError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| BackupError::InvalidEntry {
        name: name.to_string(),
        source,
    })?;
    writer.start_file(name, options)?;
    writer.write_all(&json)?;
    Ok(())
}

/// Unpack and validate a backup archive
pub fn read_archive(bytes: &[u8]) -> Result<BackupContents, BackupError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let articles = read_json(&mut archive, ARTICLES_ENTRY)?;
    let categories = read_json(&mut archive, CATEGORIES_ENTRY)?;

    let mut images = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(file_name) = entry.name().strip_prefix(UPLOADS_PREFIX).map(str::to_string) else {
            continue;
        };
        if !is_safe_file_name(&file_name) {
            warn!("Skipping backup entry with unsafe name {:?}", entry.name());
            continue;
        }
        let size = entry.size();
        let data = read_entry(&mut entry, size, &file_name)?;
        images.push((file_name, data));
    }

    Ok(BackupContents {
        articles,
        categories,
        images,
    })
}

fn read_json<T, R>(archive: &mut ZipArchive<R>, name: &'static str) -> Result<T, BackupError>
where
    T: serde::de::DeserializeOwned,
    R: Read + std::io::Seek,
{
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(BackupError::MissingEntry(name)),
        Err(e) => return Err(e.into()),
    };
    let size = entry.size();
    let data = read_entry(&mut entry, size, name)?;
    serde_json::from_slice(&data).map_err(|source| BackupError::InvalidEntry {
        name: name.to_string(),
        source,
    })
}

fn read_entry(entry: impl Read, size: u64, name: &str) -> Result<Vec<u8>, BackupError> {
    if size > MAX_ENTRY_BYTES {
        return Err(BackupError::EntryTooLarge(name.to_string()));
    }
    let mut data = Vec::with_capacity(size as usize);
    entry.take(MAX_ENTRY_BYTES + 1).read_to_end(&mut data)?;
    if data.len() as u64 > MAX_ENTRY_BYTES {
        return Err(BackupError::EntryTooLarge(name.to_string()));
    }
    Ok(data)
}

async fn read_upload_dir(dir: &Path) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_safe_file_name(&name) {
            continue;
        }
        images.push((name, tokio::fs::read(entry.path()).await?));
    }
    images.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(images)
}
