use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Server configuration, read from `PAPERBOARD_*` environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub public_url: String,
    pub frontend_url: String,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub max_backup_bytes: usize,
    pub image_max_width: u32,
    pub image_quality: u8,
    pub admin_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            upload_dir: data_dir.join("uploads"),
            data_dir,
            public_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 10 * 1024 * 1024, // 10 MB
            max_backup_bytes: 1024 * 1024 * 1024, // 1 GB
            image_max_width: 1200,
            image_quality: 80,
            admin_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    /// for missing or malformed values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = get("PAPERBOARD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let upload_dir = get("PAPERBOARD_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("uploads"));

        let allowed_origins = get("PAPERBOARD_ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        let image_quality = parse_or(
            "PAPERBOARD_IMAGE_QUALITY",
            get("PAPERBOARD_IMAGE_QUALITY"),
            defaults.image_quality,
        )
        .clamp(1, 100);

        Self {
            bind_addr: parse_or(
                "PAPERBOARD_BIND_ADDR",
                get("PAPERBOARD_BIND_ADDR"),
                defaults.bind_addr,
            ),
            data_dir,
            upload_dir,
            public_url: get("PAPERBOARD_PUBLIC_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_url),
            frontend_url: get("PAPERBOARD_FRONTEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.frontend_url),
            allowed_origins,
            max_upload_bytes: parse_or(
                "PAPERBOARD_MAX_UPLOAD_BYTES",
                get("PAPERBOARD_MAX_UPLOAD_BYTES"),
                defaults.max_upload_bytes,
            ),
            max_backup_bytes: parse_or(
                "PAPERBOARD_MAX_BACKUP_BYTES",
                get("PAPERBOARD_MAX_BACKUP_BYTES"),
                defaults.max_backup_bytes,
            ),
            image_max_width: parse_or(
                "PAPERBOARD_IMAGE_MAX_WIDTH",
                get("PAPERBOARD_IMAGE_MAX_WIDTH"),
                defaults.image_max_width,
            )
            .max(1),
            image_quality,
            admin_token: get("PAPERBOARD_ADMIN_TOKEN"),
        }
    }

    pub fn articles_path(&self) -> PathBuf {
        self.data_dir.join("articles.json")
    }

    pub fn categories_path(&self) -> PathBuf {
        self.data_dir.join("categories.json")
    }

    /// Resolve a public `/uploads/<file>` URL to its location on disk.
    /// Returns `None` for anything that is not a plain file in the upload dir.
    pub fn upload_path(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix("/uploads/")?;
        if !is_safe_file_name(name) {
            return None;
        }
        Some(self.upload_dir.join(name))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value {:?} for {}", raw, key);
            default
        }),
        None => default,
    }
}

/// Plain file names only: no separators, no parent refs, no dotfiles
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && Path::new(name).file_name().map(|n| n == name).unwrap_or(false)
}
