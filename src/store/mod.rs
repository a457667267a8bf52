pub use articles::ArticleRepository;
pub use categories::{CategoryError, CategoryRepository};
pub use file::JsonFile;

mod articles;
mod categories;
mod file;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::models::{Article, Category};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Both JSON collections. Operations spanning the two files always lock
/// categories before articles.
#[derive(Clone)]
pub struct Store {
    pub articles: Arc<ArticleRepository>,
    pub categories: Arc<CategoryRepository>,
}

impl Store {
    pub fn new(config: &Config) -> Self {
        Self {
            articles: Arc::new(ArticleRepository::new(config.articles_path())),
            categories: Arc::new(CategoryRepository::new(config.categories_path())),
        }
    }

    /// Delete a category and strip its slug from every article.
    /// Returns the removed category and how many articles were touched.
    pub async fn delete_category(
        &self,
        slug: &str,
    ) -> Result<Option<(Category, usize)>, StoreError> {
        let categories = self.categories.file().lock().await;
        let articles = self.articles.file().lock().await;

        let mut category_list = categories.load().await?;
        let Some(pos) = category_list.iter().position(|c| c.slug == slug) else {
            return Ok(None);
        };
        let removed = category_list.remove(pos);

        let mut article_list = articles.load().await?;
        let mut touched = 0;
        for article in article_list.iter_mut() {
            let before = article.categories.len();
            article.categories.retain(|c| c != slug);
            if article.categories.len() != before {
                touched += 1;
            }
        }

        categories.save(&category_list).await?;
        if touched > 0 {
            articles.save(&article_list).await?;
        }

        info!("Deleted category {} ({} articles updated)", slug, touched);
        Ok(Some((removed, touched)))
    }

    /// Consistent copy of both collections
    pub async fn snapshot(&self) -> Result<(Vec<Article>, Vec<Category>), StoreError> {
        let categories = self.categories.file().lock().await;
        let articles = self.articles.file().lock().await;
        Ok((articles.load().await?, categories.load().await?))
    }

    /// Overwrite both collections, used by restore
    pub async fn replace_all(
        &self,
        article_list: &[Article],
        category_list: &[Category],
    ) -> Result<(), StoreError> {
        let categories = self.categories.file().lock().await;
        let articles = self.articles.file().lock().await;
        categories.save(category_list).await?;
        articles.save(article_list).await?;

        info!(
            "Replaced store contents: {} articles, {} categories",
            article_list.len(),
            category_list.len()
        );
        Ok(())
    }
}

/// Create the data and upload directories and seed empty collections
pub async fn init_store(config: &Config) -> Result<Store, StoreError> {
    info!("Preparing data directory {}", config.data_dir.display());

    for dir in [&config.data_dir, &config.upload_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::io(dir, e))?;
    }

    let store = Store::new(config);
    store.categories.file().ensure_exists().await?;
    store.articles.file().ensure_exists().await?;

    info!("Data directory ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateArticleRequest, CreateCategoryRequest};
    use serde_json::json;

    fn test_config(dir: &Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            upload_dir: dir.join("uploads"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_init_store_creates_layout() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        init_store(&config).await.unwrap();

        assert!(config.upload_dir.is_dir());
        assert!(config.articles_path().is_file());
        assert!(config.categories_path().is_file());
    }

    #[tokio::test]
    async fn test_delete_category_strips_articles() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = init_store(&test_config(temp_dir.path())).await.unwrap();

        let category = store
            .categories
            .create(
                CreateCategoryRequest {
                    name: "Tech".to_string(),
                    description: None,
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();

        let new = CreateArticleRequest {
            title: "Hello".to_string(),
            content: "World".to_string(),
            categories: json!(["tech", "news"]),
            ..Default::default()
        }
        .validate()
        .unwrap();
        store.articles.create(new).await.unwrap();

        let (removed, touched) = store
            .delete_category(&category.slug)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.name, "Tech");
        assert_eq!(touched, 1);

        let article = store.articles.get("hello").await.unwrap().unwrap();
        assert_eq!(article.categories, vec!["news"]);
        assert!(store.categories.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_category() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = init_store(&test_config(temp_dir.path())).await.unwrap();
        assert!(store.delete_category("nope").await.unwrap().is_none());
    }
}
