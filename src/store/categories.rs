use std::path::PathBuf;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{JsonFile, StoreError};
use crate::models::Category;
use crate::slug::{slugify, unique_slug};

pub struct CategoryRepository {
    file: JsonFile<Category>,
}

impl CategoryRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub(super) fn file(&self) -> &JsonFile<Category> {
        &self.file
    }

    /// All categories ordered by name
    pub async fn list(&self) -> Result<Vec<Category>, StoreError> {
        let mut categories = self.file.load().await?;
        categories.sort_by_key(|c| c.name.to_lowercase());
        Ok(categories)
    }

    pub async fn get(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        let categories = self.file.load().await?;
        Ok(categories.into_iter().find(|c| c.slug == slug))
    }

    /// Create a category. Names are unique ignoring case.
    pub async fn create(
        &self,
        (name, description): (String, Option<String>),
    ) -> Result<Category, CategoryError> {
        let category = self
            .file
            .modify(|categories| {
                let lowered = name.to_lowercase();
                if categories.iter().any(|c| c.name.to_lowercase() == lowered) {
                    return Err(CategoryError::AlreadyExists(name.clone()));
                }

                let slug = unique_slug(
                    &slugify(&name),
                    "category",
                    categories.iter().map(|c| c.slug.as_str()),
                );
                let category = Category {
                    id: Uuid::new_v4().to_string(),
                    name: name.clone(),
                    slug,
                    description,
                    created_at: Utc::now(),
                };
                categories.push(category.clone());
                Ok(category)
            })
            .await?;

        info!("Created category {} ({})", category.slug, category.id);
        Ok(category)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("Category {0:?} already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> (String, Option<String>) {
        (name.to_string(), None)
    }

    #[tokio::test]
    async fn test_create_and_list_sorted() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = CategoryRepository::new(temp_dir.path().join("categories.json"));

        repo.create(named("web")).await.unwrap();
        repo.create(named("Apps")).await.unwrap();
        let rust = repo
            .create(("Rust Lang".to_string(), Some("Systems".to_string())))
            .await
            .unwrap();
        assert_eq!(rust.slug, "rust-lang");
        assert_eq!(rust.description.as_deref(), Some("Systems"));

        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Apps", "Rust Lang", "web"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = CategoryRepository::new(temp_dir.path().join("categories.json"));

        repo.create(named("News")).await.unwrap();
        let result = repo.create(named("NEWS")).await;
        assert!(matches!(result, Err(CategoryError::AlreadyExists(_))));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_colliding_slug_gets_suffix() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = CategoryRepository::new(temp_dir.path().join("categories.json"));

        repo.create(named("C++")).await.unwrap();
        let second = repo.create(named("C")).await.unwrap();
        assert_eq!(second.slug, "c-2");
        assert!(repo.get("c-2").await.unwrap().is_some());
    }
}
