use std::path::PathBuf;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{JsonFile, StoreError};
use crate::models::{excerpt, Article, ArticleFilter, NewArticle, EXCERPT_CHARS};
use crate::slug::{slugify, unique_slug};

pub struct ArticleRepository {
    file: JsonFile<Article>,
}

/// An article removed from the store
#[derive(Debug)]
pub struct DeletedArticle {
    pub article: Article,
    /// The article's image, when no remaining article references it
    pub orphaned_image: Option<String>,
}

impl ArticleRepository {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub(super) fn file(&self) -> &JsonFile<Article> {
        &self.file
    }

    /// Filtered page of articles, newest first, plus the filtered total
    pub async fn list(&self, filter: &ArticleFilter) -> Result<(Vec<Article>, usize), StoreError> {
        let articles = self.file.load().await?;
        Ok(apply_filter(articles, filter))
    }

    /// Get an article by slug
    pub async fn get(&self, slug: &str) -> Result<Option<Article>, StoreError> {
        let articles = self.file.load().await?;
        Ok(articles.into_iter().find(|a| a.slug == slug))
    }

    /// Store a new article under a slug no other article uses
    pub async fn create(&self, new: NewArticle) -> Result<Article, StoreError> {
        let article = self
            .file
            .modify(|articles| {
                let slug = unique_slug(
                    &slugify(&new.title),
                    "article",
                    articles.iter().map(|a| a.slug.as_str()),
                );

                let article = Article {
                    id: Uuid::new_v4().to_string(),
                    excerpt: excerpt(&new.content, EXCERPT_CHARS),
                    title: new.title,
                    slug,
                    content: new.content,
                    author: new.author,
                    categories: new.categories,
                    image: new.image,
                    created_at: Utc::now(),
                };
                articles.push(article.clone());
                Ok::<_, StoreError>(article)
            })
            .await?;

        info!("Created article {} ({})", article.slug, article.id);
        Ok(article)
    }

    /// Remove an article by slug. Image usage is decided under the same
    /// lock as the removal.
    pub async fn delete(&self, slug: &str) -> Result<Option<DeletedArticle>, StoreError> {
        let removed = self
            .file
            .modify(|articles| {
                let Some(pos) = articles.iter().position(|a| a.slug == slug) else {
                    return Ok::<_, StoreError>(None);
                };
                let article = articles.remove(pos);
                let orphaned_image = article
                    .image
                    .clone()
                    .filter(|url| !articles.iter().any(|a| a.image.as_ref() == Some(url)));
                Ok(Some(DeletedArticle {
                    article,
                    orphaned_image,
                }))
            })
            .await?;

        if removed.is_some() {
            info!("Deleted article {}", slug);
        }
        Ok(removed)
    }
}

fn apply_filter(mut articles: Vec<Article>, filter: &ArticleFilter) -> (Vec<Article>, usize) {
    let category = filter
        .category
        .as_deref()
        .map(slugify)
        .filter(|c| !c.is_empty());
    let needle = filter
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    articles.retain(|article| {
        let category_ok = category
            .as_ref()
            .map(|c| article.categories.iter().any(|ac| ac == c))
            .unwrap_or(true);
        let text_ok = needle
            .as_ref()
            .map(|n| {
                article.title.to_lowercase().contains(n.as_str())
                    || article.content.to_lowercase().contains(n.as_str())
            })
            .unwrap_or(true);
        category_ok && text_ok
    });

    // Later insertions win ties on timestamp
    articles.reverse();
    articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = articles.len();
    let page = articles
        .into_iter()
        .skip(filter.offset.unwrap_or(0))
        .take(filter.limit.unwrap_or(usize::MAX))
        .collect();
    (page, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_article(title: &str, categories: &[&str]) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            content: format!("Body of {}", title),
            author: None,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            image: None,
        }
    }

    fn article(slug: &str, minutes_ago: i64, categories: &[&str]) -> Article {
        Article {
            id: slug.to_string(),
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            content: format!("content {}", slug),
            excerpt: String::new(),
            author: None,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            image: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_unique_slugs() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = ArticleRepository::new(temp_dir.path().join("articles.json"));

        let first = repo.create(new_article("Hello World", &[])).await.unwrap();
        let second = repo.create(new_article("Hello, World!", &[])).await.unwrap();
        let third = repo.create(new_article("hello world", &[])).await.unwrap();

        assert_eq!(first.slug, "hello-world");
        assert_eq!(second.slug, "hello-world-2");
        assert_eq!(third.slug, "hello-world-3");
        assert_ne!(first.id, second.id);
        assert_eq!(first.excerpt, "Body of Hello World");
    }

    #[tokio::test]
    async fn test_create_untitled_slug_fallback() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = ArticleRepository::new(temp_dir.path().join("articles.json"));

        let article = repo.create(new_article("???", &[])).await.unwrap();
        assert_eq!(article.slug, "article");
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = ArticleRepository::new(temp_dir.path().join("articles.json"));

        repo.create(new_article("First", &[])).await.unwrap();
        assert!(repo.get("first").await.unwrap().is_some());

        let removed = repo.delete("first").await.unwrap();
        assert_eq!(removed.map(|d| d.article.title), Some("First".to_string()));
        assert!(repo.get("first").await.unwrap().is_none());
        assert!(repo.delete("first").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slug_reused_after_delete() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = ArticleRepository::new(temp_dir.path().join("articles.json"));

        repo.create(new_article("Post", &[])).await.unwrap();
        repo.delete("post").await.unwrap();
        let again = repo.create(new_article("Post", &[])).await.unwrap();
        assert_eq!(again.slug, "post");
    }

    #[tokio::test]
    async fn test_delete_reports_orphaned_image() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let repo = ArticleRepository::new(temp_dir.path().join("articles.json"));

        for title in ["Pic", "Pic again"] {
            let mut new = new_article(title, &[]);
            new.image = Some("/uploads/a.jpg".to_string());
            repo.create(new).await.unwrap();
        }
        repo.create(new_article("Plain", &[])).await.unwrap();

        let first = repo.delete("pic").await.unwrap().unwrap();
        assert_eq!(first.orphaned_image, None);

        let second = repo.delete("pic-again").await.unwrap().unwrap();
        assert_eq!(second.orphaned_image.as_deref(), Some("/uploads/a.jpg"));

        let plain = repo.delete("plain").await.unwrap().unwrap();
        assert_eq!(plain.orphaned_image, None);
    }

    #[test]
    fn test_filter_newest_first() {
        let articles = vec![article("old", 30, &[]), article("new", 1, &[]), article("mid", 10, &[])];
        let (page, total) = apply_filter(articles, &ArticleFilter::default());
        let slugs: Vec<_> = page.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "mid", "old"]);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_filter_by_category_name() {
        let articles = vec![
            article("a", 3, &["rust-lang"]),
            article("b", 2, &["web"]),
            article("c", 1, &["web", "rust-lang"]),
        ];
        let filter = ArticleFilter {
            category: Some("Rust Lang".to_string()),
            ..Default::default()
        };
        let (page, total) = apply_filter(articles, &filter);
        let slugs: Vec<_> = page.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["c", "a"]);
        assert_eq!(total, 2);
    }

    #[test]
    fn test_filter_search_and_paging() {
        let articles = vec![
            article("alpha", 4, &[]),
            article("beta", 3, &[]),
            article("alphabet", 2, &[]),
            article("alpine", 1, &[]),
        ];
        let filter = ArticleFilter {
            q: Some("ALP".to_string()),
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        let (page, total) = apply_filter(articles, &filter);
        let slugs: Vec<_> = page.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(total, 3);
        assert_eq!(slugs, vec!["alphabet", "alpha"]);
    }
}
