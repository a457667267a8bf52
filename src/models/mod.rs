pub mod article;
pub mod category;

pub use article::{
    excerpt, Article, ArticleFilter, ArticleListResponse,
    CreateArticleRequest, NewArticle, EXCERPT_CHARS,
};
pub use category::{Category, CreateCategoryRequest};
