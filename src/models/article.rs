use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::slug::slugify;

/// Maximum title length in characters
pub const MAX_TITLE_CHARS: usize = 200;

/// Length of the stored excerpt in characters
pub const EXCERPT_CHARS: usize = 160;

/// Article record as persisted in `articles.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// JSON body for article creation
#[derive(Debug, Default, Deserialize)]
pub struct CreateArticleRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub author: Option<String>,
    #[serde(default)]
    pub categories: Value,
    pub image: Option<String>,
    /// Set when `image` points at a file stored while reading this request
    #[serde(skip)]
    pub image_uploaded: bool,
}

/// Validated input ready to be stored
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub image: Option<String>,
}

impl CreateArticleRequest {
    pub fn validate(self) -> Result<NewArticle, String> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err("title is required".to_string());
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(format!("title must be at most {} characters", MAX_TITLE_CHARS));
        }
        if self.content.trim().is_empty() {
            return Err("content is required".to_string());
        }

        Ok(NewArticle {
            title,
            content: self.content,
            author: self
                .author
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            categories: normalize_categories(&self.categories),
            image: self
                .image
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty()),
        })
    }
}

/// Query parameters for `GET /api/articles`
#[derive(Debug, Default, Deserialize)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Response for article listing
#[derive(Debug, Serialize)]
pub struct ArticleListResponse {
    pub articles: Vec<Article>,
    pub total: usize,
}

/// Normalize whatever the client sent as `categories` into a list of
/// unique category slugs. Falsy entries are dropped.
pub fn normalize_categories(value: &Value) -> Vec<String> {
    let mut raw: Vec<String> = Vec::new();
    collect_categories(value, &mut raw, true);

    let mut slugs: Vec<String> = Vec::new();
    for entry in raw {
        let slug = slugify(&entry);
        if !slug.is_empty() && !slugs.contains(&slug) {
            slugs.push(slug);
        }
    }
    slugs
}

fn collect_categories(value: &Value, out: &mut Vec<String>, top_level: bool) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_categories(item, out, false);
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if is_falsy_str(trimmed) {
                return;
            }
            // Form posts carry the list as a JSON string or as "a, b, c"
            if top_level || trimmed.starts_with('[') {
                if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
                    collect_categories(&parsed, out, false);
                    return;
                }
            }
            if top_level {
                out.extend(
                    trimmed
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !is_falsy_str(s))
                        .map(String::from),
                );
            } else {
                out.push(trimmed.to_string());
            }
        }
        Value::Number(n) => {
            if n.as_f64().map(|f| f != 0.0).unwrap_or(false) {
                out.push(n.to_string());
            }
        }
        Value::Null | Value::Bool(_) | Value::Object(_) => {}
    }
}

fn is_falsy_str(s: &str) -> bool {
    s.is_empty() || matches!(s, "null" | "undefined" | "false" | "0" | "NaN")
}

/// Whitespace-collapsed prefix of `content`, at most `max` characters,
/// with an ellipsis when cut.
pub fn excerpt(content: &str, max: usize) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max).collect();
    // Back up to the last word break unless that loses over half the text
    let trimmed = match cut.rfind(' ') {
        Some(idx) if cut[..idx].chars().count() > max / 2 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_array_strips_falsy() {
        let value = json!(["Tech", "", null, false, 0, "  ", "News", "tech", "undefined"]);
        assert_eq!(normalize_categories(&value), vec!["tech", "news"]);
    }

    #[test]
    fn test_normalize_json_string() {
        let value = json!(r#"["Rust Lang", "Web"]"#);
        assert_eq!(normalize_categories(&value), vec!["rust-lang", "web"]);
    }

    #[test]
    fn test_normalize_comma_string() {
        let value = json!("rust, , web ,null");
        assert_eq!(normalize_categories(&value), vec!["rust", "web"]);
    }

    #[test]
    fn test_normalize_null_and_numbers() {
        assert!(normalize_categories(&Value::Null).is_empty());
        assert_eq!(normalize_categories(&json!([2024, 0])), vec!["2024"]);
    }

    #[test]
    fn test_validate_requires_title_and_content() {
        let req = CreateArticleRequest {
            title: "   ".to_string(),
            content: "body".to_string(),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = CreateArticleRequest {
            title: "Title".to_string(),
            content: "\n".to_string(),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_trims() {
        let req = CreateArticleRequest {
            title: "  Hello  ".to_string(),
            content: "body".to_string(),
            author: Some(" ".to_string()),
            categories: json!(["A"]),
            image: Some("/uploads/x.jpg".to_string()),
            image_uploaded: false,
        };
        let article = req.validate().unwrap();
        assert_eq!(article.title, "Hello");
        assert!(article.author.is_none());
        assert_eq!(article.categories, vec!["a"]);
        assert_eq!(article.image.as_deref(), Some("/uploads/x.jpg"));
    }

    #[test]
    fn test_validate_title_too_long() {
        let req = CreateArticleRequest {
            title: "x".repeat(MAX_TITLE_CHARS + 1),
            content: "body".to_string(),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short   text\n", 50), "short text");
        assert_eq!(excerpt("one two three four five", 12), "one two…");
        assert_eq!(excerpt("ééééééé", 3), "ééé…");
    }

    #[test]
    fn test_excerpt_word_break_counts_chars() {
        // The space sits at char 4 but byte 8; exactly half is not enough
        assert_eq!(excerpt("éééé ééééé", 8), "éééé ééé…");
        assert_eq!(excerpt("ééééé éééé", 8), "ééééé…");
    }
}
