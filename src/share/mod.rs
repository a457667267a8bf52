use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::{excerpt, Article, EXCERPT_CHARS};
use crate::AppState;

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new().route("/:slug", axum::routing::get(share_article))
}

/// GET /share/:slug
/// HTML page with Open Graph tags for link previews, redirecting browsers
/// to the article on the frontend
async fn share_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<(StatusCode, Html<String>), ApiError> {
    match state.store.articles.get(&slug).await? {
        Some(article) => Ok((StatusCode::OK, Html(render_share_page(&state.config, &article)))),
        None => Ok((StatusCode::NOT_FOUND, Html(render_not_found(&state.config)))),
    }
}

pub fn render_share_page(config: &Config, article: &Article) -> String {
    let target = format!("{}/articles/{}", config.frontend_url, article.slug);
    let share_url = format!("{}/share/{}", config.public_url, article.slug);
    let description = if article.excerpt.is_empty() {
        excerpt(&article.content, EXCERPT_CHARS)
    } else {
        article.excerpt.clone()
    };

    let title = escape_html(&article.title);
    let description = escape_html(&description);
    let target_attr = escape_html(&target);

    let mut meta = vec![
        r#"<meta property="og:type" content="article">"#.to_string(),
        format!(r#"<meta property="og:title" content="{}">"#, title),
        format!(r#"<meta property="og:description" content="{}">"#, description),
        format!(r#"<meta property="og:url" content="{}">"#, escape_html(&share_url)),
        format!(
            r#"<meta property="article:published_time" content="{}">"#,
            article.created_at.to_rfc3339()
        ),
        format!(r#"<meta name="description" content="{}">"#, description),
        format!(r#"<meta name="twitter:title" content="{}">"#, title),
        format!(r#"<meta name="twitter:description" content="{}">"#, description),
    ];

    match article.image.as_deref().map(|image| absolute_url(config, image)) {
        Some(image) => {
            let image = escape_html(&image);
            meta.push(format!(r#"<meta property="og:image" content="{}">"#, image));
            meta.push(format!(r#"<meta name="twitter:image" content="{}">"#, image));
            meta.push(r#"<meta name="twitter:card" content="summary_large_image">"#.to_string());
        }
        None => meta.push(r#"<meta name="twitter:card" content="summary">"#.to_string()),
    }
    for category in &article.categories {
        meta.push(format!(
            r#"<meta property="article:tag" content="{}">"#,
            escape_html(category)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
{meta}
<link rel="canonical" href="{target}">
<meta http-equiv="refresh" content="0; url={target}">
</head>
<body>
<p>Redirecting to <a href="{target}">{title}</a>…</p>
<script>window.location.replace({target_js});</script>
</body>
</html>
"#,
        title = title,
        meta = meta.join("\n"),
        target = target_attr,
        target_js = js_string(&target),
    )
}

fn render_not_found(config: &Config) -> String {
    let home = escape_html(&config.frontend_url);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Article not found</title>
<meta name="robots" content="noindex">
</head>
<body>
<p>This article does not exist. <a href="{home}">Back to the homepage</a></p>
</body>
</html>
"#,
        home = home
    )
}

/// Stored images are relative (`/uploads/..`); previews need absolute URLs
fn absolute_url(config: &Config, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{}{}", config.public_url, url)
    } else {
        format!("{}/{}", config.public_url, url)
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// JSON string literal, with `<` escaped so it cannot close the script tag
fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string())
        .to_string()
        .replace('<', "\\u003c")
}
