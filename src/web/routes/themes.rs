// Theme listing route handler

use hyper::{Body, Response, StatusCode};
use std::convert::Infallible;
use std::path::Path;

use crate::web::response_helpers::{json_error, json_response};
use crate::web::state::AppState;
use crate::sys_warn;

/// Names of the `.css` files in `dir`, without extension, sorted.
pub async fn list_theme_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_css = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("css"));
        if !is_css || !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub async fn handle_get_themes(state: &AppState) -> Result<Response<Body>, Infallible> {
    let dir = state.config.themes_dir();
    if !dir.is_dir() {
        sys_warn!("[THEMES] Directory not found: {}", dir.display());
        return Ok(json_error(StatusCode::NOT_FOUND, "Themes directory not found"));
    }

    Ok(match list_theme_names(dir).await {
        Ok(names) => json_response(StatusCode::OK, &names),
        Err(e) => {
            sys_warn!("[THEMES] Failed to read {}: {}", dir.display(), e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list themes")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_css_stems_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["solarized.css", "dark.CSS", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.css")).unwrap();

        let names = list_theme_names(dir.path()).await.unwrap();
        assert_eq!(names, vec!["dark", "solarized"]);
    }
}
