//! Dataset loading from a directory of text, markdown and HTML files

use chrono::{DateTime, Utc};
use pulldown_cmark::{Event, Parser, TagEnd};
use scraper::{Html, Selector};
use serde_json::json;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use ragline_core::{Error, RawDocument, Result};

/// Reads every supported file under `dir`, recursively, in path order
pub async fn load_dataset(dir: &Path) -> Result<Vec<RawDocument>> {
    if !fs::metadata(dir).await?.is_dir() {
        return Err(Error::Configuration(format!(
            "dataset path {} is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();

    let mut documents = Vec::new();
    for path in files {
        let Some(format) = Format::of(&path) else {
            debug!(path = %path.display(), "skipping unsupported file");
            continue;
        };
        documents.push(load_file(dir, &path, format).await?);
    }

    info!(dir = %dir.display(), documents = documents.len(), "dataset loaded");
    Ok(documents)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Markdown,
    Html,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" => Some(Format::Text),
            "md" | "markdown" => Some(Format::Markdown),
            "html" | "htm" => Some(Format::Html),
            _ => None,
        }
    }
}

async fn load_file(root: &Path, path: &Path, format: Format) -> Result<RawDocument> {
    let raw = fs::read_to_string(path).await?;
    let text = match format {
        Format::Text => raw,
        Format::Markdown => markdown_to_text(&raw),
        Format::Html => html_to_text(&raw),
    };

    let relative = path.strip_prefix(root).unwrap_or(path);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let modified: DateTime<Utc> = fs::metadata(path).await?.modified()?.into();

    Ok(
        RawDocument::new(relative.to_string_lossy().into_owned(), text)
            .with_metadata("file_name", json!(file_name))
            .with_metadata("modified", json!(modified.to_rfc3339())),
    )
}

/// Keeps the readable text of a markdown document, one block per line
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            ) => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }
    text.trim_end().to_string()
}

/// Extracts the visible text of an HTML document's body
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next());

    let fragments: Vec<&str> = match body {
        Some(body) => body.text().collect(),
        None => document.root_element().text().collect(),
    };

    fragments
        .iter()
        .map(|fragment| fragment.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_markdown_is_stripped() {
        let text = markdown_to_text("# Tokio\n\nAn *async* runtime with `spawn`.\n\n- timers\n- io");
        assert_eq!(text, "Tokio\nAn async runtime with spawn.\ntimers\nio");
    }

    #[test]
    fn test_html_body_text() {
        let text = html_to_text(
            "<html><head><title>ignored</title></head><body><h1>Serde</h1><p>Serializes   data.</p></body></html>",
        );
        assert_eq!(text, "Serde\nSerializes data.");
    }

    #[tokio::test]
    async fn test_loads_supported_files_in_path_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "plain text").unwrap();
        std::fs::write(dir.path().join("a.md"), "# Title\n\nBody").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.html"), "<p>nested page</p>").unwrap();

        let documents = load_dataset(dir.path()).await.unwrap();
        let paths: Vec<&str> = documents.iter().map(|d| d.path.as_str()).collect();
        let nested = Path::new("nested").join("c.html");
        assert_eq!(paths, vec!["a.md", "b.txt", nested.to_str().unwrap()]);

        assert_eq!(documents[0].text, "Title\nBody");
        assert_eq!(documents[1].metadata["file_name"], json!("b.txt"));
        let modified = documents[2].metadata["modified"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(modified).is_ok());
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_dataset(&dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
