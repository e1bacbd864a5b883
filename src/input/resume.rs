//! Resume document loading

use crate::error::{JobMatcherError, Result};
use crate::input::file_detector::FileType;
use crate::input::record::TextRecord;
use log::info;
use pulldown_cmark::{html, Parser};
use regex::Regex;
use std::path::Path;
use tokio::fs;

pub struct ResumeLoader {
    max_chars: usize,
    tag_pattern: Regex,
}

impl ResumeLoader {
    pub fn new(max_chars: usize) -> Result<Self> {
        let tag_pattern = Regex::new(r"<[^>]*>")
            .map_err(|e| JobMatcherError::Processing(format!("Failed to build tag pattern: {}", e)))?;
        Ok(Self { max_chars, tag_pattern })
    }

    /// Read the resume file and return it as a single resume record.
    pub async fn load(&self, path: &Path) -> Result<TextRecord> {
        if !path.exists() {
            return Err(JobMatcherError::invalid_input(
                path.display().to_string(),
                "resume file does not exist",
            ));
        }

        let extension = path.extension().and_then(|ext| ext.to_str()).ok_or_else(|| {
            JobMatcherError::UnsupportedFormat(format!("File has no extension: {}", path.display()))
        })?;

        let raw = match FileType::from_extension(extension) {
            FileType::Pdf => {
                info!("Extracting resume text from PDF: {}", path.display());
                let bytes = fs::read(path).await?;
                pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                    JobMatcherError::TextExtraction(format!(
                        "Failed to extract text from PDF '{}': {}",
                        path.display(),
                        e
                    ))
                })?
            }
            FileType::Text => {
                info!("Reading resume text file: {}", path.display());
                fs::read_to_string(path).await?
            }
            FileType::Markdown => {
                info!("Reading resume markdown file: {}", path.display());
                let markdown = fs::read_to_string(path).await?;
                self.markdown_to_text(&markdown)
            }
            FileType::Unknown => {
                return Err(JobMatcherError::UnsupportedFormat(format!(
                    "Unsupported resume file type: {}",
                    path.display()
                )));
            }
        };

        let id = path
            .file_stem()
            .map(|stem| format!("resume-{}", stem.to_string_lossy()))
            .unwrap_or_else(|| "resume".to_string());

        Ok(TextRecord::resume(id, self.clean(&raw)).with_metadata("source", path.display().to_string()))
    }

    /// Collapse runs of whitespace and cut to the configured length.
    pub fn clean(&self, raw: &str) -> String {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.char_indices().nth(self.max_chars) {
            Some((byte_idx, _)) => format!("{}...", &normalized[..byte_idx]),
            None => normalized,
        }
    }

    fn markdown_to_text(&self, markdown: &str) -> String {
        let parser = Parser::new(markdown);
        let mut html_output = String::new();
        html::push_html(&mut html_output, parser);

        let text = html_output
            .replace("<br>", "\n")
            .replace("</p>", "\n\n")
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'");

        self.tag_pattern.replace_all(&text, " ").into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::record::RecordKind;
    use tempfile::TempDir;

    #[test]
    fn test_clean_collapses_and_truncates() {
        let loader = ResumeLoader::new(9).unwrap();
        assert_eq!(loader.clean("  Rust \n\n developer  "), "Rust deve...");
        assert_eq!(loader.clean("short"), "short");
    }

    #[tokio::test]
    async fn test_load_text_resume() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jane.txt");
        std::fs::write(&path, "Jane Doe\n\nSKILLS\nPython, Rust").unwrap();

        let record = ResumeLoader::new(2000).unwrap().load(&path).await.unwrap();
        assert_eq!(record.kind, RecordKind::Resume);
        assert_eq!(record.id, "resume-jane");
        assert_eq!(record.text, "Jane Doe SKILLS Python, Rust");
    }

    #[tokio::test]
    async fn test_load_markdown_resume() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cv.md");
        std::fs::write(&path, "# Jane Doe\n\n**Skills**: Rust &amp; Go").unwrap();

        let record = ResumeLoader::new(2000).unwrap().load(&path).await.unwrap();
        assert!(record.text.contains("Jane Doe"));
        assert!(!record.text.contains('#'));
        assert!(!record.text.contains("<strong>"));
    }

    #[tokio::test]
    async fn test_unsupported_and_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ResumeLoader::new(2000).unwrap();

        let odd = temp_dir.path().join("resume.xyz");
        std::fs::write(&odd, "text").unwrap();
        assert!(matches!(loader.load(&odd).await, Err(JobMatcherError::UnsupportedFormat(_))));

        let missing = temp_dir.path().join("missing.txt");
        assert!(loader.load(&missing).await.is_err());
    }
}
