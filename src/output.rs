//! Result types produced by a generation run.

use crate::pipeline::metadata;
use crate::pipeline::store::ImageHandle;
use serde::{Deserialize, Serialize};

/// Which path produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageMode {
    /// Text completion.
    Text,
    /// Image generation seeded by the page's source image on the local endpoint.
    SeededLocal,
    /// Image generation for a seeded page that fell back to the remote service.
    SeededRemote,
    /// Text-to-image generation with no seed.
    Unseeded,
}

impl PageMode {
    pub fn is_seeded(self) -> bool {
        matches!(self, PageMode::SeededLocal | PageMode::SeededRemote)
    }
}

/// What a page shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PageContent {
    /// Finalised (reviewed) text.
    Text(String),
    /// A staged image awaiting embedding.
    Image(ImageHandle),
    /// The backend call failed; the message is shown on the page.
    Error(String),
}

impl PageContent {
    /// Printable text of the page, if it is not an image.
    ///
    /// Error pages render as `"[Error] <message>"`.
    pub fn text(&self) -> Option<String> {
        match self {
            PageContent::Text(t) => Some(t.clone()),
            PageContent::Image(_) => None,
            PageContent::Error(msg) => Some(format!("[Error] {msg}")),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PageContent::Error(_))
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        match self {
            PageContent::Image(h) => Some(h),
            _ => None,
        }
    }
}

/// One generated page. Created by the page generator and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-indexed position in the book.
    pub index: usize,
    pub title: String,
    pub content: PageContent,
    /// The prompt this page was generated from, including the page suffix.
    pub prompt: String,
    pub mode: PageMode,
    /// Set when the page completed in degraded form.
    pub warning: Option<String>,
}

impl PageRecord {
    /// Value for the metadata `Prompt` column: the final text for text
    /// pages, the page prompt otherwise.
    pub fn metadata_prompt(&self) -> &str {
        match &self.content {
            PageContent::Text(t) => t,
            _ => &self.prompt,
        }
    }
}

/// The optional cover page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverRecord {
    pub title: String,
    pub image: ImageHandle,
}

/// One row of the exported metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Prompt")]
    pub prompt: String,
    #[serde(rename = "Type")]
    pub book_type: String,
}

/// Aggregate numbers for a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_pages: usize,
    pub text_pages: usize,
    pub image_pages: usize,
    pub failed_pages: usize,
    /// Pages that completed with a warning (kept seed image).
    pub degraded_pages: usize,
    /// Physical pages in the PDF, cover and overflow pages included.
    pub document_pages: usize,
    pub cover_generated: bool,
    pub local_backend_available: bool,
    pub generation_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a run produces. Built once, fully in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOutput {
    /// The PDF document.
    #[serde(skip)]
    pub document: Vec<u8>,
    pub pages: Vec<PageRecord>,
    pub metadata: Vec<MetadataRow>,
    pub stats: GenerationStats,
}

impl BookOutput {
    /// Render the metadata table as CSV (UTF-8, header `Title,Prompt,Type`).
    pub fn metadata_csv(&self) -> Result<String, crate::error::BookError> {
        metadata::to_csv(&self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: PageContent) -> PageRecord {
        PageRecord {
            index: 1,
            title: "Page 1".into(),
            content,
            prompt: "Write. (Page 1)".into(),
            mode: PageMode::Text,
            warning: None,
        }
    }

    #[test]
    fn error_content_has_prefix() {
        let c = PageContent::Error("quota exceeded".into());
        assert_eq!(c.text().as_deref(), Some("[Error] quota exceeded"));
        assert!(c.is_error());
    }

    #[test]
    fn metadata_prompt_uses_final_text_for_text_pages() {
        assert_eq!(
            record(PageContent::Text("edited story".into())).metadata_prompt(),
            "edited story"
        );
        assert_eq!(
            record(PageContent::Error("x".into())).metadata_prompt(),
            "Write. (Page 1)"
        );
    }

    #[test]
    fn metadata_row_serialises_with_headers() {
        let row = MetadataRow {
            title: "Page 1".into(),
            prompt: "p".into(),
            book_type: "Journal".into(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["Title"], "Page 1");
        assert_eq!(json["Type"], "Journal");
    }
}
