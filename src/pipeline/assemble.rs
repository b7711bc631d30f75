//! Book assembly: cover, pages and metadata, strictly in order.
//!
//! Assembly is single-pass. Staged images are taken out of the
//! [`ImageStore`] as they are embedded, so scratch space shrinks as the
//! document grows; whatever is left is released when the store drops.

use crate::config::BookType;
use crate::error::BookError;
use crate::output::{CoverRecord, MetadataRow, PageContent, PageRecord};
use crate::pipeline::metadata;
use crate::pipeline::pdf::{Align, DocumentWriter};
use crate::pipeline::store::{ImageHandle, ImageStore};
use tracing::{debug, info};

/// Width every embedded image is set at.
pub const IMAGE_WIDTH_MM: f32 = 180.0;
pub const COVER_TITLE_SIZE: f32 = 20.0;
pub const TITLE_SIZE: f32 = 12.0;
pub const BODY_SIZE: f32 = 12.0;
/// Gap between a heading and what follows it.
const GAP_MM: f32 = 4.0;

/// The assembled book.
#[derive(Debug)]
pub struct Assembled {
    pub document: Vec<u8>,
    pub metadata: Vec<MetadataRow>,
    /// Physical pages written, including cover and overflow pages.
    pub document_pages: usize,
}

/// Writes a book through a [`DocumentWriter`].
pub struct BookAssembler<'a> {
    book_type: BookType,
    store: &'a mut ImageStore,
}

impl<'a> BookAssembler<'a> {
    pub fn new(book_type: BookType, store: &'a mut ImageStore) -> Self {
        Self { book_type, store }
    }

    /// Assemble the cover (if any) and every page in order.
    ///
    /// Any writer error aborts the whole assembly.
    pub fn assemble<W: DocumentWriter>(
        &mut self,
        mut writer: W,
        cover: Option<&CoverRecord>,
        pages: &[PageRecord],
    ) -> Result<Assembled, BookError> {
        // ── Step 1: Cover ────────────────────────────────────────────────
        if let Some(cover) = cover {
            writer.begin_page()?;
            self.embed(&mut writer, &cover.image)?;
            writer.skip(GAP_MM);
            writer.write_line(&cover.title, COVER_TITLE_SIZE, Align::Center)?;
            debug!("Cover page written");
        }

        // ── Step 2: Pages ────────────────────────────────────────────────
        for page in pages {
            writer.begin_page()?;
            writer.write_line(&page.title, TITLE_SIZE, Align::Left)?;
            writer.skip(GAP_MM);
            match &page.content {
                PageContent::Image(handle) => self.embed(&mut writer, handle)?,
                content => {
                    let body = content.text().unwrap_or_default();
                    writer.write_paragraphs(&body, BODY_SIZE)?;
                }
            }
        }

        // ── Step 3: Finish and metadata ──────────────────────────────────
        let document_pages = writer.page_count();
        let document = writer.finish()?;
        let metadata = metadata::build_rows(pages, self.book_type);
        info!(
            "Assembled {} records into {} document pages ({} bytes)",
            pages.len(),
            document_pages,
            document.len()
        );

        Ok(Assembled {
            document,
            metadata,
            document_pages,
        })
    }

    fn embed<W: DocumentWriter>(&mut self, writer: &mut W, handle: &ImageHandle) -> Result<(), BookError> {
        let image = self
            .store
            .take(handle)
            .map_err(|e| BookError::Assembly(format!("staged image {} unavailable: {e}", handle.id)))?;
        writer.write_image(&image, IMAGE_WIDTH_MM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageMode;
    use crate::pipeline::fonts::PdfFont;
    use crate::pipeline::pdf::PdfWriter;
    use image::{DynamicImage, Rgb, RgbImage};

    #[derive(Debug, PartialEq)]
    enum Op {
        Page,
        Line(String, f32, Align),
        Body(String),
        Image(u32, f32),
        Skip,
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
        fail_on_image: bool,
    }

    impl DocumentWriter for &mut Recorder {
        fn begin_page(&mut self) -> Result<(), BookError> {
            self.ops.push(Op::Page);
            Ok(())
        }
        fn write_line(&mut self, text: &str, size: f32, align: Align) -> Result<(), BookError> {
            self.ops.push(Op::Line(text.into(), size, align));
            Ok(())
        }
        fn write_paragraphs(&mut self, text: &str, _size: f32) -> Result<(), BookError> {
            self.ops.push(Op::Body(text.into()));
            Ok(())
        }
        fn write_image(&mut self, image: &DynamicImage, width_mm: f32) -> Result<(), BookError> {
            if self.fail_on_image {
                return Err(BookError::Assembly("disk full".into()));
            }
            self.ops.push(Op::Image(image.width(), width_mm));
            Ok(())
        }
        fn skip(&mut self, _height_mm: f32) {
            self.ops.push(Op::Skip);
        }
        fn page_count(&self) -> usize {
            self.ops.iter().filter(|o| **o == Op::Page).count()
        }
        fn finish(self) -> Result<Vec<u8>, BookError> {
            Ok(b"doc".to_vec())
        }
    }

    fn image(width: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, 4, Rgb([1, 2, 3])))
    }

    fn record(index: usize, content: PageContent) -> PageRecord {
        PageRecord {
            index,
            title: format!("Page {index}"),
            content,
            prompt: format!("Draw. (Page {index})"),
            mode: PageMode::Unseeded,
            warning: None,
        }
    }

    #[test]
    fn cover_then_pages_in_order() {
        let mut store = ImageStore::new().unwrap();
        let cover = CoverRecord {
            title: "Moon Tales".into(),
            image: store.put(&image(10)).unwrap(),
        };
        let pages = vec![
            record(1, PageContent::Image(store.put(&image(7)).unwrap())),
            record(2, PageContent::Error("quota".into())),
            record(3, PageContent::Text("Once.".into())),
        ];

        let mut rec = Recorder::default();
        let out = BookAssembler::new(BookType::Coloring, &mut store)
            .assemble(&mut rec, Some(&cover), &pages)
            .unwrap();

        assert_eq!(
            rec.ops,
            vec![
                Op::Page,
                Op::Image(10, IMAGE_WIDTH_MM),
                Op::Skip,
                Op::Line("Moon Tales".into(), COVER_TITLE_SIZE, Align::Center),
                Op::Page,
                Op::Line("Page 1".into(), TITLE_SIZE, Align::Left),
                Op::Skip,
                Op::Image(7, IMAGE_WIDTH_MM),
                Op::Page,
                Op::Line("Page 2".into(), TITLE_SIZE, Align::Left),
                Op::Skip,
                Op::Body("[Error] quota".into()),
                Op::Page,
                Op::Line("Page 3".into(), TITLE_SIZE, Align::Left),
                Op::Skip,
                Op::Body("Once.".into()),
            ]
        );
        assert_eq!(out.document_pages, 4);
        assert_eq!(out.metadata.len(), 3);
        assert_eq!(store.staged(), 0, "embedded images are released");
    }

    #[test]
    fn writer_failure_is_fatal() {
        let mut store = ImageStore::new().unwrap();
        let pages = vec![record(1, PageContent::Image(store.put(&image(5)).unwrap()))];
        let mut rec = Recorder {
            fail_on_image: true,
            ..Default::default()
        };
        let err = BookAssembler::new(BookType::Coloring, &mut store)
            .assemble(&mut rec, None, &pages)
            .unwrap_err();
        assert!(matches!(err, BookError::Assembly(_)));
    }

    #[test]
    fn pdf_has_one_page_per_short_record() {
        let mut store = ImageStore::new().unwrap();
        let pages: Vec<PageRecord> = (1..=5)
            .map(|i| record(i, PageContent::Text(format!("Short story {i}."))))
            .collect();
        let out = BookAssembler::new(BookType::Storybook, &mut store)
            .assemble(PdfWriter::new(PdfFont::Builtin), None, &pages)
            .unwrap();

        let doc = lopdf::Document::load_mem(&out.document).unwrap();
        assert_eq!(doc.get_pages().len(), 5);
        assert_eq!(out.document_pages, 5);
        assert!(out.metadata.iter().all(|r| r.book_type == "Storybook"));
    }
}
