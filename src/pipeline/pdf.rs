//! PDF writing: a small flowing-layout writer over `lopdf`.
//!
//! The assembler only needs a handful of primitives: start a page, set a
//! line of text, flow a paragraph, place an image. [`DocumentWriter`] is
//! that surface; [`PdfWriter`] implements it on A4 portrait pages with
//! 10 mm side margins and an automatic page break 15 mm above the bottom
//! edge.
//!
//! ## Layout model
//!
//! The writer keeps a vertical cursor. Text advances it by one line height
//! per line and breaks to a fresh page when the next line would cross the
//! bottom margin. Images are centred, set at the requested width and scaled
//! down when they would not fit under the cursor, so a page title and its
//! picture always share a page.

use crate::error::BookError;
use crate::pipeline::fonts::{GlyphUsage, PdfFont};
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// A4 portrait, in points.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;

pub const SIDE_MARGIN_MM: f32 = 10.0;
pub const TOP_MARGIN_MM: f32 = 10.0;
pub const BOTTOM_MARGIN_MM: f32 = 15.0;

/// Line height as a multiple of the font size.
pub const LINE_SPACING: f32 = 1.5;

const FONT_RESOURCE: &str = "F1";

/// Millimetres to points.
pub fn mm(v: f32) -> f32 {
    v * 72.0 / 25.4
}

/// Horizontal placement of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// The operations the assembler needs from a document backend.
pub trait DocumentWriter {
    /// Start a new page; the cursor moves to the top margin.
    fn begin_page(&mut self) -> Result<(), BookError>;

    /// Set `text` in lines at `size` points, wrapped to the content width.
    fn write_line(&mut self, text: &str, size: f32, align: Align) -> Result<(), BookError>;

    /// Flow a multi-paragraph body, breaking pages as needed.
    fn write_paragraphs(&mut self, text: &str, size: f32) -> Result<(), BookError>;

    /// Place an image `width_mm` wide, centred under the cursor.
    fn write_image(&mut self, image: &DynamicImage, width_mm: f32) -> Result<(), BookError>;

    /// Move the cursor down.
    fn skip(&mut self, height_mm: f32);

    /// Pages started so far.
    fn page_count(&self) -> usize;

    /// Serialise the finished document.
    fn finish(self) -> Result<Vec<u8>, BookError>;
}

/// Greedy word wrap by measured width.
///
/// Words wider than `max_width` are split by character. Explicit newlines
/// start a new line; blank lines are preserved as empty strings.
pub fn wrap_text(text: &str, max_width: f32, width_of: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if width_of(&candidate) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if width_of(word) <= max_width {
                current = word.to_string();
                continue;
            }
            for c in word.chars() {
                current.push(c);
                if width_of(&current) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        lines.push(current);
    }
    lines
}

struct PageState {
    ops: Vec<Operation>,
    xobjects: Dictionary,
    cursor_y: f32,
}

impl PageState {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            xobjects: Dictionary::new(),
            cursor_y: PAGE_HEIGHT - mm(TOP_MARGIN_MM),
        }
    }
}

/// [`DocumentWriter`] producing a PDF 1.5 file.
pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    font: PdfFont,
    glyphs: GlyphUsage,
    page_ids: Vec<ObjectId>,
    page: Option<PageState>,
    images: usize,
}

impl PdfWriter {
    pub fn new(font: PdfFont) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            font_id,
            font,
            glyphs: GlyphUsage::new(),
            page_ids: Vec::new(),
            page: None,
            images: 0,
        }
    }

    fn content_width() -> f32 {
        PAGE_WIDTH - 2.0 * mm(SIDE_MARGIN_MM)
    }

    fn bottom() -> f32 {
        mm(BOTTOM_MARGIN_MM)
    }

    fn current(&mut self) -> Result<&mut PageState, BookError> {
        if self.page.is_none() {
            self.begin_page()?;
        }
        self.page
            .as_mut()
            .ok_or_else(|| BookError::Internal("no open page".into()))
    }

    fn flush_page(&mut self) -> Result<(), BookError> {
        let Some(page) = self.page.take() else {
            return Ok(());
        };
        let content = Content {
            operations: page.ops,
        };
        let bytes = content
            .encode()
            .map_err(|e| BookError::Assembly(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, bytes));

        let mut resources = dictionary! {
            "Font" => dictionary! { FONT_RESOURCE => self.font_id },
        };
        if !page.xobjects.is_empty() {
            resources.set("XObject", page.xobjects);
        }
        let media_box: Vec<Object> = vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()];
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box,
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Set one already-wrapped line, breaking the page first if needed.
    fn set_line(&mut self, line: &str, size: f32, align: Align) -> Result<(), BookError> {
        let line_height = size * LINE_SPACING;
        if self.current()?.cursor_y - line_height < Self::bottom() {
            self.begin_page()?;
        }

        let x = match align {
            Align::Left => mm(SIDE_MARGIN_MM),
            Align::Center => (PAGE_WIDTH - self.font.text_width(line, size)) / 2.0,
        };
        let encoded = self.font.encode(line, &mut self.glyphs);
        let page = self.current()?;
        let baseline = page.cursor_y - size;
        page.cursor_y -= line_height;
        if line.is_empty() {
            return Ok(());
        }
        page.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![FONT_RESOURCE.into(), size.into()]),
            Operation::new("Td", vec![x.into(), baseline.into()]),
            Operation::new("Tj", vec![encoded]),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    fn wrap(&self, text: &str, size: f32) -> Vec<String> {
        wrap_text(text, Self::content_width(), |s| self.font.text_width(s, size))
    }
}

impl DocumentWriter for PdfWriter {
    fn begin_page(&mut self) -> Result<(), BookError> {
        self.flush_page()?;
        self.page = Some(PageState::new());
        Ok(())
    }

    fn write_line(&mut self, text: &str, size: f32, align: Align) -> Result<(), BookError> {
        for line in self.wrap(text, size) {
            self.set_line(&line, size, align)?;
        }
        Ok(())
    }

    fn write_paragraphs(&mut self, text: &str, size: f32) -> Result<(), BookError> {
        self.write_line(text, size, Align::Left)
    }

    fn write_image(&mut self, image: &DynamicImage, width_mm: f32) -> Result<(), BookError> {
        let (px_w, px_h) = (image.width(), image.height());
        if px_w == 0 || px_h == 0 {
            return Err(BookError::Assembly("cannot embed an empty image".into()));
        }

        let mut width = mm(width_mm).min(Self::content_width());
        let mut height = width * px_h as f32 / px_w as f32;
        let available = self.current()?.cursor_y - Self::bottom();
        if height > available {
            let scale = available.max(0.0) / height;
            width *= scale;
            height *= scale;
        }

        let rgb = image.to_rgb8();
        let xobject = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(px_w),
                "Height" => i64::from(px_h),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb.into_raw(),
        );
        let image_id = self.doc.add_object(xobject);
        self.images += 1;
        let name = format!("Im{}", self.images);

        let x = (PAGE_WIDTH - width) / 2.0;
        let page = self.current()?;
        let y = page.cursor_y - height;
        page.xobjects.set(name.clone(), image_id);
        page.ops.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        page.cursor_y = y;
        debug!("Embedded {}x{} image at {:.0}x{:.0}pt", px_w, px_h, width, height);
        Ok(())
    }

    fn skip(&mut self, height_mm: f32) {
        if let Some(page) = self.page.as_mut() {
            page.cursor_y -= mm(height_mm);
        }
    }

    fn page_count(&self) -> usize {
        self.page_ids.len() + usize::from(self.page.is_some())
    }

    fn finish(mut self) -> Result<Vec<u8>, BookError> {
        self.flush_page()?;
        if self.page_ids.is_empty() {
            return Err(BookError::Assembly("document has no pages".into()));
        }

        self.font
            .write_objects(&mut self.doc, self.font_id, &self.glyphs);

        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| BookError::Assembly(e.to_string()))?;
        Ok(bytes)
    }
}
