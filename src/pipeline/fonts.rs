//! Fonts for the PDF writer.
//!
//! Two flavours:
//!
//! * [`PdfFont::TrueType`] — an embedded TrueType file written as a Type0
//!   composite font (Identity-H, glyph ids as character codes) with a
//!   ToUnicode map. Books always use this one: either the configured font
//!   or the DejaVu Sans copy compiled into the crate.
//! * [`PdfFont::Builtin`] — the standard Helvetica with WinAnsi encoding.
//!   Needs no embedding; characters outside WinAnsi print as `?`. Only for
//!   writers built directly on [`crate::pipeline::pdf::PdfWriter`].

use crate::error::BookError;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// DejaVu Sans, used when no font is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
const BUNDLED_FONT_NAME: &str = "DejaVuSans";

/// An embedded TrueType font.
pub struct TrueTypeFont {
    name: String,
    data: Vec<u8>,
    face: fontdue::Font,
    ascent: i64,
    descent: i64,
}

/// The font all document text is set in.
pub enum PdfFont {
    Builtin,
    TrueType(Box<TrueTypeFont>),
}

/// Glyphs used so far: glyph id → (first char that produced it, width in 1/1000 em).
pub type GlyphUsage = BTreeMap<u16, (char, i64)>;

impl PdfFont {
    /// Parse a TrueType file.
    pub fn load(path: &Path) -> Result<Self, BookError> {
        let fail = |detail: String| BookError::FontLoadFailed {
            path: path.to_path_buf(),
            detail,
        };
        let data = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let font = Self::from_bytes(&name, data).map_err(fail)?;
        info!("Using font {}", path.display());
        Ok(font)
    }

    /// The DejaVu Sans copy compiled into the crate.
    pub fn bundled() -> Result<Self, BookError> {
        Self::from_bytes(BUNDLED_FONT_NAME, BUNDLED_FONT.to_vec()).map_err(|detail| {
            BookError::FontLoadFailed {
                path: "<bundled DejaVuSans.ttf>".into(),
                detail,
            }
        })
    }

    /// Resolve the run's font: the configured file, else the bundled one.
    pub fn discover(configured: Option<&Path>) -> Result<Self, BookError> {
        match configured {
            Some(path) => Self::load(path),
            None => {
                debug!("No font configured; using bundled {}", BUNDLED_FONT_NAME);
                Self::bundled()
            }
        }
    }

    fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self, String> {
        let face = fontdue::Font::from_bytes(data.as_slice(), fontdue::FontSettings::default())
            .map_err(|e| e.to_string())?;
        let (ascent, descent) = face
            .horizontal_line_metrics(1000.0)
            .map(|m| (m.ascent.round() as i64, m.descent.round() as i64))
            .unwrap_or((800, -200));
        let name: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        let name = if name.is_empty() { "EmbeddedFont".to_string() } else { name };

        Ok(PdfFont::TrueType(Box::new(TrueTypeFont {
            name,
            data,
            face,
            ascent,
            descent,
        })))
    }

    /// Advance width of `text` at `size` points.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: i64 = match self {
            PdfFont::Builtin => text
                .chars()
                .map(|c| helvetica_width(winansi_byte(c).unwrap_or(b'?')))
                .sum(),
            PdfFont::TrueType(tt) => text.chars().map(|c| tt.glyph(c).1).sum(),
        };
        units as f32 * size / 1000.0
    }

    /// Encode `text` as a string operand for `Tj`, recording glyph usage.
    pub fn encode(&self, text: &str, usage: &mut GlyphUsage) -> Object {
        match self {
            PdfFont::Builtin => Object::String(
                text.chars().map(|c| winansi_byte(c).unwrap_or(b'?')).collect(),
                StringFormat::Literal,
            ),
            PdfFont::TrueType(tt) => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for c in text.chars() {
                    let (gid, width) = tt.glyph(c);
                    usage.entry(gid).or_insert((c, width));
                    bytes.extend_from_slice(&gid.to_be_bytes());
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
        }
    }

    /// Write the font objects into `doc` under the reserved id `font_id`.
    pub fn write_objects(&self, doc: &mut Document, font_id: ObjectId, usage: &GlyphUsage) {
        let dict = match self {
            PdfFont::Builtin => dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            },
            PdfFont::TrueType(tt) => tt.write_type0(doc, usage),
        };
        doc.objects.insert(font_id, Object::Dictionary(dict));
    }
}

impl TrueTypeFont {
    fn glyph(&self, c: char) -> (u16, i64) {
        let gid = self.face.lookup_glyph_index(c);
        let width = self.face.metrics_indexed(gid, 1000.0).advance_width.round() as i64;
        (gid, width)
    }

    fn write_type0(&self, doc: &mut Document, usage: &GlyphUsage) -> Dictionary {
        let base_font = Object::Name(self.name.as_bytes().to_vec());

        let font_file = Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.clone(),
        );
        let font_file_id = doc.add_object(font_file);

        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => base_font.clone(),
            "Flags" => 32,
            "FontBBox" => vec![
                Object::Integer(-1000),
                Object::Integer(self.descent),
                Object::Integer(2000),
                Object::Integer(self.ascent),
            ],
            "ItalicAngle" => 0,
            "Ascent" => self.ascent,
            "Descent" => self.descent,
            "CapHeight" => self.ascent,
            "StemV" => 80,
            "FontFile2" => font_file_id,
        });

        let mut widths = Vec::with_capacity(usage.len() * 2);
        for (gid, (_, width)) in usage {
            widths.push(Object::Integer(i64::from(*gid)));
            widths.push(Object::Array(vec![Object::Integer(*width)]));
        }

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => base_font.clone(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, to_unicode_cmap(usage)));

        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => base_font,
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        }
    }
}

/// Build a ToUnicode CMap so text in the PDF stays searchable and copyable.
fn to_unicode_cmap(usage: &GlyphUsage) -> Vec<u8> {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &(char, i64))> = usage.iter().collect();
    // bfchar sections hold at most 100 entries.
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, (c, _)) in chunk {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            cmap.push_str(&format!("<{gid:04X}> <{hex}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap.into_bytes()
}

/// Map a char to its WinAnsi code, if it has one.
pub fn winansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match c {
        '€' => Some(0x80),
        '…' => Some(0x85),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        '\t' => Some(b' '),
        _ if (0x20..0x7F).contains(&code) || (0xA0..=0xFF).contains(&code) => Some(code as u8),
        _ => None,
    }
}

/// Helvetica advance widths (1/1000 em) for printable ASCII, from the AFM.
const HELVETICA_ASCII: [i64; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' .. '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0' .. '9'
    278, 278, 584, 584, 584, 556, 1015, // ':' .. '@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A' .. 'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N' .. 'Z'
    278, 278, 278, 469, 556, 333, // '[' .. '`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a' .. 'm'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n' .. 'z'
    334, 260, 334, 584, // '{' .. '~'
];

fn helvetica_width(byte: u8) -> i64 {
    match byte {
        0x20..=0x7E => HELVETICA_ASCII[(byte - 0x20) as usize],
        0x85 | 0x97 => 1000,
        0x91 | 0x92 => 222,
        0x93 | 0x94 => 333,
        0x95 => 350,
        0xA0 => 278,
        _ => 556,
    }
}
