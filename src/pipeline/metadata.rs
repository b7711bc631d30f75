//! Metadata export: one `Title,Prompt,Type` row per page, in page order.

use crate::config::BookType;
use crate::error::BookError;
use crate::output::{MetadataRow, PageRecord};

/// Build the metadata rows for a run. Error pages get a row too.
pub fn build_rows(pages: &[PageRecord], book_type: BookType) -> Vec<MetadataRow> {
    pages
        .iter()
        .map(|page| MetadataRow {
            title: page.title.clone(),
            prompt: page.metadata_prompt().to_string(),
            book_type: book_type.label().to_string(),
        })
        .collect()
}

/// Render rows as UTF-8 CSV with a header line.
pub fn to_csv(rows: &[MetadataRow]) -> Result<String, BookError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer
            .write_record(["Title", "Prompt", "Type"])
            .map_err(|e| BookError::Metadata(e.to_string()))?;
    }
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| BookError::Metadata(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| BookError::Metadata(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| BookError::Metadata(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{PageContent, PageMode};

    fn page(index: usize, content: PageContent) -> PageRecord {
        PageRecord {
            index,
            title: format!("Page {index}"),
            content,
            prompt: format!("Quote. (Page {index})"),
            mode: PageMode::Text,
            warning: None,
        }
    }

    #[test]
    fn rows_follow_page_order() {
        let pages = vec![
            page(1, PageContent::Text("Stay curious.".into())),
            page(2, PageContent::Error("timeout".into())),
        ];
        let rows = build_rows(&pages, BookType::Quote);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].prompt, "Stay curious.");
        assert_eq!(rows[1].title, "Page 2");
        assert_eq!(rows[1].prompt, "Quote. (Page 2)");
        assert!(rows.iter().all(|r| r.book_type == "Quote Book"));
    }

    #[test]
    fn csv_has_header_and_quotes_fields() {
        let rows = vec![MetadataRow {
            title: "Page 1".into(),
            prompt: "Line one,\n\"two\"".into(),
            book_type: "Journal".into(),
        }];
        let csv = to_csv(&rows).unwrap();
        assert!(csv.starts_with("Title,Prompt,Type\n"), "got: {csv}");
        assert!(csv.contains("\"Line one,\n\"\"two\"\"\""), "got: {csv}");

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let back: Vec<MetadataRow> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(back, rows);
    }

    #[test]
    fn empty_table_still_has_header() {
        assert_eq!(to_csv(&[]).unwrap(), "Title,Prompt,Type\n");
    }
}
