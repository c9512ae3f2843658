// SPDX-License-Identifier: MIT
//
// Plain-text to PDF rendering for backends that only accept PDF input.
//
// printpdf 0.8 uses a data-oriented API: documents are built from `PdfPage`
// structs holding `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::Path;

use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use printrelay_core::error::Result;
use tracing::{debug, info};

/// A4 page size in millimetres.
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;

/// Renders plain text into a paginated monospace PDF.
///
/// Layout mirrors a line printer: Courier at a fixed size, lines broken at a
/// fixed column, page breaks when the body area is full.
pub struct TextRenderer {
    font_size_pt: f32,
    line_height_pt: f32,
    margin_pt: f32,
    /// Hard break column for long lines.
    max_columns: usize,
}

impl TextRenderer {
    /// Renderer with the standard A4 line-printer layout.
    pub fn a4() -> Self {
        Self {
            font_size_pt: 10.0,
            line_height_pt: 13.0,
            margin_pt: 36.0,
            max_columns: 110,
        }
    }

    /// Render `text` into PDF bytes.
    pub fn render(&self, text: &str) -> Result<Vec<u8>> {
        let page_w = Mm(PAGE_WIDTH_MM);
        let page_h = Mm(PAGE_HEIGHT_MM);
        let page_h_pt = page_h.into_pt().0;

        let usable_height_pt = page_h_pt - 2.0 * self.margin_pt;
        let lines_per_page = (usable_height_pt / self.line_height_pt).max(1.0) as usize;

        let lines: Vec<String> = text
            .lines()
            .flat_map(|line| break_line(line, self.max_columns))
            .collect();

        let mut doc = PdfDocument::new("Printrelay Document");
        let mut pages: Vec<PdfPage> = Vec::new();

        for page_lines in lines.chunks(lines_per_page) {
            let mut ops: Vec<Op> = Vec::new();
            for (index, line) in page_lines.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                let y_pt = page_h_pt - self.margin_pt - (index as f32 * self.line_height_pt);

                ops.push(Op::StartTextSection);
                ops.push(Op::SetTextCursor {
                    pos: Point {
                        x: Pt(self.margin_pt),
                        y: Pt(y_pt),
                    },
                });
                ops.push(Op::SetFontSizeBuiltinFont {
                    size: Pt(self.font_size_pt),
                    font: BuiltinFont::Courier,
                });
                ops.push(Op::WriteTextBuiltinFont {
                    items: vec![TextItem::Text(line.clone())],
                    font: BuiltinFont::Courier,
                });
                ops.push(Op::EndTextSection);
            }
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        // An empty input still produces a printable single blank page.
        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }

        debug!(
            total_lines = lines.len(),
            pages = pages.len(),
            "text layout complete"
        );

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        Ok(doc.save(&PdfSaveOptions::default(), &mut warnings))
    }

    /// Read a text file and write the rendered PDF to `dest`.
    pub fn render_file(&self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
        // Replacement-decode rather than reject: the file already passed the
        // .txt allow-list and mangled glyphs beat a failed job.
        let raw = std::fs::read(src.as_ref())?;
        let content = String::from_utf8_lossy(&raw);
        let bytes = self.render(&content)?;
        std::fs::write(dest.as_ref(), &bytes)?;
        info!(dest = %dest.as_ref().display(), "wrote text PDF");
        Ok(())
    }
}

/// Hard-break a single line at `max_columns` characters.
///
/// Breaks on character boundaries, not bytes, so multi-byte input stays
/// intact. An empty line yields one empty entry to preserve vertical spacing.
fn break_line(line: &str, max_columns: usize) -> Vec<String> {
    if line.is_empty() {
        return vec![String::new()];
    }

    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(max_columns.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
