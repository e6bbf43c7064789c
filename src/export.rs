//! Participant list export as spreadsheet or PDF.

use std::fmt::Write;

use printpdf::{IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::error::ServerError;
use crate::registration::{Registration, RegistrationStatus};

const SHEET_NAME: &str = "Participants";
const FALLBACK_NAME: &str = "participants";
const HEADERS: [&str; 6] = [
    "Last name",
    "First name",
    "Middle name",
    "Email",
    "Phone",
    "Checked in",
];

// Landscape A4.
const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 15.0;
const ROW_HEIGHT: f32 = 7.0;
const TITLE_SIZE: f32 = 14.0;
const TEXT_SIZE: f32 = 9.0;
/// Column offsets from the left margin, in millimeters.
const COLUMNS: [f32; 6] = [0.0, 45.0, 85.0, 125.0, 205.0, 250.0];

// Built-in PDF fonts only cover WinAnsi, names are often Cyrillic.
const REGULAR_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
const BOLD_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("spreadsheet rendering failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("pdf rendering failed: {0}")]
    Pdf(#[from] printpdf::Error),
}

/// Supported output formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Pdf,
}

impl ExportFormat {
    /// `xlsx` (or `excel`) when absent. Unknown formats are rejected.
    pub fn parse(value: Option<&str>) -> Result<Self, ServerError> {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("xlsx") | Some("excel") => Ok(ExportFormat::Xlsx),
            Some("pdf") => Ok(ExportFormat::Pdf),
            Some(other) => Err(ServerError::InvalidInput(format!(
                "unsupported export format `{other}`, use xlsx or pdf"
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            },
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// Rendered file.
#[derive(Debug)]
pub struct Export {
    pub file_name: String,
    pub content_type: &'static str,
    pub content: Vec<u8>,
}

impl Export {
    /// `Content-Disposition` value with an ASCII fallback name.
    pub fn content_disposition(&self) -> String {
        let ascii: String = self
            .file_name
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();

        let mut encoded = String::with_capacity(self.file_name.len());
        for byte in self.file_name.bytes() {
            if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
                encoded.push(byte as char);
            } else {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }

        format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
    }
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_file_name(title: &str) -> String {
    let name: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if name.is_empty() {
        FALLBACK_NAME.to_owned()
    } else {
        name
    }
}

fn row(registration: &Registration) -> [&str; 6] {
    [
        registration.last_name.as_str(),
        registration.first_name.as_str(),
        registration.middle_name.as_deref().unwrap_or_default(),
        registration.email.as_str(),
        registration.phone.as_deref().unwrap_or_default(),
        if registration.status == RegistrationStatus::CheckedIn {
            "Yes"
        } else {
            "No"
        },
    ]
}

/// Render `registrations` of the event titled `title`.
pub fn render(
    title: &str,
    registrations: &[Registration],
    format: ExportFormat,
) -> Result<Export, ExportError> {
    let content = match format {
        ExportFormat::Xlsx => xlsx(registrations)?,
        ExportFormat::Pdf => pdf(title, registrations)?,
    };

    tracing::debug!(format = format.extension(), rows = registrations.len(), size = content.len(), "participants exported");

    Ok(Export {
        file_name: format!("{}.{}", sanitize_file_name(title), format.extension()),
        content_type: format.content_type(),
        content,
    })
}

fn xlsx(registrations: &[Registration]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let bold = Format::new().set_bold();
    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (i, registration) in registrations.iter().enumerate() {
        for (col, value) in row(registration).into_iter().enumerate() {
            sheet.write_string(i as u32 + 1, col as u16, value)?;
        }
    }
    sheet.autofit();

    Ok(workbook.save_to_buffer()?)
}

struct PdfWriter {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PdfWriter {
    fn line(&self, layer: &PdfLayerReference, cells: [&str; 6], y: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        for (cell, offset) in cells.into_iter().zip(COLUMNS) {
            layer.use_text(cell, TEXT_SIZE, Mm(MARGIN + offset), Mm(y), font);
        }
    }
}

fn pdf(title: &str, registrations: &[Registration]) -> Result<Vec<u8>, ExportError> {
    let (doc, page, layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "participants");
    let writer = PdfWriter {
        regular: doc.add_external_font(REGULAR_FONT)?,
        bold: doc.add_external_font(BOLD_FONT)?,
    };

    let mut layer = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT - MARGIN;
    layer.use_text(title, TITLE_SIZE, Mm(MARGIN), Mm(y), &writer.bold);
    y -= ROW_HEIGHT * 2.0;
    writer.line(&layer, HEADERS, y, true);

    for registration in registrations {
        y -= ROW_HEIGHT;
        if y < MARGIN {
            let (page, next) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "participants");
            layer = doc.get_page(page).get_layer(next);
            y = PAGE_HEIGHT - MARGIN;
            // Header repeated on every page.
            writer.line(&layer, HEADERS, y, true);
            y -= ROW_HEIGHT;
        }
        writer.line(&layer, row(registration), y, false);
    }

    Ok(doc.save_to_bytes()?)
}
