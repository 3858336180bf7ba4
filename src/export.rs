use crate::error::ExportError;
use crate::record::{column_rank, SchemaVersion, StoredRecord};
use crate::store::RecordStore;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::str::FromStr;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const EXPORT_FILE_STEM: &str = "dados_usuarios_technos";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

/// A finished download: name, MIME type, and the whole file in memory.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Records flattened to rows under the union of every document's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// An empty collection still gets the current schema's header.
    pub fn from_records(records: &[StoredRecord], schema: SchemaVersion) -> Table {
        let columns: Vec<String> = if records.is_empty() {
            schema.fields().iter().map(|f| f.to_string()).collect()
        } else {
            let union: BTreeSet<&str> = records.iter().flat_map(|r| r.document.keys()).collect();
            let mut cols: Vec<&str> = union.into_iter().collect();
            cols.sort_by_key(|c| column_rank(*c));
            cols.into_iter().map(str::to_string).collect()
        };
        let rows = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.document.get(c).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();
        Table { columns, rows }
    }
}

/// Reads every record and serializes it. A failed read aborts the export;
/// no partial file is produced.
pub fn export_records(
    store: &dyn RecordStore,
    schema: SchemaVersion,
    format: ExportFormat,
) -> Result<ExportFile, ExportError> {
    let records = store.stream_all().map_err(|e| {
        tracing::warn!(error = %e, "export read failed");
        ExportError::from(e)
    })?;
    let table = Table::from_records(&records, schema);
    let bytes = match format {
        ExportFormat::Csv => write_csv(&table)?,
        ExportFormat::Xlsx => write_xlsx(&table)?,
    };
    tracing::info!(
        rows = table.rows.len(),
        columns = table.columns.len(),
        format = format.extension(),
        "export built"
    );
    Ok(ExportFile {
        file_name: format!("{}.{}", EXPORT_FILE_STEM, format.extension()),
        content_type: format.content_type(),
        bytes,
    })
}

fn write_csv(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Failed(format!("csv: {}", e.error())))
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="users" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

pub(crate) const SHEET_ENTRY: &str = "xl/worksheets/sheet1.xml";

/// Minimal SpreadsheetML package: one sheet, inline strings, no styles.
fn write_xlsx(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES_XML),
        ("_rels/.rels", ROOT_RELS_XML),
        ("xl/workbook.xml", WORKBOOK_XML),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML),
    ] {
        zip.start_file(name, opts)?;
        zip.write_all(body.as_bytes())?;
    }

    zip.start_file(SHEET_ENTRY, opts)?;
    zip.write_all(sheet_xml(table).as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

fn sheet_xml(table: &Table) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, cells) in std::iter::once(&table.columns).chain(&table.rows).enumerate() {
        let row_no = r + 1;
        out.push_str(&format!(r#"<row r="{row_no}">"#));
        for (c, value) in cells.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            out.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                column_letters(c),
                row_no,
                xml_escape(value)
            ));
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

/// 0 -> A, 25 -> Z, 26 -> AA.
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(ch),
            // Not representable in XML 1.0.
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}
