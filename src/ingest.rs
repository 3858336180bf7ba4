//! Record ingestion: single submissions and bulk spreadsheet imports.
//!
//! A submission moves through collecting (all fields present), validating
//! (email shape), the duplicate-number check, and persisting. The first
//! failing step rejects it and nothing is written; persisting is last, so a
//! rejection never leaves partial state behind.

use crate::error::{ImportError, StoreError};
use crate::record::{
    Document, RecordInput, SchemaVersion, FIELD_DEPARTMENT_OR_COURSE, FIELD_EMAIL, FIELD_ISSUE,
    FIELD_NAME, FIELD_NUMBER, FIELD_REGISTRATION_CODE,
};
use crate::store::RecordStore;
use crate::validate::{is_valid_email, number_exists};
use calamine::{Data, Reader, Xlsx};
use std::collections::HashSet;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("fill in all fields (missing: {})", .0.join(", "))]
    IncompleteFields(Vec<&'static str>),
    #[error("enter a valid email address")]
    InvalidEmail,
    #[error("phone number already registered")]
    DuplicateNumber,
    #[error("{0}")]
    StoreError(String),
    #[error("malformed row: {0}")]
    ImportParseError(String),
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::IncompleteFields(_) => "incomplete_fields",
            Rejection::InvalidEmail => "invalid_email",
            Rejection::DuplicateNumber => "duplicate_number",
            Rejection::StoreError(_) => "store_error",
            Rejection::ImportParseError(_) => "import_parse_error",
        }
    }
}

impl From<StoreError> for Rejection {
    fn from(e: StoreError) -> Self {
        Rejection::StoreError(e.to_string())
    }
}

/// Runs every check short of writing. Returns the document that would be stored.
pub fn check(
    store: &dyn RecordStore,
    schema: SchemaVersion,
    input: &RecordInput,
) -> Result<Document, Rejection> {
    let missing = input.missing_fields(schema);
    if !missing.is_empty() {
        return Err(Rejection::IncompleteFields(missing));
    }
    if !is_valid_email(input.email.trim()) {
        return Err(Rejection::InvalidEmail);
    }
    if number_exists(input.number.trim(), store)? {
        return Err(Rejection::DuplicateNumber);
    }
    Ok(input.to_document(schema))
}

/// Validates and persists one record, returning the id the store assigned.
pub fn submit(
    store: &mut dyn RecordStore,
    schema: SchemaVersion,
    input: &RecordInput,
) -> Result<String, Rejection> {
    let document = check(&*store, schema, input)?;
    let id = store.add(&document).map_err(|e| {
        tracing::warn!(error = %e, "record write failed");
        Rejection::from(e)
    })?;
    tracing::info!(record_id = %id, "record registered");
    Ok(id)
}

/// One data row of an uploaded file. `row` counts data rows from 1, header excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub row: usize,
    pub fields: Result<RecordInput, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub row: usize,
    pub reason: Rejection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    pub inserted: usize,
    pub rejected: Vec<RowRejection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewReport {
    pub total: usize,
    pub accepted: Vec<usize>,
    pub rejected: Vec<RowRejection>,
}

/// Sequential best-effort import. A rejected row is recorded and the batch
/// moves on; rows that repeat an earlier row's number see it already stored.
pub fn import_rows(
    store: &mut dyn RecordStore,
    schema: SchemaVersion,
    rows: &[ImportRow],
) -> ImportReport {
    let mut report = ImportReport {
        total: rows.len(),
        ..ImportReport::default()
    };
    for r in rows {
        let outcome = match &r.fields {
            Ok(input) => submit(store, schema, input).map(|_| ()),
            Err(msg) => Err(Rejection::ImportParseError(msg.clone())),
        };
        match outcome {
            Ok(()) => report.inserted += 1,
            Err(reason) => {
                tracing::debug!(row = r.row, code = reason.code(), "import row rejected");
                report.rejected.push(RowRejection { row: r.row, reason });
            }
        }
    }
    tracing::info!(
        total = report.total,
        inserted = report.inserted,
        rejected = report.rejected.len(),
        "bulk import finished"
    );
    report
}

/// Dry run of `import_rows`: same checks, nothing written. Numbers repeated
/// within the file count as duplicates from their second occurrence.
pub fn preview_rows(
    store: &dyn RecordStore,
    schema: SchemaVersion,
    rows: &[ImportRow],
) -> PreviewReport {
    let mut report = PreviewReport {
        total: rows.len(),
        ..PreviewReport::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    for r in rows {
        let outcome = match &r.fields {
            Ok(input) => check(store, schema, input).and_then(|_| {
                if seen.insert(input.number.trim().to_string()) {
                    Ok(())
                } else {
                    Err(Rejection::DuplicateNumber)
                }
            }),
            Err(msg) => Err(Rejection::ImportParseError(msg.clone())),
        };
        match outcome {
            Ok(()) => report.accepted.push(r.row),
            Err(reason) => report.rejected.push(RowRejection { row: r.row, reason }),
        }
    }
    report
}

const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const UTF8_BOM: &str = "\u{feff}";

/// Column aliases accepted for each field, by position in `RecordInput`.
fn column_aliases(schema: SchemaVersion) -> [(&'static str, Vec<&'static str>); 5] {
    let mut code_aliases = vec![schema.code_field()];
    for alias in [
        FIELD_REGISTRATION_CODE,
        FIELD_DEPARTMENT_OR_COURSE,
        "cod_matricula",
        "curso/setor",
    ] {
        if !code_aliases.contains(&alias) {
            code_aliases.push(alias);
        }
    }
    [
        (FIELD_NAME, vec![FIELD_NAME]),
        (FIELD_EMAIL, vec![FIELD_EMAIL]),
        (FIELD_NUMBER, vec![FIELD_NUMBER]),
        ("problema", vec!["problema", FIELD_ISSUE]),
        (schema.code_field(), code_aliases),
    ]
}

/// Decodes an uploaded spreadsheet into rows. Workbooks (zip signature) are
/// read from their first sheet; anything else is read as CSV. File-level
/// problems (unreadable upload, missing columns) fail the whole upload;
/// row-level shape problems are carried in the row so the rest of the file
/// still imports.
pub fn parse_import(bytes: &[u8], schema: SchemaVersion) -> Result<Vec<ImportRow>, ImportError> {
    if bytes.starts_with(&ZIP_SIGNATURE) {
        let (headers, body) = read_workbook(bytes)?;
        return map_rows(schema, headers, body.into_iter().map(Ok));
    }
    let text = std::str::from_utf8(bytes).map_err(|_| ImportError::NotText)?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::Malformed(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    let body = reader.records().map(|result| {
        result
            .map(|record| record.iter().map(str::to_string).collect::<Vec<_>>())
            .map_err(|e| e.to_string())
    });
    map_rows(schema, headers, body)
}

/// Header row and data rows of the first sheet, as trimmed text.
fn read_workbook(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>), ImportError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ImportError::UnreadableWorkbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::UnreadableWorkbook("workbook has no sheets".to_string()))?
        .map_err(|e| ImportError::UnreadableWorkbook(e.to_string()))?;

    let mut rows = range
        .rows()
        .map(|cells| cells.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    Ok((headers, rows.collect()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // Numbers typed into a sheet come back as floats; 5511.0 prints as 5511.
        other => other.to_string().trim().to_string(),
    }
}

/// Resolves the header aliases, then turns each data row into an
/// `ImportRow`. Blank rows are skipped but still counted for numbering.
fn map_rows<I>(
    schema: SchemaVersion,
    headers: Vec<String>,
    body: I,
) -> Result<Vec<ImportRow>, ImportError>
where
    I: Iterator<Item = Result<Vec<String>, String>>,
{
    let headers: Vec<String> = headers
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut indexes = [0usize; 5];
    let mut missing = Vec::new();
    for (slot, (display, aliases)) in column_aliases(schema).iter().enumerate() {
        match aliases
            .iter()
            .find_map(|a| headers.iter().position(|h| h == a))
        {
            Some(i) => indexes[slot] = i,
            None => missing.push(display.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    let mut rows = Vec::new();
    for (i, result) in body.enumerate() {
        let row = i + 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                rows.push(ImportRow {
                    row,
                    fields: Err(e),
                });
                continue;
            }
        };
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        if record.len() < headers.len() {
            rows.push(ImportRow {
                row,
                fields: Err(format!(
                    "expected {} cells, found {}",
                    headers.len(),
                    record.len()
                )),
            });
            continue;
        }
        let cell = |slot: usize| {
            record
                .get(indexes[slot])
                .map(|c| c.trim().to_string())
                .unwrap_or_default()
        };
        rows.push(ImportRow {
            row,
            fields: Ok(RecordInput {
                name: cell(0),
                email: cell(1),
                number: cell(2),
                issue: cell(3),
                code: cell(4),
            }),
        });
    }
    Ok(rows)
}
