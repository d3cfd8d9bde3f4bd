//! Turns an uploaded workbook into validated recipients.
//!
//! Only the first worksheet is read. Its first row is the header; the column
//! titled `email` (any case, surrounding spaces ignored) holds the addresses.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use calamine::{Data, Range, Reader, Xlsx, XlsxError, open_workbook_from_rs};

use crate::domain::{NewRecipient, dedup_by_email};
use crate::helpers::error_chain_fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetRow {
    pub email: Option<String>,
}

#[derive(thiserror::Error)]
pub enum SpreadsheetError {
    #[error("The upload is not valid base64.")]
    Encoding(#[source] base64::DecodeError),
    #[error("The upload is not a readable xlsx workbook.")]
    Unreadable(#[source] XlsxError),
    #[error("The workbook has no worksheets.")]
    NoWorksheet,
    #[error("The first worksheet has no `email` column.")]
    MissingEmailColumn,
}

impl std::fmt::Debug for SpreadsheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub fn decode_upload(encoded: &str) -> Result<Vec<SpreadsheetRow>, SpreadsheetError> {
    let payload = match encoded.trim().split_once(";base64,") {
        Some((_, payload)) => payload,
        None => encoded.trim(),
    };
    let bytes = STANDARD
        .decode(payload)
        .map_err(SpreadsheetError::Encoding)?;
    read_email_rows(bytes)
}

pub fn read_email_rows(bytes: Vec<u8>) -> Result<Vec<SpreadsheetRow>, SpreadsheetError> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).map_err(SpreadsheetError::Unreadable)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::NoWorksheet)?
        .map_err(SpreadsheetError::Unreadable)?;
    rows_from_range(&range)
}

pub fn rows_from_range(range: &Range<Data>) -> Result<Vec<SpreadsheetRow>, SpreadsheetError> {
    let mut rows = range.rows();
    let column = rows
        .next()
        .and_then(email_column)
        .ok_or(SpreadsheetError::MissingEmailColumn)?;

    Ok(rows
        .map(|row| SpreadsheetRow {
            email: row.get(column).and_then(cell_text),
        })
        .collect())
}

fn email_column(header: &[Data]) -> Option<usize> {
    header.iter().position(|cell| {
        cell_text(cell).is_some_and(|title| title.trim().eq_ignore_ascii_case("email"))
    })
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Drops rows without a valid address and repeated addresses. The returned
/// recipients keep the spreadsheet order.
pub fn normalize_rows(rows: Vec<SpreadsheetRow>) -> Vec<NewRecipient> {
    let total = rows.len();
    let valid: Vec<NewRecipient> = rows
        .into_iter()
        .filter_map(|row| row.email)
        .filter_map(|email| match NewRecipient::try_from(email) {
            Ok(recipient) => Some(recipient),
            Err(e) => {
                tracing::debug!(error.message = %e, "Skipping spreadsheet row.");
                None
            }
        })
        .collect();
    let unique = dedup_by_email(valid);
    tracing::info!(total, accepted = unique.len(), "Normalized spreadsheet rows.");
    unique
}
