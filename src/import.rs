//! Batch account creation from an uploaded CSV file.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;

use crate::accounts::{AccountService, CreateAccount};
use crate::err::Error;
use crate::models::{Account, Role};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub added: Vec<Account>,
    pub skipped: Vec<SkippedRow>,
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|header| header.eq_ignore_ascii_case(name))
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Creates one student account per row, never stopping on a bad row.
///
/// Rows are numbered from 1, starting with the first row after the header.
/// An unreadable header is reported as row 0 and ends the import.
pub async fn import_accounts(
    accounts: &AccountService,
    file_name: &str,
    contents: &[u8],
    default_password: &str,
) -> Result<ImportReport, Error> {
    if !file_name.to_ascii_lowercase().ends_with(".csv") {
        return Err(Error::bad_request("Invalid file format"));
    }

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(contents);
    let mut report = ImportReport {
        added: Vec::new(),
        skipped: Vec::new(),
    };
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) => {
            log::warn!("Could not read CSV header of `{}`: {}", file_name, err);
            report.skipped.push(SkippedRow {
                row: 0,
                reason: format!("Could not read CSV header: {}", err),
            });
            return Ok(report);
        }
    };
    let email_col = column(&headers, "email");
    let username_col = column(&headers, "username");

    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                log::debug!("Import row {} unreadable: {}", row, err);
                report.skipped.push(SkippedRow {
                    row,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let (Some(email), Some(username)) = (cell(&record, email_col), cell(&record, username_col))
        else {
            report.skipped.push(SkippedRow {
                row,
                reason: "Missing email or username".to_string(),
            });
            continue;
        };

        let candidate = CreateAccount {
            username,
            email,
            password: default_password.to_string(),
            role: Role::Student.as_str().to_string(),
        };
        match accounts.create_account(candidate).await {
            Ok(account) => report.added.push(account),
            Err(err) => {
                log::debug!("Import row {} rejected: {}", row, err);
                report.skipped.push(SkippedRow {
                    row,
                    reason: err.to_string(),
                });
            }
        }
    }

    log::info!(
        "Imported {} account(s), skipped {} row(s) from `{}`",
        report.added.len(),
        report.skipped.len(),
        file_name
    );
    Ok(report)
}
