//! Operator input files
//!
//! Usage arrives as a JSON document matching [`UsageInput`]. Status and
//! credit lists are two-column `user_email,amount_payable` CSV files; a
//! header row is optional.

use rust_decimal::Decimal;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use domain_billing::{AmountRow, UsageInput};

use crate::error::CliError;

const AMOUNT_HEADER: [&str; 2] = ["user_email", "amount_payable"];

/// Reads a usage file
pub fn read_usage(path: &Path) -> Result<UsageInput, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Usage {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a `user_email,amount_payable` list
pub fn read_amount_rows(path: &Path) -> Result<Vec<AmountRow>, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_amount_rows(path, &text)
}

/// Parses the contents of a `user_email,amount_payable` list
pub fn parse_amount_rows(path: &Path, text: &str) -> Result<Vec<AmountRow>, CliError> {
    let csv_error = |line: usize, message: String| CliError::Csv {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut rows = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let raw = raw.trim().trim_start_matches('\u{feff}');
        if raw.is_empty() {
            continue;
        }

        let fields: Vec<&str> = raw.split(',').map(|f| f.trim().trim_matches('"')).collect();
        if fields.len() != 2 {
            return Err(csv_error(line, format!("expected 2 columns, found {}", fields.len())));
        }
        if rows.is_empty() && fields == AMOUNT_HEADER {
            continue;
        }
        if fields[0].is_empty() {
            return Err(csv_error(line, "user_email is empty".to_string()));
        }
        let amount = Decimal::from_str(fields[1])
            .map_err(|e| csv_error(line, format!("amount_payable '{}': {}", fields[1], e)))?;
        rows.push(AmountRow::new(fields[0], amount));
    }

    if rows.is_empty() {
        return Err(csv_error(0, "no rows".to_string()));
    }
    Ok(rows)
}
