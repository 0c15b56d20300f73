//! JSON document output
//!
//! Writes each document's rendering context as pretty-printed JSON into the
//! output directory, named after the document's file stem.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use domain_billing::{BillingError, Document, DocumentRenderer};

use crate::error::CliError;

#[derive(Serialize)]
struct Rendered<'a> {
    template: &'a str,
    context: &'a serde_json::Value,
}

/// Renders documents as JSON files
#[derive(Debug, Clone)]
pub struct JsonRenderer {
    output_dir: PathBuf,
}

impl JsonRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, file_stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", file_stem))
    }
}

impl DocumentRenderer for JsonRenderer {
    fn exists(&self, file_stem: &str) -> bool {
        self.path_for(file_stem).exists()
    }

    fn render(&self, document: &Document) -> Result<PathBuf, BillingError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| CliError::Write {
            path: self.output_dir.clone(),
            source,
        })?;

        let path = self.path_for(&document.file_stem);
        let body = serde_json::to_string_pretty(&Rendered {
            template: &document.template,
            context: &document.context,
        })
        .map_err(|e| BillingError::Render(e.to_string()))?;

        fs::write(&path, body).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
