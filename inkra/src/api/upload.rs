//! Multipart form decoding for document uploads.

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use inkra_core::model::{parse_csv, DocumentDraft, Upload};
use inkra_core::DocError;
use tracing::debug;

pub const FILE_FIELD: &str = "file";

/// Text fields and the (optional) file part of a submitted form.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    pub file: Option<Upload>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self, DocError> {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await.map_err(form_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(form_error)?;
                // browsers send an empty part when no file was picked
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                debug!("Received file {:?} ({} bytes)", file_name, bytes.len());
                form.file = Some(Upload::new(file_name, bytes));
            } else {
                let value = field.text().await.map_err(form_error)?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn csv(&self, name: &str) -> Vec<String> {
        parse_csv(self.text(name))
    }

    pub fn draft(&self) -> DocumentDraft {
        DocumentDraft {
            title: self.text("title").to_string(),
            description: self.text("description").to_string(),
            tags: self.csv("tags"),
            ip_whitelist: self.csv("ipWhitelist"),
        }
    }
}

fn form_error(err: MultipartError) -> DocError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        DocError::validation("File too large")
    } else {
        debug!("Multipart error: {}", err.body_text());
        DocError::validation("Error parsing multipart form")
    }
}
