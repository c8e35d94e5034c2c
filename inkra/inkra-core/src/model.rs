//! Document records and the inputs accepted by the lifecycle operations.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// One uploaded file and its signing state.
///
/// The signed-* fields are either all `Some` (when `is_signed`) or all `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub original_name: String,
    pub original_path: String,
    pub ip_whitelist: Vec<String>,
    pub is_signed: bool,
    pub signed_name: Option<String>,
    pub signed_path: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signed_by_metadata: Option<String>,
    pub signed_by_ip: Option<String>,
    pub remarks: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// True when the signed-* fields agree with `is_signed`.
    pub fn signature_consistent(&self) -> bool {
        let set = [
            self.signed_name.is_some(),
            self.signed_path.is_some(),
            self.signed_at.is_some(),
            self.signed_by_metadata.is_some(),
            self.signed_by_ip.is_some(),
            self.remarks.is_some(),
        ];
        set.iter().all(|s| *s == self.is_signed)
    }
}

/// What an unauthenticated counter-signer may see about a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDocument {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub original_name: String,
    pub original_path: String,
    pub is_signed: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for PublicDocument {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            description: doc.description,
            tags: doc.tags,
            original_name: doc.original_name,
            original_path: doc.original_path,
            is_signed: doc.is_signed,
            signed_at: doc.signed_at,
            created_at: doc.created_at,
        }
    }
}

/// Editable metadata supplied on create and update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentDraft {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub ip_whitelist: Vec<String>,
}

/// An uploaded file as handed over by the transport layer.
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub declared_size: u64,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            file_name: file_name.into(),
            declared_size: bytes.len() as u64,
            bytes,
        }
    }
}

/// Inputs for a signing attempt.
#[derive(Clone, Debug)]
pub struct SignRequest {
    pub client_ip: String,
    pub upload: Option<Upload>,
    pub metadata: String,
    pub remarks: String,
}

/// Signing audit fields written in a single update.
#[derive(Clone, Debug)]
pub struct SignedFields {
    pub signed_name: String,
    pub signed_path: String,
    pub signed_at: DateTime<Utc>,
    pub signed_by_metadata: String,
    pub signed_by_ip: String,
    pub remarks: String,
}

/// Raw listing parameters; see [`ListQuery::normalize`].
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub keyword: Option<String>,
    pub signed: Option<bool>,
}

/// Listing parameters after clamping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListFilter {
    pub page: u32,
    pub limit: u32,
    pub keyword: Option<String>,
    pub signed: Option<bool>,
}

impl ListFilter {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl ListQuery {
    /// `page` defaults to 1 and is at least 1; `limit` defaults to 10 and is
    /// clamped into `1..=100`; blank keywords are dropped.
    pub fn normalize(&self) -> ListFilter {
        let page = self.page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
        let limit = self
            .limit
            .unwrap_or(i64::from(DEFAULT_PAGE_LIMIT))
            .clamp(1, i64::from(MAX_PAGE_LIMIT)) as u32;
        let keyword = self
            .keyword
            .as_ref()
            .filter(|k| !k.is_empty())
            .cloned();
        ListFilter {
            page,
            limit,
            keyword,
            signed: self.signed,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentPage {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub docs: Vec<Document>,
}

/// Split a comma separated form value, trimming entries and dropping blanks.
pub fn parse_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
