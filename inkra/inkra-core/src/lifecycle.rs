//! Document lifecycle: create, update, sign, soft-delete and the read paths.
//!
//! Every precondition is checked before anything is written. The sign
//! transition itself is a conditional update in the store, so a check that
//! passes here can still lose to a concurrent signer; that case is reported as
//! [`DocError::InvalidState`] just like the early check.

use std::io::Cursor;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access;
use crate::blob::{safe_extension, BlobArea, BlobStore};
use crate::error::{DocError, Result};
use crate::model::{
    Document, DocumentDraft, DocumentPage, ListQuery, PublicDocument, SignRequest, SignedFields,
    Upload,
};
use crate::sniff;
use crate::store::DocumentStore;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub max_file_size: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

pub struct DocumentService {
    store: Arc<DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    config: LifecycleConfig,
}

impl DocumentService {
    pub fn new(
        store: Arc<DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            config,
        }
    }

    pub async fn create(&self, draft: DocumentDraft, upload: Option<Upload>) -> Result<Document> {
        require_fields(&draft)?;
        let upload = self.check_upload(upload.as_ref())?;

        let id = Uuid::new_v4();
        let name = format!("{}{}", id, safe_extension(&upload.file_name));
        let path = self.blobs.put(BlobArea::Uploads, &name, &upload.bytes).await?;

        let now = Utc::now();
        let doc = Document {
            id,
            title: draft.title,
            description: draft.description,
            tags: draft.tags,
            original_name: upload.file_name.clone(),
            original_path: path,
            ip_whitelist: draft.ip_whitelist,
            is_signed: false,
            signed_name: None,
            signed_path: None,
            signed_at: None,
            signed_by_metadata: None,
            signed_by_ip: None,
            remarks: None,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&doc)?;
        info!(doc_id = %id, "Created document {:?}", doc.title);
        Ok(doc)
    }

    /// Replace metadata and the original file. The previous file stays on disk.
    pub async fn update(
        &self,
        id: &str,
        draft: DocumentDraft,
        upload: Option<Upload>,
    ) -> Result<Document> {
        require_fields(&draft)?;
        let upload = self.check_upload(upload.as_ref())?;

        let id = parse_id(id)?;
        if self.store.find(id, false)?.is_none() {
            return Err(DocError::not_found());
        }

        let name = format!("{}{}", Uuid::new_v4(), safe_extension(&upload.file_name));
        let path = self.blobs.put(BlobArea::Uploads, &name, &upload.bytes).await?;

        let updated = self
            .store
            .update_original(id, &draft, &upload.file_name, &path, Utc::now())?;
        if !updated {
            // deleted between the check and the update
            self.discard(&path).await;
            return Err(DocError::not_found());
        }
        info!(doc_id = %id, "Updated document");
        self.store.find(id, false)?.ok_or_else(DocError::not_found)
    }

    /// Soft-delete a live document.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = parse_id(id)?;
        if !self.store.soft_delete(id, Utc::now())? {
            return Err(DocError::not_found());
        }
        info!(doc_id = %id, "Deleted document");
        Ok(())
    }

    /// Attach a countersigned file. Succeeds at most once per document.
    pub async fn sign(&self, id: &str, req: SignRequest) -> Result<Document> {
        let id = parse_id(id)?;
        let doc = self.store.find(id, true)?.ok_or_else(DocError::not_found)?;
        if doc.deleted {
            return Err(DocError::InvalidState("Document is deleted".into()));
        }
        if doc.is_signed {
            return Err(DocError::InvalidState("Document is already signed".into()));
        }
        // an unattributed request never passes, even an open whitelist
        if req.client_ip.is_empty() || !access::is_allowed(&req.client_ip, &doc.ip_whitelist) {
            warn!(doc_id = %id, client_ip = %req.client_ip, "Rejected signing attempt");
            return Err(DocError::Forbidden("IP not allowed".into()));
        }
        let upload = self.check_upload(req.upload.as_ref())?;

        let name = format!("signed_{}{}", Uuid::new_v4(), safe_extension(&upload.file_name));
        let path = self.blobs.put(BlobArea::Signed, &name, &upload.bytes).await?;

        let fields = SignedFields {
            signed_name: name,
            signed_path: path.clone(),
            signed_at: Utc::now(),
            signed_by_metadata: req.metadata,
            signed_by_ip: req.client_ip.clone(),
            remarks: req.remarks,
        };
        let won = match self.store.mark_signed(id, &fields) {
            Ok(won) => won,
            Err(e) => {
                self.discard(&path).await;
                return Err(e);
            }
        };
        if !won {
            self.discard(&path).await;
            return Err(match self.store.find(id, true)? {
                Some(current) if current.deleted => {
                    DocError::InvalidState("Document is deleted".into())
                }
                Some(_) => DocError::InvalidState("Document is already signed".into()),
                None => DocError::not_found(),
            });
        }

        info!(doc_id = %id, client_ip = %req.client_ip, "Document signed");
        self.store.find(id, true)?.ok_or_else(DocError::not_found)
    }

    pub async fn get(&self, id: &str) -> Result<Document> {
        let id = parse_id(id)?;
        self.store.find(id, false)?.ok_or_else(DocError::not_found)
    }

    /// Like [`get`](Self::get) but also returns soft-deleted records.
    pub async fn get_including_deleted(&self, id: &str) -> Result<Document> {
        let id = parse_id(id)?;
        self.store.find(id, true)?.ok_or_else(DocError::not_found)
    }

    pub async fn view(&self, id: &str) -> Result<PublicDocument> {
        self.get(id).await.map(PublicDocument::from)
    }

    pub async fn list(&self, query: &ListQuery) -> Result<DocumentPage> {
        let filter = query.normalize();
        let (docs, total) = self.store.list(&filter)?;
        debug!(
            "Listed {} of {} documents (page {}, limit {})",
            docs.len(),
            total,
            filter.page,
            filter.limit
        );
        Ok(DocumentPage {
            total,
            page: filter.page,
            limit: filter.limit,
            docs,
        })
    }

    fn check_upload<'a>(&self, upload: Option<&'a Upload>) -> Result<&'a Upload> {
        let upload = upload.ok_or_else(|| DocError::validation("No file uploaded"))?;
        let size = upload.declared_size.max(upload.bytes.len() as u64);
        if size > self.config.max_file_size {
            return Err(DocError::validation("File too large"));
        }
        let kind = sniff::classify(&mut Cursor::new(upload.bytes.as_ref()))
            .map_err(|_| DocError::validation("Error parsing pdf"))?;
        if !kind.is_pdf() {
            debug!("Rejected upload {:?} sniffed as {}", upload.file_name, kind.mime());
            return Err(DocError::validation("File is not a pdf"));
        }
        Ok(upload)
    }

    async fn discard(&self, location: &str) {
        if let Err(e) = self.blobs.remove(location).await {
            warn!("Could not remove orphaned file {}: {}", location, e);
        }
    }
}

fn require_fields(draft: &DocumentDraft) -> Result<()> {
    if draft.title.is_empty() || draft.description.is_empty() {
        return Err(DocError::validation(
            "Missing required fields: title, description",
        ));
    }
    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| DocError::not_found())
}
