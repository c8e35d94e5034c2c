use std::sync::Arc;

use inkra_core::blob::LocalBlobStore;
use inkra_core::model::{DocumentDraft, ListQuery, SignRequest, Upload};
use inkra_core::store::DocumentStore;
use inkra_core::{DocError, DocumentService, LifecycleConfig};

const B1: &[u8] = b"%PDF-1.7\n% original\n1 0 obj << >> endobj\n%%EOF\n";
const B2: &[u8] = b"%PDF-1.7\n% countersigned\n1 0 obj << >> endobj\n%%EOF\n";

fn service(dir: &tempfile::TempDir) -> Arc<DocumentService> {
    let store = Arc::new(DocumentStore::open(&dir.path().join("data")).unwrap());
    let blobs = Arc::new(LocalBlobStore::new(dir.path().join("docs")));
    Arc::new(DocumentService::new(store, blobs, LifecycleConfig::default()))
}

fn draft(whitelist: &[&str]) -> DocumentDraft {
    DocumentDraft {
        title: "T".into(),
        description: "D".into(),
        tags: vec![],
        ip_whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
    }
}

fn sign_from(ip: &str) -> SignRequest {
    SignRequest {
        client_ip: ip.into(),
        upload: Some(Upload::new("countersigned.pdf", B2)),
        metadata: "signer".into(),
        remarks: String::new(),
    }
}

#[tokio::test]
async fn open_document_signs_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let doc = service
        .create(draft(&[]), Some(Upload::new("b1.pdf", B1)))
        .await
        .unwrap();
    assert!(!doc.is_signed);
    let id = doc.id.to_string();

    let signed = service.sign(&id, sign_from("198.51.100.7")).await.unwrap();
    assert!(signed.is_signed);
    assert_eq!(signed.signed_by_ip.as_deref(), Some("198.51.100.7"));
    assert_eq!(std::fs::read(signed.signed_path.unwrap()).unwrap(), B2);
    assert_eq!(std::fs::read(&doc.original_path).unwrap(), B1);

    for ip in ["198.51.100.7", "192.0.2.1", "not-an-ip"] {
        let err = service.sign(&id, sign_from(ip)).await.unwrap_err();
        assert!(matches!(err, DocError::InvalidState(_)), "{ip}: {err}");
    }
}

#[tokio::test]
async fn whitelisted_document_rejects_outsiders() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let doc = service
        .create(draft(&["203.0.113.0/24"]), Some(Upload::new("b1.pdf", B1)))
        .await
        .unwrap();
    let id = doc.id.to_string();

    let err = service.sign(&id, sign_from("198.51.100.7")).await.unwrap_err();
    assert!(matches!(err, DocError::Forbidden(_)));
    let unchanged = service.get(&id).await.unwrap();
    assert!(!unchanged.is_signed);
    assert!(unchanged.signature_consistent());

    let signed = service.sign(&id, sign_from("203.0.113.50")).await.unwrap();
    assert!(signed.is_signed);
    assert!(signed.signature_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signers_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let doc = service
        .create(draft(&[]), Some(Upload::new("b1.pdf", B1)))
        .await
        .unwrap();
    let id = doc.id.to_string();

    let attempts: Vec<_> = (0..16)
        .map(|i| {
            let service = service.clone();
            let id = id.clone();
            tokio::spawn(async move { service.sign(&id, sign_from(&format!("10.0.0.{i}"))).await })
        })
        .collect();

    let mut winners = Vec::new();
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(doc) => winners.push(doc),
            Err(DocError::InvalidState(msg)) => assert_eq!(msg, "Document is already signed"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let stored = service.get(&id).await.unwrap();
    assert_eq!(stored.signed_by_ip, winners[0].signed_by_ip);
    assert_eq!(stored.signed_name, winners[0].signed_name);

    // losing uploads are cleaned up
    let signed_files = std::fs::read_dir(dir.path().join("docs").join("signed"))
        .unwrap()
        .count();
    assert_eq!(signed_files, 1);
}

#[tokio::test]
async fn deleted_documents_drop_out_of_listing() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let keep = service
        .create(draft(&[]), Some(Upload::new("keep.pdf", B1)))
        .await
        .unwrap();
    let gone = service
        .create(draft(&[]), Some(Upload::new("gone.pdf", B1)))
        .await
        .unwrap();

    service.delete(&gone.id.to_string()).await.unwrap();
    let err = service
        .sign(&gone.id.to_string(), sign_from("10.0.0.1"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Document is deleted");

    let page = service.list(&ListQuery::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.docs[0].id, keep.id);

    let page = service
        .list(&ListQuery {
            keyword: Some("gone".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}
