//! Trigger routing and async continuation, end to end over in-memory
//! collaborators.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use common::{dyn_stages, Harness, PipelineSetBuilder, ScriptedStage, StageScript};
use docpipe::envelope::{Envelope, Payload};
use docpipe::router::resume_after;
use docpipe::{
    AsyncKind, AsyncRouter, BlobStorage, CompletionHandler, EngineError, MessageQueue,
    ResultSink, ResultStore, StageError, TriggerMessage, TriggerOutcome,
};

/// Marks the pending job done, stores the envelope and queues the resume.
struct CompleteImmediately {
    calls: AtomicUsize,
}

impl CompleteImmediately {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionHandler for CompleteImmediately {
    async fn complete(
        &self,
        mut envelope: Envelope,
        result_name: &str,
        sink: &ResultSink,
        queue: &dyn MessageQueue,
    ) -> Result<(), StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        envelope.complete_result(result_name, json!({ "content": "INVOICE 42" }));
        envelope.kind = "ocr-text".to_string();

        let stored = sink.store(envelope).await?;
        if let Some(message) = resume_after(stored, result_name) {
            queue.send_message(message).await?;
        }
        Ok(())
    }
}

fn invoices_harness() -> (Harness, Arc<ScriptedStage>, Arc<ScriptedStage>) {
    let ocr = ScriptedStage::new("ocr", &["pdf"], StageScript::StartJob);
    let extract = ScriptedStage::producing("extractFields", &["ocr-text"], "fields");
    let pipelines = PipelineSetBuilder::new()
        .pipeline("invoices", &[("ocr", None), ("extractFields", None)])
        .build();
    let harness = Harness::new(dyn_stages(&[&ocr, &extract]), pipelines);
    (harness, ocr, extract)
}

#[tokio::test]
async fn test_upload_suspend_continue_resume() {
    let (harness, ocr, extract) = invoices_harness();
    let handler = CompleteImmediately::new();
    let router = AsyncRouter::new().with_handler(AsyncKind::FormRecognition, handler.clone());
    let trigger = harness.trigger(router).await;

    harness
        .documents
        .upload(b"%PDF-1.7", "invoices/Invoice_01.pdf")
        .await
        .unwrap();

    // Upload: runs until the OCR job is started.
    let outcome = trigger
        .handle(TriggerMessage::upload("Invoice_01.pdf", "invoices"))
        .await
        .unwrap();
    assert!(matches!(outcome, TriggerOutcome::Suspended { .. }));
    assert_eq!(ocr.calls(), 1);
    assert_eq!(extract.calls(), 0);

    // Continuation: routed to the form-recognition handler.
    let mut queued = harness.queue.take();
    assert_eq!(queued.len(), 1);
    let outcome = trigger.handle(queued.remove(0)).await.unwrap();
    assert!(matches!(
        outcome,
        TriggerOutcome::Dispatched(AsyncKind::FormRecognition)
    ));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    // Resume: re-enters at the stage after OCR.
    let mut queued = harness.queue.take();
    assert_eq!(queued.len(), 1);
    assert!(matches!(queued[0], TriggerMessage::Resume { index: 2, .. }));
    let outcome = trigger.handle(queued.remove(0)).await.unwrap();

    let stored = match outcome {
        TriggerOutcome::Completed(envelope) => envelope,
        other => panic!("Expected Completed, got {:?}", other),
    };
    assert_eq!(ocr.calls(), 1);
    assert_eq!(extract.calls(), 1);
    assert_eq!(
        extract.seen_payloads(),
        vec![Payload::Json(json!({ "content": "INVOICE 42" }))]
    );
    assert_eq!(stored.id.as_deref(), Some("Invoice_01"));
    assert_eq!(stored.kind, "fields");
    assert_eq!(
        stored.aggregated_results.keys().cloned().collect::<Vec<_>>(),
        vec!["ocr", "extractFields"]
    );

    let persisted = harness
        .sink
        .results()
        .get_by_id("Invoice_01", "invoices")
        .await
        .unwrap();
    assert_eq!(persisted.kind, "fields");
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn test_storage_event_runs_pipeline_from_blob_path() {
    let extract = ScriptedStage::producing("summarize", &["text"], "summary");
    let pipelines = PipelineSetBuilder::new()
        .pipeline("notes", &[("summarize", None)])
        .build();
    let harness = Harness::new(dyn_stages(&[&extract]), pipelines);
    let trigger = harness.trigger(AsyncRouter::new()).await;

    harness
        .documents
        .upload(b"meeting notes", "notes/2026/monday.txt")
        .await
        .unwrap();

    let outcome = trigger
        .handle(TriggerMessage::StorageEvent {
            subject: "/blobServices/default/containers/documents/blobs/notes/2026/monday.txt"
                .to_string(),
        })
        .await
        .unwrap();

    let stored = match outcome {
        TriggerOutcome::Completed(envelope) => envelope,
        other => panic!("Expected Completed, got {:?}", other),
    };
    assert_eq!(stored.id.as_deref(), Some("monday"));
    assert_eq!(stored.pipeline_name, "notes");
    assert_eq!(stored.result("text"), Some(&json!("meeting notes")));
    assert!(harness.results.contains("notes/monday.json"));
}

/// A failing route case: the message and the error record it must leave.
struct FailureCase {
    name: &'static str,
    message: TriggerMessage,
    expected_error_key: &'static str,
}

#[tokio::test]
async fn test_failures_are_recorded_and_propagated() {
    let cases = vec![
        FailureCase {
            name: "unknown_pipeline",
            message: TriggerMessage::upload("a.pdf", "receipts"),
            expected_error_key: "error/receipts/a_error.json",
        },
        FailureCase {
            name: "missing_blob",
            message: TriggerMessage::upload("missing.pdf", "invoices"),
            expected_error_key: "error/invoices/missing_error.json",
        },
        FailureCase {
            name: "continuation_without_checkpoint",
            message: TriggerMessage::Continuation(docpipe::ContinuationMessage {
                filename: Some("gone.pdf".to_string()),
                id: "gone".to_string(),
                pipeline: "invoices".to_string(),
                label: "first".to_string(),
                kind: "async-transaction".to_string(),
            }),
            expected_error_key: "error/invoices/gone_error.json",
        },
    ];

    for case in cases {
        let (harness, _, _) = invoices_harness();
        let trigger = harness.trigger(AsyncRouter::new()).await;

        let result = trigger.handle(case.message).await;

        assert!(result.is_err(), "Case '{}': expected failure", case.name);
        assert!(
            harness.results.contains(case.expected_error_key),
            "Case '{}': expected error record at {}, found {:?}",
            case.name,
            case.expected_error_key,
            harness.results.paths()
        );
    }
}

#[tokio::test]
async fn test_continuation_without_handler_fails() {
    let (harness, _, _) = invoices_harness();
    let trigger = harness.trigger(AsyncRouter::new()).await;
    harness
        .documents
        .upload(b"%PDF", "invoices/a.pdf")
        .await
        .unwrap();

    trigger
        .handle(TriggerMessage::upload("a.pdf", "invoices"))
        .await
        .unwrap();
    let continuation = harness.queue.take().remove(0);

    let err = trigger.handle(continuation).await.unwrap_err();
    assert!(matches!(err, EngineError::NoCompletionHandler { .. }));
}

#[tokio::test]
async fn test_unrecognized_async_kind() {
    let (harness, _, _) = invoices_harness();
    let handler = CompleteImmediately::new();
    let router = AsyncRouter::new()
        .with_handler(AsyncKind::SpeechToText, handler.clone())
        .with_handler(AsyncKind::FormRecognition, handler.clone())
        .with_handler(AsyncKind::TextAnalytics, handler.clone());

    let mut envelope = Envelope::placeholder(Some("a.pdf"), "invoices");
    envelope
        .record_result(1, "customVision", "async-transaction", json!({ "location": "x" }))
        .unwrap();

    let err = router
        .dispatch(envelope, &harness.sink, &*harness.queue)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnrecognizedAsyncKind { ref filename } if filename == "a.pdf"));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_router_invokes_exactly_one_handler() {
    let (harness, _, _) = invoices_harness();
    let speech = CompleteImmediately::new();
    let forms = CompleteImmediately::new();
    let text = CompleteImmediately::new();
    let router = AsyncRouter::new()
        .with_handler(AsyncKind::SpeechToText, speech.clone())
        .with_handler(AsyncKind::FormRecognition, forms.clone())
        .with_handler(AsyncKind::TextAnalytics, text.clone());

    let mut envelope = Envelope::placeholder(Some("call.wav"), "calls");
    envelope
        .record_result(1, "speechToText", "async-transaction", json!({ "location": "x" }))
        .unwrap();

    let kind = router
        .dispatch(envelope, &harness.sink, &*harness.queue)
        .await
        .unwrap();

    assert_eq!(kind, AsyncKind::SpeechToText);
    assert_eq!(speech.calls.load(Ordering::SeqCst), 1);
    assert_eq!(forms.calls.load(Ordering::SeqCst), 0);
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
}
