//! End-to-end processing of one facility.
//!
//! The orchestrator is the only component that sequences the others:
//! locate, enumerate, then retrieve/extract/summarize per document,
//! strictly sequentially (all browser work shares one page). Per-document
//! faults are recorded as descriptive strings and never abort the batch;
//! only a session fault fails the run, after scheduling a session reset so
//! the next run starts clean.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::types::{ProcessingResult, ProgressEvent, RunTarget, Stage};
use super::RunError;
use crate::browser::SessionManager;
use crate::extraction::pipeline::DocumentExtractor;
use crate::portal::enumerator::DocumentList;
use crate::portal::locator::FacilitySearch;
use crate::portal::retriever::DocumentFetch;
use crate::portal::types::{DocumentDescriptor, FacilityRecord, FacilityRef};
use crate::portal::PortalError;
use crate::summary::types::{DocumentSummary, Relevance, Summarizer};

pub struct Orchestrator {
    session: Arc<SessionManager>,
    locator: Arc<dyn FacilitySearch>,
    enumerator: Arc<dyn DocumentList>,
    retriever: Arc<dyn DocumentFetch>,
    extractor: Arc<DocumentExtractor>,
    summarizer: Arc<dyn Summarizer>,
}

impl Orchestrator {
    pub fn new(
        session: Arc<SessionManager>,
        locator: Arc<dyn FacilitySearch>,
        enumerator: Arc<dyn DocumentList>,
        retriever: Arc<dyn DocumentFetch>,
        extractor: Arc<DocumentExtractor>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            session,
            locator,
            enumerator,
            retriever,
            extractor,
            summarizer,
        }
    }

    /// Drive one run, emitting progress over `tx`. A closed channel means
    /// the caller went away: emission stops, the in-flight document is
    /// finished (browser operations are not preemptible mid-strategy), and
    /// the run returns early with what it has.
    pub async fn process(
        &self,
        target: RunTarget,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> Result<ProcessingResult, RunError> {
        // One logical run at a time; a concurrent caller queues here.
        let _permit = self.session.run_permit().await;

        match self.process_inner(target, &tx).await {
            Ok(result) => {
                let done = ProgressEvent::new(Stage::Done, 100, "Processing complete")
                    .with_result(result.clone());
                let _ = tx.send(done).await;
                Ok(result)
            }
            Err(e) => {
                if is_session_fault(&e) {
                    // Discard the session so the next run starts clean.
                    self.session.reset().await;
                }
                let failed = ProgressEvent::new(Stage::Failed, 100, format!("Run failed: {e}"));
                let _ = tx.send(failed).await;
                Err(e)
            }
        }
    }

    async fn process_inner(
        &self,
        target: RunTarget,
        tx: &mpsc::Sender<ProgressEvent>,
    ) -> Result<ProcessingResult, RunError> {
        emit(tx, ProgressEvent::new(Stage::Locating, 5, "Locating facility")).await;

        let (facility, facility_ref) = self.resolve_facility(target, tx).await?;

        emit(
            tx,
            ProgressEvent::new(
                Stage::Enumerating,
                20,
                format!("Enumerating documents for {}", facility.name),
            ),
        )
        .await;

        let descriptors = self.enumerator.list(&facility_ref).await?;
        let documents_found = descriptors.len();

        emit(
            tx,
            ProgressEvent::new(
                Stage::Enumerating,
                30,
                format!("Found {documents_found} documents"),
            )
            .with_documents_found(documents_found),
        )
        .await;

        if descriptors.is_empty() {
            // A facility with no records is a valid, complete result.
            return Ok(ProcessingResult {
                overview: format!(
                    "No documents were found for {} in the records viewer.",
                    facility.name
                ),
                facility,
                documents_found: 0,
                documents_processed: 0,
                summaries: vec![],
                errors: vec![],
            });
        }

        let mut summaries: Vec<DocumentSummary> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut cancelled = false;

        for (index, descriptor) in descriptors.iter().enumerate() {
            // Per-document progress spans 30..90.
            let progress = 30 + ((index * 60) / documents_found) as u8;
            let sent = emit(
                tx,
                ProgressEvent::new(
                    Stage::Retrieving,
                    progress,
                    format!(
                        "Retrieving document {}/{}: {}",
                        index + 1,
                        documents_found,
                        descriptor.label()
                    ),
                )
                .with_documents_found(documents_found),
            )
            .await;
            if !sent {
                cancelled = true;
            }

            match self.process_document(descriptor, tx, progress).await? {
                DocumentOutcome::Summary(summary) => {
                    let sent = emit(
                        tx,
                        ProgressEvent::new(
                            Stage::Summarizing,
                            progress.saturating_add(2),
                            format!("Summarized {}", descriptor.label()),
                        )
                        .with_summary(summary.clone()),
                    )
                    .await;
                    if !sent {
                        cancelled = true;
                    }
                    summaries.push(summary);
                }
                DocumentOutcome::SoftFailure(error) => {
                    tracing::warn!(document = %descriptor.label(), error = %error, "Soft failure");
                    errors.push(error);
                }
            }

            if cancelled {
                tracing::info!(
                    processed = summaries.len(),
                    remaining = documents_found - index - 1,
                    "Caller went away, stopping after in-flight document"
                );
                break;
            }
        }

        let documents_processed = summaries.len();

        emit(
            tx,
            ProgressEvent::new(Stage::Summarizing, 95, "Generating facility overview"),
        )
        .await;

        let overview = self
            .overview(&facility, documents_found, documents_processed, &summaries)
            .await;

        Ok(ProcessingResult {
            facility,
            overview,
            documents_found,
            documents_processed,
            summaries,
            errors,
        })
    }

    async fn resolve_facility(
        &self,
        target: RunTarget,
        tx: &mpsc::Sender<ProgressEvent>,
    ) -> Result<(FacilityRecord, FacilityRef), RunError> {
        match target {
            RunTarget::Query(query) => {
                let facilities = self.locator.search(&query).await?;
                let Some(facility) = facilities.first().cloned() else {
                    return Err(RunError::FacilityNotFound(query));
                };
                emit(
                    tx,
                    ProgressEvent::new(
                        Stage::Locating,
                        15,
                        format!("Matched {} facilities, using first", facilities.len()),
                    )
                    .with_facilities(facilities),
                )
                .await;
                let facility_ref = FacilityRef::Id(facility.id.clone());
                Ok((facility, facility_ref))
            }
            RunTarget::Facility(facility_ref) => {
                // Caller-supplied reference: no search pass, a skeletal
                // record identifies the run.
                let facility = FacilityRecord {
                    id: facility_ref.to_string(),
                    name: facility_ref.to_string(),
                    address: String::new(),
                    city: String::new(),
                    postal_code: String::new(),
                    county: String::new(),
                    programs: vec![],
                };
                Ok((facility, facility_ref))
            }
        }
    }

    async fn process_document(
        &self,
        descriptor: &DocumentDescriptor,
        tx: &mpsc::Sender<ProgressEvent>,
        progress: u8,
    ) -> Result<DocumentOutcome, RunError> {
        let retrieved = match self.retriever.retrieve(descriptor).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                return Ok(DocumentOutcome::SoftFailure(format!(
                    "Document unavailable: {} (all retrieval strategies exhausted)",
                    descriptor.label()
                )));
            }
            Err(e @ (PortalError::Browser(_) | PortalError::Cdp(_))) => {
                // Session fault: fatal to this run.
                return Err(RunError::Portal(e));
            }
            Err(e) => {
                return Ok(DocumentOutcome::SoftFailure(format!(
                    "Retrieval failed for {}: {e}",
                    descriptor.label()
                )));
            }
        };

        tracing::debug!(
            document = %descriptor.label(),
            strategy = retrieved.strategy,
            "Extracting text"
        );

        let extractor = Arc::clone(&self.extractor);
        let bytes = retrieved.bytes;
        let extraction = tokio::task::spawn_blocking(move || extractor.extract(&bytes)).await;
        let extracted = match extraction {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Ok(DocumentOutcome::SoftFailure(format!(
                    "Text extraction failed for {}: {e}",
                    descriptor.label()
                )));
            }
            Err(join_error) => {
                return Ok(DocumentOutcome::SoftFailure(format!(
                    "Text extraction crashed for {}: {join_error}",
                    descriptor.label()
                )));
            }
        };

        emit(
            tx,
            ProgressEvent::new(
                Stage::Summarizing,
                progress.saturating_add(1),
                format!(
                    "Summarizing {} ({} method, {} pages)",
                    descriptor.label(),
                    extracted.method.as_str(),
                    extracted.page_count
                ),
            ),
        )
        .await;

        let summarizer = Arc::clone(&self.summarizer);
        let text = extracted.text;
        let descriptor_for_task = descriptor.clone();
        let summary = tokio::task::spawn_blocking(move || {
            summarizer.summarize_document(&text, &descriptor_for_task)
        })
        .await
        .unwrap_or_else(|join_error| {
            DocumentSummary::placeholder(descriptor, format!("summarizer crashed: {join_error}"))
        });

        Ok(DocumentOutcome::Summary(summary))
    }

    async fn overview(
        &self,
        facility: &FacilityRecord,
        documents_found: usize,
        documents_processed: usize,
        summaries: &[DocumentSummary],
    ) -> String {
        let findings: Vec<String> = summaries
            .iter()
            .filter(|s| s.relevance == Relevance::Relevant)
            .map(|s| format!("{} ({}): {}", s.doc_type, s.date, s.narrative))
            .collect();

        let summarizer = Arc::clone(&self.summarizer);
        let facility = facility.clone();
        tokio::task::spawn_blocking(move || {
            summarizer.facility_overview(&facility, documents_found, documents_processed, &findings)
        })
        .await
        .unwrap_or_else(|join_error| {
            format!(
                "Processed {documents_processed} of {documents_found} documents. \
                 Overview generation crashed: {join_error}"
            )
        })
    }
}

enum DocumentOutcome {
    Summary(DocumentSummary),
    SoftFailure(String),
}

/// Send an event, reporting whether the caller is still listening.
async fn emit(tx: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) -> bool {
    tx.send(event).await.is_ok()
}

fn is_session_fault(error: &RunError) -> bool {
    matches!(
        error,
        RunError::Portal(PortalError::Browser(_)) | RunError::Portal(PortalError::Cdp(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DIGITAL_WORD_THRESHOLD, MIN_DOCUMENT_BYTES};
    use crate::extraction::ocr::MockOcrEngine;
    use crate::extraction::pdf::MockPdfTextSource;
    use crate::extraction::renderer::MockPdfPageRenderer;
    use crate::portal::locator::validate_query;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn facility() -> FacilityRecord {
        FacilityRecord {
            id: "FL-4401".to_string(),
            name: "ACME METALS".to_string(),
            address: "100 Industry Rd".to_string(),
            city: "Tampa".to_string(),
            postal_code: "33601".to_string(),
            county: "Hillsborough".to_string(),
            programs: vec!["Waste Cleanup".to_string()],
        }
    }

    fn descriptor(id: usize, doc_type: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            id,
            doc_type: doc_type.to_string(),
            date: format!("0{}/01/2019", id + 1),
            row_index: id,
        }
    }

    fn valid_pdf_bytes() -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(MIN_DOCUMENT_BYTES + 1, b'x');
        bytes
    }

    struct MockSearch {
        results: Vec<FacilityRecord>,
    }

    #[async_trait]
    impl FacilitySearch for MockSearch {
        async fn search(&self, query: &str) -> Result<Vec<FacilityRecord>, PortalError> {
            validate_query(query)?;
            Ok(self.results.clone())
        }
    }

    struct MockList {
        descriptors: Vec<DocumentDescriptor>,
    }

    #[async_trait]
    impl DocumentList for MockList {
        async fn list(
            &self,
            _facility: &FacilityRef,
        ) -> Result<Vec<DocumentDescriptor>, PortalError> {
            Ok(self.descriptors.clone())
        }
    }

    /// Maps row index to retrieval outcome; rows absent from the map
    /// soft-fail with a cascade exhaustion.
    struct MockFetch {
        documents: HashMap<usize, Vec<u8>>,
    }

    #[async_trait]
    impl DocumentFetch for MockFetch {
        async fn retrieve(
            &self,
            descriptor: &DocumentDescriptor,
        ) -> Result<Option<crate::portal::types::RetrievedDocument>, PortalError> {
            Ok(self.documents.get(&descriptor.row_index).map(|bytes| {
                crate::portal::types::RetrievedDocument {
                    descriptor: descriptor.clone(),
                    bytes: bytes.clone(),
                    strategy: "network_capture",
                }
            }))
        }
    }

    struct MockSummarizer {
        relevance: Vec<Relevance>,
    }

    impl Summarizer for MockSummarizer {
        fn summarize_document(
            &self,
            _text: &str,
            descriptor: &DocumentDescriptor,
        ) -> DocumentSummary {
            let relevance = self
                .relevance
                .get(descriptor.id)
                .copied()
                .unwrap_or(Relevance::Maybe);
            DocumentSummary {
                doc_type: descriptor.doc_type.clone(),
                date: descriptor.date.clone(),
                site_context: "test site".to_string(),
                contaminants: vec!["lead".to_string()],
                media: vec!["soil".to_string()],
                actions: "monitoring".to_string(),
                relevance,
                narrative: format!("Summary of {}", descriptor.label()),
                error: None,
            }
        }

        fn facility_overview(
            &self,
            facility: &FacilityRecord,
            documents_found: usize,
            documents_processed: usize,
            _findings: &[String],
        ) -> String {
            format!(
                "{}: {documents_processed}/{documents_found} processed",
                facility.name
            )
        }
    }

    /// Extractor whose digital pass always clears the threshold.
    fn digital_extractor() -> Arc<DocumentExtractor> {
        let rich = vec!["monitoring"; DIGITAL_WORD_THRESHOLD + 1].join(" ");
        Arc::new(DocumentExtractor::new(
            Box::new(MockPdfTextSource::new(vec![rich.as_str()])),
            Box::new(MockPdfPageRenderer::new(1)),
            Box::new(MockOcrEngine::failing()),
        ))
    }

    /// Extractor that always fails with NoText.
    fn failing_extractor() -> Arc<DocumentExtractor> {
        Arc::new(DocumentExtractor::new(
            Box::new(MockPdfTextSource::new(vec![""])),
            Box::new(MockPdfPageRenderer::new(1)),
            Box::new(MockOcrEngine::failing()),
        ))
    }

    fn orchestrator(
        descriptors: Vec<DocumentDescriptor>,
        documents: HashMap<usize, Vec<u8>>,
        extractor: Arc<DocumentExtractor>,
        relevance: Vec<Relevance>,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(SessionManager::new()),
            Arc::new(MockSearch {
                results: vec![facility()],
            }),
            Arc::new(MockList { descriptors }),
            Arc::new(MockFetch { documents }),
            extractor,
            Arc::new(MockSummarizer { relevance }),
        )
    }

    async fn run_collecting(
        orch: &Orchestrator,
        target: RunTarget,
    ) -> (Result<ProcessingResult, RunError>, Vec<ProgressEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let result = orch.process(target, tx).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn acme_metals_scenario() {
        // 3 descriptors; retrieval succeeds for rows 0 and 2, fails for 1.
        let descriptors = vec![
            descriptor(0, "Permit Application"),
            descriptor(1, "Inspection Report"),
            descriptor(2, "Consent Order"),
        ];
        let mut documents = HashMap::new();
        documents.insert(0, valid_pdf_bytes());
        documents.insert(2, valid_pdf_bytes());

        let orch = orchestrator(
            descriptors,
            documents,
            digital_extractor(),
            vec![Relevance::Relevant, Relevance::Maybe, Relevance::NotRelevant],
        );
        let (result, events) =
            run_collecting(&orch, RunTarget::Query("ACME METALS".to_string())).await;
        let result = result.unwrap();

        assert_eq!(result.documents_found, 3);
        assert_eq!(result.documents_processed, 2);
        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Inspection Report"));
        assert!(result.errors[0].contains("02/01/2019"));

        // Summaries preserve enumeration order.
        assert_eq!(result.summaries[0].doc_type, "Permit Application");
        assert_eq!(result.summaries[1].doc_type, "Consent Order");

        // Every document yields exactly one of summary or error.
        assert_eq!(
            result.summaries.len() + result.errors.len(),
            result.documents_found
        );

        // Event stream: starts locating, ends with Done carrying the result.
        assert_eq!(events.first().unwrap().stage, Stage::Locating);
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Done);
        assert_eq!(last.progress, 100);
        let terminal = last.result.as_ref().unwrap();
        assert_eq!(terminal.documents_processed, 2);
    }

    #[tokio::test]
    async fn relevance_partition_is_exact() {
        let descriptors = vec![
            descriptor(0, "A"),
            descriptor(1, "B"),
            descriptor(2, "C"),
        ];
        let mut documents = HashMap::new();
        for i in 0..3 {
            documents.insert(i, valid_pdf_bytes());
        }
        let orch = orchestrator(
            descriptors,
            documents,
            digital_extractor(),
            vec![Relevance::Relevant, Relevance::Maybe, Relevance::NotRelevant],
        );
        let (result, _) = run_collecting(&orch, RunTarget::Query("ACME".to_string())).await;
        let result = result.unwrap();

        let relevant = result
            .summaries
            .iter()
            .filter(|s| s.relevance == Relevance::Relevant)
            .count();
        let maybe = result
            .summaries
            .iter()
            .filter(|s| s.relevance == Relevance::Maybe)
            .count();
        let not_relevant = result
            .summaries
            .iter()
            .filter(|s| s.relevance == Relevance::NotRelevant)
            .count();
        assert_eq!(relevant + maybe + not_relevant, result.summaries.len());
        assert_eq!(relevant, 1);
    }

    #[tokio::test]
    async fn zero_documents_is_a_valid_result() {
        let orch = orchestrator(vec![], HashMap::new(), digital_extractor(), vec![]);
        let (result, events) = run_collecting(&orch, RunTarget::Query("ACME".to_string())).await;
        let result = result.unwrap();

        assert_eq!(result.documents_found, 0);
        assert!(result.summaries.is_empty());
        assert!(result.errors.is_empty());
        assert!(result.overview.contains("No documents"));
        assert_eq!(events.last().unwrap().stage, Stage::Done);
    }

    #[tokio::test]
    async fn extraction_failure_is_a_soft_error() {
        let descriptors = vec![descriptor(0, "Scanned Report")];
        let mut documents = HashMap::new();
        documents.insert(0, valid_pdf_bytes());

        let orch = orchestrator(descriptors, documents, failing_extractor(), vec![]);
        let (result, _) = run_collecting(&orch, RunTarget::Query("ACME".to_string())).await;
        let result = result.unwrap();

        assert_eq!(result.documents_found, 1);
        assert_eq!(result.documents_processed, 0);
        assert!(result.summaries.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Text extraction failed"));
        assert!(result.errors[0].contains("Scanned Report"));
    }

    #[tokio::test]
    async fn unmatched_query_fails_with_terminal_event() {
        let orch = Orchestrator::new(
            Arc::new(SessionManager::new()),
            Arc::new(MockSearch { results: vec![] }),
            Arc::new(MockList {
                descriptors: vec![],
            }),
            Arc::new(MockFetch {
                documents: HashMap::new(),
            }),
            digital_extractor(),
            Arc::new(MockSummarizer { relevance: vec![] }),
        );
        let (result, events) =
            run_collecting(&orch, RunTarget::Query("NOWHERE INC".to_string())).await;
        assert!(matches!(result, Err(RunError::FacilityNotFound(_))));
        assert_eq!(events.last().unwrap().stage, Stage::Failed);
    }

    #[tokio::test]
    async fn trivial_query_is_rejected_before_any_work() {
        let orch = orchestrator(vec![], HashMap::new(), digital_extractor(), vec![]);
        let (result, events) = run_collecting(&orch, RunTarget::Query("x".to_string())).await;
        assert!(matches!(
            result,
            Err(RunError::Portal(PortalError::QueryTooShort))
        ));
        assert_eq!(events.last().unwrap().stage, Stage::Failed);
    }

    #[tokio::test]
    async fn preresolved_facility_skips_search() {
        let descriptors = vec![descriptor(0, "Permit")];
        let mut documents = HashMap::new();
        documents.insert(0, valid_pdf_bytes());
        let orch = orchestrator(descriptors, documents, digital_extractor(), vec![]);

        let target = RunTarget::Facility(FacilityRef::Id("FL-9999".to_string()));
        let (result, events) = run_collecting(&orch, target).await;
        let result = result.unwrap();
        assert_eq!(result.facility.id, "FL-9999");
        assert_eq!(result.documents_processed, 1);
        // No facility-list event is emitted on the pre-resolved path.
        assert!(events.iter().all(|e| e.facilities.is_none()));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_run_without_error() {
        let descriptors = (0..5).map(|i| descriptor(i, "Report")).collect();
        let mut documents = HashMap::new();
        for i in 0..5 {
            documents.insert(i, valid_pdf_bytes());
        }
        let orch = orchestrator(descriptors, documents, digital_extractor(), vec![]);

        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        let result = orch
            .process(RunTarget::Query("ACME".to_string()), tx)
            .await
            .unwrap();
        // The first document may complete before cancellation is observed;
        // the run must not process the whole batch.
        assert!(result.documents_processed <= 1);
    }

    #[tokio::test]
    async fn placeholder_summaries_count_as_processed() {
        struct CrashingSummarizer;
        impl Summarizer for CrashingSummarizer {
            fn summarize_document(
                &self,
                _text: &str,
                descriptor: &DocumentDescriptor,
            ) -> DocumentSummary {
                DocumentSummary::placeholder(descriptor, "model unavailable")
            }
            fn facility_overview(
                &self,
                _facility: &FacilityRecord,
                _found: usize,
                _processed: usize,
                _findings: &[String],
            ) -> String {
                "fallback overview".to_string()
            }
        }

        let descriptors = vec![descriptor(0, "Permit")];
        let mut documents = HashMap::new();
        documents.insert(0, valid_pdf_bytes());
        let orch = Orchestrator::new(
            Arc::new(SessionManager::new()),
            Arc::new(MockSearch {
                results: vec![facility()],
            }),
            Arc::new(MockList { descriptors }),
            Arc::new(MockFetch { documents }),
            digital_extractor(),
            Arc::new(CrashingSummarizer),
        );
        let (result, _) = run_collecting(&orch, RunTarget::Query("ACME".to_string())).await;
        let result = result.unwrap();

        // Collaborator faults become placeholder summaries, not errors.
        assert_eq!(result.documents_processed, 1);
        assert!(result.errors.is_empty());
        assert!(result.summaries[0].error.is_some());
        assert_eq!(result.summaries[0].relevance, Relevance::Maybe);
    }
}
