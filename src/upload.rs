use crate::{
    candidate::{FileSelection, UploadCandidate, ValidationError},
    client::{DetectionError, Detector},
    detection::DetectionResult,
    notification::{LoadingIndicator, Notification, Notifier},
    preview::PreviewStore,
    render::{render_result, DetectionStatistics, RenderedResult},
};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadPhase {
    Empty,
    Ready,
    Submitting,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestState {
    Idle,
    AwaitingResponse,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid file: {0}")]
    Validation(#[from] ValidationError),
    #[error("No image selected")]
    MissingCandidate,
    #[error("A detection request is already in progress")]
    AlreadyInProgress,
    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),
}

impl From<&SessionError> for Notification {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::Validation(e) => e.into(),
            SessionError::MissingCandidate => Notification::missing_image(),
            SessionError::AlreadyInProgress => Notification::already_in_progress(),
            SessionError::Detection(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(DetectionStatistics),
    /// The candidate was cleared while the request was in flight.
    Discarded,
}

/// Candidate, request flag and last result. Every change goes through a
/// transition method; `generation` moves whenever the candidate changes so a
/// late response for a cleared candidate can be recognised.
#[derive(Debug)]
struct UploadState {
    phase: UploadPhase,
    request: RequestState,
    candidate: Option<UploadCandidate>,
    result: Option<DetectionResult>,
    generation: u64,
}

impl Default for UploadState {
    fn default() -> Self {
        Self {
            phase: UploadPhase::Empty,
            request: RequestState::Idle,
            candidate: None,
            result: None,
            generation: 0,
        }
    }
}

impl UploadState {
    fn select(&mut self, candidate: UploadCandidate) -> Result<(), SessionError> {
        if self.phase == UploadPhase::Submitting {
            return Err(SessionError::AlreadyInProgress);
        }
        self.candidate = Some(candidate);
        self.result = None;
        self.phase = UploadPhase::Ready;
        self.generation += 1;
        Ok(())
    }

    fn begin_submit(&mut self) -> Result<(u64, UploadCandidate), SessionError> {
        if self.request == RequestState::AwaitingResponse {
            return Err(SessionError::AlreadyInProgress);
        }
        let candidate = self
            .candidate
            .clone()
            .ok_or(SessionError::MissingCandidate)?;
        self.phase = UploadPhase::Submitting;
        self.request = RequestState::AwaitingResponse;
        Ok((self.generation, candidate))
    }

    /// Returns `false` when the outcome belongs to a candidate that is gone.
    fn finish(
        &mut self,
        generation: u64,
        outcome: &Result<DetectionResult, DetectionError>,
    ) -> bool {
        self.request = RequestState::Idle;
        if generation != self.generation {
            return false;
        }
        match outcome {
            Ok(result) => {
                self.result = Some(result.clone());
                self.phase = UploadPhase::Completed;
            }
            Err(_) => self.phase = UploadPhase::Ready,
        }
        true
    }

    /// Releases the request slot of a round trip that never reached `finish`.
    fn abandon(&mut self, generation: u64) {
        self.request = RequestState::Idle;
        if generation == self.generation && self.phase == UploadPhase::Submitting {
            self.phase = UploadPhase::Ready;
        }
    }

    fn clear(&mut self) {
        self.candidate = None;
        self.result = None;
        self.phase = UploadPhase::Empty;
        self.generation += 1;
    }
}

/// Holds the in-flight request slot. Dropping it before `finish` (task
/// aborted, detector panicked) frees the slot so the session stays usable.
struct RequestSlot<'a> {
    state: &'a Mutex<UploadState>,
    generation: u64,
    finished: bool,
}

impl RequestSlot<'_> {
    fn finish(mut self, outcome: &Result<DetectionResult, DetectionError>) -> bool {
        self.finished = true;
        self.state.lock().finish(self.generation, outcome)
    }
}

impl Drop for RequestSlot<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Detection round trip dropped before completion");
            self.state.lock().abandon(self.generation);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateView {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub preview_url: String,
}

/// Read-only copy of the session, handed to the page and the JSON endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSnapshot {
    pub phase: UploadPhase,
    pub request: RequestState,
    pub candidate: Option<CandidateView>,
    pub result: Option<RenderedResult>,
    pub loading: Option<LoadingIndicator>,
}

impl UploadSnapshot {
    pub fn can_submit(&self) -> bool {
        self.candidate.is_some() && self.request == RequestState::Idle
    }
}

pub struct UploadSession<D: Detector> {
    state: Mutex<UploadState>,
    detector: D,
    notifier: Notifier,
    previews: PreviewStore,
    model: Option<String>,
}

impl<D: Detector> UploadSession<D> {
    pub fn new(detector: D, notifier: Notifier, previews: PreviewStore) -> Self {
        Self {
            state: Mutex::new(UploadState::default()),
            detector,
            notifier,
            previews,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    pub fn phase(&self) -> UploadPhase {
        self.state.lock().phase
    }

    fn reject(&self, err: SessionError) -> SessionError {
        self.notifier.notify(Notification::from(&err));
        err
    }

    #[instrument(skip(self, selection), fields(file = %selection.file_name, mime = %selection.mime_type, size = selection.size_bytes))]
    pub fn select_file(&self, selection: FileSelection) -> Result<(), SessionError> {
        let candidate = UploadCandidate::new(selection, &self.previews)
            .map_err(|e| self.reject(e.into()))?;

        // The replaced candidate, and its preview, are dropped outside the lock.
        let replaced = {
            let mut state = self.state.lock();
            let previous = state.candidate.take();
            match state.select(candidate) {
                Ok(()) => previous,
                Err(e) => {
                    state.candidate = previous;
                    drop(state);
                    return Err(self.reject(e));
                }
            }
        };
        drop(replaced);

        self.notifier.notify(Notification::image_ready());
        Ok(())
    }

    /// Runs one round trip for the current candidate. Duplicate calls while a
    /// request is in flight are rejected without touching the network.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        let begun = self.state.lock().begin_submit();
        let (generation, candidate) = begun.map_err(|e| self.reject(e))?;
        let slot = RequestSlot {
            state: &self.state,
            generation,
            finished: false,
        };

        let outcome = {
            let _loading = self.notifier.loading(
                "Processing Image",
                "Please wait while we detect objects in your image...",
            );
            self.detector.detect(&candidate, self.model.as_deref()).await
        };
        drop(candidate);

        let committed = slot.finish(&outcome);
        if !committed {
            tracing::info!("Discarding detection outcome for a cleared image");
            return Ok(SubmitOutcome::Discarded);
        }

        match outcome {
            Ok(result) => {
                let statistics = DetectionStatistics::from_detections(&result.detections);
                self.notifier
                    .notify(Notification::detection_complete(statistics.total));
                Ok(SubmitOutcome::Completed(statistics))
            }
            Err(e) => Err(self.reject(e.into())),
        }
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let released = {
            let mut state = self.state.lock();
            let candidate = state.candidate.take();
            let result = state.result.take();
            state.clear();
            (candidate, result)
        };
        drop(released);
        self.notifier.notify(Notification::cleared());
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        let state = self.state.lock();
        UploadSnapshot {
            phase: state.phase,
            request: state.request,
            candidate: state.candidate.as_ref().map(|c| CandidateView {
                file_name: c.file_name().to_string(),
                mime_type: c.mime_type().to_string(),
                size_bytes: c.size_bytes(),
                preview_url: c.preview().url(),
            }),
            result: state.result.as_ref().map(render_result),
            loading: self.notifier.loading_indicator(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detection::{AnnotatedImage, BoundingBox, Detection},
        notification::NotificationKind,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::sync::Notify;

    #[derive(Clone)]
    struct MockDetector {
        calls: Arc<AtomicUsize>,
        response: Result<DetectionResult, DetectionError>,
        gate: Option<Arc<Notify>>,
    }

    impl MockDetector {
        fn returning(response: Result<DetectionResult, DetectionError>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                response,
                gate: None,
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    #[async_trait]
    impl Detector for MockDetector {
        async fn detect(
            &self,
            _candidate: &UploadCandidate,
            _model: Option<&str>,
        ) -> Result<DetectionResult, DetectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.response.clone()
        }
    }

    fn detected(labels: &[(&str, f32)]) -> DetectionResult {
        DetectionResult {
            image: AnnotatedImage::Url("http://service/result.jpg".into()),
            detections: labels
                .iter()
                .map(|(label, confidence)| Detection {
                    label: label.to_string(),
                    confidence: *confidence,
                    bounding_box: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: 10.0,
                        height: 10.0,
                    },
                })
                .collect(),
        }
    }

    fn total(outcome: &SubmitOutcome) -> usize {
        match outcome {
            SubmitOutcome::Completed(statistics) => statistics.total,
            SubmitOutcome::Discarded => panic!("outcome was discarded"),
        }
    }

    fn image(name: &str) -> FileSelection {
        FileSelection::new(name, "image/jpeg", Bytes::from_static(b"\xff\xd8\xff"))
    }

    fn session(detector: MockDetector) -> UploadSession<MockDetector> {
        UploadSession::new(detector, Notifier::new(), PreviewStore::new())
    }

    #[test]
    fn test_select_valid_file() {
        let session = session(MockDetector::returning(Ok(detected(&[]))));

        session.select_file(image("cat.jpg")).unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Ready);
        assert_eq!(snapshot.candidate.unwrap().file_name, "cat.jpg");
        assert!(session.previews().len() == 1);
        assert_eq!(session.notifier().drain(), vec![Notification::image_ready()]);
    }

    #[test]
    fn test_select_non_image_stays_empty() {
        let session = session(MockDetector::returning(Ok(detected(&[]))));

        let err = session
            .select_file(FileSelection::new(
                "notes.txt",
                "text/plain",
                Bytes::from_static(b"hi"),
            ))
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::NotAnImage(_))
        ));
        assert_eq!(session.phase(), UploadPhase::Empty);
        assert!(session.previews().is_empty());
        let notes = session.notifier().drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Warning);
        assert_eq!(notes[0].title, "Invalid File");
    }

    #[test]
    fn test_select_too_large_keeps_previous_candidate() {
        let session = session(MockDetector::returning(Ok(detected(&[]))));
        session.select_file(image("small.jpg")).unwrap();

        let big = FileSelection {
            file_name: "big.jpg".into(),
            mime_type: "text/plain".into(),
            size_bytes: 10_485_761,
            bytes: Bytes::from_static(b"x"),
        };
        let err = session.select_file(big).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::TooLarge(_))
        ));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Ready);
        assert_eq!(snapshot.candidate.unwrap().file_name, "small.jpg");
    }

    #[tokio::test]
    async fn test_submit_without_candidate_is_noop() {
        let detector = MockDetector::returning(Ok(detected(&[])));
        let calls = detector.calls.clone();
        let session = session(detector);

        let err = session.submit().await.unwrap_err();

        assert_eq!(err, SessionError::MissingCandidate);
        assert_eq!(session.phase(), UploadPhase::Empty);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let notes = session.notifier().drain();
        assert_eq!(notes, vec![Notification::missing_image()]);
    }

    #[tokio::test]
    async fn test_successful_round_trip() {
        let detector =
            MockDetector::returning(Ok(detected(&[("cat", 0.9), ("cat", 0.7), ("dog", 0.5)])));
        let session = session(detector);
        session.select_file(image("pets.jpg")).unwrap();
        session.notifier().drain();

        let outcome = session.submit().await.unwrap();

        assert_eq!(total(&outcome), 3);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Completed);
        assert_eq!(snapshot.request, RequestState::Idle);
        assert!(snapshot.loading.is_none());
        let result = snapshot.result.unwrap();
        assert_eq!(result.statistics.labels.len(), 2);
        assert_eq!(result.statistics.labels[0].label, "cat");
        assert_eq!(
            session.notifier().drain(),
            vec![Notification::detection_complete(3)]
        );
    }

    #[tokio::test]
    async fn test_failure_returns_to_ready_with_candidate() {
        let detector = MockDetector::returning(Err(DetectionError::Server {
            status: 404,
            message: None,
        }));
        let calls = detector.calls.clone();
        let session = session(detector);
        session.select_file(image("cat.jpg")).unwrap();
        session.notifier().drain();

        let err = session.submit().await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Detection(DetectionError::Server { status: 404, .. })
        ));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Ready);
        assert!(snapshot.candidate.is_some());
        assert!(snapshot.loading.is_none());
        assert!(snapshot.can_submit());

        let notes = session.notifier().drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Error);
        assert_eq!(
            notes[0].description,
            "The requested resource could not be found."
        );

        // Retry without selecting again.
        let _ = session.submit().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_submit_issues_one_request() {
        let gate = Arc::new(Notify::new());
        let detector = MockDetector::returning(Ok(detected(&[("cat", 0.9)]))).gated(gate.clone());
        let calls = detector.calls.clone();
        let session = Arc::new(session(detector));
        session.select_file(image("cat.jpg")).unwrap();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.submit().await }
        });
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Submitting);
        assert!(!snapshot.can_submit());
        assert!(snapshot.loading.is_some());

        let second = session.submit().await;
        assert_eq!(second, Err(SessionError::AlreadyInProgress));
        assert_eq!(
            session.select_file(image("dog.jpg")),
            Err(SessionError::AlreadyInProgress)
        );

        gate.notify_one();
        let first = first.await.unwrap();
        assert_eq!(total(&first.unwrap()), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!session.notifier().is_loading());
        assert_eq!(
            session.snapshot().candidate.unwrap().file_name,
            "cat.jpg"
        );
    }

    #[tokio::test]
    async fn test_clear_during_submit_discards_result() {
        let gate = Arc::new(Notify::new());
        let detector = MockDetector::returning(Ok(detected(&[("cat", 0.9)]))).gated(gate.clone());
        let calls = detector.calls.clone();
        let session = Arc::new(session(detector));
        session.select_file(image("cat.jpg")).unwrap();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.submit().await }
        });
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.clear();
        assert_eq!(session.phase(), UploadPhase::Empty);
        session.select_file(image("dog.jpg")).unwrap();
        assert_eq!(
            session.submit().await,
            Err(SessionError::AlreadyInProgress)
        );

        gate.notify_one();
        assert_eq!(first.await.unwrap(), Ok(SubmitOutcome::Discarded));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Ready);
        assert!(snapshot.result.is_none());
        assert_eq!(snapshot.candidate.unwrap().file_name, "dog.jpg");
        assert_eq!(session.previews().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_from_every_state() {
        let session = session(MockDetector::returning(Ok(detected(&[("cat", 0.9)]))));

        session.clear();
        assert_eq!(session.phase(), UploadPhase::Empty);

        session.select_file(image("a.jpg")).unwrap();
        session.clear();
        assert_eq!(session.phase(), UploadPhase::Empty);
        assert!(session.previews().is_empty());

        session.select_file(image("b.jpg")).unwrap();
        session.submit().await.unwrap();
        assert_eq!(session.phase(), UploadPhase::Completed);
        session.clear();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Empty);
        assert!(snapshot.candidate.is_none());
        assert!(snapshot.result.is_none());
        assert!(session.previews().is_empty());
        assert_eq!(
            session.notifier().drain().last(),
            Some(&Notification::cleared())
        );
    }

    #[tokio::test]
    async fn test_new_selection_replaces_result_and_preview() {
        let session = session(MockDetector::returning(Ok(detected(&[("cat", 0.9)]))));
        session.select_file(image("a.jpg")).unwrap();
        let first_preview = session.snapshot().candidate.unwrap().preview_url;
        session.submit().await.unwrap();

        session.select_file(image("b.jpg")).unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Ready);
        assert!(snapshot.result.is_none());
        assert_ne!(snapshot.candidate.unwrap().preview_url, first_preview);
        assert_eq!(session.previews().len(), 1);
    }

    #[tokio::test]
    async fn test_resubmit_from_completed() {
        let detector = MockDetector::returning(Ok(detected(&[])));
        let calls = detector.calls.clone();
        let session = session(detector);
        session.select_file(image("a.jpg")).unwrap();

        session.submit().await.unwrap();
        let outcome = session.submit().await.unwrap();

        assert_eq!(total(&outcome), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            session.notifier().drain().last(),
            Some(&Notification::detection_complete(0))
        );
    }

    #[tokio::test]
    async fn test_aborted_submit_releases_request_slot() {
        let gate = Arc::new(Notify::new());
        let detector = MockDetector::returning(Ok(detected(&[("cat", 0.9)]))).gated(gate);
        let calls = detector.calls.clone();
        let session = Arc::new(session(detector));
        session.select_file(image("a.jpg")).unwrap();

        let stuck = tokio::spawn({
            let session = session.clone();
            async move { session.submit().await }
        });
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Ready);
        assert_eq!(snapshot.request, RequestState::Idle);
        assert!(snapshot.loading.is_none());
        assert!(snapshot.can_submit());

        session.clear();
        session.select_file(image("b.jpg")).unwrap();
        assert!(session.snapshot().can_submit());
    }

    #[tokio::test]
    async fn test_panicking_detector_releases_request_slot() {
        struct PanickingDetector;

        #[async_trait]
        impl Detector for PanickingDetector {
            async fn detect(
                &self,
                _candidate: &UploadCandidate,
                _model: Option<&str>,
            ) -> Result<DetectionResult, DetectionError> {
                panic!("detector blew up")
            }
        }

        let session = Arc::new(UploadSession::new(
            PanickingDetector,
            Notifier::new(),
            PreviewStore::new(),
        ));
        session.select_file(image("a.jpg")).unwrap();

        let handle = tokio::spawn({
            let session = session.clone();
            async move { session.submit().await }
        });
        assert!(handle.await.unwrap_err().is_panic());

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, UploadPhase::Ready);
        assert_eq!(snapshot.request, RequestState::Idle);
        assert!(snapshot.loading.is_none());
    }

    #[tokio::test]
    async fn test_outcome_carries_its_own_statistics() {
        let session = session(MockDetector::returning(Ok(detected(&[
            ("dog", 0.4),
            ("dog", 0.6),
        ]))));
        session.select_file(image("a.jpg")).unwrap();

        let SubmitOutcome::Completed(statistics) = session.submit().await.unwrap() else {
            panic!("expected a completed outcome");
        };

        assert_eq!(statistics.total, 2);
        assert_eq!(statistics.labels[0].label, "dog");
        assert_eq!(statistics.labels[0].count, 2);
    }
}
