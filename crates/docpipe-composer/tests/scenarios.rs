//! End-to-end runs against in-process annotator services over HTTP

use docpipe_composer::{Composer, ComposerConfig, ComposerError, ErrorKind, StageError};
use docpipe_document::{
    AnnotationKind, AnnotatorMetaData, Document, DocumentModification, DocumentError,
};
use docpipe_driver::{ComponentDescriptor, DriverError, RemoteDriver};
use docpipe_test_utils::{
    empty_document, init_test_tracing, scenario_document, segment_spans, Behaviour, MockService,
    SCENARIO_SPANS,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn remote_composer(config: ComposerConfig) -> Composer {
    init_test_tracing();
    let composer = Composer::new(config);
    composer.add_driver(Arc::new(RemoteDriver::new())).unwrap();
    composer
}

fn stage(service: &MockService) -> ComponentDescriptor {
    ComponentDescriptor::remote(service.address())
}

#[tokio::test]
async fn segments_reference_text() {
    let segmenter = MockService::sentence_segmenter();
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&segmenter)).unwrap();

    let mut doc = scenario_document();
    let summary = composer.run(&mut doc).await.unwrap();

    assert_eq!(segment_spans(&doc), SCENARIO_SPANS.to_vec());
    assert_eq!(doc.count(AnnotationKind::AnnotatorMetaData), 2);
    assert_eq!(doc.count(AnnotationKind::DocumentModification), 1);
    assert_eq!(summary.stages_executed, 1);
    assert_eq!(summary.annotations_added, 5);

    let covered: Vec<_> = doc
        .select_typed::<docpipe_document::SegmentSpan>()
        .map(|s| doc.covered_text(s.span()).unwrap().to_string())
        .collect();
    assert_eq!(
        covered,
        vec![
            "This is a very great example sentence!",
            "I absolutely hate this example."
        ]
    );

    let meta: Vec<&AnnotatorMetaData> = doc.select_typed::<AnnotatorMetaData>().collect();
    assert!(meta.iter().all(|m| m.component == "mock-sentence-segmenter"));

    composer.shutdown().await;
}

#[tokio::test]
async fn empty_text_still_records_modification() {
    let segmenter = MockService::sentence_segmenter();
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&segmenter).with_name("sentences")).unwrap();

    let mut doc = empty_document();
    composer.run(&mut doc).await.unwrap();

    assert_eq!(doc.count(AnnotationKind::Segment), 0);
    assert_eq!(doc.count(AnnotationKind::AnnotatorMetaData), 0);
    let records: Vec<&DocumentModification> = doc.select_typed().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user, "sentences");
    assert_eq!(segmenter.request_count(), 1);
}

#[tokio::test]
async fn timeout_in_first_stage_leaves_no_trace() {
    let slow = MockService::spawn("slow", Behaviour::Delay(Duration::from_secs(5)));
    let segmenter = MockService::sentence_segmenter();
    let composer =
        remote_composer(ComposerConfig::new().with_call_timeout(Duration::from_millis(200)));
    composer.add(stage(&slow)).unwrap();
    composer.add(stage(&segmenter)).unwrap();

    let mut doc = scenario_document();
    let err = composer.run(&mut doc).await.unwrap_err();

    assert!(matches!(
        err,
        ComposerError::StageExecution {
            stage: 0,
            source: StageError::StageTimeout { .. },
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(doc.count(AnnotationKind::DocumentModification), 0);
    assert_eq!(doc.index().len(), 0);
    assert_eq!(segmenter.request_count(), 0);
}

#[tokio::test]
async fn later_failure_keeps_earlier_stages() {
    let segmenter = MockService::sentence_segmenter();
    let broken = MockService::spawn("broken", Behaviour::Status(503));
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&segmenter)).unwrap();
    composer.add(stage(&broken)).unwrap();

    let mut doc = scenario_document();
    let err = composer.run(&mut doc).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StageExecution);
    assert_eq!(err.stage(), Some(1));
    assert!(matches!(
        err,
        ComposerError::StageExecution {
            source: StageError::StageUnreachable(DriverError::StageUnreachable { .. }),
            ..
        }
    ));

    assert_eq!(segment_spans(&doc), SCENARIO_SPANS.to_vec());
    assert_eq!(
        doc.select_from_stage(AnnotationKind::DocumentModification, 0)
            .count(),
        1
    );
    assert_eq!(
        doc.select_from_stage(AnnotationKind::DocumentModification, 1)
            .count(),
        0
    );
}

#[tokio::test]
async fn overlapping_reply_is_an_invariant_violation() {
    let service = MockService::spawn("overlap", Behaviour::Overlapping);
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&service)).unwrap();

    let mut doc = scenario_document();
    let err = composer.run(&mut doc).await.unwrap_err();

    assert!(matches!(
        err,
        ComposerError::InvariantViolation {
            source: DocumentError::OverlappingSpans { .. },
            ..
        }
    ));
    assert!(!err.is_retryable());
    assert_eq!(doc.index().len(), 0);
}

#[tokio::test]
async fn out_of_range_reply_is_rejected_whole() {
    let service = MockService::spawn("too-long", Behaviour::OutOfRange);
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&service)).unwrap();

    let mut doc = scenario_document();
    let err = composer.run(&mut doc).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(doc.count(AnnotationKind::AnnotatorMetaData), 0);
    assert_eq!(doc.count(AnnotationKind::DocumentModification), 0);
}

#[tokio::test]
async fn undecodable_reply_is_malformed() {
    let service = MockService::spawn("html", Behaviour::Garbage);
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&service)).unwrap();

    let err = composer.run(&mut scenario_document()).await.unwrap_err();
    assert!(matches!(
        err,
        ComposerError::StageExecution {
            source: StageError::MalformedDelta(_),
            ..
        }
    ));
}

#[tokio::test]
async fn segments_without_metadata_are_malformed() {
    let service = MockService::spawn("bare", Behaviour::MissingMetadata);
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&service)).unwrap();

    let mut doc = scenario_document();
    let err = composer.run(&mut doc).await.unwrap_err();

    assert!(matches!(
        err,
        ComposerError::StageExecution {
            source: StageError::MalformedDelta(_),
            ..
        }
    ));
    assert_eq!(doc.count(AnnotationKind::Segment), 0);
}

#[tokio::test]
async fn failed_verification_touches_nothing() {
    let segmenter = MockService::sentence_segmenter();
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&segmenter)).unwrap();
    composer
        .add(ComponentDescriptor::remote("http://127.0.0.1:1"))
        .unwrap();

    let mut doc = scenario_document();
    let err = composer.run(&mut doc).await.unwrap_err();

    assert!(matches!(
        err,
        ComposerError::Provisioning {
            stage: 1,
            source: DriverError::EndpointUnreachable { .. },
            ..
        }
    ));
    assert_eq!(doc.index().len(), 0);
    assert_eq!(segmenter.request_count(), 0);
}

#[tokio::test]
async fn skipping_verification_defers_failure_to_the_call() {
    let composer = remote_composer(ComposerConfig::new().with_skip_verification(true));
    composer
        .add(ComponentDescriptor::remote("http://127.0.0.1:1"))
        .unwrap();

    let err = composer.run(&mut scenario_document()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StageExecution);
}

#[tokio::test]
async fn chained_stages_see_earlier_output() {
    let segmenter = MockService::sentence_segmenter();
    let follower = MockService::spawn("follower", Behaviour::Empty);
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&segmenter)).unwrap();
    composer.add(stage(&follower).with_name("follower")).unwrap();

    let mut doc = scenario_document();
    let summary = composer.run(&mut doc).await.unwrap();

    assert_eq!(summary.stages_executed, 2);
    assert_eq!(summary.annotations_added, 6);
    let users: Vec<_> = doc
        .select_typed::<DocumentModification>()
        .map(|m| m.user.clone())
        .collect();
    assert_eq!(users, vec![segmenter.address().to_string(), "follower".to_string()]);
    assert_eq!(follower.request_count(), 1);
}

#[tokio::test]
async fn rerun_on_fresh_document_is_identical() {
    let segmenter = MockService::sentence_segmenter();
    let composer = remote_composer(ComposerConfig::default());
    composer.add(stage(&segmenter)).unwrap();

    let mut first = scenario_document();
    let mut second = scenario_document();
    composer.run(&mut first).await.unwrap();
    composer.run(&mut second).await.unwrap();

    let kinds = |doc: &Document| -> Vec<AnnotationKind> {
        doc.annotations()
            .iter()
            .map(|stored| stored.annotation.kind())
            .collect()
    };
    assert_eq!(kinds(&first), kinds(&second));
    assert_eq!(segment_spans(&first), segment_spans(&second));
    assert_eq!(composer.pool_stats().reused, 1);
}
