//! In-process annotator services
//!
//! Each [`MockService`] is a `warp` server on an ephemeral loopback port
//! that honours the annotator HTTP contract. The server stops when the
//! handle is dropped.

use crate::wire::{self, DeltaBody, SnapshotView};
use docpipe_document::{Annotation, AnnotatorMetaData, SegmentSpan, Transcription};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Reply};

/// Version reported by every mock
pub const MOCK_VERSION: &str = "0.1.0";

/// What a mock service does with `/v1/process`
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// One segment plus one metadata record per sentence
    SentenceSegmenter,
    /// One transcription per audio attachment received
    Transcriber,
    /// Empty delta
    Empty,
    /// Sleep, then empty delta
    Delay(Duration),
    /// Reply with this HTTP status and no delta
    Status(u16),
    /// 200 with a body that is no delta at all
    Garbage,
    /// Two overlapping segments covering the text
    Overlapping,
    /// A segment ending past the text
    OutOfRange,
    /// Segments without metadata records
    MissingMetadata,
}

#[derive(Debug)]
struct State {
    name: String,
    behaviour: Behaviour,
    requests: AtomicUsize,
}

/// Handle to a running mock service
#[derive(Debug)]
pub struct MockService {
    address: String,
    state: Arc<State>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockService {
    /// Start a service on `127.0.0.1:0`
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(name: &str, behaviour: Behaviour) -> Self {
        let state = Arc::new(State {
            name: name.to_string(),
            behaviour,
            requests: AtomicUsize::new(0),
        });

        let docs_route = {
            let state = Arc::clone(&state);
            warp::path!("v1" / "documentation")
                .and(warp::get())
                .map(move || warp::reply::json(&documentation(&state.name)))
        };

        let io_route = warp::path!("v1" / "details" / "input_output")
            .and(warp::get())
            .map(|| {
                warp::reply::json(&serde_json::json!({
                    "inputs": [],
                    "outputs": ["segment", "annotator_meta_data", "transcription"]
                }))
            });

        let process_route = {
            let state = Arc::clone(&state);
            warp::path!("v1" / "process")
                .and(warp::post())
                .and(warp::header::optional::<String>("content-type"))
                .and(warp::body::bytes())
                .and_then(move |content_type: Option<String>, body: Bytes| {
                    let state = Arc::clone(&state);
                    async move {
                        state.requests.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Infallible>(process(&state, content_type, &body).await)
                    }
                })
        };

        let (tx, rx) = oneshot::channel::<()>();
        let routes = docs_route.or(io_route).or(process_route);
        let (addr, server) = warp::serve(routes)
            .bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
                let _ = rx.await;
            });
        tokio::spawn(server);
        tracing::debug!(%addr, service = name, "mock service listening");

        Self {
            address: format!("http://{addr}"),
            state,
            shutdown: Some(tx),
        }
    }

    pub fn sentence_segmenter() -> Self {
        Self::spawn("mock-sentence-segmenter", Behaviour::SentenceSegmenter)
    }

    pub fn transcriber() -> Self {
        Self::spawn("mock-transcriber", Behaviour::Transcriber)
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `/v1/process` requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn documentation(name: &str) -> serde_json::Value {
    serde_json::json!({
        "annotator_name": name,
        "version": MOCK_VERSION,
        "implementation_lang": "Rust",
        "capability": {
            "supported_languages": ["en", "de"],
            "reproducible": true
        }
    })
}

async fn process(state: &State, content_type: Option<String>, body: &[u8]) -> warp::reply::Response {
    let content_type = content_type.unwrap_or_else(|| "application/json".to_string());
    match respond(state, &content_type, body).await {
        Ok(Some(delta)) => match wire::encode(&content_type, &delta) {
            Ok(bytes) => reply(StatusCode::OK, &content_type, bytes),
            Err(e) => reply(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string().into_bytes()),
        },
        Ok(None) => match &state.behaviour {
            Behaviour::Status(code) => reply(
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "text/plain",
                b"scripted failure".to_vec(),
            ),
            _ => reply(StatusCode::OK, "text/html", b"<html>not a delta</html>".to_vec()),
        },
        Err(e) => reply(StatusCode::BAD_REQUEST, "text/plain", e.to_string().into_bytes()),
    }
}

/// `Ok(None)` means "answer without a delta"
async fn respond(state: &State, content_type: &str, body: &[u8]) -> anyhow::Result<Option<DeltaBody>> {
    let snapshot: SnapshotView = wire::decode(content_type, body)?;
    let len = snapshot.text.chars().count();

    let delta = match &state.behaviour {
        Behaviour::SentenceSegmenter => {
            let mut annotations = Vec::new();
            for (begin, end) in wire::segment_sentences(&snapshot.text) {
                annotations.push(SegmentSpan::new(begin, end).into());
                annotations.push(AnnotatorMetaData::now(&state.name, MOCK_VERSION).into());
            }
            DeltaBody::new(annotations)
        }
        Behaviour::Transcriber => {
            let annotations: Vec<Annotation> = snapshot
                .attachments
                .iter()
                .filter(|a| a.is_audio())
                .map(|a| {
                    Transcription {
                        start_time: 0.0,
                        end_time: 1.0,
                        speaker: "SPEAKER_00".to_string(),
                        utterance: format!("clip {}", a.id),
                        model: state.name.clone(),
                        attachment_id: a.id,
                    }
                    .into()
                })
                .collect();
            DeltaBody::new(annotations).with_modification(&state.name, "transcribed audio")
        }
        Behaviour::Empty => DeltaBody::default(),
        Behaviour::Delay(delay) => {
            tokio::time::sleep(*delay).await;
            DeltaBody::default()
        }
        Behaviour::Status(_) | Behaviour::Garbage => return Ok(None),
        Behaviour::Overlapping => DeltaBody::new(vec![
            SegmentSpan::new(0, len).into(),
            AnnotatorMetaData::now(&state.name, MOCK_VERSION).into(),
            SegmentSpan::new(len / 2, len).into(),
            AnnotatorMetaData::now(&state.name, MOCK_VERSION).into(),
        ]),
        Behaviour::OutOfRange => DeltaBody::new(vec![
            SegmentSpan::new(0, len + 1).into(),
            AnnotatorMetaData::now(&state.name, MOCK_VERSION).into(),
        ]),
        Behaviour::MissingMetadata => DeltaBody::new(
            wire::segment_sentences(&snapshot.text)
                .into_iter()
                .map(|(begin, end)| SegmentSpan::new(begin, end).into())
                .collect(),
        ),
    };
    Ok(Some(delta))
}

fn reply(status: StatusCode, content_type: &str, body: Vec<u8>) -> warp::reply::Response {
    let content_type = content_type.to_string();
    warp::reply::with_status(
        warp::reply::with_header(body, "content-type", content_type),
        status,
    )
    .into_response()
}
