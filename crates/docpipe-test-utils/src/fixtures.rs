//! Document fixtures

use docpipe_document::{Attachment, AudioFormat, Document, SegmentSpan, Span};

/// Two-sentence reference input
pub const SCENARIO_TEXT: &str =
    "This is a very great example sentence! I absolutely hate this example. ";

/// Sentence spans of [`SCENARIO_TEXT`]
pub const SCENARIO_SPANS: [(usize, usize); 2] = [(0, 38), (39, 70)];

pub fn scenario_document() -> Document {
    Document::with_text(SCENARIO_TEXT, "en")
}

pub fn empty_document() -> Document {
    Document::with_text("", "en")
}

/// Empty text plus `clips` short silent audio attachments
pub fn audio_document(clips: usize) -> anyhow::Result<Document> {
    let mut doc = Document::with_text("", "en");
    let silence = vec![0u8; 3200];
    for _ in 0..clips {
        doc.add_attachment(Attachment::audio(
            &silence,
            AudioFormat::SPEECH_16K_MONO,
            Span::new(0, 0),
        ))?;
    }
    Ok(doc)
}

/// Segment spans in index order
pub fn segment_spans(doc: &Document) -> Vec<(usize, usize)> {
    doc.select_typed::<SegmentSpan>()
        .map(|s| (s.begin, s.end))
        .collect()
}
