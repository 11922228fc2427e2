//! End-to-end behavior of the chat stream, driven through the public API.
use bytes::Bytes;
use chat_stream::render::extract_suggestions;
use chat_stream::{
    APOLOGY_TEXT, ChatMessage, CitationRef, IngestOptions, Segment, Source, StreamEvent,
    StreamFailure, StreamIngestor, StreamOutcome, Transcript, ingest, ingest_into, render_message,
};
use futures::stream;

const SCENARIO: &str = "data: THREAD_ID:abc123\n\n\
data: EVENT:THINKING:Searching...\n\n\
data: EVENT:SOURCES:[{\"title\":\"Syllabus\"}]\n\n\
data: {\"token\":\"Hello \"}\n\n\
data: {\"token\":\"world\"}\n\n\
data: [DONE]\n\n";

fn run_chunks(chunks: &[&[u8]]) -> (Vec<StreamEvent>, StreamIngestor) {
    let mut ingestor = StreamIngestor::new();
    let mut events = Vec::new();
    let mut sink = |event: &StreamEvent, _: &ChatMessage| events.push(event.clone());
    for chunk in chunks {
        ingestor.push_chunk(chunk, &mut sink);
    }
    ingestor.finish(&mut sink);
    (events, ingestor)
}

fn byte_stream(
    chunks: Vec<Vec<u8>>,
) -> impl futures::Stream<Item = Result<Bytes, StreamFailure>> + Send + 'static {
    stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
}

#[test]
fn chunk_boundaries_do_not_change_the_result() {
    let input = "data: THREAD_ID:t-7\n\
data: EVENT:SOURCES:[{\"title\":\"Café notes · ünïcode\"}]\n\
data: {\"token\":\"Grüße 👋 \"}\n\
data: {\"token\":\"naïve [1]\"}\n\
data: [DONE]\n";
    let bytes = input.as_bytes();
    let (whole_events, whole) = run_chunks(&[bytes]);

    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        let (events, ingestor) = run_chunks(&[head, tail]);
        assert_eq!(events, whole_events, "split at byte {split}");
        assert_eq!(ingestor.message().content, whole.message().content);
        assert_eq!(ingestor.message().sources, whole.message().sources);
    }

    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    let (events, ingestor) = run_chunks(&singles);
    assert_eq!(events, whole_events);
    assert_eq!(ingestor.message().content, "Grüße 👋 naïve [1]");
    assert_eq!(ingestor.thread_id(), Some("t-7"));
}

#[test]
fn sources_replace_previous_list() {
    let (_, ingestor) = run_chunks(&[
        b"data: EVENT:SOURCES:[{\"title\":\"A\"},{\"title\":\"B\"}]\n",
        b"data: EVENT:SOURCES:[{\"title\":\"C\"}]\n",
    ]);
    assert_eq!(ingestor.message().sources, vec![Source::new("C")]);
}

#[test]
fn tokens_accumulate_in_order() {
    let (events, ingestor) = run_chunks(&[
        b"data: {\"token\":\"one \"}\ndata: {\"token\":\"two \"}\n",
        b"data: three\n",
    ]);
    let deltas: Vec<&str> = events.iter().filter_map(StreamEvent::as_text_delta).collect();
    assert_eq!(deltas, vec!["one ", "two ", "three"]);
    assert_eq!(ingestor.message().content, "one two three");
}

#[test]
fn nothing_follows_the_sentinel() {
    let (events, ingestor) = run_chunks(&[
        b"data: [DONE]\ndata: {\"token\":\"late\"}\n",
        b"data: EVENT:SOURCES:[{\"title\":\"Late\"}]\n",
    ]);
    assert_eq!(events, vec![StreamEvent::StreamEnded]);
    assert!(ingestor.message().content.is_empty());
    assert!(ingestor.message().sources.is_empty());
}

#[test]
fn malformed_sources_are_skipped() {
    let (events, ingestor) = run_chunks(&[
        b"data: EVENT:SOURCES:[{\"title\":\"Good\"}]\n",
        b"data: EVENT:SOURCES:not json\n",
        b"data: {\"token\":\"ok\"}\n",
    ]);
    assert_eq!(ingestor.message().sources, vec![Source::new("Good")]);
    assert_eq!(ingestor.message().content, "ok");
    assert_eq!(events.last(), Some(&StreamEvent::StreamEnded));
}

#[test]
fn citations_split_text_verbatim() {
    let rendered = render_message("Loops end [1]; proofs [2] hold.", &[]);
    assert_eq!(
        rendered.segments,
        vec![
            Segment::Text("Loops end ".into()),
            Segment::Citation(CitationRef::new(1)),
            Segment::Text("; proofs ".into()),
            Segment::Citation(CitationRef::new(2)),
            Segment::Text(" hold.".into()),
        ]
    );
}

#[test]
fn suggestions_are_extracted_and_truncated() {
    let (display, questions) = extract_suggestions(
        "Body text.\n\n💡 Dive Deeper:\n1. \"What is X?\"\n2. \"How does Y work?\"",
    );
    assert_eq!(display, "Body text.");
    assert_eq!(questions, vec!["What is X?", "How does Y work?"]);
}

#[test]
fn out_of_range_citation_is_inert() {
    let sources = vec![Source::new("Syllabus")];
    let rendered = render_message("See [99].", &sources);
    assert_eq!(rendered.citations().collect::<Vec<_>>(), vec![CitationRef::new(99)]);
    assert!(rendered.resolve(CitationRef::new(99)).is_inert());
}

#[tokio::test]
async fn end_to_end_scenario() {
    let mut stream = ingest(
        byte_stream(vec![SCENARIO.as_bytes().to_vec()]),
        IngestOptions::default(),
    )
    .expect("start");

    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::ThreadAssigned {
                thread_id: "abc123".into()
            },
            StreamEvent::ProgressStep {
                label: "Searching...".into()
            },
            StreamEvent::SourcesFound {
                sources: vec![Source::new("Syllabus")]
            },
            StreamEvent::TokenDelta {
                text: "Hello ".into()
            },
            StreamEvent::TokenDelta {
                text: "world".into()
            },
            StreamEvent::StreamEnded,
        ]
    );

    let output = stream.finish().await.expect("finish");
    assert_eq!(output.thread_id.as_deref(), Some("abc123"));
    assert_eq!(output.message.content, "Hello world");
    assert_eq!(output.message.sources, vec![Source::new("Syllabus")]);
    assert!(!output.message.pending);
    assert_eq!(output.outcome, StreamOutcome::Completed);
}

#[tokio::test]
async fn failure_before_any_bytes_reports_apology() {
    let input = stream::iter(vec![Err::<Bytes, _>(StreamFailure::transport("dns failure"))]);
    let output = ingest(input, IngestOptions::default())
        .expect("start")
        .finish()
        .await
        .expect("finish");
    assert_eq!(output.message.content, APOLOGY_TEXT);
    assert!(!output.message.pending);
}

#[tokio::test]
async fn concurrent_streams_fill_one_transcript() {
    let mut transcript = Transcript::new();
    transcript.push_user("first");
    let first_id = transcript.begin_assistant();
    transcript.push_user("second");
    let second_id = transcript.begin_assistant();

    let first_message = transcript.message(&first_id).cloned().expect("first");
    let second_message = transcript.message(&second_id).cloned().expect("second");
    let mut first = ingest_into(
        first_message,
        byte_stream(vec![b"data: {\"token\":\"one\"}\n".to_vec()]),
        IngestOptions::default(),
    )
    .expect("first stream");
    let mut second = ingest_into(
        second_message,
        byte_stream(vec![
            b"data: THREAD_ID:shared\n".to_vec(),
            b"data: {\"token\":\"two\"}\n".to_vec(),
        ]),
        IngestOptions::default(),
    )
    .expect("second stream");

    // Apply the second stream's events before the first's.
    while let Some(event) = second.next_event().await {
        transcript.apply(second.message_id(), &event);
    }
    while let Some(event) = first.next_event().await {
        transcript.apply(first.message_id(), &event);
    }

    assert_eq!(transcript.thread_id.as_deref(), Some("shared"));
    assert_eq!(transcript.message(&first_id).map(|m| m.content.as_str()), Some("one"));
    assert_eq!(transcript.message(&second_id).map(|m| m.content.as_str()), Some("two"));
    assert_eq!(transcript.pending_ids().count(), 0);

    transcript.complete(first.finish().await.expect("first output"));
    transcript.complete(second.finish().await.expect("second output"));
    assert_eq!(transcript.messages().len(), 4);
}
