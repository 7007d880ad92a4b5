use cuesmith::{
    annotate_mistiming, conform_timing, find_mistimed_segments, load_cue_document,
    merge_retranscription, parse_transcript_json, repair_mistimed_lines, segment_tokens, Cue,
    CueDocument, CueFlag, EngineConfig, TimingRange, Token,
};

/// Tokens for one sentence, time split evenly across its words
fn sentence(text: &str, start: f64, end: f64) -> Vec<Token> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = (end - start) / words.len() as f64;
    words
        .iter()
        .enumerate()
        .map(|(i, w)| Token::new(*w, start + i as f64 * step, start + (i + 1) as f64 * step))
        .collect()
}

/// A recording where the recognizer stretched one word over 27 seconds and
/// crammed the next five sentences into a tenth of a second
fn mistimed_tokens() -> Vec<Token> {
    let mut tokens = Vec::new();
    tokens.extend(sentence("Good morning.", 0.0, 1.0));
    tokens.extend(sentence("This is fine.", 1.0, 2.0));
    tokens.push(Token::new("Then", 2.0, 2.5));
    tokens.push(Token::new("silence.", 2.5, 30.0));
    for (i, word) in ["One.", "Two.", "Three.", "Four.", "Five."].iter().enumerate() {
        let start = 30.0 + i as f64 * 0.02;
        tokens.push(Token::new(*word, start, start + 0.02));
    }
    for k in 0..8 {
        let start = 31.0 + k as f64 * 0.8;
        tokens.extend(sentence(&format!("Sentence {}.", k + 1), start, start + 0.8));
    }
    tokens
}

fn fresh_tokens() -> Vec<Token> {
    let mut tokens = sentence("Then silence.", 2.0, 3.0);
    for (i, word) in ["One.", "Two.", "Three.", "Four.", "Five."].iter().enumerate() {
        let start = 25.0 + i as f64;
        tokens.push(Token::new(*word, start, start + 1.0));
    }
    tokens
}

fn assert_ordered_without_overlap(cues: &[Cue]) {
    for (i, cue) in cues.iter().enumerate() {
        assert_eq!(cue.index, i + 1);
        assert!(cue.start <= cue.end);
    }
    for pair in cues.windows(2) {
        assert!(pair[0].start <= pair[1].start);
        assert!(pair[0].end <= pair[1].start + 1e-6);
    }
}

#[test]
fn test_detect_retranscribe_and_conform() {
    let config = EngineConfig::default();

    let mut cues = segment_tokens(&mistimed_tokens(), &config.segmenter, None)
        .unwrap()
        .cues;
    assert_eq!(cues.len(), 16);
    assert_eq!(cues[2].text, "Then silence.");
    assert_ordered_without_overlap(&cues);

    let report = annotate_mistiming(&mut cues, &config.mistiming);
    assert_eq!(report.mistimed_lines, 5);
    assert_eq!(report.ranges, vec![TimingRange::new(3, 8).unwrap()]);
    assert!(cues[2].has_flag(CueFlag::MistimedSegmentStart));
    assert!(cues[7].has_flag(CueFlag::MistimedSegmentEnd));

    let merged = merge_retranscription(
        &cues,
        report.ranges[0],
        &fresh_tokens(),
        &config.segmenter,
        &config.merge,
        None,
    )
    .unwrap();
    assert_eq!(merged.cues.len(), 16);
    assert_eq!(merged.cues[3].text, "One.");
    assert_eq!(merged.cues[3].start, 25.0);
    // Cues outside the range are untouched
    assert_eq!(merged.cues[0].text, cues[0].text);
    assert_eq!(merged.cues[15].start, cues[15].start);
    assert_ordered_without_overlap(&merged.cues);
    assert!(find_mistimed_segments(&merged.cues, &config.mistiming).is_empty());

    let conformed = conform_timing(&merged.cues, &config.padding, None);
    assert_eq!(conformed.cues.len(), merged.cues.len());
    assert_ordered_without_overlap(&conformed.cues);
    // The last cue has nothing after it and reaches the minimum duration
    let last = conformed.cues.last().unwrap();
    assert!((last.duration() - config.padding.min_sec).abs() < 1e-9);

    let again = conform_timing(&conformed.cues, &config.padding, None);
    assert_eq!(again.cues, conformed.cues);
}

#[test]
fn test_repair_without_new_audio() {
    let config = EngineConfig::default();
    let cues = segment_tokens(&mistimed_tokens(), &config.segmenter, None)
        .unwrap()
        .cues;

    let repaired = repair_mistimed_lines(&cues, &config.mistiming, " ", None);
    assert_eq!(repaired.runs_redistributed, 1);
    assert_eq!(repaired.cues.len(), cues.len());
    assert_ordered_without_overlap(&repaired.cues);

    // The stretched cue gave its time back to the crammed ones
    assert!(repaired.cues[2].duration() < 15.0);
    assert!(repaired.cues[3].duration() > 2.0);
    assert_eq!(repaired.cues[7].end, cues[7].end);
    assert!(find_mistimed_segments(&repaired.cues, &config.mistiming).is_empty());
}

#[test]
fn test_cue_document_file_round_trip() {
    let config = EngineConfig::default();
    let json = r#"{"words": [
        {"text": "Short", "start": 0.0, "end": 0.2, "confidence": 0.3},
        {"text": "one.", "start": 0.2, "end": 0.4, "confidence": 0.4},
        {"text": "(applause)", "start": 0.4, "end": 4.0, "type": "audio_event"},
        {"text": "A", "start": 4.0, "end": 4.1},
        {"text": "second", "start": 4.1, "end": 4.3},
        {"text": "line.", "start": 4.3, "end": 4.5}
    ]}"#;
    let tokens = parse_transcript_json(json).unwrap();
    let cues = segment_tokens(&tokens, &config.segmenter, None).unwrap().cues;
    assert_eq!(cues.len(), 2);
    assert!(cues[0].has_flag(CueFlag::LowConfidence));
    assert!(!cues[1].has_flag(CueFlag::LowConfidence));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cues.json");
    CueDocument::new(cues, vec![], None).write_json(&path).unwrap();

    let mut document = load_cue_document(&path).unwrap();
    let result = conform_timing(&document.cues, &config.padding, TimingRange::new(1, 1).ok());
    assert_eq!(result.extended, 1);
    document.cues = result.cues;
    document.refresh_metadata();

    assert_eq!(document.metadata.padded_cues, 1);
    assert!((document.cues[0].duration() - 1.0).abs() < 1e-9);
    assert_eq!(document.cues[1].start, 4.0);
}

#[test]
fn test_zero_length_cue_is_widened_by_conformer() {
    let config = EngineConfig::default();
    let tokens = vec![Token::new("Hi.", 1.0, 1.0), Token::new("Next.", 3.0, 3.5)];

    let cues = segment_tokens(&tokens, &config.segmenter, None).unwrap().cues;
    assert_eq!(cues.len(), 2);
    assert_eq!((cues[0].start, cues[0].end), (1.0, 1.0));

    let conformed = conform_timing(&cues, &config.padding, None);
    assert_eq!(conformed.still_short, 0);
    assert_eq!((conformed.cues[0].start, conformed.cues[0].end), (1.0, 2.0));
    assert!(conformed.cues.iter().all(|c| c.end > c.start));
    assert_ordered_without_overlap(&conformed.cues);
}
