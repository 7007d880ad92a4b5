pub mod config;
pub mod error;
pub mod heuristics;
pub mod io;
pub mod llm;
pub mod models;
pub mod stages;

pub use config::EngineConfig;
pub use error::EngineError;
pub use heuristics::{annotate_mistiming, find_mistimed_segments, pad_ranges, MistimingConfig, MistimingReport};
pub use io::{load_cue_document, parse_transcript_file, parse_transcript_json, CueDocument, DocumentMetadata};
pub use llm::{AnthropicClient, LlmConfig, LlmLineBreaker};
pub use models::{Cue, CueFlag, TimingRange, Token};
pub use stages::{
    conform_timing, merge_retranscription, merge_retranscriptions, repair_mistimed_lines,
    segment_tokens, LineBreakOracle, MergeConfig, PaddingConfig, Retranscription, SegmenterConfig,
};
