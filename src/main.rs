use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cuesmith::models::shift_tokens;
use cuesmith::{
    annotate_mistiming, conform_timing, load_cue_document, merge_retranscriptions, pad_ranges,
    parse_transcript_file, repair_mistimed_lines, segment_tokens, AnthropicClient, CueDocument,
    Cue, EngineConfig, LineBreakOracle, LlmLineBreaker, Retranscription, TimingRange,
};

#[derive(Parser)]
#[command(name = "cuesmith")]
#[command(author, version, about = "Subtitle cue builder for word-timed transcriptions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults to ./cuesmith.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build subtitle cues from a word-timed transcription
    Segment {
        /// Transcription JSON (`{"words": [...]}`)
        #[arg(short, long)]
        input: PathBuf,

        /// Output cue document (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Also write a plain text preview
        #[arg(long)]
        text: Option<PathBuf>,

        /// Replace a block of cues with a fresh transcription, as RANGE=FILE
        /// (e.g. 12-30=clip.json); may be repeated
        #[arg(long = "retranscribed", value_name = "RANGE=FILE")]
        retranscribed: Vec<String>,

        /// Timestamps in --retranscribed files start at the block, not the media
        #[arg(long)]
        clip_relative: bool,

        /// Redistribute time across mistimed lines
        #[arg(long)]
        repair: bool,

        /// Pad cues to the reading speed and minimum duration
        #[arg(long)]
        pad: bool,

        /// Ask a language model where to split over-long lines
        #[arg(long)]
        llm_split: bool,
    },

    /// Report mistimed lines and blocks in a cue document
    Analyze {
        /// Cue document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Write the annotated document here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Widen reported blocks by one cue on each side
        #[arg(long)]
        pad_ranges: bool,
    },

    /// Pad cue timing in an existing cue document
    Conform {
        /// Cue document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output cue document (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Only touch cues in this range (e.g. 12-30)
        #[arg(long)]
        range: Option<String>,

        /// Also write a plain text preview
        #[arg(long)]
        text: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Segment {
            input,
            output,
            text,
            retranscribed,
            clip_relative,
            repair,
            pad,
            llm_split,
        } => {
            let options = SegmentOptions {
                retranscribed,
                clip_relative,
                repair,
                pad,
                llm_split,
            };
            segment_transcript(&config, &input, &output, text.as_deref(), &options)
        }
        Commands::Analyze {
            input,
            output,
            pad_ranges,
        } => analyze_document(&config, &input, output.as_deref(), pad_ranges),
        Commands::Conform {
            input,
            output,
            range,
            text,
        } => conform_document(&config, &input, &output, range.as_deref(), text.as_deref()),
    }
}

fn setup_logging(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
        return;
    }

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

struct SegmentOptions {
    retranscribed: Vec<String>,
    clip_relative: bool,
    repair: bool,
    pad: bool,
    llm_split: bool,
}

fn segment_transcript(
    config: &EngineConfig,
    input: &Path,
    output: &Path,
    text: Option<&Path>,
    options: &SegmentOptions,
) -> Result<()> {
    info!("Loading transcription from {:?}", input);
    let tokens = parse_transcript_file(input).context("Failed to parse input transcription")?;
    info!("Loaded {} tokens", tokens.len());

    let breaker = if options.llm_split {
        let client = AnthropicClient::from_env(config.llm.clone())?;
        info!("Splitting over-long lines with {}", client.model());
        Some(LlmLineBreaker::new(client))
    } else {
        None
    };
    let oracle = breaker.as_ref().map(|b| b as &dyn LineBreakOracle);

    let mut cues = segment_tokens(&tokens, &config.segmenter, oracle)?.cues;

    if !options.retranscribed.is_empty() {
        let retranscriptions = options
            .retranscribed
            .iter()
            .map(|arg| load_retranscription(arg, &cues, options.clip_relative))
            .collect::<Result<Vec<_>>>()?;
        let merged = merge_retranscriptions(
            &cues,
            &retranscriptions,
            &config.segmenter,
            &config.merge,
            oracle,
        )?;
        cues = merged.cues;
    }

    if options.repair {
        cues = repair_mistimed_lines(&cues, &config.mistiming, &config.segmenter.word_separator, None).cues;
    }

    let report = annotate_mistiming(&mut cues, &config.mistiming);

    if options.pad {
        cues = conform_timing(&cues, &config.padding, None).cues;
    }

    let document = CueDocument::new(cues, report.ranges, Some(input.display().to_string()));
    write_outputs(&document, output, text)?;

    info!(
        "Complete: {} cues, {} mistimed line(s), {} block(s) to re-transcribe",
        document.metadata.total_cues,
        document.metadata.mistimed_lines,
        document.ranges.len()
    );
    Ok(())
}

/// Parse `RANGE=FILE` and load the file's tokens
fn load_retranscription(
    arg: &str,
    cues: &[Cue],
    clip_relative: bool,
) -> Result<Retranscription> {
    let (range, file) = arg
        .split_once('=')
        .with_context(|| format!("Expected RANGE=FILE, got {:?}", arg))?;
    let range = TimingRange::parse(range)?;
    let mut tokens = parse_transcript_file(Path::new(file))?;

    if clip_relative {
        let offset = cues
            .get(*range.positions().start())
            .map(|c| c.start)
            .with_context(|| format!("Range {} is outside the document ({} cues)", range, cues.len()))?;
        tokens = shift_tokens(&tokens, offset);
    }

    info!("Range {}: {} fresh tokens from {}", range, tokens.len(), file);
    Ok(Retranscription { range, tokens })
}

fn analyze_document(
    config: &EngineConfig,
    input: &Path,
    output: Option<&Path>,
    widen: bool,
) -> Result<()> {
    info!("Analyzing cue document {:?}", input);
    let mut document = load_cue_document(input)?;
    let report = annotate_mistiming(&mut document.cues, &config.mistiming);

    let ranges = if widen {
        pad_ranges(&report.ranges, document.cues.len())
    } else {
        report.ranges
    };
    document.ranges = ranges;
    document.refresh_metadata();

    println!("Cue Analysis");
    println!("============");
    println!("Total cues: {}", document.metadata.total_cues);
    println!("Duration: {:.1}s", document.metadata.duration_sec);
    println!("Mistimed lines: {}", document.metadata.mistimed_lines);
    println!("Low confidence cues: {}", document.metadata.low_confidence_cues);
    println!();

    println!("Blocks to Re-transcribe");
    println!("-----------------------");
    if document.ranges.is_empty() {
        println!("None");
    }
    for range in &document.ranges {
        let positions = range.positions();
        let first = &document.cues[*positions.start()];
        let last = &document.cues[*positions.end()];
        println!(
            "{}: {} cues, {:.2}s - {:.2}s",
            range,
            range.len(),
            first.start,
            last.end
        );
    }

    if let Some(output) = output {
        document.write_json(output)?;
        info!("Annotated document written to {:?}", output);
    }
    Ok(())
}

fn conform_document(
    config: &EngineConfig,
    input: &Path,
    output: &Path,
    range: Option<&str>,
    text: Option<&Path>,
) -> Result<()> {
    let mut document = load_cue_document(input)?;
    let restrict = range.map(TimingRange::parse).transpose()?;
    if let Some(range) = restrict {
        if range.end_index() > document.cues.len() {
            warn!(
                "Range {} extends past the last cue ({}), clamping",
                range,
                document.cues.len()
            );
        }
    }

    let result = conform_timing(&document.cues, &config.padding, restrict);
    document.cues = result.cues;
    document.refresh_metadata();
    write_outputs(&document, output, text)?;

    info!(
        "Complete: {} cue(s) extended, {} still short",
        result.extended, result.still_short
    );
    Ok(())
}

fn write_outputs(document: &CueDocument, output: &Path, text: Option<&Path>) -> Result<()> {
    document.write_json(output)?;
    info!("Output written to {:?}", output);
    if let Some(text) = text {
        document.write_text(text)?;
        info!("Text preview written to {:?}", text);
    }
    Ok(())
}
