//! CLI tool for flattening belief-state annotated dialogues.
//!
//! `flatten` converts a dialogue corpus into line-by-line predict/target files
//! for sequence-model training; `parse`, `responses` and `format-retrieval`
//! turn model output back into JSON that evaluation scripts consume.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::LevelFilter;
use serde::Serialize;

use dst_flatten_core::{
    convert_json_to_flattened, format_retrieval_scores, pair_responses,
    parse_flattened_results_from_file, parse_responses_from_file, read_scores, ConvertConfig,
    ConvertPaths, Corpus, DEFAULT_LEN_CONTEXT, NUM_RETRIEVAL_CANDIDATES,
};

/// Flatten and parse belief-state dialogue data.
#[derive(Parser, Debug)]
#[command(name = "dst-flatten")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a dialogue JSON file into flattened predict/target lines
    Flatten(FlattenArgs),
    /// Parse belief states out of a flattened (or generated) file
    Parse(ParseArgs),
    /// Pair generated responses with their targets
    Responses(ResponsesArgs),
    /// Group per-candidate retrieval scores by dialogue and turn
    FormatRetrieval(FormatRetrievalArgs),
}

#[derive(Args, Debug)]
struct FlattenArgs {
    /// Input path to the original dialogue data
    #[arg(long)]
    input_path_json: PathBuf,

    /// Output path for model input
    #[arg(long)]
    output_path_predict: PathBuf,

    /// Output path for full targets
    #[arg(long)]
    output_path_target: Option<PathBuf>,

    /// Input path for special tokens; defaults are used when omitted
    #[arg(long)]
    input_path_special_tokens: Option<PathBuf>,

    /// Output path for special tokens; enables act/slot token collection
    #[arg(long)]
    output_path_special_tokens: Option<PathBuf>,

    /// Number of turns to include as dialogue context
    #[arg(long, default_value_t = DEFAULT_LEN_CONTEXT)]
    len_context: usize,

    /// Whether to include multimodal object references in the context (0 or 1)
    #[arg(long, default_value_t = 1)]
    use_multimodal_contexts: u8,

    /// Emit response-only lines instead of belief states
    #[arg(long)]
    no_belief_states: bool,

    /// Do not write targets
    #[arg(long)]
    no_target: bool,

    /// Input path to the retrieval candidates
    #[arg(long)]
    input_path_retrieval: Option<PathBuf>,

    /// Output path for the expanded retrieval targets
    #[arg(long)]
    output_path_retrieval: Option<PathBuf>,

    /// Number of retrieval candidates per turn
    #[arg(long, default_value_t = NUM_RETRIEVAL_CANDIDATES)]
    num_retrieval_candidates: usize,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Flattened file, one line per turn
    #[arg(long)]
    input_path: PathBuf,

    /// Output JSON path for the parsed belief states
    #[arg(long)]
    output_path_json: PathBuf,
}

#[derive(Args, Debug)]
struct ResponsesArgs {
    /// Target file, line-separated
    #[arg(long)]
    input_path_target: PathBuf,

    /// Model prediction file, line-separated
    #[arg(long)]
    input_path_predicted: PathBuf,

    /// Output JSON path for the response pairs
    #[arg(long)]
    output_path_json: PathBuf,
}

#[derive(Args, Debug)]
struct FormatRetrievalArgs {
    /// Model output: one candidate NLL score per line
    #[arg(long)]
    model_output_file: PathBuf,

    /// Original dialogue JSON
    #[arg(long)]
    dialog_json_file: PathBuf,

    /// Formatted output path
    #[arg(long)]
    formatted_output_file: PathBuf,

    /// Number of retrieval candidates per turn
    #[arg(long, default_value_t = NUM_RETRIEVAL_CANDIDATES)]
    num_retrieval_candidates: usize,
}

/// Level forced by `-v`/`-q`, or `None` to defer to `RUST_LOG`.
fn verbosity_level(verbose: u8, quiet: u8) -> Option<LevelFilter> {
    match (verbose, quiet) {
        (0, 0) => None,
        (_, 1) => Some(LevelFilter::Warn),
        (_, q) if q > 1 => Some(LevelFilter::Error),
        (1, _) => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    if let Some(level) = verbosity_level(verbose, quiet) {
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_string(value)?)?;
    Ok(())
}

fn run_flatten(args: FlattenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConvertConfig {
        len_context: args.len_context,
        use_multimodal_contexts: args.use_multimodal_contexts != 0,
        use_belief_states: !args.no_belief_states,
        output_target: !args.no_target,
        num_retrieval_candidates: args.num_retrieval_candidates,
    };
    log::info!("Belief states: {}", config.use_belief_states);

    let paths = ConvertPaths {
        input_json: args.input_path_json,
        output_predict: args.output_path_predict,
        output_target: args.output_path_target,
        input_special_tokens: args.input_path_special_tokens,
        output_special_tokens: args.output_path_special_tokens,
        input_retrieval: args.input_path_retrieval,
        output_retrieval: args.output_path_retrieval,
    };

    let summary = convert_json_to_flattened(&paths, &config)?;

    println!("\n[summary]");
    println!("  Dialogues processed: {}", summary.total_dialogues);
    println!("  Turns processed: {}", summary.total_turns);
    println!("  Predict lines: {} -> {:?}", summary.predict_lines, paths.output_predict);
    if let Some(path) = &paths.output_target {
        println!("  Target lines: {} -> {:?}", summary.target_lines, path);
    }
    if let Some(path) = &paths.output_retrieval {
        println!("  Retrieval lines: {} -> {:?}", summary.retrieval_lines, path);
    }
    if let Some(path) = &paths.output_special_tokens {
        println!("  Collected tokens: {} -> {:?}", summary.oov_tokens, path);
    }

    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_flattened_results_from_file(&args.input_path)?;
    let empty = parsed.iter().filter(|frames| frames.is_empty()).count();
    write_json(&args.output_path_json, &parsed)?;

    println!("\n[summary]");
    println!("  Lines parsed: {}", parsed.len());
    println!("  Lines without a belief state: {}", empty);
    println!("  Output: {:?}", args.output_path_json);
    Ok(())
}

fn run_responses(args: ResponsesArgs) -> Result<(), Box<dyn std::error::Error>> {
    let target = parse_responses_from_file(&args.input_path_target)?;
    let predicted = parse_responses_from_file(&args.input_path_predicted)?;
    if target.len() != predicted.len() {
        log::warn!(
            "{} target lines but {} predicted lines; pairing the first {}",
            target.len(),
            predicted.len(),
            target.len().min(predicted.len())
        );
    }

    let pairs = pair_responses(&predicted, &target)?;
    write_json(&args.output_path_json, &pairs)?;

    println!("\n[summary]");
    println!("  Response pairs: {}", pairs.len());
    println!("  Output: {:?}", args.output_path_json);
    Ok(())
}

fn run_format_retrieval(args: FormatRetrievalArgs) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Reading dialogs: {:?}", args.dialog_json_file);
    let corpus = Corpus::load(&args.dialog_json_file)?;

    log::info!("Reading outputs: {:?}", args.model_output_file);
    let scores = read_scores(&args.model_output_file)?;

    let formatted = format_retrieval_scores(&corpus, &scores, args.num_retrieval_candidates)?;

    log::info!("Saving: {:?}", args.formatted_output_file);
    write_json(&args.formatted_output_file, &formatted)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Flatten(args) => run_flatten(args),
        Command::Parse(args) => run_parse(args),
        Command::Responses(args) => run_responses(args),
        Command::FormatRetrieval(args) => run_format_retrieval(args),
    }
}
