use std::path::{Path, PathBuf};

use clap::Parser;
use dfbscan::analyzer::ProjectAnalyzer;
use dfbscan::config::Config;
use dfbscan::domain::Language;
use dfbscan::engine::{run_scan, EngineConfig};
use dfbscan::errors::{Result, ScanError};
use dfbscan::extractors::{self, BugKind};
use dfbscan::oracle::stub::{NullIntraDataFlowAnalyzer, NullPathValidator};
use dfbscan::oracle::retry::{RetryingIntraDataFlowAnalyzer, RetryingPathValidator};
use once_cell::sync::Lazy;
use regex::Regex;

/// Repository-level data-flow bug scanner.
#[derive(Parser, Debug)]
#[command(name = "dfbscan", version, about)]
struct Cli {
    /// Root of the project to scan.
    project_path: PathBuf,

    /// Source language to analyze. Inferred from `dfbscan.toml` or the dominant file
    /// extension under `project_path` when omitted.
    #[arg(long, value_enum)]
    language: Option<Language>,

    /// Bug kind to look for.
    #[arg(long, value_enum, default_value = "npd")]
    bug_type: CliBugKind,

    /// Maximum CFL call-context depth before a worklist item is discarded.
    #[arg(long)]
    call_depth: Option<usize>,

    /// Size of the parsing/call-graph-construction thread pool (rayon).
    #[arg(long)]
    max_symbolic_workers: Option<usize>,

    /// Size of the bounded worker pool dispatching one task per source seed.
    #[arg(long)]
    max_neural_workers: Option<usize>,

    /// Directory `detect_info.json` is written under.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Model name passed through to the LLM oracle transport, if one is wired in.
    #[arg(long)]
    model_name: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Regex matched against each discovered file's project-relative path; a match
    /// excludes the file from the scan.
    #[arg(long)]
    exclude: Option<String>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliBugKind {
    Npd,
    Mlk,
    Uaf,
}

impl From<CliBugKind> for BugKind {
    fn from(kind: CliBugKind) -> Self {
        match kind {
            CliBugKind::Npd => BugKind::Npd,
            CliBugKind::Mlk => BugKind::Mlk,
            CliBugKind::Uaf => BugKind::Uaf,
        }
    }
}

const SOURCE_EXTENSIONS: &[(&str, Language)] = &[
    ("c", Language::C),
    ("h", Language::C),
    ("cc", Language::Cpp),
    ("cpp", Language::Cpp),
    ("cxx", Language::Cpp),
    ("hpp", Language::Cpp),
    ("java", Language::Java),
    ("py", Language::Python),
    ("go", Language::Go),
];

/// Directory names skipped during discovery, compiled once on first use rather than
/// re-parsed per `discover_files` call.
static SKIP_DIR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\.git|target|node_modules|build|dist|vendor)$").unwrap());

fn extension_for(language: Language) -> Vec<&'static str> {
    SOURCE_EXTENSIONS.iter().filter(|(_, l)| *l == language).map(|(ext, _)| *ext).collect()
}

/// Walks `root`, collecting `(relative_path, contents)` for every file whose extension
/// matches `language`, skipping VCS/build-noise directories and any path matched by
/// `exclude`. A single unreadable file is logged and dropped rather than aborting
/// discovery.
fn discover_files(root: &Path, language: Language, exclude: Option<&Regex>) -> Vec<(String, String)> {
    let extensions = extension_for(language);
    let mut out = Vec::new();
    let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry
            .file_name()
            .to_str()
            .map(|name| !SKIP_DIR_PATTERN.is_match(name))
            .unwrap_or(true)
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.contains(&ext) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().into_owned();
        if exclude.is_some_and(|re| re.is_match(&rel)) {
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => out.push((rel, contents)),
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "failed to read file, skipping");
            }
        }
    }
    out
}

fn infer_language(root: &Path) -> Option<Language> {
    let mut counts: std::collections::HashMap<Language, usize> = std::collections::HashMap::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if let Some((_, lang)) = SOURCE_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
            *counts.entry(*lang).or_default() += 1;
        }
    }
    counts.into_iter().max_by_key(|(_, n)| *n).map(|(lang, _)| lang)
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "dfbscan=info",
        1 => "dfbscan=debug",
        _ => "dfbscan=trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.project_path)?;

    let language = cli
        .language
        .or(config.language)
        .or_else(|| infer_language(&cli.project_path))
        .ok_or_else(|| ScanError::config("could not determine a source language; pass --language"))?;

    let bug_kind: BugKind = cli.bug_type.into();
    if !BugKind::supported_for(language).contains(&bug_kind) {
        return Err(ScanError::config(format!("{bug_kind} is not supported for {language}")));
    }

    let call_depth = cli.call_depth.unwrap_or(config.call_depth);
    let max_symbolic_workers = cli.max_symbolic_workers.unwrap_or(config.max_symbolic_workers);
    let max_neural_workers = cli.max_neural_workers.unwrap_or(config.max_neural_workers);
    let out_dir = cli.out_dir.unwrap_or_else(|| PathBuf::from(&config.out_dir));

    rayon::ThreadPoolBuilder::new()
        .num_threads(max_symbolic_workers.max(1))
        .build_global()
        .ok();

    let exclude_pattern = cli
        .exclude
        .or(config.exclude.clone())
        .map(|p| Regex::new(&p).map_err(|e| ScanError::config(format!("invalid --exclude pattern: {e}"))))
        .transpose()?;
    let files = discover_files(&cli.project_path, language, exclude_pattern.as_ref());
    tracing::info!(count = files.len(), %language, "discovered source files");
    if files.is_empty() {
        tracing::warn!("no source files found, nothing to scan");
        return Ok(());
    }

    let (analyzer, parsed) = ProjectAnalyzer::build_with_trees(&files, language)?;
    tracing::info!(functions = analyzer.functions().count(), "built project call graph");

    let extractor = extractors::extractor_for(language, bug_kind)
        .ok_or_else(|| ScanError::config(format!("no extractor for {bug_kind} on {language}")))?;
    let (sources, sinks) = extractors::extract_all(&analyzer, &parsed, extractor.as_ref());
    tracing::info!(sources = sources.len(), sinks = sinks.len(), "extracted bug pattern candidates");
    drop(parsed);

    let model_name = cli.model_name.or(config.model_name);
    let (intra, validator): (Box<dyn dfbscan::oracle::IntraDataFlowAnalyzer>, Box<dyn dfbscan::oracle::PathValidator>) =
        match model_name {
            Some(_) => (
                Box::new(RetryingIntraDataFlowAnalyzer::new(NullIntraDataFlowAnalyzer, 3)),
                Box::new(RetryingPathValidator::new(NullPathValidator, 3)),
            ),
            None => {
                tracing::warn!("no --model-name configured; running with a no-op oracle, which finds nothing");
                (Box::new(NullIntraDataFlowAnalyzer), Box::new(NullPathValidator))
            }
        };

    let engine_config = EngineConfig { call_depth };
    let state = run_scan(
        &analyzer,
        bug_kind,
        sources,
        &sinks,
        intra.as_ref(),
        validator.as_ref(),
        &out_dir,
        engine_config,
        max_neural_workers,
    )?;

    tracing::info!(reports = state.bug_report_count(), out_dir = %out_dir.display(), "scan complete");
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("dfbscan: {err}");
        std::process::exit(1);
    }
}
