use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cohort_merge::catalog::BatchCatalog;
use cohort_merge::config::{CliOverrides, ConfigLoader};
use cohort_merge::error::MergeError;
use cohort_merge::extract::CancelToken;
use cohort_merge::pipeline::Pipeline;
use cohort_merge::report::RunReport;
use cohort_merge::tool::PlinkTool;

#[derive(Parser)]
#[command(name = "cohort-merge")]
#[command(about = "Merge independently-genotyped batches into one conflict-free cohort")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the full extract-merge-correct-convert pipeline")]
    Run(RunArgs),
    #[command(about = "List the batch triples that would be merged")]
    Batches(BatchesArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    batch_dir: Option<String>,

    #[arg(long)]
    keep_list: Option<String>,

    #[arg(long)]
    work_dir: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    output_prefix: Option<String>,

    #[arg(long)]
    tool: Option<String>,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    tool_retries: Option<u32>,

    #[arg(long)]
    no_vcf: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BatchesArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    batch_dir: Option<String>,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<MergeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MergeError) -> u8 {
    match error {
        MergeError::InvalidBatchId(_)
        | MergeError::InvalidVariantId(_)
        | MergeError::IncompleteBatch { .. }
        | MergeError::NoBatches(_)
        | MergeError::InsufficientBatches(_)
        | MergeError::KeepListRead { .. }
        | MergeError::EmptyKeepList(_)
        | MergeError::ConfigRead(_)
        | MergeError::ConfigParse(_)
        | MergeError::ConfigValue { .. } => 2,
        MergeError::ExtractionFailed { .. }
        | MergeError::MergeToolError { .. }
        | MergeError::ConversionError { .. }
        | MergeError::MissingTool(_) => 3,
        MergeError::UnresolvedConflict { .. }
        | MergeError::MissingConflictReport(_)
        | MergeError::EmptyConflictReport(_)
        | MergeError::CohortVerification { .. }
        | MergeError::InvalidVcfArtifact { .. } => 4,
        MergeError::Cancelled(_) => 130,
        MergeError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_pipeline(args),
        Commands::Batches(args) => run_batches(args),
    }
}

fn run_pipeline(args: RunArgs) -> miette::Result<()> {
    let overrides = CliOverrides {
        batch_dir: args.batch_dir,
        keep_list: args.keep_list,
        work_dir: args.work_dir,
        output_dir: args.output_dir,
        output_prefix: args.output_prefix,
        tool: args.tool,
        concurrency: args.concurrency,
        timeout_secs: args.timeout_secs,
        tool_retries: args.tool_retries,
        no_vcf: args.no_vcf,
    };
    let config = ConfigLoader::resolve(args.config.as_deref(), overrides).into_diagnostic()?;
    let tool = PlinkTool::new(&config.tool, Duration::from_secs(config.timeout_secs))
        .into_diagnostic()?;

    let pipeline = Pipeline::new(&tool, &config);
    let cancel = CancelToken::new();
    let (report, result) = pipeline.run(&cancel);

    if args.json {
        let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
        println!("{json}");
    } else {
        print_summary(&report);
    }

    result.map(|_| ()).into_diagnostic()
}

fn print_summary(report: &RunReport) {
    println!("status: {}", report.status);
    println!("batches: {}", report.batch_count);
    println!("samples kept: {}", report.samples_kept);
    if report.correction_applied {
        println!("variants excluded: {}", report.excluded_variant_count);
    }
    if let Some(count) = report.final_sample_count {
        println!("final samples: {count}");
    }
    if let Some(count) = report.final_variant_count {
        println!("final variants: {count}");
    }
    if let Some(prefix) = &report.output_prefix {
        println!("output: {prefix}");
    }
    if let Some(vcf) = &report.vcf_path {
        println!("vcf: {vcf}");
    }
    if let Some(error) = &report.error {
        println!("error: {error}");
    }
}

#[derive(Serialize)]
struct BatchEntry {
    id: String,
    prefix: String,
}

fn run_batches(args: BatchesArgs) -> miette::Result<()> {
    let batch_dir =
        ConfigLoader::resolve_batch_dir(args.config.as_deref(), args.batch_dir).into_diagnostic()?;
    let batches = BatchCatalog::discover(&batch_dir).into_diagnostic()?;

    if args.json {
        let entries: Vec<BatchEntry> = batches
            .iter()
            .map(|batch| BatchEntry {
                id: batch.id().to_string(),
                prefix: batch.prefix().to_string(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries).into_diagnostic()?;
        println!("{json}");
    } else {
        for batch in &batches {
            println!("{}\t{}", batch.id(), batch.prefix());
        }
    }
    Ok(())
}
