use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use clipforge::config::{GeneratorConfig, RunnerConfig};
use clipforge::download::download_prefix;
use clipforge::engines::command::CommandEngine;
use clipforge::engines::tone::ToneEngine;
use clipforge::job::{self, Job};
use clipforge::naming::output_key;
use clipforge::report::BatchReport;
use clipforge::runner::BatchRunner;
use clipforge::store::{self, ArtifactStore, MemoryStore};
use clipforge::{ConfigError, Error, GenerationEngine, Generator};

/// Exit status for failures before any job ran.
const EXIT_PREFLIGHT: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "clipforge")]
#[command(
    author,
    version,
    about = "Generate audio clips from a prompt file and upload them to an object store"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// Target bucket
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Bucket region, used for the default endpoint
    #[arg(long, global = true)]
    region: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Use a local directory as the store instead of a bucket
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate every clip in a prompt file that is not already stored
    Run(RunArgs),
    /// List stored keys
    List {
        /// Only keys starting with this prefix
        prefix: Option<String>,
    },
    /// Download every file under a prefix into DESTINATION/PREFIX/
    Download {
        prefix: String,
        /// Existing local directory
        destination: PathBuf,
    },
    /// Print the output key for a prompt line ("prompt ; duration ; name")
    Key { line: String },
    /// Generate the clips for a prompt line into a local directory, without
    /// touching the store
    Preview(PreviewArgs),
}

#[derive(Debug, Args)]
struct PreviewArgs {
    /// Prompt line, "prompt ; duration ; name"
    line: String,

    /// Directory the WAV files are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Generator program invoked once per segment
    #[arg(short, long)]
    generator: Option<PathBuf>,

    /// Synthesize a test tone instead of calling the generator
    #[arg(long)]
    tone: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Prompt file, one "prompt ; duration ; name" per line
    #[arg(short, long, default_value = "prompts.txt")]
    prompts: PathBuf,

    /// Generator program invoked once per segment
    #[arg(short, long)]
    generator: Option<PathBuf>,

    /// Hourly machine cost in USD for the cost estimate
    #[arg(long)]
    hourly_rate: Option<f64>,

    /// Instance type used to look up the hourly cost
    #[arg(long)]
    instance_type: Option<String>,

    /// Synthesize test tones into an in-memory store instead
    #[arg(long)]
    dry_run: bool,

    /// Also write the CSV cost report to this file
    #[arg(long)]
    report_csv: Option<PathBuf>,

    /// Write the full report as JSON to this file
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Do not upload the cost report to the store
    #[arg(long)]
    no_upload_report: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(EXIT_PREFLIGHT)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn load_config(cli: &Cli) -> Result<RunnerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };

    let overrides = &cli.store;
    if let Some(bucket) = &overrides.bucket {
        config.bucket = Some(bucket.clone());
    }
    if let Some(region) = &overrides.region {
        config.region = region.clone();
    }
    if let Some(endpoint) = &overrides.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(dir) = &overrides.store_dir {
        config.store_dir = Some(dir.clone());
    }
    Ok(config)
}

fn execute(cli: Cli) -> Result<u8, Error> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Run(args) => {
            if let Some(rate) = args.hourly_rate {
                config.hourly_rate_usd = Some(rate);
            }
            if let Some(instance_type) = &args.instance_type {
                config.instance_type = instance_type.clone();
            }
            if let Some(program) = &args.generator {
                config.generator = Some(GeneratorConfig::new(program));
            }
            run(&config, &args)
        }
        Commands::List { prefix } => {
            config.validate()?;
            let store = store::open(&config)?;
            for key in store.list(prefix.as_deref().unwrap_or(""))? {
                println!("{key}");
            }
            Ok(0)
        }
        Commands::Download {
            prefix,
            destination,
        } => {
            config.validate()?;
            let store = store::open(&config)?;
            let results = download_prefix(store.as_ref(), &prefix, &destination)?;
            let failed = results.iter().filter(|r| !r.is_success()).count();

            println!("Download Summary:");
            println!("  Files downloaded: {}", results.len() - failed);
            println!("  Files failed: {failed}");
            Ok(u8::from(failed > 0))
        }
        Commands::Key { line } => {
            for job in job::parse_jobs(&line)? {
                println!("{}", output_key(&job));
            }
            Ok(0)
        }
        Commands::Preview(args) => {
            if let Some(program) = &args.generator {
                config.generator = Some(GeneratorConfig::new(program));
            }
            config.validate()?;
            let jobs = job::parse_jobs(&args.line)?;
            std::fs::create_dir_all(&args.output_dir)?;

            match (&config.generator, args.tone) {
                (_, true) => preview(ToneEngine::new(), &config, &jobs, &args.output_dir)?,
                (Some(generator), false) => preview(
                    CommandEngine::new(generator.clone()),
                    &config,
                    &jobs,
                    &args.output_dir,
                )?,
                (None, false) => return Err(ConfigError::Missing("generator").into()),
            }
            Ok(0)
        }
    }
}

fn preview<E: GenerationEngine>(
    engine: E,
    config: &RunnerConfig,
    jobs: &[Job],
    output_dir: &Path,
) -> Result<(), Error> {
    let mut generator = Generator::new(engine).with_max_segment_secs(config.max_segment_secs);
    for job in jobs {
        let path = output_dir.join(output_key(job));
        generator
            .generate(&job.prompt, job.duration_secs)?
            .write_wav(&path)?;
        println!("{}", path.display());
    }
    Ok(())
}

fn run(config: &RunnerConfig, args: &RunArgs) -> Result<u8, Error> {
    config.validate()?;
    let jobs = job::load_jobs(&args.prompts)?;
    if jobs.is_empty() {
        log::warn!("No jobs found in {}", args.prompts.display());
    }

    let store: Box<dyn ArtifactStore> = if args.dry_run {
        log::info!("Dry run: synthesizing test tones into memory");
        Box::new(MemoryStore::new())
    } else {
        store::open(config)?
    };

    let report = match (&config.generator, args.dry_run) {
        (_, true) => run_batch(store.as_ref(), ToneEngine::new(), config, &jobs),
        (Some(generator), false) => run_batch(
            store.as_ref(),
            CommandEngine::new(generator.clone()),
            config,
            &jobs,
        ),
        (None, false) => return Err(ConfigError::Missing("generator").into()),
    };

    Ok(finish_run(&report, args, store.as_ref()))
}

/// Print, save and upload the report once every job has run.
///
/// Nothing here can change the outcome of the batch: a report that fails to
/// save or upload is logged and the exit status still reflects the jobs.
fn finish_run(report: &BatchReport, args: &RunArgs, store: &dyn ArtifactStore) -> u8 {
    println!("{}", report.summary());

    if let Some(path) = &args.report_csv {
        if let Err(e) = std::fs::write(path, report.to_csv()) {
            log::warn!("Failed to write CSV report to {}: {e}", path.display());
        }
    }
    if let Some(path) = &args.report_json {
        let written = report
            .to_json()
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(path, json));
        if let Err(e) = written {
            log::warn!("Failed to write JSON report to {}: {e}", path.display());
        }
    }
    if !args.no_upload_report {
        if let Err(e) = report.publish(store) {
            log::warn!("Failed to upload cost report: {e}");
        }
    }

    if report.failed > 0 {
        log::warn!("{} job(s) failed", report.failed);
    }
    report.exit_code()
}

fn run_batch<E: GenerationEngine>(
    store: &dyn ArtifactStore,
    engine: E,
    config: &RunnerConfig,
    jobs: &[Job],
) -> BatchReport {
    let generator = Generator::new(engine).with_max_segment_secs(config.max_segment_secs);
    let mut runner = BatchRunner::new(store, generator, config.hourly_rate());
    runner.run(jobs)
}
