//! SkyLift CLI
//!
//! The `skylift` command compiles test files for a target and runs their
//! tests, locally in the simulator or through a deployment harness.
//!
//! ## Commands
//!
//! - `test`: Discover, compile and run test files
//! - `compile`: Synthesize one test file into an output directory
//! - `tests`: List the tests declared by a test file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use tracing::info;

use skylift_core::{init_tracing, telemetry::level_for, LiftConfig, Target, DEFAULT_ENV_SUFFIX_LEN};
use skylift_sim::{AppBuilder, AppManifest};
use skylift_test::{
    Compiler, FsDiscovery, ManifestCompiler, Orchestrator, SnapshotMode, TestFilter, TestOptions,
};

#[derive(Parser)]
#[command(name = "skylift")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and test lifted cloud applications", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests
    Test(TestArgs),

    /// Compile a test file for a target and print the output directory
    Compile {
        /// Test file to compile
        file: PathBuf,

        #[arg(short, long, env = "SKYLIFT_TARGET", default_value = "sim")]
        target: Target,

        /// Root id of the application tree
        #[arg(long, default_value = "root")]
        root_id: String,

        /// Directory for synthesized output (default: target/ next to the file)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Hex characters appended to environment binding names
        #[arg(long, default_value_t = DEFAULT_ENV_SUFFIX_LEN)]
        env_suffix_len: usize,
    },

    /// List the tests declared by a test file
    Tests {
        file: PathBuf,

        /// Only list tests whose name matches this regex
        #[arg(short = 'f', long)]
        test_filter: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct TestArgs {
    /// Test files, or fragments of their paths (default: every *.test.json)
    entrypoints: Vec<String>,

    #[arg(short, long, env = "SKYLIFT_TARGET", default_value = "sim")]
    target: Target,

    /// Root id of the application tree
    #[arg(long)]
    root_id: Option<String>,

    /// Keep synthesized output after the run
    #[arg(long)]
    no_clean: bool,

    /// Write results to this JSON file
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Only run tests whose name matches this regex
    #[arg(short = 'f', long)]
    test_filter: Option<String>,

    /// Attempts per file, including the first
    #[arg(short, long, env = "SKYLIFT_RETRY", default_value_t = 1)]
    retry: u32,

    /// Print traces as they happen
    #[arg(long)]
    stream: bool,

    /// Snapshot mode: never, deploy, update, assert or auto
    #[arg(short, long, default_value = "auto")]
    snapshots: SnapshotMode,

    /// Files tested at once (0 = unbounded)
    #[arg(short, long, env = "SKYLIFT_PARALLEL", default_value_t = 0)]
    parallel: usize,

    /// Show verbose traces
    #[arg(long, env = "DEBUG", value_parser = FalseyValueParser::new())]
    debug: bool,

    /// Restart the simulator around every test
    #[arg(long)]
    isolate: bool,

    /// Running in CI
    #[arg(long, env = "CI", value_parser = FalseyValueParser::new())]
    ci: bool,

    /// Directory for synthesized output (default: target/ next to each file)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Hex characters appended to environment binding names
    #[arg(long, default_value_t = DEFAULT_ENV_SUFFIX_LEN)]
    env_suffix_len: usize,
}

impl TestArgs {
    fn options(&self) -> TestOptions {
        TestOptions {
            target: self.target,
            root_id: self.root_id.clone(),
            clean: !self.no_clean,
            output_file: self.output_file.clone(),
            test_filter: self.test_filter.clone(),
            retry: self.retry,
            stream: self.stream,
            snapshots: self.snapshots,
            parallel: self.parallel,
            debug: self.debug,
            isolate_tests: self.isolate,
            ci: self.ci,
        }
    }

    fn compiler(&self) -> ManifestCompiler {
        compiler(self.out_dir.as_deref(), self.env_suffix_len)
    }
}

fn compiler(out_dir: Option<&Path>, env_suffix_len: usize) -> ManifestCompiler {
    let compiler = ManifestCompiler::new().with_lift_config(LiftConfig { env_suffix_len });
    match out_dir {
        Some(dir) => compiler.with_out_root(dir),
        None => compiler,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let debug = matches!(&cli.command, Commands::Test(args) if args.debug);
    init_tracing(cli.json, level_for(cli.verbose || debug));

    match cli.command {
        Commands::Test(args) => {
            let code = cmd_test(&args).await?;
            std::process::exit(code);
        }
        Commands::Compile {
            file,
            target,
            root_id,
            out_dir,
            env_suffix_len,
        } => cmd_compile(&file, target, &root_id, out_dir.as_deref(), env_suffix_len).await,
        Commands::Tests { file, test_filter } => cmd_tests(&file, test_filter.as_deref()),
    }
}

async fn cmd_test(args: &TestArgs) -> Result<i32> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let options = args.options();
    info!(target = %options.target, entrypoints = args.entrypoints.len(), "starting test run");

    let orchestrator = Orchestrator::new(FsDiscovery::new(cwd), args.compiler());
    let code = orchestrator
        .run(&args.entrypoints, &options)
        .await
        .context("Test run failed")?;
    Ok(code)
}

async fn cmd_compile(
    file: &Path,
    target: Target,
    root_id: &str,
    out_dir: Option<&Path>,
    env_suffix_len: usize,
) -> Result<()> {
    let compiled = compiler(out_dir, env_suffix_len)
        .compile(file, target, root_id)
        .await
        .with_context(|| format!("Failed to compile {}", file.display()))?;
    println!("{}", compiled.out_dir.display());
    Ok(())
}

fn cmd_tests(file: &Path, test_filter: Option<&str>) -> Result<()> {
    let manifest = AppManifest::load(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let app = AppBuilder::new(Target::Sim)
        .build(&manifest)
        .with_context(|| format!("Failed to build {}", file.display()))?;
    let filter = TestFilter::new(test_filter).context("Invalid test filter")?;

    let tests = filter.apply(app.test_paths());
    if tests.is_empty() {
        println!("No tests found.");
    }
    for test in tests {
        println!("{test}");
    }
    Ok(())
}
