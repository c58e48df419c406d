//! All the clap stuff for parsing/documenting the cli

use camino::Utf8PathBuf;
use clap::{
    builder::{PossibleValuesParser, TypedValueParser},
    Args, Parser, Subcommand, ValueEnum,
};
use dist_matrix::config::ConfigLayer;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Clone, Debug)]
#[clap(version, about, long_about = None)]
#[clap(propagate_version = true)]
/// Build, package and publish a binary for every target in the release matrix.
///
/// In CI each job runs `dist-matrix run --target <triple>` for its own entry.
/// Locally `dist-matrix run` fans out over every entry this machine can build.
pub struct Cli {
    /// The command to run
    #[clap(subcommand)]
    pub command: Commands,

    /// How verbose logging should be (log level)
    #[clap(long, short)]
    #[clap(default_value_t = LevelFilter::WARN)]
    #[clap(value_parser = PossibleValuesParser::new(["off", "error", "warn", "info", "debug", "trace"]).map(|s| s.parse::<LevelFilter>().expect("possible values are valid")))]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub verbose: LevelFilter,

    /// The format of the output
    #[clap(long, short, value_enum)]
    #[clap(default_value_t = OutputFormat::Human)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub output_format: OutputFormat,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Print the release matrix without building anything
    Plan(PlanArgs),
    /// Build, package and (unless told not to) publish matrix entries
    ///
    /// Every selected entry is independent: failures are reported per entry
    /// and never stop the others. Exits non-zero if any entry failed.
    Run(RunArgs),
    /// Generate the GitHub Actions workflow that runs the release matrix
    GenerateCi(GenerateCiArgs),
    /// Print the JSON schema of the run report
    ReportSchema(ReportSchemaArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ProjectArgs {
    /// The cargo project containing the binary
    #[clap(long, default_value = ".")]
    pub project_dir: Utf8PathBuf,

    /// The binary to release
    #[clap(long)]
    pub binary: Option<String>,

    /// Target triples to limit the run to (defaults to the whole matrix)
    #[clap(long, short)]
    pub target: Vec<String>,
}

impl ProjectArgs {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            binary: self.binary.clone(),
            targets: (!self.target.is_empty()).then(|| self.target.clone()),
            ..ConfigLayer::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub project: ProjectArgs,
}

impl PlanArgs {
    pub fn config_layer(&self) -> ConfigLayer {
        self.project.layer()
    }
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[clap(flatten)]
    pub project: ProjectArgs,

    /// Where to write archives
    #[clap(long)]
    pub dist_dir: Option<Utf8PathBuf>,

    /// Don't strip debug symbols from binaries
    #[clap(long)]
    pub no_strip: bool,

    /// Give up on an entry after this many seconds
    #[clap(long)]
    pub timeout: Option<u64>,

    /// How many entries may run at once (0 means no limit)
    #[clap(long, short)]
    pub jobs: Option<usize>,

    /// The cross-compilation helper to use for linux targets
    #[clap(long)]
    pub cross: Option<String>,

    /// Path to the release event payload (defaults to $GITHUB_EVENT_PATH)
    #[clap(long)]
    pub event: Option<Utf8PathBuf>,

    /// Upload straight to this release asset url, ignoring any event
    #[clap(long)]
    pub upload_url: Option<String>,

    /// The env var to read the upload token from
    #[clap(long)]
    pub token_env: Option<String>,

    /// Stop after packaging, don't upload anything
    #[clap(long)]
    pub no_publish: bool,
}

impl RunArgs {
    pub fn config_layer(&self) -> ConfigLayer {
        ConfigLayer {
            dist_dir: self.dist_dir.clone(),
            strip: self.no_strip.then_some(false),
            timeout_secs: self.timeout,
            jobs: self.jobs,
            token_env: self.token_env.clone(),
            cross: self.cross.clone(),
            ..self.project.layer()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct GenerateCiArgs {
    #[clap(flatten)]
    pub project: ProjectArgs,

    /// Check that the workflow on disk is up to date instead of writing it
    #[clap(long)]
    pub check: bool,
}

impl GenerateCiArgs {
    pub fn config_layer(&self) -> ConfigLayer {
        self.project.layer()
    }
}

#[derive(Args, Clone, Debug)]
pub struct ReportSchemaArgs {}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}
