// CLI interface for hookenv using clap
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{CliError, EnvError, Result};
use crate::language::{HealthStatus, LanguageRegistry, Provisioner, SetupRequest};
use crate::logging::{init_logging, LogConfig};
use crate::process::ProcessToolRunner;

#[derive(Parser)]
#[command(
    name = "hookenv",
    about = "hookenv - Idempotent provisioning of isolated per-language hook environments",
    version = crate::VERSION,
    long_about = "hookenv computes, health-checks and provisions the isolated toolchain environments that hooks run in, reusing healthy ones and recreating broken ones."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file path (defaults to ./hookenv.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Control color output (auto, always, never)
    #[arg(long, global = true, value_name = "WHEN")]
    pub color: Option<String>,
}

/// Arguments that identify one environment
#[derive(Args, Debug, Clone)]
pub struct EnvironmentArgs {
    /// Language key (node, python, ruby, rust, conda, perl, r, dart, dotnet, coursier)
    pub language: String,

    /// Requested language version; empty means the language's own default
    #[arg(long, default_value = "")]
    pub language_version: String,

    /// Local checkout of the hook repository
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Cache directory for repositories without a checkout; an empty value disables it
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Additional dependencies to install into the environment
    #[arg(long = "dep", value_name = "DEPENDENCY")]
    pub dependencies: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the environment if needed and print its path
    Setup {
        #[command(flatten)]
        env: EnvironmentArgs,

        /// Where the hook repository came from (recorded in logs only)
        #[arg(long)]
        repo_url: Option<String>,
    },

    /// Report whether the environment is absent, healthy or broken
    Status {
        #[command(flatten)]
        env: EnvironmentArgs,
    },

    /// Print the environment path without touching the filesystem
    Path {
        #[command(flatten)]
        env: EnvironmentArgs,
    },

    /// Print the variables a hook would run with inside an environment
    Env {
        /// Language key
        language: String,

        /// Environment directory
        env_path: PathBuf,
    },

    /// List the supported language keys
    Languages,

    /// Generate shell completion scripts
    GenerateCompletion {
        /// Shell to generate completion for
        shell: Shell,
    },
}

impl Cli {
    pub fn run(&self) -> Result<i32> {
        if self.verbose && self.quiet {
            return Err(EnvError::Cli(Box::new(CliError::ConflictingArguments {
                first: "--verbose".to_string(),
                second: "--quiet".to_string(),
                suggestion:
                    "Use either --verbose for more output or --quiet for less output, but not both"
                        .to_string(),
            })));
        }

        if let Commands::GenerateCompletion { shell } = &self.command {
            let mut cmd = Self::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            return Ok(0);
        }

        let settings = Settings::load(self.config.as_deref())?;
        self.init_logging(&settings);

        let registry = Arc::new(LanguageRegistry::with_builtin(Arc::new(
            ProcessToolRunner::new(),
        )));
        let provisioner = Provisioner::new(registry);
        let mut stdout = std::io::stdout().lock();

        match &self.command {
            Commands::Setup { env, repo_url } => {
                let mut request = build_request(env, &settings);
                if let Some(url) = repo_url {
                    request = request.with_repo_url(url.clone());
                }
                let path = provisioner.setup_environment(&env.language, &request)?;
                writeln!(stdout, "{}", path.display())?;
                Ok(0)
            }
            Commands::Status { env } => {
                let request = build_request(env, &settings);
                let (path, report) = provisioner.status(&env.language, &request)?;
                match &report.reason {
                    Some(reason) => {
                        writeln!(stdout, "{}: {} ({reason})", report.status, path.display())?
                    }
                    None => writeln!(stdout, "{}: {}", report.status, path.display())?,
                }
                Ok(if report.status == HealthStatus::Healthy {
                    0
                } else {
                    1
                })
            }
            Commands::Path { env } => {
                let request = build_request(env, &settings);
                let path = provisioner.environment_path(&env.language, &request)?;
                writeln!(stdout, "{}", path.display())?;
                Ok(0)
            }
            Commands::Env { language, env_path } => {
                let environment = provisioner.process_environment(language, env_path)?;
                let mut variables: Vec<(String, String)> =
                    environment.build().into_iter().collect();
                variables.sort();
                for (key, value) in variables {
                    writeln!(stdout, "{key}={value}")?;
                }
                Ok(0)
            }
            Commands::Languages => {
                for name in provisioner.registry().list_plugins() {
                    writeln!(stdout, "{name}")?;
                }
                Ok(0)
            }
            Commands::GenerateCompletion { .. } => Ok(0),
        }
    }

    fn init_logging(&self, settings: &Settings) {
        let mut log_config = LogConfig::from_cli(self.verbose, self.quiet, self.color.clone());
        if let Some(format) = settings.log_format() {
            log_config = log_config.with_format(format);
        }

        if let Err(e) = init_logging(log_config) {
            eprintln!("Failed to initialize logging: {e}");
        }
    }

    /// Colors for error output, following the same rules as log output
    pub fn use_colors(&self) -> bool {
        LogConfig::from_cli(self.verbose, self.quiet, self.color.clone()).should_use_colors()
    }
}

fn build_request(args: &EnvironmentArgs, settings: &Settings) -> SetupRequest {
    let mut request = SetupRequest::new()
        .with_version(settings.language_version(&args.language, &args.language_version))
        .with_dependencies(args.dependencies.iter().cloned());
    if let Some(repo) = args.repo.as_deref().filter(|repo| !is_empty_path(repo)) {
        request = request.with_repo_path(repo);
    }
    if let Some(cache_dir) = settings.resolve_cache_dir(args.cache_dir.as_deref().map(Path::new)) {
        request = request.with_cache_dir(cache_dir);
    }
    request
}

fn is_empty_path(path: &Path) -> bool {
    path.as_os_str().is_empty()
}
