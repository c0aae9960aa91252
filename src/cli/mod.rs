//! Command-line interface for docshift
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - Endpoint resolution from URIs, named datasources and defaults
//! - Dispatch of the migrate, inventory and verify commands

use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, ConnectionConfig, LogLevel};
use crate::connection::{ConnectionDescriptor, ConnectionManager};
use crate::error::{ConfigError, Result};
use crate::formatter::Formatter;
use crate::inventory::InventoryReporter;
use crate::migrate::BulkCopier;
use crate::store::{MongoDriver, StoreDriver};
use crate::verify::{SpotCheckVerifier, VerificationResult};

pub mod completion;

/// Copy, inventory and spot-check MongoDB databases
#[derive(Parser, Debug)]
#[command(
    name = "docshift",
    version,
    about = "Copy every collection of one MongoDB database into another",
    long_about = "Copies all collections from a source database to a target database,
one collection at a time, with per-collection failure isolation. Also lists
databases and collections on either side and spot-checks copied collections."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Quiet mode (error logs only, no progress lines or bar)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Source endpoint options
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Named datasource from the config file
    #[arg(long = "source", value_name = "NAME")]
    pub source: Option<String>,

    /// Source connection URI
    #[arg(
        long = "source-uri",
        value_name = "URI",
        env = "DOCSHIFT_SOURCE_URI",
        hide_env_values = true
    )]
    pub source_uri: Option<String>,

    /// Source database (overrides the datasource and the URI path)
    #[arg(long = "source-db", value_name = "NAME", env = "DOCSHIFT_SOURCE_DB")]
    pub source_db: Option<String>,
}

/// Target endpoint options
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Named datasource from the config file
    #[arg(long = "target", value_name = "NAME")]
    pub target: Option<String>,

    /// Target connection URI
    #[arg(
        long = "target-uri",
        value_name = "URI",
        env = "DOCSHIFT_TARGET_URI",
        hide_env_values = true
    )]
    pub target_uri: Option<String>,

    /// Target database (overrides the datasource and the URI path)
    #[arg(long = "target-db", value_name = "NAME", env = "DOCSHIFT_TARGET_DB")]
    pub target_db: Option<String>,
}

/// Endpoint options of one role, detached from clap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointArgs {
    pub datasource: Option<String>,
    pub uri: Option<String>,
    pub database: Option<String>,
}

impl SourceArgs {
    pub fn endpoint(&self) -> EndpointArgs {
        EndpointArgs {
            datasource: self.source.clone(),
            uri: self.source_uri.clone(),
            database: self.source_db.clone(),
        }
    }
}

impl TargetArgs {
    pub fn endpoint(&self) -> EndpointArgs {
        EndpointArgs {
            datasource: self.target.clone(),
            uri: self.target_uri.clone(),
            database: self.target_db.clone(),
        }
    }
}

/// Subcommands for docshift
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy every collection from the source database to the target database
    Migrate {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,

        /// Per-call timeout in seconds for reads and inserts
        #[arg(long, value_name = "SECONDS")]
        operation_timeout: Option<u64>,
    },

    /// List databases, collections and document counts
    Inventory {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Spot-check one collection on the target
    Verify {
        /// Collection name (matched case-insensitively)
        #[arg(value_name = "COLLECTION")]
        collection: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show or validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,

        /// Print configured datasource names, one per line
        #[arg(long)]
        list_datasources: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// How a completed command went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Everything succeeded
    Success,
    /// The command ran to the end but something failed along the way
    /// (a collection, an endpoint, a missing collection)
    Incomplete,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Incomplete => 2,
        }
    }
}

/// Resolve where one role connects to
///
/// URI priority: explicit URI, then named datasource, then
/// `default_<role>` from the config. Database priority: explicit database,
/// then the datasource's database, then the URI path.
///
/// # Arguments
/// * `role` - `source` or `target`
/// * `args` - Endpoint options given for that role
/// * `config` - Connection configuration with datasources
///
/// # Returns
/// * `Result<Option<ConnectionDescriptor>>` - `None` when nothing is configured
pub fn resolve_endpoint(
    role: &str,
    args: &EndpointArgs,
    config: &ConnectionConfig,
) -> Result<Option<ConnectionDescriptor>> {
    if let Some(uri) = &args.uri {
        return Ok(Some(ConnectionDescriptor::new(
            uri.clone(),
            args.database.clone(),
        )));
    }

    let default = match role {
        "source" => config.default_source.as_ref(),
        "target" => config.default_target.as_ref(),
        _ => None,
    };

    let Some(name) = args.datasource.as_ref().or(default) else {
        return Ok(None);
    };

    let datasource = config.get_datasource(name)?;
    let database = args
        .database
        .clone()
        .or_else(|| datasource.database.clone());
    Ok(Some(ConnectionDescriptor::new(
        datasource.uri.clone(),
        database,
    )))
}

/// Like [`resolve_endpoint`], but the role must be configured
pub fn require_endpoint(
    role: &str,
    args: &EndpointArgs,
    config: &ConnectionConfig,
) -> Result<ConnectionDescriptor> {
    resolve_endpoint(role, args, config)?.ok_or_else(|| {
        ConfigError::MissingField(format!(
            "{role} endpoint (pass --{role}-uri, --{role} NAME or set connection.default_{role})"
        ))
        .into()
    })
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration with arguments applied
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        let args = CliArgs::parse();
        let config = Config::load_from_file(args.config_file.as_deref())?;
        Ok(Self::with_config(args, config))
    }

    /// Create a CLI interface from parsed arguments and a loaded config
    pub fn with_config(args: CliArgs, mut config: Config) -> Self {
        Self::apply_args_to_config(&mut config, &args);
        Self { args, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        if args.no_color {
            config.display.color_output = false;
        }

        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };

        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }

        if args.quiet {
            config.migration.show_progress = false;
        }

        if let Commands::Migrate {
            no_progress,
            operation_timeout,
            ..
        } = &args.command
        {
            if *no_progress {
                config.migration.show_progress = false;
            }
            if let Some(timeout) = operation_timeout {
                config.migration.operation_timeout = *timeout;
            }
        }
    }

    /// Connection manager backed by the MongoDB driver
    pub fn connection_manager(&self) -> ConnectionManager {
        self.connection_manager_with(Arc::new(MongoDriver::new()))
    }

    /// Connection manager backed by any store driver
    pub fn connection_manager_with(&self, driver: Arc<dyn StoreDriver>) -> ConnectionManager {
        ConnectionManager::new(driver, self.config.connection.clone())
            .with_operation_timeout(self.config.operation_timeout())
    }

    fn formatter(&self) -> Formatter {
        Formatter::new(
            self.config.display.color_output,
            self.config.display.show_timing,
        )
    }

    /// Handle subcommands that do not touch a store
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(shell, &mut io::stdout())?;
                Ok(true)
            }
            Commands::Config {
                show,
                validate,
                list_datasources,
            } => {
                self.handle_config_command(*show, *validate, *list_datasources)?;
                Ok(true)
            }
            Commands::Migrate { .. } | Commands::Inventory { .. } | Commands::Verify { .. } => {
                Ok(false)
            }
        }
    }

    /// Run migrate, inventory or verify against the stores
    ///
    /// # Arguments
    /// * `manager` - Opens the connections the command needs
    ///
    /// # Returns
    /// * `Result<RunStatus>` - Outcome, or the fatal error that ended the command
    pub async fn execute(&self, manager: ConnectionManager) -> Result<RunStatus> {
        self.config.validate()?;

        match &self.args.command {
            Commands::Migrate { source, target, .. } => {
                self.run_migrate(manager, source, target).await
            }
            Commands::Inventory { source, target } => {
                self.run_inventory(manager, source, target).await
            }
            Commands::Verify { collection, target } => {
                self.run_verify(manager, collection, target).await
            }
            _ => Ok(RunStatus::Success),
        }
    }

    async fn run_migrate(
        &self,
        manager: ConnectionManager,
        source: &SourceArgs,
        target: &TargetArgs,
    ) -> Result<RunStatus> {
        let source = require_endpoint("source", &source.endpoint(), &self.config.connection)?;
        let target = require_endpoint("target", &target.endpoint(), &self.config.connection)?;

        if !self.args.quiet {
            println!("Source: {source}");
            println!("Target: {target}");
        }

        let summary = BulkCopier::new(manager)
            .with_progress(self.config.migration.show_progress)
            .with_quiet(self.args.quiet)
            .migrate(&source, &target)
            .await?;

        println!("{}", self.formatter().format_run(&summary));

        Ok(if summary.is_success() {
            RunStatus::Success
        } else {
            RunStatus::Incomplete
        })
    }

    async fn run_inventory(
        &self,
        manager: ConnectionManager,
        source: &SourceArgs,
        target: &TargetArgs,
    ) -> Result<RunStatus> {
        // Resolution failures are per endpoint, like connection failures
        let endpoints: Vec<_> = [("source", source.endpoint()), ("target", target.endpoint())]
            .into_iter()
            .filter_map(|(role, args)| {
                resolve_endpoint(role, &args, &self.config.connection)
                    .transpose()
                    .map(|descriptor| (role.to_string(), descriptor))
            })
            .collect();
        if endpoints.is_empty() {
            return Err(ConfigError::MissingField(
                "endpoint (pass --source-uri, --target-uri or a datasource)".to_string(),
            )
            .into());
        }

        let reports = InventoryReporter::new(manager)
            .with_system_databases(self.config.inventory.include_system_databases)
            .inspect_all(endpoints)
            .await;

        let formatter = self.formatter();
        for report in &reports {
            println!("{}", formatter.format_inventory(report));
        }

        Ok(if reports.iter().all(|r| r.is_success()) {
            RunStatus::Success
        } else {
            RunStatus::Incomplete
        })
    }

    async fn run_verify(
        &self,
        manager: ConnectionManager,
        collection: &str,
        target: &TargetArgs,
    ) -> Result<RunStatus> {
        let target = require_endpoint("target", &target.endpoint(), &self.config.connection)?;
        let result = SpotCheckVerifier::new(manager)
            .verify(&target, collection)
            .await?;

        println!("{}", self.formatter().format_verification(&result)?);

        Ok(match result {
            VerificationResult::Found { .. } => RunStatus::Success,
            VerificationResult::NotFound { .. } => RunStatus::Incomplete,
        })
    }

    /// Show version information
    fn show_version(&self) {
        println!("docshift version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    fn handle_config_command(&self, show: bool, validate: bool, list: bool) -> Result<()> {
        if list {
            for name in self.config.connection.list_datasources() {
                println!("{name}");
            }
            return Ok(());
        }

        if validate {
            self.validate_config_file()?;
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) -> Result<()> {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return Ok(());
        }

        let config = Config::load_from_file(Some(&path))?;
        config.validate()?;
        println!("✅ Configuration is valid");
        Ok(())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }
}
