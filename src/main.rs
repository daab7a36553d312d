use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pentrail::{
    config::Config,
    logging::{self, LoggingHandle},
    module::{build_modules, ModuleContext, ModuleKind},
    output::{print_report, OutputFormat},
    resolve::{HostResolver, StaticResolver, SystemResolver},
    CommandNotifier, FileReportRenderer, HttpScopeProvider, PortRange, Scan, ScanJob, ScanPipeline,
    ScheduleReport, Scheduler, ScopeProvider, Severity, Target, TcpConnectProbe,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const TARGET_FAILED: u8 = 2;
    pub const CRITICAL_VULN: u8 = 3;
    pub const HIGH_VULN: u8 = 4;
    pub const MEDIUM_VULN: u8 = 5;
    pub const LOW_VULN: u8 = 6;
}

#[derive(Parser)]
#[command(name = "pentrail")]
#[command(
    author,
    version,
    about = "Run vulnerability assessments against many targets concurrently"
)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Less log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess one or more targets
    Scan {
        /// URLs, hostnames or IP addresses
        targets: Vec<String>,

        /// Also scan every domain the configured scope provider authorizes
        #[arg(long)]
        from_scope: bool,

        /// Module to run, in order (repeatable). Defaults to the configured list
        #[arg(short, long = "module")]
        modules: Vec<ModuleKind>,

        /// Label recorded on every scan
        #[arg(long, default_value = "assessment")]
        scan_type: String,

        /// Port range for the port-scan module, e.g. 1-1024 or 443
        #[arg(short, long)]
        ports: Option<PortRange>,

        /// Maximum simultaneous connection attempts per target
        #[arg(long)]
        max_threads: Option<usize>,

        /// Maximum number of targets scanned at once
        #[arg(long)]
        max_targets: Option<usize>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Directory for report files and external tool output
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Do not write report files
        #[arg(long)]
        no_reports: bool,

        /// Mail the reports of each target to this address
        #[arg(long)]
        notify: Option<String>,

        /// Exit with error if findings at or above this severity are recorded
        #[arg(long, value_enum)]
        fail_on: Option<FailLevel>,

        /// Resolve a host to a fixed address, e.g. app.local=10.0.0.5 (repeatable)
        #[arg(long = "resolve", value_parser = StaticResolver::parse_entry)]
        resolve: Vec<(String, std::net::IpAddr)>,
    },

    /// List available assessment modules
    ListModules,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn severity(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Scan {
            targets,
            from_scope,
            modules,
            scan_type,
            ports,
            max_threads,
            max_targets,
            format,
            report_dir,
            no_reports,
            notify,
            fail_on,
            resolve,
        } => {
            let verbosity = verbosity(cli.verbose, cli.quiet);
            let logging = logging::init(&config.logging, verbosity)?;

            let options = ScanOptions {
                targets,
                from_scope,
                modules,
                scan_type,
                ports,
                max_threads,
                max_targets,
                format: OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?,
                report_dir,
                no_reports,
                notify,
                fail_on,
                resolve,
            };
            let code = run_scan(config, options, &logging).await;
            logging.flush();
            code
        }
        Commands::ListModules => {
            list_modules(&config);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path, cli.config.as_deref())?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Net log level shift from repeated `-v` and `-q` flags.
fn verbosity(verbose: u8, quiet: u8) -> i8 {
    let verbose = i8::try_from(verbose).unwrap_or(i8::MAX);
    let quiet = i8::try_from(quiet).unwrap_or(i8::MAX);
    verbose - quiet
}

struct ScanOptions {
    targets: Vec<String>,
    from_scope: bool,
    modules: Vec<ModuleKind>,
    scan_type: String,
    ports: Option<PortRange>,
    max_threads: Option<usize>,
    max_targets: Option<usize>,
    format: OutputFormat,
    report_dir: Option<PathBuf>,
    no_reports: bool,
    notify: Option<String>,
    fail_on: Option<FailLevel>,
    resolve: Vec<(String, std::net::IpAddr)>,
}

async fn run_scan(mut config: Config, options: ScanOptions, logging: &LoggingHandle) -> Result<u8> {
    let is_interactive = options.format == OutputFormat::Table;

    if let Some(max_threads) = options.max_threads {
        config.scan.max_threads = max_threads;
    }
    if let Some(report_dir) = options.report_dir {
        config.report_dir = report_dir;
    }
    let max_targets = options
        .max_targets
        .unwrap_or(config.scheduler.max_concurrent_targets);
    let port_range = match options.ports {
        Some(range) => range,
        None => PortRange::new(config.port_range[0], config.port_range[1])
            .context("Invalid port_range in config")?,
    };

    let targets = collect_targets(&config, options.targets, options.from_scope).await?;
    if targets.is_empty() {
        anyhow::bail!("No targets to scan. Pass targets or use --from-scope");
    }

    let resolver: Arc<dyn HostResolver> = if options.resolve.is_empty() {
        Arc::new(SystemResolver)
    } else {
        let resolver = options
            .resolve
            .into_iter()
            .fold(StaticResolver::new(), |r, (host, ip)| r.with_entry(host, ip));
        Arc::new(resolver.with_fallback(Arc::new(SystemResolver)))
    };
    let context = ModuleContext {
        resolver,
        probe: Arc::new(TcpConnectProbe),
        port_range,
        report_dir: config.report_dir.clone(),
    };
    let kinds = if options.modules.is_empty() {
        config.default_modules.clone()
    } else {
        options.modules
    };
    let modules = build_modules(&kinds, &context);

    info!(
        targets = targets.len(),
        modules = %kinds.iter().map(ModuleKind::as_str).collect::<Vec<_>>().join(","),
        ports = %port_range,
        "starting run"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling running scans");
            on_interrupt.cancel();
        }
    });

    let progress = if is_interactive {
        let pb = ProgressBar::new(targets.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let pipeline = Arc::new(ScanPipeline::new(logging));
    let mut scheduler = Scheduler::new(pipeline, config.scan.clone(), max_targets, logging)
        .with_cancellation(cancel);

    if !options.no_reports {
        scheduler = scheduler.with_renderer(Arc::new(FileReportRenderer::new(config.report_dir.clone())));
        let recipient = options.notify.or_else(|| config.notify.recipient.clone());
        if let Some(recipient) = recipient {
            scheduler = scheduler.with_notifier(
                Arc::new(CommandNotifier::new(config.notify.command.clone())),
                recipient,
            );
        }
    } else if options.notify.is_some() {
        warn!("--notify has no effect with --no-reports");
    }

    if let Some(pb) = &progress {
        let pb = pb.clone();
        scheduler = scheduler.with_observer(Arc::new(move |scan: &Scan| {
            pb.set_message(format!("{} {}", scan.target.raw, scan.status));
            pb.inc(1);
        }));
    }

    let jobs = targets
        .into_iter()
        .map(|target| ScanJob::new(target, options.scan_type.clone(), modules.clone()))
        .collect();
    let report = scheduler.run(jobs).await;

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "{} completed, {} failed",
            report.completed(),
            report.failed()
        ));
    }

    print_report(&report, options.format)?;

    Ok(determine_exit_code(&report, options.fail_on))
}

/// Command-line targets plus, optionally, the scope provider's, minus
/// configured exclusions.
async fn collect_targets(config: &Config, raw: Vec<String>, from_scope: bool) -> Result<Vec<Target>> {
    let mut raw = raw;

    if from_scope {
        let token = config.scope.token().with_context(|| {
            format!(
                "--from-scope needs an API token (set scope.api_token or {})",
                pentrail::config::SCOPE_TOKEN_ENV
            )
        })?;
        let provider = HttpScopeProvider::new(config.scope.api_url.clone(), token);
        let scoped = provider
            .fetch_authorized_targets()
            .await
            .context("Failed to fetch authorized targets")?;
        info!(count = scoped.len(), "targets from scope provider");
        raw.extend(scoped);
    }

    let mut targets = Vec::with_capacity(raw.len());
    for entry in raw {
        let target = Target::new(entry.as_str()).with_context(|| format!("Invalid target '{}'", entry))?;
        if config.exclude.should_exclude(&target.raw, &target.host) {
            info!(target = %target.raw, "excluded by config");
            continue;
        }
        targets.push(target);
    }
    Ok(targets)
}

/// Failed targets take precedence over the --fail-on threshold.
fn determine_exit_code(report: &ScheduleReport, fail_on: Option<FailLevel>) -> u8 {
    if !report.all_completed() {
        return exit_codes::TARGET_FAILED;
    }

    let (Some(fail_on), Some(highest)) = (fail_on, report.highest_severity()) else {
        return exit_codes::SUCCESS;
    };

    if highest < fail_on.severity() {
        return exit_codes::SUCCESS;
    }

    match highest {
        Severity::Critical => exit_codes::CRITICAL_VULN,
        Severity::High => exit_codes::HIGH_VULN,
        Severity::Medium => exit_codes::MEDIUM_VULN,
        Severity::Low => exit_codes::LOW_VULN,
    }
}

fn list_modules(config: &Config) {
    println!("Available modules:");
    println!();

    let modules = build_modules(ModuleKind::all(), &ModuleContext::default());
    for (kind, module) in ModuleKind::all().iter().zip(&modules) {
        let default = if config.default_modules.contains(kind) {
            " [default]"
        } else {
            ""
        };
        println!("  {:<22} {}{}", kind.as_str(), module.name(), default);
        println!("  {:<22} {}", "", module.description());
        println!();
    }
}

fn handle_config(init: bool, show_path: bool, explicit: Option<&std::path::Path>) -> Result<()> {
    let config_path = explicit.map(PathBuf::from).unwrap_or_else(Config::config_path);

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save_to(&config_path)?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'pentrail config --init' to create one.");
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentrail::{FindingDraft, ScanConfiguration, ScanId, TargetReport};

    #[test]
    fn test_verbosity_saturates() {
        assert_eq!(verbosity(0, 0), 0);
        assert_eq!(verbosity(2, 1), 1);
        assert_eq!(verbosity(200, 0), i8::MAX);
        assert_eq!(verbosity(0, 255), -i8::MAX);
        assert_eq!(verbosity(255, 255), 0);
    }

    fn report(severity: Severity, failed: bool) -> ScheduleReport {
        let target = Target::new("example.com").unwrap();
        let mut scan = Scan::new(ScanId(1), target.clone(), "network", ScanConfiguration::default());
        scan.record(FindingDraft::new("Finding", "test", severity));
        if failed {
            scan.fail(
                target,
                pentrail::ScanFailure {
                    module: None,
                    kind: pentrail::FailureKind::ModuleFailure,
                    message: "boom".to_string(),
                },
            );
        } else {
            scan.complete(target);
        }

        let mut report = ScheduleReport::default();
        report.targets.insert(
            "example.com".to_string(),
            TargetReport {
                scan,
                artifacts: Vec::new(),
                delivery_errors: Vec::new(),
            },
        );
        report
    }

    #[test]
    fn test_exit_code_thresholds() {
        let high = report(Severity::High, false);
        assert_eq!(determine_exit_code(&high, None), exit_codes::SUCCESS);
        assert_eq!(determine_exit_code(&high, Some(FailLevel::Critical)), exit_codes::SUCCESS);
        assert_eq!(determine_exit_code(&high, Some(FailLevel::Medium)), exit_codes::HIGH_VULN);
        assert_eq!(
            determine_exit_code(&report(Severity::High, true), Some(FailLevel::Low)),
            exit_codes::TARGET_FAILED
        );
    }
}
