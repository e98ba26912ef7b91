use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use xcresolve_core::{
    EnvFlags, ProfileMapping, Project, ProjectOptions, SigningResolver, XcodebuildRunner,
};

mod config;
mod discovery;
mod prompt;

use config::FileConfig;
use prompt::TerminalPrompter;

/// CLI for resolving Xcode projects, schemes, and code-signing profile
/// mappings from build pipelines.
#[derive(Parser, Debug)]
#[command(
    name = "xcresolve",
    version,
    about = "Resolve Xcode projects, schemes, and code-signing profile mappings",
    long_about = None
)]
struct Cli {
    /// Path to an .xcodeproj bundle
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Path to an .xcworkspace bundle
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Scheme to resolve against
    #[arg(long, global = true)]
    scheme: Option<String>,

    /// Build configuration (e.g. Debug, Release)
    #[arg(long, global = true)]
    configuration: Option<String>,

    /// Silence the toolchain's diagnostic stream
    #[arg(long, global = true)]
    suppress_stderr: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize the resolved project: name, platforms, product type.
    Info,
    /// List the available schemes, one per line.
    Schemes,
    /// List the available targets, one per line.
    Targets,
    /// List the available build configurations, one per line.
    Configurations,
    /// Print the value of one build setting.
    Settings {
        /// Setting key, e.g. PRODUCT_BUNDLE_IDENTIFIER
        key: String,
        /// Target to read from (defaults to the first listed target)
        #[arg(long)]
        target: Option<String>,
        /// Fail the invocation when the setting is absent
        #[arg(long)]
        required: bool,
    },
    /// Resolve the scheme to build, prompting when ambiguous.
    SelectScheme {
        /// Prefer schemes containing this substring
        #[arg(long)]
        prefer: Option<String>,
    },
    /// Detect and merge provisioning-profile mappings, printed as JSON.
    ProfileMapping {
        /// Distribution channel arbitrating conflicts (e.g. app-store, ad-hoc)
        #[arg(long)]
        export_method: Option<String>,
        /// JSON file with a pre-resolved bundle-id -> profile mapping
        #[arg(long)]
        primary: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn init_logging(verbose: bool) {
    let default_directives = if verbose {
        "xcresolve=debug,xcresolve_core=debug"
    } else {
        "xcresolve=info,xcresolve_core=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let file_config = match FileConfig::discover()? {
        Some((config, path)) => {
            debug!("loaded configuration from {}", path.display());
            config
        }
        None => FileConfig::default(),
    };

    let prompter = TerminalPrompter;

    // CLI flags beat the config file; discovery only runs when neither
    // names a build container.
    let mut options = ProjectOptions {
        project: cli.project.or_else(|| file_config.project.project.clone()),
        workspace: cli
            .workspace
            .or_else(|| file_config.project.workspace.clone()),
        scheme: cli.scheme.or_else(|| file_config.project.scheme.clone()),
        configuration: cli
            .configuration
            .or_else(|| file_config.project.configuration.clone()),
        suppress_stderr: cli.suppress_stderr,
    };
    if options.project_path().is_none() && options.workspace_path().is_none() {
        discovery::detect_projects(&mut options, &prompter)?;
    }

    let mut project = Project::new(options, Box::new(XcodebuildRunner::new()))?;

    match cli.command {
        Command::Info => {
            println!("name: {}", project.project_name());
            println!(
                "kind: {}",
                if project.is_workspace() {
                    "workspace"
                } else {
                    "project"
                }
            );
            let platforms: Vec<&str> = project
                .supported_platforms()?
                .iter()
                .map(|platform| platform.as_str())
                .collect();
            println!("platforms: {}", platforms.join(" "));
            if let Some(product) = project.product_type(None)? {
                println!("product type: {}", product.identifier());
            }
            if let Some(bundle_id) = project.default_app_identifier()? {
                println!("bundle identifier: {bundle_id}");
            }
        }
        Command::Schemes => {
            for scheme in project.schemes()? {
                println!("{scheme}");
            }
        }
        Command::Targets => {
            for target in project.targets()? {
                println!("{target}");
            }
        }
        Command::Configurations => {
            for configuration in project.configurations()? {
                println!("{configuration}");
            }
        }
        Command::Settings {
            key,
            target,
            required,
        } => match project.build_settings(&key, target.as_deref(), !required)? {
            Some(value) => println!("{value}"),
            None => bail!("no value for build setting {key}"),
        },
        Command::SelectScheme { prefer } => {
            let scheme =
                project.select_scheme(prefer.as_deref(), &EnvFlags::from_env(), &prompter)?;
            println!("{scheme}");
        }
        Command::ProfileMapping {
            export_method,
            primary,
        } => {
            let export_method = export_method
                .or_else(|| file_config.signing.export_method.clone())
                .unwrap_or_else(|| "app-store".to_string());

            let primary: Option<ProfileMapping> = match primary {
                Some(path) => {
                    let raw = fs::read_to_string(&path).with_context(|| {
                        format!("failed to read primary mapping {}", path.display())
                    })?;
                    Some(serde_json::from_str(&raw).with_context(|| {
                        format!("failed to parse primary mapping {}", path.display())
                    })?)
                }
                None if !file_config.signing.profiles.is_empty() => {
                    Some(file_config.signing.profiles.clone())
                }
                None => None,
            };

            let mut resolver = SigningResolver::new(&mut project);
            let merged = resolver.merged_mapping(primary.as_ref(), None, &export_method)?;
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }
    }

    Ok(())
}
