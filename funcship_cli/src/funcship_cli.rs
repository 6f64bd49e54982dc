// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;

use funcship_api::invocation::InvocationType;
use funcship_project::config::{self, ProjectConfig};
use funcship_project::descriptor::DescriptorOverrides;
use funcship_project::project::{Project, ProjectSettings};

#[derive(Debug, Clone, clap::Args)]
struct CommonOptions {
    /// Qualifier example: dev|prod|latest
    #[arg(long)]
    qualifier: Option<String>,
    /// Region override
    #[arg(long)]
    region: Option<String>,
    /// Included virtual environment
    #[arg(long)]
    venv: Option<String>,
    /// Comma-separated library folders to include
    #[arg(long, value_delimiter = ',')]
    libs: Vec<String>,
    /// Show debugging information
    #[arg(long, overrides_with = "no_debug")]
    debug: bool,
    /// Negate a --debug given earlier on the command line
    #[arg(long)]
    no_debug: bool,
    /// Dry run
    #[arg(long, overrides_with = "no_dry")]
    dry: bool,
    /// Negate a --dry given earlier on the command line
    #[arg(long)]
    no_dry: bool,
    /// Change default credential profile
    #[arg(long)]
    profile: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Display the funcship version
    Version,
    /// Deploy functions found under a project path
    Deploy {
        path: String,
        func: Vec<String>,
        #[command(flatten)]
        common: CommonOptions,
    },
    /// Invoke functions found under a project path
    Invoke {
        path: String,
        func: Vec<String>,
        /// Invocation payload
        #[arg(long)]
        payload: Option<String>,
        /// Invocation type: sync|async|dry
        #[arg(long)]
        invocation: Option<String>,
        /// Also deploy before invoking
        #[arg(long = "d", overrides_with = "no_deploy_first")]
        deploy_first: bool,
        /// Negate a --d given earlier on the command line
        #[arg(long = "no-d")]
        no_deploy_first: bool,
        #[command(flatten)]
        common: CommonOptions,
    },
    /// Create a new function
    New {
        path: String,
        func: String,
        /// Function handler name
        #[arg(long)]
        handler: Option<String>,
        /// Execution role
        #[arg(long)]
        role: Option<String>,
        /// Memory size in MB
        #[arg(long)]
        memory: Option<u32>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u32>,
        #[arg(long)]
        description: Option<String>,
        /// Runtime identifier
        #[arg(long)]
        runtime: Option<String>,
        /// Override the remote function name
        #[arg(long)]
        name: Option<String>,
        /// Also deploy after creating
        #[arg(long = "d", overrides_with = "no_deploy_first")]
        deploy_first: bool,
        /// Negate a --d given earlier on the command line
        #[arg(long = "no-d")]
        no_deploy_first: bool,
        #[command(flatten)]
        common: CommonOptions,
    },
}

#[derive(Debug, clap::Parser)]
#[command(long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Write a commented configuration template to the given path
    #[arg(short, long, default_value_t = String::from(""))]
    template: String,
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn test_later_negation_wins() {
        let args = parse(&["funcship_cli", "deploy", ".", "--dry", "--no-dry"]);
        match args.command {
            Some(Commands::Deploy { common, .. }) => assert!(!common.dry),
            other => panic!("unexpected command: {:?}", other),
        }
        let args = parse(&["funcship_cli", "invoke", ".", "billing", "--d", "--no-d"]);
        match args.command {
            Some(Commands::Invoke { deploy_first, .. }) => assert!(!deploy_first),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_later_enable_wins() {
        let args = parse(&["funcship_cli", "deploy", ".", "--no-debug", "--debug"]);
        match args.command {
            Some(Commands::Deploy { common, .. }) => assert!(common.debug),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

fn init_logging(debug: bool) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if debug { "debug" } else { "info" }),
    )
    .init();
}

async fn open_project(
    path: &str,
    common: &CommonOptions,
    payload: Option<String>,
    invocation: Option<String>,
) -> anyhow::Result<Project> {
    let root = std::path::PathBuf::from(path);
    let config = ProjectConfig::load(&root)?.unwrap_or_default();
    let region = common.region.clone().or_else(|| config.region.clone());
    let profile = common.profile.clone().or_else(|| config.profile.clone());
    let registry = funcship_api::aws_impl::AwsRegistryClient::new(region, profile).await;

    let mut settings = ProjectSettings::new(root);
    settings.qualifier = common.qualifier.clone();
    settings.virtual_env = common.venv.clone().map(Into::into);
    settings.libraries = common.libs.iter().map(Into::into).collect();
    settings.dry_run = common.dry;
    settings.payload = payload;
    if let Some(invocation) = invocation {
        settings.invocation_type = InvocationType::from_string(&invocation)?;
    }
    Ok(Project::new(settings, config, Box::new(registry)))
}

/// Deploy either the named functions (each handled independently) or
/// every unit under the project path. Returns the failing unit names.
async fn run_deploy(project: &Project, func: &[String], cancel: &CancellationToken) -> anyhow::Result<Vec<String>> {
    let overrides = DescriptorOverrides::default();
    let batch = if func.is_empty() {
        project.deploy_all(&overrides, cancel).await?
    } else {
        project.deploy_named(func, &overrides, cancel).await
    };
    for (name, result) in &batch.results {
        match result {
            Ok(outcome) => {
                match (&outcome.qualifier, &outcome.published_version) {
                    (Some(qualifier), Some(version)) => println!(
                        "{}: {} ({} bytes, fingerprint {}), {} -> version {}",
                        name, outcome.action, outcome.archive_size, outcome.fingerprint, qualifier, version
                    ),
                    _ => println!(
                        "{}: {} ({} bytes, fingerprint {})",
                        name, outcome.action, outcome.archive_size, outcome.fingerprint
                    ),
                };
            }
            Err(err) => println!("{}: failed: {}", name, err),
        }
    }
    Ok(batch.failed_names())
}

async fn run_invoke(project: &Project, func: &[String], cancel: &CancellationToken) -> anyhow::Result<Vec<String>> {
    let batch = if func.is_empty() {
        project.invoke_all(cancel).await?
    } else {
        project.invoke_named(func, cancel).await
    };
    let mut failed = batch.failed_names();
    for (name, result) in &batch.results {
        match result {
            Ok(outcome) => {
                println!("{}: status {}", name, outcome.status_code);
                if !outcome.payload.is_empty() {
                    println!("{}", String::from_utf8_lossy(&outcome.payload));
                }
                // The call succeeded but the function itself failed.
                if let Some(function_error) = &outcome.function_error {
                    println!("{}: function error: {}", name, function_error);
                    failed.push(name.clone());
                }
            }
            Err(err) => println!("{}: failed: {}", name, err),
        }
    }
    failed.sort();
    failed.dedup();
    Ok(failed)
}

fn finish(failed: Vec<String>) {
    if !failed.is_empty() {
        eprintln!("failed units: {}", failed.join(", "));
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let debug = match &args.command {
        Some(Commands::Deploy { common, .. })
        | Some(Commands::Invoke { common, .. })
        | Some(Commands::New { common, .. }) => common.debug,
        _ => false,
    };
    init_logging(debug);

    if !args.template.is_empty() {
        funcship_api::util::create_template(&args.template, config::default_conf().as_str())?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, cancelling remaining units");
                cancel.cancel();
            }
        });
    }

    match args.command {
        None => {
            Args::command().print_help()?;
        }
        Some(Commands::Version) => {
            println!("funcship: {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Deploy { path, func, common }) => {
            let project = open_project(&path, &common, None, None).await?;
            let failed = run_deploy(&project, &func, &cancel).await?;
            finish(failed);
        }
        Some(Commands::Invoke {
            path,
            func,
            payload,
            invocation,
            deploy_first,
            no_deploy_first: _,
            common,
        }) => {
            let project = open_project(&path, &common, payload, invocation).await?;
            let mut failed = Vec::new();
            if deploy_first {
                failed.extend(run_deploy(&project, &func, &cancel).await?);
            }
            failed.extend(run_invoke(&project, &func, &cancel).await?);
            failed.sort();
            failed.dedup();
            finish(failed);
        }
        Some(Commands::New {
            path,
            func,
            handler,
            role,
            memory,
            timeout,
            description,
            runtime,
            name,
            deploy_first,
            no_deploy_first: _,
            common,
        }) => {
            let project = open_project(&path, &common, None, None).await?;
            let overrides = DescriptorOverrides {
                name,
                handler,
                role,
                runtime,
                memory_size: memory,
                timeout,
                description,
            };
            match project.new_function(&func, &overrides).await {
                Ok(outcome) => {
                    println!("{}: {} ({} bytes, fingerprint {})", func, outcome.action, outcome.archive_size, outcome.fingerprint);
                    if deploy_first {
                        let failed = run_deploy(&project, &[func.clone()], &cancel).await?;
                        finish(failed);
                    }
                }
                Err(err) => {
                    println!("{}: failed: {}", func, err);
                    finish(vec![func]);
                }
            }
        }
    }
    Ok(())
}
