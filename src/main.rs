//! bye-watch deploy - 构建并部署 bye-watch
//!
//! Usage:
//! - Full pipeline: `bye-watch-deploy run`
//! - Deploy an existing build: `bye-watch-deploy deploy`
//! - Show what would run: `bye-watch-deploy plan`
//! - Structural checks: `bye-watch-deploy check`
//!
//! Target host secrets come from DEPLOY_HOST / DEPLOY_USER / DEPLOY_PASSWORD / DEPLOY_PATH.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bye_watch_deploy::config::env::constants::{STEP_TIMEOUT_SECS, VERSION};
use bye_watch_deploy::domain::{LogLine, PipelineStatus, StepKind};
use bye_watch_deploy::infra::{Connector, DryRunConnector, SshConnector};
use bye_watch_deploy::services::checks::{self, Finding};
use bye_watch_deploy::services::pipeline::FailurePolicy;
use bye_watch_deploy::{Pipeline, PipelineContext, PipelineOptions, RemoteSettings, Workflow};

#[derive(Parser)]
#[command(name = "bye-watch-deploy", version = VERSION)]
#[command(about = "Build bye-watch and deploy it to the target host", long_about = None)]
struct Cli {
    /// Repository working directory
    #[arg(long, global = true, default_value = ".")]
    work_dir: PathBuf,

    /// Workflow definition (TOML); omitted keys use the built-in bye-watch pipeline
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: checkout, toolchain, dependencies, build, deploy
    Run(RunArgs),
    /// Run only the deploy step against an existing build
    Deploy(RunArgs),
    /// Print the steps and remote commands without executing anything
    Plan,
    /// Check the workflow and remote configuration for structural problems
    Check {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Log commands instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Stop at the first failing remote command
    #[arg(long)]
    fail_fast: bool,

    /// Skip a step (checkout, toolchain, dependencies, build, deploy)
    #[arg(long = "skip", value_parser = parse_step)]
    skip: Vec<StepKind>,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Timeout for each local command, in seconds
    #[arg(long, default_value_t = STEP_TIMEOUT_SECS)]
    timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_step(s: &str) -> Result<StepKind, String> {
    StepKind::from_str(s).ok_or_else(|| format!("unknown step: {}", s))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bye_watch_deploy=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let workflow = Workflow::load(cli.workflow.as_deref())?;
    let settings = RemoteSettings::from_env();

    match cli.command {
        Commands::Run(args) => run(workflow, settings, &cli.work_dir, args, &[]).await,
        Commands::Deploy(args) => {
            let local_steps: Vec<StepKind> =
                StepKind::ALL.into_iter().filter(|s| s.is_local()).collect();
            run(workflow, settings, &cli.work_dir, args, &local_steps).await
        }
        Commands::Plan => {
            print_plan(&workflow, &settings);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { format } => check(&workflow, &settings, format),
    }
}

async fn run(
    workflow: Workflow,
    settings: RemoteSettings,
    work_dir: &Path,
    args: RunArgs,
    extra_skip: &[StepKind],
) -> Result<ExitCode> {
    let mut skip: std::collections::HashSet<StepKind> = args.skip.into_iter().collect();
    skip.extend(extra_skip.iter().copied());

    for finding in checks::check_workflow(&workflow) {
        tracing::warn!(code = finding.code, severity = finding.severity.as_str(), "{}", finding.message);
    }

    let deploying = !skip.contains(&StepKind::Deploy);
    let (connector, remote_dir): (Box<dyn Connector>, String) = if args.dry_run {
        let dir = settings
            .path
            .clone()
            .unwrap_or_else(|| "$DEPLOY_PATH".to_string());
        (Box::new(DryRunConnector::new()), dir)
    } else if deploying {
        let target = settings.require()?;
        let dir = target.path.clone();
        (Box::new(SshConnector::new(target)), dir)
    } else {
        (Box::new(DryRunConnector::new()), settings.path.clone().unwrap_or_default())
    };

    let options = PipelineOptions {
        work_dir: work_dir.to_path_buf(),
        skip,
        failure_policy: if args.fail_fast {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Continue
        },
        step_timeout: Duration::from_secs(args.timeout_secs),
    };

    let pipeline = Pipeline::new(workflow, options, remote_dir);
    let ctx = PipelineContext::new(uuid::Uuid::new_v4().to_string(), args.dry_run);

    let printer = tokio::spawn(print_logs(ctx.subscribe()));

    let cancel = ctx.cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling pipeline");
            cancel.cancel();
        }
    });

    let result = pipeline.run(&ctx, connector.as_ref()).await;

    // 关闭日志通道，等待输出完毕
    drop(ctx);
    let _ = printer.await;

    for stage in &result.stages {
        println!(
            "{:<22} {:<8} {}",
            stage.display_name,
            format!("{:?}", stage.status).to_lowercase(),
            stage.message.as_deref().unwrap_or("")
        );
    }

    if let Some(path) = args.report {
        let json = serde_json::to_string_pretty(&result)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write report {}", path.display()))?;
        tracing::info!(path = %path.display(), "Run report written");
    }

    Ok(if result.status == PipelineStatus::Success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// 打印步骤输出
async fn print_logs(mut rx: broadcast::Receiver<LogLine>) {
    loop {
        match rx.recv().await {
            Ok(line) if line.stream == "stderr" => eprintln!("{}", line.content),
            Ok(line) => println!("{}", line.content),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                eprintln!("... {} log lines dropped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_plan(workflow: &Workflow, settings: &RemoteSettings) {
    let remote_dir = settings.path.as_deref().unwrap_or("$DEPLOY_PATH");
    let pipeline = Pipeline::new(workflow.clone(), PipelineOptions::default(), remote_dir);

    println!("Branch: {}", workflow.branch);
    for (i, step) in StepKind::ALL.iter().enumerate() {
        match step {
            StepKind::Checkout => println!(
                "{}. {}: git fetch origin {b} && git checkout {b} && git pull --ff-only origin {b}",
                i + 1,
                step,
                b = workflow.branch
            ),
            StepKind::Deploy => {
                println!(
                    "{}. {} ({}@{}:{}):",
                    i + 1,
                    step,
                    settings.user.as_deref().unwrap_or("$DEPLOY_USER"),
                    settings.host.as_deref().unwrap_or("$DEPLOY_HOST"),
                    settings.port
                );
                for command in pipeline.remote_commands() {
                    println!("     {}", command.describe());
                }
            }
            local => println!(
                "{}. {}: {}",
                i + 1,
                local,
                pipeline.local_command(*local).unwrap_or_default().join(" ")
            ),
        }
    }
}

fn check(workflow: &Workflow, settings: &RemoteSettings, format: OutputFormat) -> Result<ExitCode> {
    let mut findings: Vec<Finding> = checks::check_workflow(workflow);
    findings.extend(checks::check_remote(settings));

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&findings)?),
        OutputFormat::Text => {
            if findings.is_empty() {
                println!("No problems found");
            }
            for finding in &findings {
                println!("{}[{}]: {}", finding.severity.as_str(), finding.code, finding.message);
            }
        }
    }

    Ok(if checks::has_errors(&findings) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
