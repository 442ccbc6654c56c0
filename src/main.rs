use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use invoicerelay::{config, Engine};
use invoicerelay_core_types::{AutomationTask, SessionId};
use record_locator::variants;

#[derive(Parser)]
#[command(
    name = "invoicerelay",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ", built ", env!("BUILD_DATE"), ")"),
    about = "Replicates invoice fields into a project-management web app by driving a real browser"
)]
struct Cli {
    /// Configuration file (defaults to invoicerelay.yml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose internal logging (equivalent to RUST_LOG=debug).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the record-update workflow for one invoice.
    Run(RunArgs),
    /// Print the search variants derived from a reference code.
    Variants {
        /// Reference code, e.g. KIWIWASTE-006.
        code: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// External order/PO identifier used to locate the record.
    #[arg(long)]
    reference_code: String,

    /// Invoice identifier appended to the record title.
    #[arg(long)]
    invoice_id: String,

    /// Invoice amount, written into the new line item.
    #[arg(long)]
    amount: Option<String>,

    /// File to attach; repeatable.
    #[arg(long = "attach", value_name = "PATH")]
    attachments: Vec<PathBuf>,

    /// Correlation id for the log stream (random when omitted).
    #[arg(long)]
    session_id: Option<String>,

    /// Override the configured home URL.
    #[arg(long)]
    target_url: Option<String>,

    /// Run the browser without a visible window.
    #[arg(long)]
    headless: bool,

    /// Close the browser when the run ends instead of leaving it open
    /// for review.
    #[arg(long)]
    close_when_done: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Variants { code } => {
            let cfg = config::load(cli.config.as_deref())?;
            for variant in variants(&code, &cfg.mapping_rules) {
                println!("{variant}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => run(cli.config.as_deref(), args).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

async fn run(config_path: Option<&std::path::Path>, args: RunArgs) -> Result<ExitCode> {
    let mut cfg = config::load(config_path)?;
    if let Some(url) = args.target_url {
        cfg.target_url = url;
    }
    if args.headless {
        cfg.headless = true;
    }
    config::validate(&cfg)?;

    let engine = Engine::new(cfg);

    let session_id = args.session_id.map(SessionId).unwrap_or_default();
    let task = AutomationTask::new(args.reference_code, args.invoice_id)
        .with_attachments(args.attachments)
        .with_session_id(session_id.clone());
    let task = match args.amount {
        Some(amount) => task.with_amount(amount),
        None => task,
    };

    // Mirror the session's progress stream onto stdout.
    let mut events = engine.subscribe(&session_id);
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!(
                "[{}] {:>7}  {}",
                event.timestamp.format("%H:%M:%S"),
                event.level.as_str(),
                event.message
            );
        }
    });

    let submission = engine
        .submit(task)
        .await
        .context("could not start the automation run")?;
    let report = &submission.report;

    println!();
    for (step, done) in report.ledger.entries() {
        println!("  {} {}", if done { "✓" } else { "✗" }, step.name());
    }
    if let Some(err) = &report.error {
        println!("\n  stopped: {err}");
    }
    println!(
        "\n  result: {}",
        if report.success { "success" } else { "failed" }
    );

    if args.close_when_done {
        engine.release(submission.handle).await;
    } else {
        println!("\nbrowser left open for review; close the window or press Ctrl-C to exit");
        tokio::signal::ctrl_c()
            .await
            .context("failed to wait for Ctrl-C")?;
        engine.shutdown().await;
    }
    printer.abort();

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
