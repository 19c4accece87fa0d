//! databok - extract financial data from quarterly PDF reports.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rapport_extraktor::services::pipeline::{ProgressCallback, ProgressEvent, RetryPolicy};
use rapport_extraktor::utils::slugify;
use rapport_extraktor::{Config, Env};

#[derive(Parser, Debug)]
#[command(
    name = "databok",
    about = "Extract financial data from Nordic quarterly PDF reports into a query-ready database",
    version
)]
struct Cli {
    /// Config file path (default: databok.toml if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<String>,

    /// Database URL (overrides config file)
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,

    /// Logging level (overrides config file, e.g. "info,rapport_extraktor=debug")
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract all pending PDFs for a company
    Extract {
        /// Company name, e.g. "Vitrolife"
        company: String,
        /// Directory with PDFs (default: <base>/<slug>/pending)
        dir: Option<PathBuf>,
        /// Ignore cached periods and re-extract everything
        #[arg(long)]
        no_cache: bool,
        /// Never prompt; retry transient failures automatically
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Regenerate the extraction log (and file sync) for a company
    Report {
        /// Company name or slug
        company: Option<String>,
        /// All companies, plus the summary log
        #[arg(long)]
        all: bool,
    },
    /// Generate embeddings for sections that lack one
    Embeddings {
        /// Company name or slug
        company: String,
    },
    /// List resumable batches from the checkpoint file
    Batches,
}

/// Console logging on stderr plus, when enabled, a per-run file log in
/// the base folder. The returned guard must stay alive for the file
/// writer to flush.
fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if config.logging.file_logging
        && std::fs::create_dir_all(&config.extraction.base_folder).is_ok()
    {
        let file_name = format!(
            "extraction_run_{}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let appender =
            tracing_appender::rolling::never(&config.extraction.base_folder, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
        return Some(guard);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .init();
    None
}

/// Terminal progress bar fed by pipeline progress events
fn progress_bar(total: usize) -> ProgressCallback {
    #[derive(Default)]
    struct State {
        done: usize,
        extracting: usize,
    }

    let state = Mutex::new(State::default());
    Arc::new(move |_path, event| {
        let mut s = state.lock().expect("progress state poisoned");
        match event {
            ProgressEvent::Cached => s.done += 1,
            ProgressEvent::Done { .. } | ProgressEvent::Failed(_) => {
                s.done += 1;
                s.extracting = s.extracting.saturating_sub(1);
            }
            ProgressEvent::Extracting => s.extracting += 1,
            _ => {}
        }

        let pct = if total > 0 {
            s.done as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        let bar_width = 30;
        let filled = bar_width * s.done / total.max(1);
        let bar: String =
            "#".repeat(filled.min(bar_width)) + &".".repeat(bar_width.saturating_sub(filled));

        let mut line = format!("[{bar}] {pct:5.1}%  {}/{total}", s.done);
        if s.extracting > 0 {
            line.push_str(&format!("  ({} pagaende)", s.extracting));
        }
        eprint!("\r{line:<70}");
        let _ = std::io::stderr().flush();
    })
}

/// Interactive retry prompt for attended runs; unattended runs always retry
fn retry_policy(interactive: bool) -> RetryPolicy {
    Arc::new(move |attempt, error| {
        if !interactive {
            return true;
        }
        eprintln!("\nExtraction failed (attempt {attempt}): {error}");
        loop {
            eprint!("Retry? [Y/N]: ");
            let _ = std::io::stderr().flush();
            let mut answer = String::new();
            if std::io::stdin().read_line(&mut answer).is_err() {
                return false;
            }
            match answer.trim().to_uppercase().as_str() {
                "Y" => return true,
                "N" => return false,
                _ => eprintln!("Please answer Y or N"),
            }
        }
    })
}

async fn run_extract(
    env: &Env,
    company: String,
    dir: Option<PathBuf>,
    no_cache: bool,
    yes: bool,
) -> Result<(), anyhow::Error> {
    let slug = slugify(&company);
    let dir = dir.unwrap_or_else(|| {
        PathBuf::from(&env.config.extraction.base_folder)
            .join(&slug)
            .join(&env.config.extraction.pending_dir)
    });

    if !dir.exists() {
        anyhow::bail!("directory not found: {}", dir.display());
    }

    let mut pdf_paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdf_paths.sort();

    if pdf_paths.is_empty() {
        anyhow::bail!("no PDF files found in {}", dir.display());
    }
    println!("Found {} PDF file(s) in {}", pdf_paths.len(), dir.display());

    // SIGINT stops dispatch of new work; in-flight files finish and are
    // checkpointed before the batch returns
    let cancel = env.orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancel requested - finishing in-flight extractions");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let interactive = !yes && std::io::stdin().is_terminal();
    let on_progress = progress_bar(pdf_paths.len());
    let outcome = env
        .orchestrator
        .run_batch(
            pdf_paths,
            &company,
            !no_cache,
            Some(on_progress),
            Some(retry_policy(interactive)),
        )
        .await?;
    eprintln!();

    println!("{}", "=".repeat(50));
    println!("Ok:      {}", outcome.successes.len() + outcome.already_completed);
    if outcome.already_completed > 0 {
        println!("Resumed: {} (already in checkpoint)", outcome.already_completed);
    }
    if !outcome.failures.is_empty() {
        println!("Failed:  {}", outcome.failures.len());
        for (path, error) in &outcome.failures {
            println!(
                "   - {}: {}",
                path.file_name().unwrap_or_default().to_string_lossy(),
                error
            );
        }
    }

    let covered = env.reports.update_company_log(&slug).await?;
    println!("Extraction log covers {covered} period(s)");
    Ok(())
}

async fn run_report(env: &Env, company: Option<String>, all: bool) -> Result<(), anyhow::Error> {
    if all {
        for company in env.store.list_companies().await? {
            let periods = env.reports.update_company_log(&company.slug).await?;
            println!("{}: {} period(s)", company.name, periods);
        }
        let path = env.reports.write_summary_log().await?;
        println!("Summary log: {}", path.display());
    } else if let Some(company) = company {
        let slug = slugify(&company);
        let periods = env.reports.update_company_log(&slug).await?;
        if periods == 0 {
            anyhow::bail!("no periods in the database for '{company}'");
        }
        println!("Extraction log covers {periods} period(s)");
    } else {
        anyhow::bail!("specify a company or --all");
    }
    Ok(())
}

async fn run_embeddings(env: &Env, company: String) -> Result<(), anyhow::Error> {
    let slug = slugify(&company);
    let Some(company) = env.store.get_company_by_slug(&slug).await? else {
        anyhow::bail!("company not found: {slug}");
    };

    let service = env.embedding_service()?;
    let updated = service.backfill_company(&company.id).await?;
    println!("{updated} section(s) received embeddings");

    let stats = env.store.embedding_stats(&company.id).await?;
    println!(
        "Coverage: {}/{} sections",
        stats.with_embedding, stats.total_sections
    );
    Ok(())
}

fn run_batches(env: &Env) {
    let batches = env.checkpoints.resumable_batches();
    if batches.is_empty() {
        println!("No resumable batches.");
        return;
    }
    for b in batches {
        println!(
            "{}: {}/{} done, {} failed, {} remaining (last update {})",
            b.batch_id,
            b.completed,
            b.total,
            b.failed,
            b.remaining,
            b.last_update
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    let _log_guard = init_tracing(&config);

    let env = Env::new(config).await?;

    match cli.command {
        Command::Extract {
            company,
            dir,
            no_cache,
            yes,
        } => run_extract(&env, company, dir, no_cache, yes).await?,
        Command::Report { company, all } => run_report(&env, company, all).await?,
        Command::Embeddings { company } => run_embeddings(&env, company).await?,
        Command::Batches => run_batches(&env),
    }

    Ok(())
}
