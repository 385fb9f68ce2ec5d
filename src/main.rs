//! batch-pager demo: page through a synthetic data source in the terminal.
//!
//! Commands are read from stdin, one per line:
//!   n | next     next page
//!   p | prev     previous page
//!   g <page>     go to a page (1-based, as displayed)
//!   q | quit     exit

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use batch_pager::config::{Cli, Config};
use batch_pager::pager::{Column, FetchCommand, FetchCompletion, PaginationSession};
use batch_pager::source::synthetic::{DemoRecord, SyntheticSource};

/// Spawn a fetch command; its completion is sent back to the loop.
fn dispatch(command: Option<FetchCommand<DemoRecord>>, tx: &mpsc::Sender<FetchCompletion<DemoRecord>>) {
    if let Some(command) = command {
        let tx = tx.clone();
        tokio::spawn(async move {
            let completion = command.await;
            // The loop only goes away on quit.
            let _ = tx.send(completion).await;
        });
    }
}

fn draw(session: &PaginationSession<DemoRecord>) {
    match session.render_current() {
        Ok(table) => print!("{table}"),
        Err(e) if session.is_loading() => println!("({e})"),
        Err(e) => error!(error = %e, "Failed to render page"),
    }
    let spinner = if session.is_loading() { "  loading…" } else { "" };
    println!(
        "page {}/{}{spinner}",
        session.current_page() + 1,
        session.total_pages().max(1)
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the table on stdout stays readable.
    let filter = if cli.verbose { "batch_pager=debug" } else { "batch_pager=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("batch-pager v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    if let Some(records) = cli.records {
        config.demo.total_records = records;
    }
    if let Some(latency_ms) = cli.latency_ms {
        config.demo.fetch_latency_ms = latency_ms;
    }

    info!(
        page_size = config.pagination.page_size,
        batch_size = config.pagination.batch_size,
        max_resident_batches = config.pagination.max_resident_batches,
        sort_key = %config.pagination.sort.key,
        ascending = config.pagination.sort.ascending,
        records = config.demo.total_records,
        "Configuration loaded"
    );

    let source = Arc::new(SyntheticSource::from_config(&config.demo));
    let columns = vec![
        Column::new("Id", "id"),
        Column::new("Name", "name"),
        Column::new("Owner", "metadata.owner"),
        Column::new("Phase", "metadata.phase"),
        Column::new("Created", "created_at"),
    ];
    let mut session: PaginationSession<DemoRecord> = PaginationSession::new(&config.pagination, source, columns)?;

    let (tx, mut rx) = mpsc::channel::<FetchCompletion<DemoRecord>>(8);
    dispatch(Some(session.open()?), &tx);
    draw(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(completion) = rx.recv() => {
                match session.apply_completion(completion) {
                    Ok(next) => dispatch(next, &tx),
                    Err(e) => error!(error = %e, "Fetch failed"),
                }
                draw(&session);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut words = line.split_whitespace();
                let command = match words.next() {
                    Some("n" | "next") => session.next_page(),
                    Some("p" | "prev") => session.prev_page(),
                    Some("g") => match words.next().and_then(|w| w.parse::<usize>().ok()) {
                        Some(page) if page > 0 => session.navigate(page - 1),
                        _ => {
                            println!("usage: g <page>");
                            continue;
                        }
                    },
                    Some("q" | "quit") => break,
                    Some(other) => {
                        println!("unknown command: {other}");
                        continue;
                    }
                    None => None,
                };
                dispatch(command, &tx);
                draw(&session);
            }
        }
    }

    Ok(())
}
