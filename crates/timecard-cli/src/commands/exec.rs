use clap::Subcommand;
use timecard_core::{Config, Database, ReservationExecutor};

#[derive(Subcommand)]
pub enum ExecAction {
    /// Scan and execute due reservations once, then exit
    Run {
        #[arg(long)]
        json: bool,
    },
    /// Run the executor on a fixed cadence (cron substitute)
    Watch {
        /// Override the configured tick interval, in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
}

pub fn run(action: ExecAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let executor = build_executor(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;

    match action {
        ExecAction::Run { json } => {
            let report = runtime.block_on(executor.run_once())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} executed, {} failed, {} total",
                    report.executed_count(),
                    report.failed_count(),
                    report.items.len()
                );
            }
        }
        ExecAction::Watch { interval } => {
            let secs = interval.unwrap_or(config.executor.tick_interval_secs).max(1);
            runtime.block_on(async move {
                let mut ticker =
                    tokio::time::interval(std::time::Duration::from_secs(secs));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    // One failed run must not kill the loop; the next tick
                    // retries anything still reserved.
                    match executor.run_once().await {
                        Ok(report) if !report.items.is_empty() => {
                            println!(
                                "{} executed, {} failed",
                                report.executed_count(),
                                report.failed_count()
                            );
                        }
                        Ok(_) => {}
                        Err(e) => eprintln!("executor tick failed: {e}"),
                    }
                }
            })
        }
    }
    Ok(())
}

fn build_executor(config: &Config) -> Result<ReservationExecutor, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    Ok(ReservationExecutor::new(db)
        .with_lookahead(chrono::Duration::seconds(config.executor.lookahead_secs))
        .with_skew_wait_cap(chrono::Duration::seconds(config.executor.skew_wait_cap_secs)))
}
