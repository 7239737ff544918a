use chrono::{DateTime, Utc};
use clap::Parser;
use repricer::cli::commands::{Cli, Commands};
use repricer::config::Settings;
use repricer::domain::entities::sku::SkuRecord;
use repricer::domain::values::alert::AlertKind;
use repricer::domain::values::execution::ExecutionMode;
use repricer::domain::values::floor::FloorRecord;
use repricer::domain::values::guardrail::GuardrailProfile;
use repricer::infrastructure::sqlite::audit_repo::{AlertFilter, DecisionFilter, RunFilter};
use repricer::Repricer;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Commands::Reprice { dry_run: true, .. } = cli.command {
        settings.scheduler.execution_mode = ExecutionMode::DryRun;
    }

    let repricer = match Repricer::new(settings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error initializing repricer: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_command(repricer, cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_command(repricer: Repricer, cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Commands::Serve => {
            let handle = repricer.start_scheduler()?;
            let queued = handle.trigger_fallback().await?;
            info!(queued, "initial fallback sweep");
            tokio::signal::ctrl_c().await?;
            info!("interrupt received, draining in-flight work");
            handle.shutdown().await?;
        }
        Commands::Reprice {
            marketplace, skus, ..
        } => {
            let runs = repricer.reprice(marketplace.as_deref(), skus).await?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
        Commands::Evaluate { marketplace, sku } => {
            let decision = repricer.evaluate(&marketplace, &sku).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::SkuUpsert { json } => {
            let record: SkuRecord = serde_json::from_str(&json)?;
            repricer.upsert_sku(&record)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::FloorSet {
            marketplace,
            sku,
            floor_price,
            min_business_price,
            as_of,
        } => {
            let floor = FloorRecord {
                floor_price: floor_price.parse::<Decimal>()?,
                min_business_price: min_business_price.map(|p| p.parse::<Decimal>()).transpose()?,
                as_of: parse_date(as_of.as_deref())?.unwrap_or_else(Utc::now),
            };
            repricer.set_floor(&marketplace, &sku, &floor)?;
            println!("{}", serde_json::to_string_pretty(&floor)?);
        }
        Commands::ProfileShow { all } => {
            if all {
                println!("{}", serde_json::to_string_pretty(&repricer.list_profiles()?)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&*repricer.active_profile())?);
            }
        }
        Commands::ProfileSet { json, activate } => {
            let profile: GuardrailProfile = serde_json::from_str(&json)?;
            let active = repricer.save_profile(profile, activate)?;
            println!("{}", serde_json::to_string_pretty(&*active)?);
        }
        Commands::Runs { marketplace, limit } => {
            let runs = repricer.runs(&RunFilter {
                marketplace,
                limit: Some(limit),
                ..Default::default()
            })?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
        Commands::Decisions {
            run,
            marketplace,
            sku,
            limit,
        } => {
            let decisions = repricer.decisions(&DecisionFilter {
                run_id: run,
                marketplace,
                sku,
                limit: Some(limit),
            })?;
            println!("{}", serde_json::to_string_pretty(&decisions)?);
        }
        Commands::Alerts { kind, limit } => {
            let kind = kind
                .map(|k| k.parse::<AlertKind>())
                .transpose()
                .map_err(|e: String| e)?;
            let alerts = repricer.alerts(&AlertFilter {
                kind,
                limit: Some(limit),
            })?;
            println!("{}", serde_json::to_string_pretty(&alerts)?);
        }
    }
    Ok(())
}

fn parse_date(s: Option<&str>) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error>> {
    match s {
        Some(raw) => {
            let dt = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                format!("Invalid date '{raw}': {e}. Use ISO-8601 format (e.g. 2026-01-15T00:00:00Z)")
            })?;
            Ok(Some(dt.with_timezone(&Utc)))
        }
        None => Ok(None),
    }
}
