use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "repricer", about = "Marketplace repricing scheduler and pricing engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Serve,
    /// Run one repricing cycle per marketplace and print the closed runs
    Reprice {
        /// Marketplace to reprice (default: every marketplace in the catalog)
        #[arg(long)]
        marketplace: Option<String>,
        /// Only these SKUs (requires --marketplace)
        #[arg(long, value_delimiter = ',', requires = "marketplace")]
        skus: Vec<String>,
        /// Record decisions without submitting prices
        #[arg(long)]
        dry_run: bool,
    },
    /// Compute the decision for one SKU without submitting or recording it
    Evaluate {
        marketplace: String,
        sku: String,
    },
    /// Insert or update a catalog entry
    SkuUpsert {
        /// JSON with sku, marketplace, current_price, floor_price and optional
        /// current_business_price, min_business_price, cost, holds_buy_box
        json: String,
    },
    /// Record a floor price from the floor feed
    FloorSet {
        marketplace: String,
        sku: String,
        floor_price: String,
        #[arg(long)]
        min_business_price: Option<String>,
        /// Feed timestamp (ISO-8601, default: now)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Show the active guardrail profile, or all stored profiles
    ProfileShow {
        #[arg(long)]
        all: bool,
    },
    /// Store a guardrail profile
    ProfileSet {
        /// JSON with name, max_price_change_percent, step_up_percent,
        /// step_up_interval_minutes, min_margin_percent, undercut_percent
        json: String,
        /// Make it the active profile
        #[arg(long)]
        activate: bool,
    },
    /// List recent runs
    Runs {
        #[arg(long)]
        marketplace: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// List recorded decisions
    Decisions {
        #[arg(long)]
        run: Option<String>,
        #[arg(long)]
        marketplace: Option<String>,
        #[arg(long)]
        sku: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// List recent alerts
    Alerts {
        /// Alert kind (e.g. STALE_FLOOR_FEED, RETRIES_EXHAUSTED)
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}
