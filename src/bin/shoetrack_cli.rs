use std::{path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shoetrack_api::{
    auth::SessionToken,
    client::{
        ApiClient, ClientConfig, ClientError, FileStore, LocalStore, OfflineQueue,
        QueueConfig, SaleOutcome, SalesClient,
    },
    entities::product,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SESSION_KEY: &str = "session";
const DEFAULT_SERVER: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(name = "shoetrack", about = "Shop-floor client for shoetrack: sell, sync and check stock", version)]
struct Cli {
    #[arg(long, global = true, help = "Server base URL (defaults to $SHOETRACK_SERVER or http://localhost:8080)")]
    server: Option<String>,
    #[arg(long, global = true, help = "Directory for the offline queue and cache (defaults to ~/.shoetrack)")]
    state_dir: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = shoetrack_api::client::DEFAULT_TIMEOUT_SECS, help = "Per-request timeout in seconds")]
    timeout: u64,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange the shop password for a session token
    Login(LoginArgs),
    /// Forget the saved session token
    Logout,
    /// Sell one unit; queued locally when the server is unreachable
    Sell(SellArgs),
    /// Submit queued sales
    Sync,
    /// Show queued sales
    Pending,
    /// Requeue sales that failed to sync
    Retry,
    /// Drop a queued sale without submitting it
    Discard(DiscardArgs),
    /// List products (falls back to the cached list when offline)
    Products(ProductsArgs),
    /// Dashboard figures (falls back to the cached figures when offline)
    Stats,
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long, help = "Shared shop password")]
    password: String,
}

#[derive(Args)]
struct SellArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Product identifier")]
    product: Uuid,
    #[arg(long, value_parser = parse_decimal, help = "Price the unit sold for")]
    price: Decimal,
}

#[derive(Args)]
struct DiscardArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Queued sale identifier")]
    id: Uuid,
}

#[derive(Args)]
struct ProductsArgs {
    #[arg(long, action = ArgAction::SetTrue, help = "Only products with stock left")]
    in_stock: bool,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Only products from this bundle")]
    bundle: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    server: String,
    token: String,
    expires_at: chrono::DateTime<Utc>,
}

struct CliContext {
    server: String,
    store: Arc<FileStore>,
    api: ApiClient,
    queue: Arc<OfflineQueue>,
    config: ClientConfig,
}

impl CliContext {
    async fn initialize(cli: &Cli) -> Result<Self> {
        let server = cli
            .server
            .clone()
            .or_else(|| std::env::var("SHOETRACK_SERVER").ok())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let state_dir = match &cli.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir()?,
        };
        let store = Arc::new(FileStore::new(state_dir));

        let mut config = ClientConfig::new(server.clone());
        config.timeout_secs = cli.timeout;
        config.token = read_session(store.as_ref(), &server).await?.map(|s| s.token);
        let api = ApiClient::new(&config).context("failed to build HTTP client")?;

        let queue_config = QueueConfig {
            submit_timeout: std::time::Duration::from_secs(cli.timeout),
            ..QueueConfig::default()
        };
        let queue = OfflineQueue::open(store.clone(), queue_config)
            .await
            .context("failed to open the offline queue")?;

        Ok(Self {
            server,
            store,
            api,
            queue: Arc::new(queue),
            config,
        })
    }

    fn sales_client(&self) -> SalesClient {
        SalesClient::new(Arc::new(self.api.clone()), self.queue.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CliContext::initialize(&cli).await?;

    match &cli.command {
        Commands::Login(args) => handle_login(&context, args, cli.json).await,
        Commands::Logout => handle_logout(&context).await,
        Commands::Sell(args) => handle_sell(&context, args, cli.json).await,
        Commands::Sync => handle_sync(&context, cli.json).await,
        Commands::Pending => handle_pending(&context, cli.json).await,
        Commands::Retry => {
            let moved = context.queue.retry_failed().await?;
            println!("{moved} failed sale(s) moved back to pending");
            Ok(())
        }
        Commands::Discard(args) => {
            if context.queue.discard(args.id).await? {
                println!("Discarded queued sale {}", args.id);
                Ok(())
            } else {
                Err(anyhow!("no queued sale with id {}", args.id))
            }
        }
        Commands::Products(args) => handle_products(&context, args, cli.json).await,
        Commands::Stats => handle_stats(&context, cli.json).await,
    }
}

async fn handle_login(context: &CliContext, args: &LoginArgs, json: bool) -> Result<()> {
    let session: SessionToken = context
        .api
        .login(&args.password)
        .await
        .context("login failed")?;
    let stored = StoredSession {
        server: context.server.clone(),
        token: session.token.clone(),
        expires_at: session.expires_at,
    };
    let payload = serde_json::to_string_pretty(&stored)?;
    context.store.save(SESSION_KEY, &payload).await?;

    if json {
        print_json(&session)?;
    } else {
        println!("Logged in; session valid until {}", session.expires_at);
        println!("Session saved to: {}", context.store.dir().display());
    }
    Ok(())
}

async fn handle_logout(context: &CliContext) -> Result<()> {
    if context.config.token.is_some() {
        if let Err(e) = context.api.logout().await {
            eprintln!("Server logout failed ({e}); clearing the local session anyway.");
        }
    }
    context.store.remove(SESSION_KEY).await?;
    println!("Logged out");
    Ok(())
}

async fn handle_sell(context: &CliContext, args: &SellArgs, json: bool) -> Result<()> {
    let name = cached_product_name(context, args.product)
        .await
        .unwrap_or_else(|| args.product.to_string());

    let outcome = context
        .sales_client()
        .sell_or_queue(args.product, &name, args.price)
        .await
        .map_err(describe_rejection)?;

    match outcome {
        SaleOutcome::Recorded(product) => {
            if json {
                print_json(&product)?;
            } else {
                println!("Sold {} for {}", product.name, args.price);
                render_product(&product);
            }
        }
        SaleOutcome::Queued(pending) => {
            if json {
                print_json(&pending)?;
            } else {
                println!(
                    "Server unreachable; sale {} queued ({} waiting). Run `shoetrack sync` later.",
                    pending.id,
                    context.queue.pending_count().await
                );
            }
        }
    }
    Ok(())
}

async fn handle_sync(context: &CliContext, json: bool) -> Result<()> {
    let report = context.sales_client().sync().await?;
    if json {
        print_json(&serde_json::json!({
            "skipped": report.skipped,
            "synced": report.synced,
            "rescheduled": report.rescheduled,
            "failed": report.failed,
            "remaining": report.remaining,
        }))?;
        return Ok(());
    }

    if report.skipped {
        println!("Another sync is already running");
        return Ok(());
    }
    println!(
        "Synced {} • rescheduled {} • failed {} • still waiting {}",
        report.synced.len(),
        report.rescheduled.len(),
        report.failed.len(),
        report.remaining
    );
    if !report.failed.is_empty() {
        println!("Inspect with `shoetrack pending`; requeue with `shoetrack retry`.");
    }
    Ok(())
}

async fn handle_pending(context: &CliContext, json: bool) -> Result<()> {
    let sales = context.queue.list().await;
    if json {
        return print_json(&sales);
    }
    if sales.is_empty() {
        println!("No queued sales");
        return Ok(());
    }
    for sale in &sales {
        println!(
            "- {} • {} • {} • {} • attempts {}{}",
            sale.id,
            sale.product_name,
            sale.sale_price,
            sale.status,
            sale.attempts,
            sale.last_error
                .as_deref()
                .map(|e| format!(" • last error: {e}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn handle_products(context: &CliContext, args: &ProductsArgs, json: bool) -> Result<()> {
    let in_stock = args.in_stock.then_some(true);
    match context.api.list_products(in_stock, args.bundle).await {
        Ok(products) => {
            if in_stock.is_none() && args.bundle.is_none() {
                let stats = context.api.stats().await.ok();
                context.queue.cache_dashboard(products.clone(), stats).await?;
            }
            if json {
                return print_json(&products);
            }
            products.iter().for_each(render_product);
            Ok(())
        }
        Err(err) if err.is_retryable() => {
            let Some(cache) = context.queue.cached_dashboard().await else {
                return Err(anyhow!("server unreachable and nothing cached yet: {err}"));
            };
            let products: Vec<_> = cache
                .products
                .into_iter()
                .filter(|p| !args.in_stock || p.stock_count > 0)
                .filter(|p| args.bundle.map_or(true, |b| p.bundle_id == Some(b)))
                .collect();
            if json {
                return print_json(&products);
            }
            println!("(offline: cached list from {})", cache.last_updated);
            products.iter().for_each(render_product);
            Ok(())
        }
        Err(err) => Err(describe_rejection(err)),
    }
}

async fn handle_stats(context: &CliContext, json: bool) -> Result<()> {
    let (stats, cached_at) = match context.api.stats().await {
        Ok(stats) => (stats, None),
        Err(err) if err.is_retryable() => {
            let cache = context
                .queue
                .cached_dashboard()
                .await
                .ok_or_else(|| anyhow!("server unreachable and nothing cached yet: {err}"))?;
            let stale = cache.is_stale(ChronoDuration::hours(1));
            let stats = cache
                .stats
                .ok_or_else(|| anyhow!("server unreachable and no cached figures: {err}"))?;
            (stats, Some((cache.last_updated, stale)))
        }
        Err(err) => return Err(describe_rejection(err)),
    };

    if json {
        return print_json(&stats);
    }
    if let Some((at, stale)) = cached_at {
        println!("(offline: cached figures from {at}{})", if stale { ", stale" } else { "" });
    }
    println!("Products:        {}", stats.total_products);
    println!("Stock:           {} of {}", stats.total_stock, stats.total_original_stock);
    println!("Sales:           {} ({} today)", stats.total_sales, stats.today_sales);
    println!("Profit:          {} ({} today)", stats.total_actual_profit, stats.today_profit);
    println!("Expected profit: {}", stats.total_expected_profit);
    println!("Sell-through:    {}%", stats.sell_through_rate);
    Ok(())
}

async fn cached_product_name(context: &CliContext, id: Uuid) -> Option<String> {
    context
        .queue
        .cached_dashboard()
        .await?
        .products
        .into_iter()
        .find(|p| p.id == id)
        .map(|p| p.name)
}

fn describe_rejection(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::Api { status: 401, .. } => {
            anyhow!("not logged in or session expired; run `shoetrack login`")
        }
        other => anyhow!(other),
    }
}

async fn read_session(store: &FileStore, server: &str) -> Result<Option<StoredSession>> {
    let Some(raw) = store.load(SESSION_KEY).await? else {
        return Ok(None);
    };
    let session: StoredSession =
        serde_json::from_str(&raw).context("failed to parse the saved session")?;
    if session.server != server || session.expires_at <= Utc::now() {
        return Ok(None);
    }
    Ok(Some(session))
}

fn default_state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SHOETRACK_HOME") {
        return Ok(PathBuf::from(dir));
    }
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".shoetrack"))
        .map_err(|_| anyhow!("cannot locate a state directory; pass --state-dir"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_product(product: &product::Model) {
    println!(
        "- {} • {} • {} • stock {}/{} • sells at {}",
        product.id,
        product.shoe_code.as_deref().unwrap_or("-"),
        product.name,
        product.stock_count,
        product.original_stock,
        product.selling_price
    );
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|_| format!("invalid decimal '{raw}'"))
}
