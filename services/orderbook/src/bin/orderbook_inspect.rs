//! Offline inspection of an order relay store.
//!
//! Prints orders as JSON lines. Do not run against a directory a live relay
//! is writing to.
//!
//! Without chain access, `check` runs every local validation rule and
//! reports orders passing them as `locally-valid`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use orderbook::config::RelayConfig;
use orderbook::logging::init_tracing;
use orderbook::{DummyExchangeProxy, OrderBook, OrderBookError, Reconciler};
use serde::Serialize;
use tracing::info;
use types::filter::{OrderFilter, TokenPair};
use types::order::Order;
use types::record::StoredOrder;
use types::{Address, B256};

#[derive(Parser)]
#[command(name = "orderbook-inspect", about = "Inspect an order relay store", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Store directory; overrides the configured one
    #[arg(long, env = "ORDER_RELAY__STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Orders selling BASE for QUOTE, cheapest first
    Asks { base: Address, quote: Address },
    /// Orders selling QUOTE for BASE, highest price first
    Bids { base: Address, quote: Address },
    /// Orders matching every given filter
    Orders(FilterArgs),
    /// A single order by hash
    Get { hash: B256 },
    /// Rewrite the journal to hold only live orders
    Compact,
    /// Remove orders that expired before now
    Purge {
        /// Keep purging every configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Validate an order document against the configured exchanges
    Check {
        /// JSON file holding the order; `-` reads stdin
        path: PathBuf,
    },
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    exchange: Option<Address>,
    /// Maker or taker token
    #[arg(long)]
    token: Option<Address>,
    #[arg(long)]
    maker_token: Option<Address>,
    #[arg(long)]
    taker_token: Option<Address>,
    /// Maker or taker
    #[arg(long)]
    trader: Option<Address>,
    #[arg(long)]
    maker: Option<Address>,
    #[arg(long)]
    taker: Option<Address>,
    #[arg(long)]
    fee_recipient: Option<Address>,
}

impl From<FilterArgs> for OrderFilter {
    fn from(args: FilterArgs) -> Self {
        OrderFilter {
            exchange: args.exchange,
            token: args.token,
            maker_token: args.maker_token,
            taker_token: args.taker_token,
            trader: args.trader,
            maker: args.maker,
            taker: args.taker,
            fee_recipient: args.fee_recipient,
        }
    }
}

/// Output line: the stored order plus its hash and display price.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderLine<'a> {
    order_hash: String,
    price: String,
    #[serde(flatten)]
    record: &'a StoredOrder,
}

/// Outcome of `check` for one order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckLine {
    order_hash: String,
    verdict: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

fn read_document(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut document = String::new();
        std::io::stdin().read_to_string(&mut document)?;
        return Ok(document);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

async fn check_order(cfg: &RelayConfig, book: &OrderBook, document: &str) -> Result<CheckLine> {
    let order = Order::from_json(document).context("not an order document")?;

    // capability calls fail, so passing the local rules ends as unavailable
    let offline = Arc::new(DummyExchangeProxy::new());
    offline.set_unavailable(true);
    cfg.register_exchanges(book, offline);

    let (verdict, reason) = match book.check(&order).await {
        Ok(()) => ("valid", None),
        Err(OrderBookError::ValidationCapabilityUnavailable { .. }) => ("locally-valid", None),
        Err(err @ OrderBookError::OrderInvalid { .. }) => {
            ("rejected", err.invalid_reason().map(ToString::to_string))
        }
        Err(err) => return Err(err.into()),
    };
    Ok(CheckLine {
        order_hash: order.hash_hex(),
        verdict,
        reason,
    })
}

fn print_orders(records: &[StoredOrder]) -> Result<()> {
    for record in records {
        let line = OrderLine {
            order_hash: record.order.hash_hex(),
            price: record.order.price().to_string(),
            record,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = RelayConfig::load(cli.config.as_deref())?;
    init_tracing(cli.json_logs || cfg.log_json)?;

    if let Some(store_dir) = cli.store_dir {
        cfg.store_dir = store_dir;
    }
    let book = cfg.open_book()?;

    match cli.command {
        Command::Asks { base, quote } => {
            print_orders(&book.get_asks(TokenPair::new(base, quote)).await)?;
        }
        Command::Bids { base, quote } => {
            print_orders(&book.get_bids(TokenPair::new(base, quote)).await)?;
        }
        Command::Orders(filter) => {
            print_orders(&book.get_orders(&filter.into()).await)?;
        }
        Command::Get { hash } => {
            if let Some(record) = book.get_order_by_hash(&hash).await {
                print_orders(std::slice::from_ref(&record))?;
            }
        }
        Command::Compact => {
            let rows = book.store().with(|store| store.compact()).await?;
            info!(rows, dir = %cfg.store_dir.display(), "Store compacted");
        }
        Command::Purge { watch: false } => {
            let now = book.now();
            let removed = book.purge_expired(now).await?;
            info!(now, removed, "Expired orders purged");
        }
        Command::Purge { watch: true } => {
            let reconciler = Reconciler::start(&book, cfg.purge_interval());
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            reconciler.stop().await;
        }
        Command::Check { path } => {
            let document = read_document(&path)?;
            let line = check_order(&cfg, &book, &document).await?;
            println!("{}", serde_json::to_string(&line)?);
        }
    }

    Ok(())
}
