//! Reconciliation loop
//!
//! Keeps the book consistent with the chain and the wall clock:
//! - a timer purges expired orders every `purge_interval`
//! - one forwarder per registered exchange applies its fill and cancel
//!   events to the book
//!
//! Exchanges registered while the loop runs are attached immediately.
//! Stopping cancels the timer and the forwarders between store operations;
//! an event already being applied completes first.

use std::collections::HashMap;
use std::time::Duration;

use persistence::SettlementUpdate;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::Address;

use crate::book::OrderBook;
use crate::proxy::ExchangeEvent;
use crate::registry::Attachment;

pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to a running reconciliation loop.
pub struct Reconciler {
    book: OrderBook,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Reconciler {
    /// Start the purge timer and attach to every registered exchange.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(book: &OrderBook, purge_interval: Duration) -> Self {
        let token = CancellationToken::new();
        let attachments = book.registry().attach();

        let timer = tokio::spawn(purge_loop(book.clone(), purge_interval, token.clone()));
        let supervisor = tokio::spawn(supervise(book.clone(), attachments, token.clone()));

        info!(
            purge_interval_secs = purge_interval.as_secs(),
            exchanges = book.registry().exchanges().len(),
            "Reconciler started"
        );

        Self {
            book: book.clone(),
            token,
            tasks: vec![timer, supervisor],
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel the timer and all subscriptions and wait for the tasks to end.
    pub async fn stop(self) {
        self.book.registry().detach();
        self.token.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "Reconciler task panicked");
            }
        }
        info!("Reconciler stopped");
    }
}

async fn purge_loop(book: OrderBook, period: Duration, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let now = book.now();
                match book.purge_expired(now).await {
                    Ok(0) => debug!(now, "No expired orders"),
                    Ok(removed) => info!(now, removed, "Expired orders purged"),
                    Err(err) => error!(now, error = %err, "Expired order purge failed"),
                }
            }
        }
    }
}

/// Spawns a forwarder per attached exchange; a re-registered exchange
/// replaces its previous forwarder.
async fn supervise(
    book: OrderBook,
    mut attachments: mpsc::UnboundedReceiver<Attachment>,
    token: CancellationToken,
) {
    let mut forwarders: HashMap<Address, CancellationToken> = HashMap::new();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            Some(attachment) = attachments.recv() => {
                let child = token.child_token();
                if let Some(previous) = forwarders.insert(attachment.exchange, child.clone()) {
                    previous.cancel();
                }
                debug!(exchange = %attachment.exchange, "Attaching exchange events");
                tasks.spawn(forward(book.clone(), attachment, child));
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    error!(error = %err, "Event forwarder panicked");
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "Event forwarder panicked");
        }
    }
}

async fn forward(book: OrderBook, attachment: Attachment, token: CancellationToken) {
    let Attachment {
        exchange,
        mut events,
    } = attachment;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => apply_event(&book, exchange, event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(exchange = %exchange, skipped, "Event subscription lagged");
                }
                Err(RecvError::Closed) => {
                    info!(exchange = %exchange, "Exchange event source closed");
                    break;
                }
            }
        }
    }
}

async fn apply_event(book: &OrderBook, exchange: Address, event: ExchangeEvent) {
    let hash = event.order_hash();
    let applied = match event {
        ExchangeEvent::Fill {
            order_hash,
            maker_amount,
            taker_amount,
        } => book.order_filled(&order_hash, maker_amount, taker_amount).await,
        ExchangeEvent::Cancel {
            order_hash,
            maker_amount,
            taker_amount,
        } => {
            book.order_cancelled(&order_hash, maker_amount, taker_amount)
                .await
        }
    };

    match applied {
        Ok(SettlementUpdate::Unknown) => {
            debug!(exchange = %exchange, hash = %hash, kind = event.kind(), "Event for unknown order ignored");
        }
        Ok(SettlementUpdate::Updated) => {
            debug!(exchange = %exchange, hash = %hash, kind = event.kind(), "Order partially settled");
        }
        Ok(SettlementUpdate::Settled) => {
            info!(exchange = %exchange, hash = %hash, kind = event.kind(), "Order settled and removed");
        }
        Err(err) => {
            error!(exchange = %exchange, hash = %hash, kind = event.kind(), error = %err, "Failed to apply exchange event");
        }
    }
}
