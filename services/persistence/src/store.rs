//! Order Store: keyed order table persisted through the journal
//!
//! The live table is held in memory keyed by order hash. Every mutation is
//! appended to the journal (and fsynced, with the default config) before the
//! in-memory table changes, so a crash never leaves the table ahead of disk.
//! Opening a store replays the journal; a torn last entry is truncated away.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;

use thiserror::Error;
use tracing::{debug, info, warn};
use types::filter::OrderFilter;
use types::order::Order;
use types::record::StoredOrder;
use types::{Address, B256, U256};

use crate::journal::{JournalConfig, JournalEntry, JournalError, JournalWriter, Op};
use crate::reader::{JournalReader, ReaderError};
use crate::row::{hash_key, parse_hash_key, OrderRow, RowError};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReaderError),

    #[error("Row encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Invalid stored row: {0}")]
    Row(#[from] RowError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Per-item outcome of [`OrderStore::insert_batch`].
#[derive(Debug, Default)]
pub struct BatchInsert {
    pub inserted: Vec<B256>,
    /// Already present; left untouched
    pub duplicates: Vec<B256>,
    pub failed: Vec<(B256, StoreError)>,
}

impl BatchInsert {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of applying a fill or cancel to a stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementUpdate {
    /// No order with that hash is stored.
    Unknown,
    /// Counters grew; the order stays in the book.
    Updated,
    /// The order became fully settled and was removed.
    Settled,
}

// ── Order Store ─────────────────────────────────────────────────────

pub struct OrderStore {
    journal: JournalWriter,
    orders: BTreeMap<B256, StoredOrder>,
}

impl OrderStore {
    /// Open (or create) the store in `config.dir` and replay its journal.
    pub fn open(config: JournalConfig) -> Result<Self, StoreError> {
        let mut reader = JournalReader::open(&config.dir)?;
        let mut orders = BTreeMap::new();
        let mut replayed = 0usize;
        while let Some(entry) = reader.next_entry()? {
            replay_entry(&mut orders, entry)?;
            replayed += 1;
        }

        if let Some(tail) = reader.torn_tail() {
            warn!(
                path = %tail.path.display(),
                valid_len = tail.valid_len,
                detail = %tail.detail,
                "Truncating torn journal tail"
            );
            OpenOptions::new()
                .write(true)
                .open(&tail.path)?
                .set_len(tail.valid_len)?;
        }

        let mut journal = JournalWriter::open(config)?;
        journal.set_next_sequence(reader.last_sequence().map_or(1, |seq| seq + 1));

        info!(
            dir = %journal.current_file_path().display(),
            entries = replayed,
            orders = orders.len(),
            "Order store opened"
        );

        Ok(Self { journal, orders })
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Store a new order with zeroed counters.
    ///
    /// Returns `false` without touching anything when the hash is already stored.
    pub fn insert(&mut self, order: Order) -> Result<bool, StoreError> {
        let hash = order.hash();
        if self.orders.contains_key(&hash) {
            debug!(hash = %hash, "Order already stored");
            return Ok(false);
        }

        let record = StoredOrder::new(order);
        self.put(hash, record)?;
        debug!(hash = %hash, "Order stored");
        Ok(true)
    }

    /// Insert every order independently; one failure does not stop the rest.
    pub fn insert_batch(&mut self, orders: impl IntoIterator<Item = Order>) -> BatchInsert {
        let mut outcome = BatchInsert::default();
        for order in orders {
            let hash = order.hash();
            match self.insert(order) {
                Ok(true) => outcome.inserted.push(hash),
                Ok(false) => outcome.duplicates.push(hash),
                Err(err) => {
                    warn!(hash = %hash, error = %err, "Batch insert item failed");
                    outcome.failed.push((hash, err));
                }
            }
        }
        outcome
    }

    pub fn get_by_hash(&self, hash: &B256) -> Option<&StoredOrder> {
        self.orders.get(hash)
    }

    /// Orders selling exactly `maker_token` for exactly `taker_token`,
    /// by price then by expiration (earliest first).
    pub fn query_by_token_pair(
        &self,
        maker_token: Address,
        taker_token: Address,
        descending: bool,
    ) -> Vec<StoredOrder> {
        let mut matched: Vec<_> = self
            .orders
            .values()
            .filter(|r| {
                r.order.maker_token_address == maker_token
                    && r.order.taker_token_address == taker_token
            })
            .map(|r| (r.order.price(), r))
            .collect();

        matched.sort_by(|(price_a, a), (price_b, b)| {
            let by_price = if descending {
                price_b.cmp(price_a)
            } else {
                price_a.cmp(price_b)
            };
            by_price.then_with(|| {
                a.order
                    .expiration_timestamp_in_sec
                    .cmp(&b.order.expiration_timestamp_in_sec)
            })
        });

        matched.into_iter().map(|(_, r)| r.clone()).collect()
    }

    /// Every stored order matching all set predicates of `filter`.
    pub fn query(&self, filter: &OrderFilter) -> Vec<StoredOrder> {
        self.orders
            .values()
            .filter(|r| filter.matches(&r.order))
            .cloned()
            .collect()
    }

    /// Returns whether a row was removed.
    pub fn delete_by_hash(&mut self, hash: &B256) -> Result<bool, StoreError> {
        if !self.orders.contains_key(hash) {
            return Ok(false);
        }
        self.remove(hash)?;
        debug!(hash = %hash, "Order deleted");
        Ok(true)
    }

    /// Remove every stored order among `hashes` with a single journal write.
    ///
    /// Returns how many rows were removed.
    pub fn delete_by_hashes(&mut self, hashes: &[B256]) -> Result<usize, StoreError> {
        let mut present: Vec<B256> = hashes
            .iter()
            .filter(|hash| self.orders.contains_key(*hash))
            .copied()
            .collect();
        present.sort_unstable();
        present.dedup();
        if present.is_empty() {
            return Ok(0);
        }

        let deletes = present
            .iter()
            .map(|hash| bincode::serialize(&hash_key(hash)).map(|key| (Op::Delete, key)))
            .collect::<Result<Vec<_>, _>>()?;
        self.journal.append_batch(deletes)?;
        for hash in &present {
            self.orders.remove(hash);
        }

        debug!(removed = present.len(), "Orders deleted");
        Ok(present.len())
    }

    /// Remove every order whose expiration is strictly before `cutoff`.
    pub fn purge_expired(&mut self, cutoff: u64) -> Result<usize, StoreError> {
        let expired: Vec<B256> = self
            .orders
            .iter()
            .filter(|(_, r)| r.order.expiration_timestamp_in_sec < cutoff)
            .map(|(hash, _)| *hash)
            .collect();

        let removed = self.delete_by_hashes(&expired)?;
        if removed > 0 {
            info!(cutoff, removed, remaining = self.orders.len(), "Purged expired orders");
        }
        Ok(removed)
    }

    pub fn apply_fill(
        &mut self,
        hash: &B256,
        maker_amount: U256,
        taker_amount: U256,
    ) -> Result<SettlementUpdate, StoreError> {
        self.settle(hash, |record| record.add_fill(maker_amount, taker_amount))
    }

    pub fn apply_cancel(
        &mut self,
        hash: &B256,
        maker_amount: U256,
        taker_amount: U256,
    ) -> Result<SettlementUpdate, StoreError> {
        self.settle(hash, |record| record.add_cancel(maker_amount, taker_amount))
    }

    /// Rewrite the live table into a fresh segment and drop older segments.
    ///
    /// Returns the number of rows written.
    pub fn compact(&mut self) -> Result<usize, StoreError> {
        let first_segment = self.journal.rotate()?;
        let rows = self
            .orders
            .values()
            .map(|record| bincode::serialize(&OrderRow::from(record)).map(|row| (Op::Put, row)))
            .collect::<Result<Vec<_>, _>>()?;
        self.journal.append_batch(rows)?;
        self.journal.sync()?;
        let removed = self.journal.remove_segments_before(first_segment)?;

        info!(
            rows = self.orders.len(),
            removed_segments = removed,
            "Order journal compacted"
        );
        Ok(self.orders.len())
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn settle(
        &mut self,
        hash: &B256,
        update: impl FnOnce(&mut StoredOrder),
    ) -> Result<SettlementUpdate, StoreError> {
        let Some(current) = self.orders.get(hash) else {
            debug!(hash = %hash, "Settlement for unknown order ignored");
            return Ok(SettlementUpdate::Unknown);
        };

        let mut record = current.clone();
        update(&mut record);

        if record.is_fully_settled() {
            self.remove(hash)?;
            debug!(hash = %hash, "Order fully settled");
            Ok(SettlementUpdate::Settled)
        } else {
            self.put(*hash, record)?;
            Ok(SettlementUpdate::Updated)
        }
    }

    fn put(&mut self, hash: B256, record: StoredOrder) -> Result<(), StoreError> {
        let payload = bincode::serialize(&OrderRow::from(&record))?;
        self.journal.append(Op::Put, payload)?;
        self.orders.insert(hash, record);
        Ok(())
    }

    fn remove(&mut self, hash: &B256) -> Result<(), StoreError> {
        let payload = bincode::serialize(&hash_key(hash))?;
        self.journal.append(Op::Delete, payload)?;
        self.orders.remove(hash);
        Ok(())
    }
}

fn replay_entry(
    orders: &mut BTreeMap<B256, StoredOrder>,
    entry: JournalEntry,
) -> Result<(), StoreError> {
    match entry.op {
        Op::Put => {
            let row: OrderRow = bincode::deserialize(&entry.payload)?;
            let record = StoredOrder::try_from(row)?;
            orders.insert(record.hash(), record);
        }
        Op::Delete => {
            let key: String = bincode::deserialize(&entry.payload)?;
            orders.remove(&parse_hash_key(&key)?);
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::list_segments;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;
    use types::testing::{exchange, token, OrderBuilder, TestMaker};

    fn open(dir: &Path) -> OrderStore {
        OrderStore::open(JournalConfig::new(dir)).unwrap()
    }

    fn order(maker_amount: u64, taker_amount: u64, salt: u64) -> Order {
        OrderBuilder::new(exchange(), token(0xA1), token(0xB2))
            .amounts(maker_amount, taker_amount)
            .salt(salt)
            .unsigned()
    }

    fn expiring(expiration: u64, salt: u64) -> Order {
        OrderBuilder::new(exchange(), token(0xA1), token(0xB2))
            .expiration(expiration)
            .salt(salt)
            .unsigned()
    }

    #[test]
    fn test_insert_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let o = order(100, 150, 1);

        assert!(store.insert(o.clone()).unwrap());
        assert!(!store.insert(o.clone()).unwrap());
        assert_eq!(store.len(), 1);

        let record = store.get_by_hash(&o.hash()).unwrap();
        assert_eq!(record.filled_maker_token_amount, U256::ZERO);
        assert_eq!(record.cancelled_taker_token_amount, U256::ZERO);
    }

    #[test]
    fn test_duplicate_insert_keeps_counters() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let o = order(100, 200, 1);
        store.insert(o.clone()).unwrap();
        store
            .apply_fill(&o.hash(), U256::from(10), U256::from(20))
            .unwrap();

        assert!(!store.insert(o.clone()).unwrap());
        assert_eq!(
            store.get_by_hash(&o.hash()).unwrap().filled_maker_token_amount,
            U256::from(10)
        );
    }

    #[test]
    fn test_reopen_restores_table() {
        let tmp = TempDir::new().unwrap();
        let signed = OrderBuilder::new(exchange(), token(0xA1), token(0xB2))
            .amounts(100, 150)
            .sign(&TestMaker::from_seed(5));
        let hash = signed.hash();

        {
            let mut store = open(tmp.path());
            store.insert(signed.clone()).unwrap();
            store.insert(order(100, 300, 2)).unwrap();
            store.delete_by_hash(&order(100, 300, 2).hash()).unwrap();
            store
                .apply_cancel(&hash, U256::from(5), U256::from(7))
                .unwrap();
        }

        let store = open(tmp.path());
        assert_eq!(store.len(), 1);
        let record = store.get_by_hash(&hash).unwrap();
        assert_eq!(record.order.hash_hex(), format!("0x{}", hash_key(&hash)));
        assert_eq!(record.order.ec_signature, signed.ec_signature);
        assert_eq!(record.cancelled_maker_token_amount, U256::from(5));
        assert_eq!(record.cancelled_taker_token_amount, U256::from(7));
        assert!(record.order.validate_signature());
    }

    #[test]
    fn test_journal_rows_store_hex_without_prefix() {
        let tmp = TempDir::new().unwrap();
        let signed = OrderBuilder::new(exchange(), token(0xA1), token(0xB2))
            .sign(&TestMaker::from_seed(5));
        open(tmp.path()).insert(signed.clone()).unwrap();

        let entries = JournalReader::open(tmp.path()).unwrap().read_all().unwrap();
        assert_eq!(entries.len(), 1);
        let row: OrderRow = bincode::deserialize(&entries[0].payload).unwrap();
        assert_eq!(format!("0x{}", row.hash), signed.hash_hex());
        assert!(!row.r.starts_with("0x"));
        assert!(!row.s.starts_with("0x"));
    }

    #[test]
    fn test_pair_query_orders_by_price_then_expiration() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());

        let two = order(100, 200, 1);
        let one = order(100, 100, 2);
        let late = OrderBuilder::new(exchange(), token(0xA1), token(0xB2))
            .amounts(100, 150)
            .expiration(5_000)
            .unsigned();
        let early = OrderBuilder::new(exchange(), token(0xA1), token(0xB2))
            .amounts(200, 300)
            .expiration(1_000)
            .unsigned();
        let other_pair = OrderBuilder::new(exchange(), token(0xB2), token(0xA1)).unsigned();

        for o in [&two, &one, &late, &early, &other_pair] {
            store.insert(o.clone()).unwrap();
        }

        let hashes = |records: Vec<StoredOrder>| -> Vec<B256> {
            records.iter().map(StoredOrder::hash).collect()
        };

        let ascending = store.query_by_token_pair(token(0xA1), token(0xB2), false);
        assert_eq!(
            hashes(ascending),
            vec![one.hash(), early.hash(), late.hash(), two.hash()]
        );

        let descending = store.query_by_token_pair(token(0xA1), token(0xB2), true);
        assert_eq!(
            hashes(descending),
            vec![two.hash(), early.hash(), late.hash(), one.hash()]
        );
    }

    #[test]
    fn test_fill_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let o = order(100, 200, 1);
        let hash = o.hash();
        store.insert(o).unwrap();

        assert_eq!(
            store.apply_fill(&hash, U256::from(60), U256::from(120)).unwrap(),
            SettlementUpdate::Updated
        );
        let record = store.get_by_hash(&hash).unwrap();
        assert_eq!(record.remaining_maker_token_amount(), U256::from(40));

        assert_eq!(
            store.apply_fill(&hash, U256::from(40), U256::from(80)).unwrap(),
            SettlementUpdate::Settled
        );
        assert!(store.get_by_hash(&hash).is_none());
        drop(store);

        assert!(open(tmp.path()).get_by_hash(&hash).is_none());
    }

    #[test]
    fn test_fill_and_cancel_share_the_cap() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let o = order(100, 200, 1);
        let hash = o.hash();
        store.insert(o).unwrap();

        store.apply_fill(&hash, U256::from(30), U256::ZERO).unwrap();
        assert_eq!(
            store.apply_cancel(&hash, U256::from(70), U256::ZERO).unwrap(),
            SettlementUpdate::Settled
        );
    }

    #[test]
    fn test_taker_leg_alone_settles() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let o = order(100, 200, 1);
        let hash = o.hash();
        store.insert(o).unwrap();

        assert_eq!(
            store.apply_cancel(&hash, U256::ZERO, U256::from(200)).unwrap(),
            SettlementUpdate::Settled
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_settlement_of_unknown_order_is_noop() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let missing = B256::repeat_byte(0x42);
        assert_eq!(
            store.apply_fill(&missing, U256::from(1), U256::from(1)).unwrap(),
            SettlementUpdate::Unknown
        );
        assert_eq!(
            store.apply_cancel(&missing, U256::from(1), U256::from(1)).unwrap(),
            SettlementUpdate::Unknown
        );
    }

    #[test]
    fn test_purge_is_strictly_before_cutoff() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let old = expiring(100, 1);
        let boundary = expiring(200, 2);
        let fresh = expiring(300, 3);
        for o in [&old, &boundary, &fresh] {
            store.insert(o.clone()).unwrap();
        }

        assert_eq!(store.purge_expired(200).unwrap(), 1);
        assert!(store.get_by_hash(&old.hash()).is_none());
        assert!(store.get_by_hash(&boundary.hash()).is_some());
        assert!(store.get_by_hash(&fresh.hash()).is_some());
        assert_eq!(store.purge_expired(200).unwrap(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let a = order(100, 100, 1);
        let b = order(100, 100, 2);
        store.insert(a.clone()).unwrap();
        store.insert(b.clone()).unwrap();

        assert!(store.delete_by_hash(&a.hash()).unwrap());
        assert!(!store.delete_by_hash(&a.hash()).unwrap());
        assert_eq!(store.delete_by_hashes(&[a.hash(), b.hash()]).unwrap(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_filtered_query() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let alice = OrderBuilder::new(exchange(), token(1), token(2))
            .maker(token(0x11))
            .unsigned();
        let bob = OrderBuilder::new(exchange(), token(2), token(3))
            .maker(token(0x22))
            .unsigned();
        store.insert(alice.clone()).unwrap();
        store.insert(bob.clone()).unwrap();

        assert_eq!(store.query(&OrderFilter::new()).len(), 2);
        assert_eq!(store.query(&OrderFilter::new().token(token(2))).len(), 2);

        let by_maker = store.query(&OrderFilter::new().trader(token(0x22)));
        assert_eq!(by_maker.len(), 1);
        assert_eq!(by_maker[0].hash(), bob.hash());

        let none = store.query(&OrderFilter::new().maker(token(0x11)).taker_token(token(3)));
        assert!(none.is_empty());
    }

    #[test]
    fn test_insert_batch_reports_duplicates() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let a = order(100, 100, 1);
        let b = order(100, 100, 2);
        store.insert(a.clone()).unwrap();

        let outcome = store.insert_batch(vec![a.clone(), b.clone(), b.clone()]);
        assert!(outcome.is_complete());
        assert_eq!(outcome.inserted, vec![b.hash()]);
        assert_eq!(outcome.duplicates, vec![a.hash(), b.hash()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_compaction_keeps_live_rows_only() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let orders: Vec<Order> = (0..5).map(|salt| order(100, 100, salt)).collect();
        for o in &orders {
            store.insert(o.clone()).unwrap();
        }
        store.delete_by_hash(&orders[0].hash()).unwrap();
        store
            .apply_fill(&orders[1].hash(), U256::from(10), U256::from(10))
            .unwrap();

        assert_eq!(store.compact().unwrap(), 4);
        assert_eq!(list_segments(tmp.path()).unwrap().len(), 1);

        store.insert(order(100, 100, 9)).unwrap();
        drop(store);

        let store = open(tmp.path());
        assert_eq!(store.len(), 5);
        assert!(store.get_by_hash(&orders[0].hash()).is_none());
        assert_eq!(
            store.get_by_hash(&orders[1].hash()).unwrap().filled_maker_token_amount,
            U256::from(10)
        );
    }

    #[test]
    fn test_torn_tail_is_truncated_on_open() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open(tmp.path());
            store.insert(order(100, 100, 1)).unwrap();
            store.insert(order(100, 100, 2)).unwrap();
        }

        let (_, path) = list_segments(tmp.path()).unwrap().pop().unwrap();
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[200, 0, 0, 0, 7, 7, 7]).unwrap();
        drop(file);

        {
            let mut store = open(tmp.path());
            assert_eq!(store.len(), 2);
            store.insert(order(100, 100, 3)).unwrap();
        }

        let store = open(tmp.path());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_corrupt_length_fails_open_without_truncating() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open(tmp.path());
            for salt in 0..3 {
                store.insert(order(100, 100, salt)).unwrap();
            }
            store.compact().unwrap();
        }

        let (_, path) = list_segments(tmp.path()).unwrap().pop().unwrap();
        let mut data = fs::read(&path).unwrap();
        let len_before = data.len() as u64;
        data[3] = 0xff;
        fs::write(&path, data).unwrap();

        assert!(matches!(
            OrderStore::open(JournalConfig::new(tmp.path())),
            Err(StoreError::Replay(ReaderError::Corruption { .. }))
        ));
        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
    }

    #[test]
    fn test_purge_journals_one_batch() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        for salt in 0..4 {
            store.insert(expiring(100 + salt, salt)).unwrap();
        }
        store.insert(expiring(1_000, 9)).unwrap();
        let before = store.journal.next_sequence();

        assert_eq!(store.purge_expired(500).unwrap(), 4);
        assert_eq!(store.journal.next_sequence(), before + 4);
        drop(store);

        let entries = JournalReader::open(tmp.path()).unwrap().read_all().unwrap();
        let deletes = entries.iter().filter(|e| e.op == Op::Delete).count();
        assert_eq!(deletes, 4);
        assert_eq!(open(tmp.path()).len(), 1);
    }

    #[test]
    fn test_delete_by_hashes_ignores_repeats() {
        let tmp = TempDir::new().unwrap();
        let mut store = open(tmp.path());
        let a = order(100, 100, 1);
        store.insert(a.clone()).unwrap();
        let before = store.journal.next_sequence();

        assert_eq!(store.delete_by_hashes(&[a.hash(), a.hash()]).unwrap(), 1);
        assert_eq!(store.journal.next_sequence(), before + 1);
        assert_eq!(store.delete_by_hashes(&[a.hash()]).unwrap(), 0);
        assert_eq!(store.journal.next_sequence(), before + 1);
    }
}

// ── Property-Based Tests ────────────────────────────────────────────
