use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The request a transaction id was issued for
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TransactionKind {
    Connect,
    CreateStream,
}

#[derive(Debug)]
struct PendingTransaction {
    kind: TransactionKind,
    deadline: Instant,
}

/// Transaction ids awaiting a `_result` or `_error`, each with its own deadline
#[derive(Debug)]
pub(super) struct TransactionTable {
    next_transaction_id: u32,
    timeout: Duration,
    pending: HashMap<u32, PendingTransaction>,
}

impl TransactionTable {
    pub fn new(timeout: Duration) -> TransactionTable {
        TransactionTable {
            next_transaction_id: 1,
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Allocates an id that no response is awaited for
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1).max(1);
        id
    }

    pub fn begin(&mut self, kind: TransactionKind, now: Instant) -> u32 {
        let id = self.next_id();
        self.pending.insert(
            id,
            PendingTransaction {
                kind,
                deadline: now + self.timeout,
            },
        );

        id
    }

    /// Removes and returns the transaction a response belongs to
    pub fn complete(&mut self, transaction_id: f64) -> Option<TransactionKind> {
        if transaction_id < 1.0 || transaction_id.fract() != 0.0 {
            return None;
        }

        self.pending
            .remove(&(transaction_id as u32))
            .map(|pending| pending.kind)
    }

    /// Removes every transaction whose deadline has passed, oldest id first
    pub fn expire(&mut self, now: Instant) -> Vec<(u32, TransactionKind)> {
        let mut expired: Vec<(u32, TransactionKind)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, pending)| (*id, pending.kind))
            .collect();

        expired.sort_by_key(|(id, _)| *id);
        for (id, _) in &expired {
            self.pending.remove(id);
        }

        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_increment() {
        let mut table = TransactionTable::new(Duration::from_secs(5));
        let now = Instant::now();

        assert_eq!(table.begin(TransactionKind::Connect, now), 1);
        assert_eq!(table.next_id(), 2);
        assert_eq!(table.begin(TransactionKind::CreateStream, now), 3);
        assert_eq!(table.pending_count(), 2);
    }

    #[test]
    fn completing_removes_only_that_transaction() {
        let mut table = TransactionTable::new(Duration::from_secs(5));
        let now = Instant::now();
        table.begin(TransactionKind::Connect, now);
        table.begin(TransactionKind::CreateStream, now);

        assert_eq!(table.complete(2.0), Some(TransactionKind::CreateStream));
        assert_eq!(table.complete(2.0), None);
        assert_eq!(table.complete(0.0), None);
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn expire_only_returns_transactions_past_their_deadline() {
        let mut table = TransactionTable::new(Duration::from_millis(50));
        let start = Instant::now();
        table.begin(TransactionKind::Connect, start);
        table.begin(TransactionKind::CreateStream, start + Duration::from_millis(40));

        assert_eq!(table.expire(start + Duration::from_millis(49)), vec![]);
        assert_eq!(
            table.expire(start + Duration::from_millis(60)),
            vec![(1, TransactionKind::Connect)]
        );
        assert_eq!(
            table.expire(start + Duration::from_millis(90)),
            vec![(2, TransactionKind::CreateStream)]
        );
        assert_eq!(table.pending_count(), 0);
    }
}
