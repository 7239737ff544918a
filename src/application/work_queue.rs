//! Per-marketplace work queue with deduplication and priority bands.
//!
//! Each SKU has at most one pending *or* in-flight entry:
//!
//! - re-enqueueing a pending SKU replaces its trigger metadata but keeps its
//!   original sequence number, so it does not lose its place in line. A
//!   high-priority re-enqueue promotes a pending low entry;
//! - a fallback (low) re-enqueue of an in-flight SKU is suppressed;
//! - a high-priority re-enqueue of an in-flight SKU is deferred and becomes
//!   pending when [`WorkQueue::complete`] is called for it.
//!
//! Dispatch order is the `High` band before the `Low` band, FIFO by sequence
//! inside a band. Capacity counts pending entries only. When it is reached a
//! newer low entry makes room for incoming high work, incoming low work is
//! dropped, and the caller gets an overflow outcome to alert on.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::values::trigger::{Priority, TriggerKind};

/// Default bound on pending entries per marketplace.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// A SKU waiting to be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub sku: String,
    pub trigger: TriggerKind,
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(sku: impl Into<String>, trigger: TriggerKind) -> Self {
        Self {
            sku: sku.into(),
            trigger,
            enqueued_at: Utc::now(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.trigger.priority()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Merged into an existing pending entry.
    Coalesced,
    /// SKU is in flight; will be re-queued once it completes.
    Deferred,
    /// SKU is already pending or in flight; nothing to add.
    Suppressed,
    /// Queue full. `dropped` is the SKU that lost its slot (possibly the
    /// incoming one).
    Overflow { dropped: String },
}

impl EnqueueOutcome {
    pub fn is_overflow(&self) -> bool {
        matches!(self, EnqueueOutcome::Overflow { .. })
    }
}

#[derive(Debug, Clone)]
struct PendingEntry {
    item: WorkItem,
    seq: u64,
}

#[derive(Debug)]
pub struct WorkQueue {
    capacity: usize,
    next_seq: u64,
    pending: HashMap<String, PendingEntry>,
    order: BTreeMap<(Priority, u64), String>,
    in_flight: HashSet<String>,
    deferred: HashMap<String, WorkItem>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 0,
            pending: HashMap::new(),
            order: BTreeMap::new(),
            in_flight: HashSet::new(),
            deferred: HashMap::new(),
        }
    }

    pub fn enqueue(&mut self, item: WorkItem) -> EnqueueOutcome {
        let priority = item.priority();

        if self.in_flight.contains(&item.sku) {
            if priority == Priority::Low {
                return EnqueueOutcome::Suppressed;
            }
            self.deferred.insert(item.sku.clone(), item);
            return EnqueueOutcome::Deferred;
        }

        if let Some(entry) = self.pending.get_mut(&item.sku) {
            if priority == Priority::Low {
                return EnqueueOutcome::Suppressed;
            }
            if entry.item.priority() == Priority::Low {
                let sku = item.sku.clone();
                self.order.remove(&(Priority::Low, entry.seq));
                self.order.insert((Priority::High, entry.seq), sku);
            }
            entry.item = item;
            return EnqueueOutcome::Coalesced;
        }

        if self.pending.len() >= self.capacity {
            return self.overflow(item);
        }
        self.insert(item);
        EnqueueOutcome::Queued
    }

    fn overflow(&mut self, item: WorkItem) -> EnqueueOutcome {
        if item.priority() == Priority::Low {
            return EnqueueOutcome::Overflow { dropped: item.sku };
        }
        let newest_low = self
            .order
            .range((Priority::Low, 0)..)
            .next_back()
            .map(|(k, sku)| (*k, sku.clone()));
        match newest_low {
            Some((key, victim)) => {
                self.order.remove(&key);
                self.pending.remove(&victim);
                self.insert(item);
                EnqueueOutcome::Overflow { dropped: victim }
            }
            None => EnqueueOutcome::Overflow { dropped: item.sku },
        }
    }

    fn insert(&mut self, item: WorkItem) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((item.priority(), seq), item.sku.clone());
        self.pending.insert(item.sku.clone(), PendingEntry { item, seq });
    }

    /// Pop the next entry and mark it in flight.
    pub fn dequeue(&mut self) -> Option<WorkItem> {
        let (_, sku) = self.order.pop_first()?;
        let entry = self.pending.remove(&sku)?;
        self.in_flight.insert(sku);
        Some(entry.item)
    }

    /// Next entry `dequeue` would return.
    pub fn peek(&self) -> Option<&WorkItem> {
        let (_, sku) = self.order.first_key_value()?;
        self.pending.get(sku).map(|entry| &entry.item)
    }

    /// Release an in-flight SKU, re-queueing any deferred trigger for it.
    pub fn complete(&mut self, sku: &str) {
        if !self.in_flight.remove(sku) {
            return;
        }
        if let Some(item) = self.deferred.remove(sku) {
            // Deferred entries bypass the capacity check: they were accepted
            // while the SKU was in flight.
            self.insert(item);
        }
    }

    /// Remove every pending entry without dispatching it.
    pub fn drain_pending(&mut self) -> Vec<WorkItem> {
        let mut drained = Vec::with_capacity(self.pending.len());
        while let Some((_, sku)) = self.order.pop_first() {
            if let Some(entry) = self.pending.remove(&sku) {
                drained.push(entry.item);
            }
        }
        drained.extend(self.deferred.drain().map(|(_, item)| item));
        drained
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_pending(&self, sku: &str) -> bool {
        self.pending.contains_key(sku)
    }

    pub fn is_in_flight(&self, sku: &str) -> bool {
        self.in_flight.contains(sku)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// No pending, deferred or in-flight work.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty() && self.deferred.is_empty()
    }
}
