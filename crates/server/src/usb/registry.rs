//! Transfer registry (C2): the three-queue state machine that tracks every
//! in-flight USB/IP SUBMIT for one session, plus the two small unlink-reply
//! queues.
//!
//! The C source keeps three intrusive lists (`priv_init`, `priv_tx`,
//! `priv_free`) under one `pthread_mutex_t`. We keep the same shape — one
//! [`Mutex`] guarding three FIFOs — but `priv_free` and `unlink_free` carry
//! only bookkeeping markers rather than the record payload: Rust's owner of
//! a [`TransferRecord`] frees its buffer when it drops it, so there is
//! nothing left to reclaim once [`TransferRegistry::drain_tx`] has handed a
//! record to its caller. `reap_free`/`reap_unlink_free` still exist to keep
//! the three-queue invariant (and property 5 of the spec) checkable, but
//! they are bookkeeping-only.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use protocol::{Direction, TransferType, UsbOutcome};
use thiserror::Error;

/// Opaque, stable identity for one registered transfer. Used to correlate a
/// backend completion callback with its [`TransferRecord`] even after
/// `mark_unlinking` has overwritten the record's `seqnum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle(u64);

/// One isochronous packet's bookkeeping, mirrored from the wire descriptor
/// plus the outcome the backend reported for it.
#[derive(Debug, Clone, Copy)]
pub struct IsoSlot {
    pub offset: u32,
    pub length: u32,
    pub actual_length: u32,
    pub status: UsbOutcome,
}

/// One outstanding (or just-completed) USB/IP SUBMIT.
#[derive(Debug)]
pub struct TransferRecord {
    id: TransferHandle,
    /// Correlates to the client's request; rewritten to the UNLINK's own
    /// seqnum once `unlinking` is set, per the wire protocol's correlation
    /// rule for late unlinks.
    pub seqnum: u32,
    pub direction: Direction,
    pub endpoint: u8,
    pub transfer_type: TransferType,
    /// For CONTROL, `buffer[0..8]` is the setup packet and `offset == 8`;
    /// for everything else `offset == 0`.
    pub buffer: Vec<u8>,
    pub offset: usize,
    pub iso_packets: Vec<IsoSlot>,
    pub unlinking: bool,
    pub outcome: Option<UsbOutcome>,
    pub actual_length: usize,
}

impl TransferRecord {
    pub fn handle(&self) -> TransferHandle {
        self.id
    }
}

/// `{seqnum_of_unlink_request, final_status}`.
#[derive(Debug, Clone, Copy)]
pub struct UnlinkRecord {
    pub seqnum: u32,
    pub status: i32,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Mirrors the C source's `calloc` failure path. Rust's global
    /// allocator aborts the process on OOM rather than returning an error,
    /// so this variant exists only so callers can still map a registry
    /// failure onto `ERROR_MALLOC` the way the spec's contract expects.
    #[error("failed to allocate a transfer record")]
    OutOfMemory,
}

/// Result of attempting to mark a transfer as unlinking.
pub enum UnlinkResult {
    /// The target was still in flight; it has been marked `unlinking` and
    /// rekeyed to the UNLINK's own seqnum. The caller must now ask the
    /// backend to cancel it, *outside* the registry lock.
    Cancel(TransferHandle),
    /// No matching transfer was in flight; a successful RET_UNLINK has
    /// already been enqueued on the caller's behalf.
    AlreadyGone,
}

/// Outcome of routing a backend completion through the registry.
pub enum CompletionOutcome {
    /// The transfer was unlinking: no RET_SUBMIT will be sent, a RET_UNLINK
    /// was enqueued instead.
    Suppressed,
    /// The transfer completed normally and is now queued for RET_SUBMIT.
    Completed,
    /// The handle did not match any in-flight transfer (stale completion
    /// after session teardown). Not an error.
    Unknown,
}

#[derive(Default)]
struct Queues {
    priv_init: VecDeque<TransferRecord>,
    priv_tx: VecDeque<TransferRecord>,
    /// Bookkeeping-only: ids whose reply has been handed to the TX caller
    /// and are awaiting `reap_free`.
    priv_free: VecDeque<TransferHandle>,
    unlink_tx: VecDeque<UnlinkRecord>,
    unlink_free: VecDeque<UnlinkRecord>,
}

/// The per-device *priv lock* plus its associated wake signal.
///
/// The C source abuses a second mutex (`tx_waitq`) as a condition variable
/// by locking it in the TX thread and unlocking it from wherever a record
/// is enqueued. We replace that with a real [`Condvar`] paired with the
/// same [`Mutex`] that guards the queues, so "enqueue, then wake" is not
/// observably different from "wake, then enqueue" to the waiter.
pub struct TransferRegistry {
    queues: Mutex<Queues>,
    tx_wake: Condvar,
    next_id: AtomicU64,
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            tx_wake: Condvar::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a record and insert it at the tail of `priv_init`.
    #[allow(clippy::too_many_arguments)]
    pub fn register_submit(
        &self,
        seqnum: u32,
        direction: Direction,
        endpoint: u8,
        transfer_type: TransferType,
        buffer: Vec<u8>,
        offset: usize,
        iso_packets: Vec<IsoSlot>,
    ) -> Result<TransferHandle, RegistryError> {
        let id = TransferHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = TransferRecord {
            id,
            seqnum,
            direction,
            endpoint,
            transfer_type,
            buffer,
            offset,
            iso_packets,
            unlinking: false,
            outcome: None,
            actual_length: 0,
        };
        let mut q = self.queues.lock().unwrap();
        q.priv_init.push_back(record);
        Ok(id)
    }

    /// Look up an in-flight transfer by its current `seqnum` (used before
    /// any unlink has rewritten it).
    pub fn find_in_init(&self, seqnum: u32) -> Option<TransferHandle> {
        let q = self.queues.lock().unwrap();
        q.priv_init
            .iter()
            .find(|r| r.seqnum == seqnum)
            .map(|r| r.id)
    }

    /// Atomically scan `priv_init` for `victim_seqnum` and either mark it
    /// unlinking (rekeying to `unlink_seqnum`) or enqueue an immediate
    /// successful RET_UNLINK if it is not (or no longer) in flight.
    ///
    /// This composes `find_in_init` + `mark_unlinking` (or
    /// `enqueue_ret_unlink`) under a single lock acquisition, matching the
    /// single critical section the RX pipeline's UNLINK dispatch requires.
    pub fn unlink(&self, unlink_seqnum: u32, victim_seqnum: u32) -> UnlinkResult {
        let mut q = self.queues.lock().unwrap();
        if let Some(record) = q
            .priv_init
            .iter_mut()
            .find(|r| r.seqnum == victim_seqnum)
        {
            record.unlinking = true;
            record.seqnum = unlink_seqnum;
            UnlinkResult::Cancel(record.id)
        } else {
            q.unlink_tx.push_back(UnlinkRecord {
                seqnum: unlink_seqnum,
                status: 0,
            });
            self.tx_wake.notify_one();
            UnlinkResult::AlreadyGone
        }
    }

    /// Route a backend completion for `handle`. Moves `priv_init` -> `priv_tx`,
    /// or, if the record was unlinking, removes it and enqueues a
    /// `unlink_tx` reply instead. Always wakes the TX actor on a state
    /// change.
    pub fn on_completion(
        &self,
        handle: TransferHandle,
        outcome: UsbOutcome,
        actual_length: usize,
        buffer: Vec<u8>,
        iso_packets: Vec<IsoSlot>,
    ) -> CompletionOutcome {
        let mut q = self.queues.lock().unwrap();
        let pos = match q.priv_init.iter().position(|r| r.id == handle) {
            Some(pos) => pos,
            None => return CompletionOutcome::Unknown,
        };
        let mut record = q.priv_init.remove(pos).unwrap();
        let result = if record.unlinking {
            q.unlink_tx.push_back(UnlinkRecord {
                seqnum: record.seqnum,
                status: outcome.to_wire_status(),
            });
            CompletionOutcome::Suppressed
        } else {
            record.outcome = Some(outcome);
            record.actual_length = actual_length;
            record.buffer = buffer;
            record.iso_packets = iso_packets;
            q.priv_tx.push_back(record);
            CompletionOutcome::Completed
        };
        self.tx_wake.notify_one();
        result
    }

    /// Move a tweaker-synthesized completion straight from `priv_init` to
    /// `priv_tx` without going through the backend at all. This is the
    /// corrected form of the source's buggy short-circuit path: acquire,
    /// move, release, then wake — never unlock a lock we never took.
    pub fn complete_synthetic(&self, handle: TransferHandle, outcome: UsbOutcome) {
        let mut q = self.queues.lock().unwrap();
        if let Some(pos) = q.priv_init.iter().position(|r| r.id == handle) {
            let mut record = q.priv_init.remove(pos).unwrap();
            record.outcome = Some(outcome);
            record.actual_length = 0;
            q.priv_tx.push_back(record);
        }
        self.tx_wake.notify_one();
    }

    /// Directly enqueue a RET_UNLINK reply, bypassing `priv_init` entirely.
    /// Used when an UNLINK targets a seqnum this session never saw (or has
    /// already freed).
    pub fn enqueue_ret_unlink(&self, seqnum: u32, status: i32) {
        let mut q = self.queues.lock().unwrap();
        q.unlink_tx.push_back(UnlinkRecord { seqnum, status });
        self.tx_wake.notify_one();
    }

    /// Snapshot-move every `priv_tx` entry to `priv_free`, returning them
    /// in FIFO order for the TX pipeline to serialize.
    pub fn drain_tx(&self) -> Vec<TransferRecord> {
        let mut q = self.queues.lock().unwrap();
        let mut out = Vec::with_capacity(q.priv_tx.len());
        while let Some(record) = q.priv_tx.pop_front() {
            q.priv_free.push_back(record.id);
            out.push(record);
        }
        out
    }

    /// Snapshot-move every `unlink_tx` entry to `unlink_free`.
    pub fn drain_unlink_tx(&self) -> Vec<UnlinkRecord> {
        let mut q = self.queues.lock().unwrap();
        let mut out = Vec::with_capacity(q.unlink_tx.len());
        while let Some(unlink) = q.unlink_tx.pop_front() {
            q.unlink_free.push_back(unlink);
            out.push(unlink);
        }
        out
    }

    /// Release everything parked on `priv_free`/`unlink_free`.
    pub fn reap_free(&self) {
        let mut q = self.queues.lock().unwrap();
        q.priv_free.clear();
        q.unlink_free.clear();
    }

    /// Wait until a completion or unlink-reply has been enqueued, up to
    /// `timeout`. Returns without distinguishing *which* queue woke it —
    /// callers re-check both via `drain_tx`/`drain_unlink_tx` regardless,
    /// matching the edge-triggered, no-missed-wakeups contract in §5.
    pub fn wait_for_tx_work(&self, timeout: std::time::Duration) {
        let q = self.queues.lock().unwrap();
        if !q.priv_tx.is_empty() || !q.unlink_tx.is_empty() {
            return;
        }
        let _ = self.tx_wake.wait_timeout(q, timeout).unwrap();
    }

    /// Cancel every transfer still in `priv_init`, returning their handles
    /// so the caller can ask the backend to cancel each one outside the
    /// lock. Used by the coordinator during fatal shutdown.
    pub fn all_in_init(&self) -> Vec<TransferHandle> {
        let q = self.queues.lock().unwrap();
        q.priv_init.iter().map(|r| r.id).collect()
    }

    #[cfg(test)]
    pub fn init_len(&self) -> usize {
        self.queues.lock().unwrap().priv_init.len()
    }

    #[cfg(test)]
    pub fn tx_len(&self) -> usize {
        self.queues.lock().unwrap().priv_tx.len()
    }
}
