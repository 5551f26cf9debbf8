//! # Receipt Aggregator
//!
//! Merges the receipt stream and the inclusion-list stream of one block into
//! a single ordered result, whatever order the two streams arrive in.
//!
//! ## State Machine
//!
//! ```text
//!            receipts                  receipts
//!          ┌─────────┐              ┌─────────┐
//!          ▼         │              ▼         │
//!       ┌──────┐ ────┘  inclusion ┌────────────┐ ───┘
//!  ───▶ │ Init │ ───────────────▶ │ Collecting │
//!       │      │ ◀─────────────── │            │
//!       └──────┘  completed, gap  └────────────┘
//!          ▲  │ inclusion (covered)      │ receipts (covered)
//!          │  ▼                          ▼
//!          │ ┌──────────────────────────────┐
//!          └─│             Done             │
//! completed  └──────────────────────────────┘
//! ```
//!
//! The transition function is pure: [`transition`] takes the current
//! [`CycleState`] and one [`CycleEvent`] and returns the next state plus an
//! [`Outcome`]. [`ReceiptAggregator`] owns the state, queues events the
//! current phase does not accept and replays them after each phase change.
//!
//! Receipts are held per `(height, transaction hash)`. A batch for a later
//! block arriving mid-cycle waits in the buffer for its own cycle.
//!
//! A cycle that can no longer be covered is abandoned: when the block
//! completes (or a later one does) before all listed receipts arrived, or
//! when the subscription reports lost events while collecting.

use shared_types::entities::{
    BlockCompletion, BlockNumber, Hash, InclusionList, Receipt,
    SelectedReceipts,
};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::mem;
use tracing::{debug, info, warn};

/// Input of the aggregation state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// A batch of receipts.
    Receipts {
        height: BlockNumber,
        round: u64,
        receipts: Vec<Receipt>,
    },
    /// The ordered inclusion list of a block.
    InclusionList(InclusionList),
    /// The block-completed signal.
    BlockCompleted(BlockCompletion),
    /// Upstream events were lost before reaching the aggregator.
    StreamGap { missed: u64 },
}

impl CycleEvent {
    fn name(&self) -> &'static str {
        match self {
            CycleEvent::Receipts { .. } => "receipts",
            CycleEvent::InclusionList(_) => "inclusion_list",
            CycleEvent::BlockCompleted(_) => "block_completed",
            CycleEvent::StreamGap { .. } => "stream_gap",
        }
    }
}

/// Phase of the current aggregation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Accepting receipts and the inclusion list.
    #[default]
    Init,
    /// Inclusion list known, waiting for the remaining receipts.
    Collecting,
    /// Result emitted for the given list, waiting for block completion.
    Done { height: BlockNumber, round: u64 },
}

/// Data accumulated during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleData {
    receipts: HashMap<(BlockNumber, Hash), Receipt>,
    list: Option<InclusionList>,
}

impl CycleData {
    /// Store receipts, keeping the first receipt seen for a hash at a height.
    fn ingest(&mut self, height: BlockNumber, receipts: Vec<Receipt>) -> usize {
        let mut duplicates = 0;
        for receipt in receipts {
            match self.receipts.entry((height, receipt.transaction_hash)) {
                Entry::Occupied(_) => duplicates += 1,
                Entry::Vacant(slot) => {
                    slot.insert(receipt);
                }
            }
        }
        duplicates
    }

    /// Listed hashes with no receipt yet.
    fn missing(&self, list: &InclusionList) -> usize {
        list.tx_hashes
            .iter()
            .filter(|hash| !self.receipts.contains_key(&(list.height, **hash)))
            .count()
    }

    fn is_covered(&self) -> bool {
        self.list.as_ref().is_some_and(|list| self.missing(list) == 0)
    }

    /// Build the ordered result and report buffered receipts at or below the
    /// list's height that the list does not name.
    fn select(&self, list: &InclusionList) -> (SelectedReceipts, Vec<Hash>) {
        let receipts = list
            .tx_hashes
            .iter()
            .filter_map(|hash| self.receipts.get(&(list.height, *hash)).cloned())
            .collect();

        let listed: HashSet<&Hash> = list.tx_hashes.iter().collect();
        let mut orphaned: Vec<Hash> = self
            .receipts
            .keys()
            .filter(|(height, hash)| {
                *height < list.height || (*height == list.height && !listed.contains(hash))
            })
            .map(|(_, hash)| *hash)
            .collect();
        orphaned.sort();

        let selected = SelectedReceipts {
            height: list.height,
            round: list.round,
            receipts,
        };
        (selected, orphaned)
    }

    /// Data for the next cycle: only receipts of blocks above `height`.
    fn carry_over(self, height: BlockNumber) -> Self {
        let receipts = self
            .receipts
            .into_iter()
            .filter(|((at, _), _)| *at > height)
            .collect();
        Self {
            receipts,
            list: None,
        }
    }

    pub fn receipt_count(&self) -> usize {
        self.receipts.len()
    }

    pub fn inclusion_list(&self) -> Option<&InclusionList> {
        self.list.as_ref()
    }
}

/// Complete aggregation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleState {
    pub phase: Phase,
    pub data: CycleData,
    /// Height of the last block whose cycle is closed.
    pub last_completed: Option<BlockNumber>,
}

impl CycleState {
    fn is_closed(&self, height: BlockNumber) -> bool {
        self.last_completed.is_some_and(|last| height <= last)
    }
}

/// Why an unfinished cycle was given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonCause {
    /// A block at this height completed first.
    Completed(BlockNumber),
    /// The subscription lost this many events.
    StreamGap(u64),
}

impl fmt::Display for AbandonCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonCause::Completed(height) => write!(f, "block {height} completed first"),
            AbandonCause::StreamGap(missed) => write!(f, "{missed} upstream events lost"),
        }
    }
}

/// Non-fatal irregularities observed while aggregating.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Anomaly {
    #[error("block completion for height {height} repeats or precedes last completed {last_completed}")]
    DuplicateCompletion {
        height: BlockNumber,
        last_completed: BlockNumber,
    },
    #[error("block completion for height {height} arrived during the cycle of height {cycle}")]
    StaleCompletion {
        height: BlockNumber,
        cycle: BlockNumber,
    },
    #[error("second inclusion list for height {height} in the same cycle")]
    DuplicateInclusionList { height: BlockNumber },
    #[error("inclusion list for already completed height {height}")]
    StaleInclusionList { height: BlockNumber },
    #[error("{count} receipts for already completed height {height}")]
    StaleReceipts { height: BlockNumber, count: usize },
    #[error("{count} receipts at height {height} are not in the inclusion list")]
    OrphanedReceipts { height: BlockNumber, count: usize },
    #[error("abandoned cycle for height {height} with {missing} receipts missing: {cause}")]
    AbandonedCycle {
        height: BlockNumber,
        missing: usize,
        cause: AbandonCause,
    },
    #[error("deferred queue full, dropped oldest {event} event")]
    DeferredOverflow { event: &'static str },
}

/// What a single transition produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Event consumed, nothing to emit yet.
    Pending,
    /// The cycle completed and produced its ordered result.
    Emitted {
        selected: SelectedReceipts,
        /// Receipts dropped because the list does not name them.
        orphaned: Vec<Hash>,
    },
    /// The cycle was discarded by a block-completed signal.
    Reset { height: BlockNumber },
    /// The cycle was discarded without a result. `requeue` is an event that
    /// belongs to a later cycle and must be applied again.
    Abandoned {
        anomaly: Anomaly,
        requeue: Option<CycleEvent>,
    },
    /// The current phase does not accept the event.
    Deferred(CycleEvent),
    /// The event was discarded.
    Dropped(Anomaly),
}

/// Pure transition of the aggregation state machine.
pub fn transition(mut state: CycleState, event: CycleEvent) -> (CycleState, Outcome) {
    if let Some(anomaly) = stale(&state, &event) {
        return (state, Outcome::Dropped(anomaly));
    }

    match (state.phase, event) {
        (Phase::Init | Phase::Collecting, CycleEvent::Receipts { height, receipts, .. }) => {
            state.data.ingest(height, receipts);
            try_emit(state)
        }
        (Phase::Init, CycleEvent::InclusionList(list)) => {
            state.data.list = Some(list);
            try_emit(state)
        }
        (Phase::Collecting, CycleEvent::InclusionList(list)) => {
            let buffered = state.data.list.as_ref().map(|l| l.height);
            if buffered == Some(list.height) {
                let anomaly = Anomaly::DuplicateInclusionList {
                    height: list.height,
                };
                (state, Outcome::Dropped(anomaly))
            } else {
                (state, Outcome::Deferred(CycleEvent::InclusionList(list)))
            }
        }
        (Phase::Done { height, .. }, CycleEvent::BlockCompleted(completion)) => {
            if completion.height < height {
                stale_completion(state, completion.height, height)
            } else {
                reset(state, completion)
            }
        }
        (Phase::Init | Phase::Collecting, CycleEvent::BlockCompleted(completion))
            if !completion.status.is_success() =>
        {
            // a failed block aborts the cycle; its result would never be used
            reset(state, completion)
        }
        (Phase::Collecting, CycleEvent::BlockCompleted(completion)) => {
            let cycle = state.data.list.as_ref().map_or(0, |list| list.height);
            if completion.height < cycle {
                stale_completion(state, completion.height, cycle)
            } else {
                let cause = AbandonCause::Completed(completion.height);
                let requeue = (completion.height > cycle)
                    .then_some(CycleEvent::BlockCompleted(completion));
                abandon(state, cause, requeue)
            }
        }
        (Phase::Collecting, CycleEvent::StreamGap { missed }) => {
            abandon(state, AbandonCause::StreamGap(missed), None)
        }
        // nothing partial to discard
        (Phase::Init | Phase::Done { .. }, CycleEvent::StreamGap { .. }) => {
            (state, Outcome::Pending)
        }
        (_, event) => (state, Outcome::Deferred(event)),
    }
}

/// Events for a height whose cycle is already closed.
fn stale(state: &CycleState, event: &CycleEvent) -> Option<Anomaly> {
    let last_completed = state.last_completed?;
    match event {
        CycleEvent::BlockCompleted(completion) if state.is_closed(completion.height) => {
            Some(Anomaly::DuplicateCompletion {
                height: completion.height,
                last_completed,
            })
        }
        CycleEvent::InclusionList(list) if state.is_closed(list.height) => {
            Some(Anomaly::StaleInclusionList {
                height: list.height,
            })
        }
        CycleEvent::Receipts {
            height, receipts, ..
        } if state.is_closed(*height) => Some(Anomaly::StaleReceipts {
            height: *height,
            count: receipts.len(),
        }),
        _ => None,
    }
}

fn try_emit(mut state: CycleState) -> (CycleState, Outcome) {
    if !state.data.is_covered() {
        state.phase = if state.data.list.is_some() {
            Phase::Collecting
        } else {
            Phase::Init
        };
        return (state, Outcome::Pending);
    }

    let Some(list) = state.data.list.take() else {
        return (state, Outcome::Pending);
    };
    let (selected, orphaned) = state.data.select(&list);

    state.data = mem::take(&mut state.data).carry_over(list.height);
    state.phase = Phase::Done {
        height: list.height,
        round: list.round,
    };
    (state, Outcome::Emitted { selected, orphaned })
}

fn reset(mut state: CycleState, completion: BlockCompletion) -> (CycleState, Outcome) {
    state.phase = Phase::Init;
    state.data = mem::take(&mut state.data).carry_over(completion.height);
    state.last_completed = Some(completion.height);
    (
        state,
        Outcome::Reset {
            height: completion.height,
        },
    )
}

fn abandon(
    mut state: CycleState,
    cause: AbandonCause,
    requeue: Option<CycleEvent>,
) -> (CycleState, Outcome) {
    let data = mem::take(&mut state.data);
    let (height, missing) = data
        .list
        .as_ref()
        .map_or((0, 0), |list| (list.height, data.missing(list)));

    state.data = data.carry_over(height);
    state.phase = Phase::Init;
    state.last_completed = Some(height);

    let anomaly = Anomaly::AbandonedCycle {
        height,
        missing,
        cause,
    };
    (state, Outcome::Abandoned { anomaly, requeue })
}

fn stale_completion(
    mut state: CycleState,
    height: BlockNumber,
    cycle: BlockNumber,
) -> (CycleState, Outcome) {
    state.last_completed = Some(height);
    (state, Outcome::Dropped(Anomaly::StaleCompletion { height, cycle }))
}

/// Stateful driver around [`transition`].
#[derive(Debug)]
pub struct ReceiptAggregator {
    state: CycleState,
    deferred: VecDeque<CycleEvent>,
    max_deferred: usize,
}

impl ReceiptAggregator {
    pub fn new(max_deferred: usize) -> Self {
        Self {
            state: CycleState::default(),
            deferred: VecDeque::new(),
            max_deferred: max_deferred.max(1),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Feed one event. Returns every result emitted, including results
    /// unlocked by replaying deferred events.
    pub fn handle(&mut self, event: CycleEvent) -> Vec<SelectedReceipts> {
        let mut emitted = Vec::new();
        if self.apply(event, &mut emitted) {
            self.replay(&mut emitted);
        }
        emitted
    }

    /// Apply one event. Returns true if the phase changed.
    fn apply(&mut self, event: CycleEvent, emitted: &mut Vec<SelectedReceipts>) -> bool {
        let before = mem::discriminant(&self.state.phase);
        let (next, outcome) = transition(mem::take(&mut self.state), event);
        self.state = next;

        match outcome {
            Outcome::Pending => {}
            Outcome::Emitted { selected, orphaned } => {
                if !orphaned.is_empty() {
                    let anomaly = Anomaly::OrphanedReceipts {
                        height: selected.height,
                        count: orphaned.len(),
                    };
                    warn!(orphaned = ?orphaned, "{anomaly}");
                }
                info!(
                    height = selected.height,
                    round = selected.round,
                    receipts = selected.receipts.len(),
                    "Selected receipts for block"
                );
                emitted.push(selected);
            }
            Outcome::Reset { height } => {
                debug!(height = height, "Aggregation cycle reset");
            }
            Outcome::Abandoned { anomaly, requeue } => {
                warn!("{anomaly}");
                if let Some(event) = requeue {
                    self.defer(event);
                }
            }
            Outcome::Deferred(event) => self.defer(event),
            Outcome::Dropped(anomaly) => warn!("{anomaly}"),
        }

        before != mem::discriminant(&self.state.phase)
    }

    fn defer(&mut self, event: CycleEvent) {
        if self.deferred.len() >= self.max_deferred {
            if let Some(dropped) = self.deferred.pop_front() {
                let anomaly = Anomaly::DeferredOverflow {
                    event: dropped.name(),
                };
                warn!(capacity = self.max_deferred, "{anomaly}");
            }
        }
        debug!(event = event.name(), phase = ?self.state.phase, "Deferred event");
        self.deferred.push_back(event);
    }

    /// Replay deferred events in arrival order until a full pass makes no
    /// progress.
    fn replay(&mut self, emitted: &mut Vec<SelectedReceipts>) {
        loop {
            let queued = mem::take(&mut self.deferred);
            let before = queued.len();
            for event in queued {
                self.apply(event, emitted);
            }
            if self.deferred.len() >= before {
                break;
            }
        }
    }
}

impl Default for ReceiptAggregator {
    fn default() -> Self {
        Self::new(1024)
    }
}
