//! Bulk cue retrieval, one list at a time.
//!
//! The console answers a count request with a count, then each indexed fetch
//! with a cue-data message; nothing correlates replies to requests, so the
//! engine tracks one explicit session and credits replies by list and index.
//! Overlapping refresh requests are queued and deduplicated.
//!
//! The engine is a pure state machine: the controller feeds it decoded events
//! and the current instant, and applies the [`RefreshAction`]s it returns.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::console::protocol::{ConsoleRequest, CueRecord};

pub const BATCH_SIZE: usize = 10;
pub const BATCH_INTERVAL: Duration = Duration::from_millis(50);
const COUNT_TIMEOUT: Duration = Duration::from_secs(5);

/// Completion deadline once the count is known.
fn fetch_timeout(count: usize) -> Duration {
    Duration::from_secs(5).max(Duration::from_millis(100 * count as u64))
}

#[derive(Debug)]
enum RefreshState {
    Idle,
    AwaitingCount {
        list: u32,
        deadline: Instant,
        fallback_sent: bool,
    },
    Fetching {
        list: u32,
        expected: usize,
        received_indices: HashSet<usize>,
        received_numbers: HashSet<String>,
        next_index: usize,
        deadline: Instant,
    },
}

/// Side effects for the controller to apply, in order.
#[derive(Debug, PartialEq)]
pub enum RefreshAction {
    Send(ConsoleRequest),
    Evict { list: u32, keep: HashSet<String> },
    Persist,
    Started { list: u32 },
    Completed { list: u32, cue_count: usize },
    Failed { list: u32 },
}

#[derive(Debug)]
pub struct RefreshEngine {
    state: RefreshState,
    queue: VecDeque<u32>,
    last_counts: HashMap<u32, usize>,
}

impl Default for RefreshEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshEngine {
    pub fn new() -> Self {
        Self {
            state: RefreshState::Idle,
            queue: VecDeque::new(),
            last_counts: HashMap::new(),
        }
    }

    pub fn in_progress(&self) -> bool {
        !matches!(self.state, RefreshState::Idle)
    }

    pub fn active_list(&self) -> Option<u32> {
        match &self.state {
            RefreshState::Idle => None,
            RefreshState::AwaitingCount { list, .. } => Some(*list),
            RefreshState::Fetching { list, .. } => Some(*list),
        }
    }

    /// Refresh `list`, or queue it if another refresh is running.
    pub fn request(&mut self, list: u32, now: Instant) -> Vec<RefreshAction> {
        if self.active_list() == Some(list) || self.queue.contains(&list) {
            return Vec::new();
        }
        if self.in_progress() {
            self.queue.push_back(list);
            return Vec::new();
        }
        self.start(list, now)
    }

    fn start(&mut self, list: u32, now: Instant) -> Vec<RefreshAction> {
        self.state = RefreshState::AwaitingCount {
            list,
            deadline: now + COUNT_TIMEOUT,
            fallback_sent: false,
        };
        vec![
            RefreshAction::Started { list },
            RefreshAction::Send(ConsoleRequest::CueCount { list }),
        ]
    }

    pub fn on_cue_count(&mut self, list: u32, count: usize, now: Instant) -> Vec<RefreshAction> {
        match self.state {
            RefreshState::AwaitingCount { list: active, .. } if active == list => {
                self.last_counts.insert(list, count);
                if count == 0 {
                    // Nothing to fetch: straight to cleanup.
                    self.state = RefreshState::Fetching {
                        list,
                        expected: 0,
                        received_indices: HashSet::new(),
                        received_numbers: HashSet::new(),
                        next_index: 0,
                        deadline: now,
                    };
                    return self.complete(now);
                }
                self.state = RefreshState::Fetching {
                    list,
                    expected: count,
                    received_indices: HashSet::new(),
                    received_numbers: HashSet::new(),
                    next_index: 0,
                    deadline: now + fetch_timeout(count),
                };
                self.send_batch()
            }
            _ => Vec::new(),
        }
    }

    /// Returns whether the record may be upserted, plus follow-up actions.
    ///
    /// Records for other lists always upsert; they are just not credited to
    /// this session. Records for the refreshing list are dropped while they
    /// cannot be attributed (count not yet established, or index out of
    /// range), so a late reply from an earlier session cannot corrupt this
    /// one's accounting.
    pub fn on_cue_data(&mut self, rec: &CueRecord, now: Instant) -> (bool, Vec<RefreshAction>) {
        match &mut self.state {
            RefreshState::Idle => (true, Vec::new()),
            RefreshState::AwaitingCount {
                list,
                fallback_sent,
                ..
            } => {
                if *list != rec.list {
                    return (true, Vec::new());
                }
                if !*fallback_sent {
                    return (false, Vec::new());
                }
                // The wildcard fallback answered first; its address carries
                // the total, which stands in for the missing count.
                let list = *list;
                let expected = rec.total;
                self.last_counts.insert(list, expected);
                let mut received_indices = HashSet::new();
                received_indices.insert(rec.index);
                let mut received_numbers = HashSet::new();
                received_numbers.insert(rec.number.clone());
                self.state = RefreshState::Fetching {
                    list,
                    expected,
                    received_indices,
                    received_numbers,
                    // The wildcard already requested every cue.
                    next_index: expected,
                    deadline: now + fetch_timeout(expected),
                };
                (true, self.complete_if_done(now))
            }
            RefreshState::Fetching {
                list,
                expected,
                received_indices,
                received_numbers,
                ..
            } => {
                if *list != rec.list {
                    return (true, Vec::new());
                }
                if rec.index >= *expected {
                    return (false, Vec::new());
                }
                received_indices.insert(rec.index);
                received_numbers.insert(rec.number.clone());
                (true, self.complete_if_done(now))
            }
        }
    }

    /// A change notification for a list: a changed count (from a nonzero
    /// baseline) refreshes the whole list, an unchanged one re-fetches just
    /// the touched cue.
    pub fn on_cue_notify(
        &mut self,
        list: u32,
        cue_number: Option<&str>,
        count: usize,
        now: Instant,
    ) -> Vec<RefreshAction> {
        match self.last_counts.get(&list) {
            Some(&prev) if prev != 0 && prev != count => self.request(list, now),
            Some(_) => cue_number
                .map(|number| {
                    vec![RefreshAction::Send(ConsoleRequest::Cue {
                        list,
                        number: number.to_string(),
                    })]
                })
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Driven by the controller's batch ticker.
    pub fn tick(&mut self, now: Instant) -> Vec<RefreshAction> {
        match &self.state {
            RefreshState::Idle => Vec::new(),
            RefreshState::AwaitingCount {
                list,
                deadline,
                fallback_sent,
            } => {
                if now < *deadline {
                    return Vec::new();
                }
                let list = *list;
                if !*fallback_sent {
                    // The count never came; ask louder.
                    self.state = RefreshState::AwaitingCount {
                        list,
                        deadline: now + COUNT_TIMEOUT,
                        fallback_sent: true,
                    };
                    vec![
                        RefreshAction::Send(ConsoleRequest::CueRange { list }),
                        RefreshAction::Send(ConsoleRequest::Cue {
                            list,
                            number: "1".to_string(),
                        }),
                        RefreshAction::Send(ConsoleRequest::CueListWildcard { list }),
                    ]
                } else {
                    // No count and no wildcard data: give up without evicting,
                    // one lost message must not wipe the list.
                    log::warn!("Refresh of cue list {list} failed: no count response");
                    self.state = RefreshState::Idle;
                    let mut actions = vec![RefreshAction::Failed { list }];
                    actions.extend(self.start_next(now));
                    actions
                }
            }
            RefreshState::Fetching { deadline, .. } => {
                if now >= *deadline {
                    log::warn!(
                        "Refresh of cue list {:?} timed out; completing with partial data",
                        self.active_list()
                    );
                    return self.complete(now);
                }
                let mut actions = self.complete_if_done(now);
                if actions.is_empty() {
                    actions = self.send_batch();
                }
                actions
            }
        }
    }

    fn complete_if_done(&mut self, now: Instant) -> Vec<RefreshAction> {
        if let RefreshState::Fetching {
            expected,
            received_indices,
            ..
        } = &self.state
        {
            if received_indices.len() >= *expected {
                return self.complete(now);
            }
        }
        Vec::new()
    }

    fn complete(&mut self, now: Instant) -> Vec<RefreshAction> {
        let state = std::mem::replace(&mut self.state, RefreshState::Idle);
        let RefreshState::Fetching {
            list,
            received_numbers,
            ..
        } = state
        else {
            return Vec::new();
        };
        let cue_count = received_numbers.len();
        let mut actions = vec![
            RefreshAction::Evict {
                list,
                keep: received_numbers,
            },
            RefreshAction::Persist,
            RefreshAction::Completed { list, cue_count },
        ];
        actions.extend(self.start_next(now));
        actions
    }

    fn start_next(&mut self, now: Instant) -> Vec<RefreshAction> {
        match self.queue.pop_front() {
            Some(next) => self.start(next, now),
            None => Vec::new(),
        }
    }

    fn send_batch(&mut self) -> Vec<RefreshAction> {
        let RefreshState::Fetching {
            list,
            expected,
            next_index,
            ..
        } = &mut self.state
        else {
            return Vec::new();
        };
        let end = (*next_index + BATCH_SIZE).min(*expected);
        let actions = (*next_index..end)
            .map(|index| {
                RefreshAction::Send(ConsoleRequest::CueIndex { list: *list, index })
            })
            .collect();
        *next_index = end;
        actions
    }
}
