//! Background refresh, one thread per view.
//!
//! Each poller runs at most one request at a time and re-runs the latest
//! query on a fixed interval while its view is active. Every request is
//! stamped with a generation; the UI applies a result only if its
//! generation is still the newest one it asked for, so a slow response can
//! never overwrite a newer one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use recorder_api::{ApiClient, SubscribedRoom};
use recorder_types::{ConvertTask, FileEntry, RecordTask};

use super::app::Tab;
use crate::format::error_text;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Query {
    Records,
    Files { dir: String },
    Converts,
    Subscriptions,
}

impl Query {
    pub(crate) fn for_tab(tab: Tab) -> Self {
        match tab {
            Tab::Records => Query::Records,
            Tab::Files => Query::Files { dir: String::new() },
            Tab::Converts => Query::Converts,
            Tab::Subscriptions => Query::Subscriptions,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Payload {
    Records(Vec<RecordTask>),
    Files { dir: String, entries: Vec<FileEntry> },
    Converts(Vec<ConvertTask>),
    Subscriptions(Vec<SubscribedRoom>),
}

#[derive(Debug)]
pub(crate) struct Refreshed {
    pub(crate) tab: Tab,
    pub(crate) generation: u64,
    pub(crate) result: Result<Payload, String>,
}

struct Request {
    generation: u64,
    query: Query,
}

pub(crate) struct Poller {
    tab: Tab,
    tx: Sender<Request>,
    active: Arc<AtomicBool>,
    generation: u64,
    query: Query,
}

impl Poller {
    pub(crate) fn spawn(
        tab: Tab,
        api: Arc<ApiClient>,
        interval: Duration,
        done: Sender<Refreshed>,
    ) -> Self {
        let (tx, rx) = unbounded::<Request>();
        let active = Arc::new(AtomicBool::new(false));
        std::thread::spawn({
            let active = active.clone();
            move || poll_loop(tab, &api, interval, &rx, &active, &done)
        });
        Self {
            tab,
            tx,
            active,
            generation: 0,
            query: Query::for_tab(tab),
        }
    }

    /// A poller with no thread behind it; requests go nowhere.
    #[cfg(test)]
    pub(crate) fn detached(tab: Tab) -> Self {
        let (tx, _rx) = unbounded::<Request>();
        Self {
            tab,
            tx,
            active: Arc::new(AtomicBool::new(false)),
            generation: 0,
            query: Query::for_tab(tab),
        }
    }

    pub(crate) fn tab(&self) -> Tab {
        self.tab
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn query(&self) -> &Query {
        &self.query
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Ask for a fresh result; anything older in flight becomes stale.
    pub(crate) fn refresh(&mut self) {
        self.generation += 1;
        let req = Request {
            generation: self.generation,
            query: self.query.clone(),
        };
        if self.tx.send(req).is_err() {
            tracing::debug!(tab = ?self.tab, "poller thread is gone");
        }
    }

    pub(crate) fn retarget(&mut self, query: Query) {
        self.query = query;
        self.refresh();
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}

fn poll_loop(
    tab: Tab,
    api: &ApiClient,
    interval: Duration,
    rx: &Receiver<Request>,
    active: &AtomicBool,
    done: &Sender<Refreshed>,
) {
    let mut current: Option<Request> = None;
    loop {
        match rx.recv_timeout(interval) {
            Ok(mut req) => {
                // Only the newest queued request matters.
                while let Ok(newer) = rx.try_recv() {
                    req = newer;
                }
                current = Some(req);
            }
            Err(RecvTimeoutError::Timeout) => {
                if !active.load(Ordering::Relaxed) {
                    continue;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(req) = current.as_ref() else {
            continue;
        };
        let result = fetch(api, &req.query);
        let msg = Refreshed {
            tab,
            generation: req.generation,
            result,
        };
        if done.send(msg).is_err() {
            break;
        }
    }
}

fn fetch(api: &ApiClient, query: &Query) -> Result<Payload, String> {
    let payload = match query {
        Query::Records => api.record_tasks().map(Payload::Records),
        Query::Files { dir } => api.browse(dir).map(|entries| Payload::Files {
            dir: dir.clone(),
            entries,
        }),
        Query::Converts => api.convert_tasks().map(Payload::Converts),
        Query::Subscriptions => api.subscriptions().map(Payload::Subscriptions),
    };
    payload.map_err(|err| error_text(&err))
}
