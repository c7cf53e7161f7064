//! Background fetches with completion delivered on the owning thread.
//!
//! Each fetch runs on its own worker thread and reports through an mpsc
//! channel. Nothing is applied until the owner calls [`FetchPool::poll`], so
//! the caller's state is only ever touched from the caller's thread.

use crate::{ManifestSource, RemoteError};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of one finished fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Caller-chosen key the fetch was requested under (a package id).
    pub key: String,
    pub url: String,
    pub result: Result<Vec<u8>, RemoteError>,
}

/// Worker message: the ticket of the request plus its outcome.
type Completion = (u64, FetchOutcome);

pub struct FetchPool {
    source: Arc<dyn ManifestSource>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    /// key -> (ticket, url) of every fetch not yet collected.
    in_flight: RefCell<HashMap<String, (u64, String)>>,
    next_ticket: Cell<u64>,
}

impl FetchPool {
    pub fn new(source: Arc<dyn ManifestSource>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            tx,
            rx,
            in_flight: RefCell::new(HashMap::new()),
            next_ticket: Cell::new(0),
        }
    }

    /// Start fetching `url` under `key`. Returns `false` without starting
    /// anything when a fetch for the same key is already in flight.
    pub fn request(&self, key: &str, url: &str) -> bool {
        if self.in_flight.borrow().contains_key(key) {
            debug!("fetch for {key} already in flight, not restarting");
            return false;
        }
        let ticket = self.next_ticket.get();
        self.next_ticket.set(ticket + 1);
        self.in_flight
            .borrow_mut()
            .insert(key.to_owned(), (ticket, url.to_owned()));

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let key_owned = key.to_owned();
        let url_owned = url.to_owned();
        let spawned = thread::Builder::new()
            .name(format!("fetch-{key}"))
            .spawn(move || {
                let result = source.fetch(&url_owned);
                // The receiver is gone once the pool is dropped; nothing left to notify.
                let _ = tx.send((
                    ticket,
                    FetchOutcome {
                        key: key_owned,
                        url: url_owned,
                        result,
                    },
                ));
            });

        if let Err(e) = spawned {
            warn!("cannot spawn fetch worker for {key}: {e}");
            let _ = self.tx.send((
                ticket,
                FetchOutcome {
                    key: key.to_owned(),
                    url: url.to_owned(),
                    result: Err(RemoteError::Io(e)),
                },
            ));
        }
        true
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.borrow().contains_key(key)
    }

    pub fn pending(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Collect every fetch that has finished since the last poll. Never blocks.
    pub fn poll(&self) -> Vec<FetchOutcome> {
        let mut done = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            done.extend(self.finish(completion));
        }
        done
    }

    /// Block until every in-flight fetch has finished or `timeout` elapses.
    /// Fetches still running at the deadline are reported as abandoned and
    /// their late results are dropped by later polls.
    pub fn wait_idle(&self, timeout: Duration) -> Vec<FetchOutcome> {
        let deadline = Instant::now() + timeout;
        let mut done = self.poll();
        while self.pending() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(completion) => done.extend(self.finish(completion)),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        let stragglers: Vec<(String, (u64, String))> =
            self.in_flight.borrow_mut().drain().collect();
        for (key, (_, url)) in stragglers {
            warn!("giving up on fetch of {url}");
            done.push(FetchOutcome {
                result: Err(RemoteError::Abandoned(url.clone())),
                key,
                url,
            });
        }
        done
    }

    /// Retire the request a completion belongs to. Results of abandoned
    /// requests are dropped.
    fn finish(&self, (ticket, outcome): Completion) -> Option<FetchOutcome> {
        let mut in_flight = self.in_flight.borrow_mut();
        match in_flight.get(&outcome.key) {
            Some((current, _)) if *current == ticket => {
                in_flight.remove(&outcome.key);
            }
            _ => {
                debug!("dropping late result for {}", outcome.url);
                return None;
            }
        }
        match &outcome.result {
            Ok(body) => debug!("fetched {} ({} bytes)", outcome.url, body.len()),
            Err(e) => debug!("fetch of {} failed: {e}", outcome.url),
        }
        Some(outcome)
    }
}
