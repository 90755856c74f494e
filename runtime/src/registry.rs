// Copyright 2025, The Embedtor Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The listener registry: kind-keyed handlers dispatched over a copy-on-write
//! snapshot, so listeners may register or cancel during dispatch without
//! invalidating the iteration.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        RwLock,
        Weak,
    },
};

use log::warn;
use tokio::runtime::Handle;

use crate::event::{TorEvent, TorEventKind};

const LOG_TARGET: &str = "runtime::registry";

type Handler = Arc<dyn Fn(&TorEvent) + Send + Sync + 'static>;

/// Registration options. Static listeners survive runtime teardown; an
/// executor handle moves dispatch onto that runtime instead of the event
/// source's task (used by callers that marshal to another thread).
#[derive(Default, Clone)]
pub struct SubscribeOptions {
    pub tag: Option<String>,
    pub is_static: bool,
    pub executor: Option<Handle>,
}

#[derive(Clone)]
struct ListenerRecord {
    id: u64,
    kind: TorEventKind,
    handler: Handler,
    tag: Option<String>,
    is_static: bool,
    executor: Option<Handle>,
}

/// Cancellation handle returned by subscribe. Dropping it does NOT cancel the
/// registration.
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn cancel(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    records: RwLock<Arc<Vec<ListenerRecord>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe<F>(self: &Arc<Self>, kind: TorEventKind, handler: F, options: SubscribeOptions) -> Subscription
    where F: Fn(&TorEvent) + Send + Sync + 'static {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = ListenerRecord {
            id,
            kind,
            handler: Arc::new(handler),
            tag: options.tag,
            is_static: options.is_static,
            executor: options.executor,
        };
        self.mutate(|records| records.push(record));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub fn remove(&self, id: u64) {
        self.mutate(|records| records.retain(|r| r.id != id));
    }

    /// Remove every registration with the given tag.
    pub fn remove_tagged(&self, tag: &str) {
        self.mutate(|records| records.retain(|r| r.tag.as_deref() != Some(tag)));
    }

    /// Drop everything except static registrations. Called on runtime destroy.
    pub fn clear_non_static(&self) {
        self.mutate(|records| records.retain(|r| r.is_static));
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch an event to every listener registered for its kind, in
    /// registration order, over a snapshot. A panicking listener does not stop
    /// dispatch: its panic is re-published as an `Error` event after all other
    /// listeners have run, or re-raised here when no error listener exists.
    pub fn dispatch(&self, event: &TorEvent) {
        let panics = self.dispatch_snapshot(event);
        if panics.is_empty() {
            return;
        }

        let has_error_listener = {
            let records = self.records.read().expect("registry poisoned");
            records.iter().any(|r| r.kind == TorEventKind::Error)
        };
        if !has_error_listener {
            panic::resume_unwind(panics.into_iter().next().expect("checked non-empty"));
        }
        for payload in panics {
            let event = TorEvent::Error {
                message: describe_panic(payload.as_ref()),
            };
            // A panic from an error listener is dropped rather than recursed on
            for nested in self.dispatch_snapshot(&event) {
                warn!(
                    target: LOG_TARGET,
                    "Error listener panicked: {}",
                    describe_panic(nested.as_ref())
                );
            }
        }
    }

    fn dispatch_snapshot(&self, event: &TorEvent) -> Vec<Box<dyn Any + Send>> {
        // Clone the Arc and release the lock before invoking any handler, so
        // handlers may (un)subscribe freely.
        let snapshot = self.records.read().expect("registry poisoned").clone();
        let kind = event.kind();
        let mut panics = Vec::new();
        for record in snapshot.iter().filter(|r| r.kind == kind) {
            match &record.executor {
                Some(handle) => {
                    let handler = record.handler.clone();
                    let event = event.clone();
                    handle.spawn(async move { (handler)(&event) });
                },
                None => {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (record.handler)(event))) {
                        panics.push(payload);
                    }
                },
            }
        }
        panics
    }

    fn mutate<F: FnOnce(&mut Vec<ListenerRecord>)>(&self, f: F) {
        let mut guard = self.records.write().expect("registry poisoned");
        let mut records = (**guard).clone();
        f(&mut records);
        *guard = Arc::new(records);
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::state::TorState;

    fn state_event() -> TorEvent {
        TorEvent::State(TorState::new())
    }

    #[test]
    fn listeners_see_events_for_their_kind_exactly_once() {
        let registry = ListenerRegistry::new();
        let state_count = Arc::new(AtomicUsize::new(0));
        let log_count = Arc::new(AtomicUsize::new(0));

        let _s1 = registry.subscribe(
            TorEventKind::State,
            {
                let state_count = state_count.clone();
                move |_| {
                    state_count.fetch_add(1, Ordering::SeqCst);
                }
            },
            SubscribeOptions::default(),
        );
        let _s2 = registry.subscribe(
            TorEventKind::ProcessLog,
            {
                let log_count = log_count.clone();
                move |_| {
                    log_count.fetch_add(1, Ordering::SeqCst);
                }
            },
            SubscribeOptions::default(),
        );

        registry.dispatch(&state_event());
        assert_eq!(state_count.load(Ordering::SeqCst), 1);
        assert_eq!(log_count.load(Ordering::SeqCst), 0);

        // A listener registered after the event does not see it
        let late_count = Arc::new(AtomicUsize::new(0));
        let _s3 = registry.subscribe(
            TorEventKind::State,
            {
                let late_count = late_count.clone();
                move |_| {
                    late_count.fetch_add(1, Ordering::SeqCst);
                }
            },
            SubscribeOptions::default(),
        );
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        registry.dispatch(&state_event());
        assert_eq!(state_count.load(Ordering::SeqCst), 2);
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_stops_delivery() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = registry.subscribe(
            TorEventKind::State,
            {
                let count = count.clone();
                move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            },
            SubscribeOptions::default(),
        );
        registry.dispatch(&state_event());
        sub.cancel();
        registry.dispatch(&state_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_becomes_an_error_event_after_others_ran() {
        let registry = ListenerRegistry::new();
        let survivor = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(RwLock::new(Vec::new()));

        let _p = registry.subscribe(
            TorEventKind::State,
            |_| panic!("listener blew up"),
            SubscribeOptions::default(),
        );
        let _s = registry.subscribe(
            TorEventKind::State,
            {
                let survivor = survivor.clone();
                move |_| {
                    survivor.fetch_add(1, Ordering::SeqCst);
                }
            },
            SubscribeOptions::default(),
        );
        let _e = registry.subscribe(
            TorEventKind::Error,
            {
                let errors = errors.clone();
                move |event| {
                    if let TorEvent::Error { message } = event {
                        errors.write().unwrap().push(message.clone());
                    }
                }
            },
            SubscribeOptions::default(),
        );

        registry.dispatch(&state_event());
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
        assert_eq!(errors.read().unwrap().as_slice(), &["listener blew up".to_string()]);
    }

    #[test]
    fn panic_with_no_error_listener_is_raised_after_dispatch() {
        let registry = ListenerRegistry::new();
        let survivor = Arc::new(AtomicUsize::new(0));
        let _p = registry.subscribe(TorEventKind::State, |_| panic!("boom"), SubscribeOptions::default());
        let _s = registry.subscribe(
            TorEventKind::State,
            {
                let survivor = survivor.clone();
                move |_| {
                    survivor.fetch_add(1, Ordering::SeqCst);
                }
            },
            SubscribeOptions::default(),
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| registry.dispatch(&state_event())));
        assert!(result.is_err());
        // The other listener still ran first
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_non_static_keeps_static_registrations() {
        let registry = ListenerRegistry::new();
        let _plain = registry.subscribe(TorEventKind::State, |_| {}, SubscribeOptions::default());
        let _static_sub = registry.subscribe(TorEventKind::State, |_| {}, SubscribeOptions {
            is_static: true,
            ..Default::default()
        });
        let _tagged = registry.subscribe(TorEventKind::ProcessLog, |_| {}, SubscribeOptions {
            tag: Some("ui".to_string()),
            ..Default::default()
        });
        assert_eq!(registry.len(), 3);

        registry.remove_tagged("ui");
        assert_eq!(registry.len(), 2);

        registry.clear_non_static();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn listeners_may_subscribe_during_dispatch() {
        let registry = ListenerRegistry::new();
        let registry2 = registry.clone();
        let _s = registry.subscribe(
            TorEventKind::State,
            move |_| {
                let _ = registry2.subscribe(TorEventKind::State, |_| {}, SubscribeOptions::default());
            },
            SubscribeOptions::default(),
        );
        registry.dispatch(&state_event());
        assert_eq!(registry.len(), 2);
    }
}
