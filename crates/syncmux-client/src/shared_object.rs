//! The subscriber half of a replicated object: subscribe/await-init,
//! ordered update application, version-gap and apply-failure recovery by
//! re-subscribing, and rolling latency sampling.

use crate::mux::{ClientMux, EndpointHandler};
use serde_json::Value;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use syncmux_core::{apply_delta, CoreError, ReadOnlyView};
use syncmux_wire::delta::Delta;
use syncmux_wire::SyncMuxError;
use tokio::sync::{broadcast, oneshot};
use tracing::warn;

#[derive(Debug, Clone)]
pub enum SharedObjectEvent {
    Init,
    Update,
    Disconnected,
    Timing { average_ms: f64 },
}

struct Replica {
    local: Option<Value>,
    v_local: u64,
    pending_init: Option<oneshot::Sender<(u64, Value)>>,
    /// Set whenever a `sub` has gone out and we're waiting on its `init`,
    /// independent of whether a caller is blocked on [`pending_init`]. The
    /// init-timeout retry loop watches this rather than `pending_init` so
    /// re-subscribes triggered by divergence (no waiting caller) still get
    /// retried on timeout.
    awaiting_init: bool,
    latencies_ms: Vec<f64>,
}

/// A client-side replica of one SharedObject endpoint. Construct one per
/// endpoint and register it with a [`ClientMux`] via
/// [`SharedObjectClient::attach`].
pub struct SharedObjectClient {
    endpoint: String,
    mux: Arc<ClientMux>,
    init_timeout: Duration,
    replica: Mutex<Replica>,
    events: broadcast::Sender<SharedObjectEvent>,
    /// Lets `&self` methods (the [`EndpointHandler`] callbacks only ever get
    /// `&self`) obtain an owned `Arc<Self>` to hand to `tokio::spawn` when
    /// (re)arming the init-timeout.
    self_weak: Mutex<Weak<SharedObjectClient>>,
}

impl SharedObjectClient {
    pub fn new(endpoint: impl Into<String>, mux: Arc<ClientMux>, init_timeout: Duration) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        let this = Arc::new(Self {
            endpoint: endpoint.into(),
            mux,
            init_timeout,
            replica: Mutex::new(Replica {
                local: None,
                v_local: 0,
                pending_init: None,
                awaiting_init: false,
                latencies_ms: Vec::new(),
            }),
            events,
            self_weak: Mutex::new(Weak::new()),
        });
        *this.self_weak.lock().unwrap() = Arc::downgrade(&this);
        this.mux.register_handler(&this.endpoint, this.clone() as Arc<dyn EndpointHandler>);
        let timing = this.clone();
        tokio::spawn(async move { timing.timing_loop().await });
        this
    }

    pub fn events(&self) -> broadcast::Receiver<SharedObjectEvent> {
        self.events.subscribe()
    }

    pub fn ready(&self) -> bool {
        self.replica.lock().unwrap().local.is_some()
    }

    pub fn version(&self) -> u64 {
        self.replica.lock().unwrap().v_local
    }

    /// A read-only view of local state; call only after [`ready`](Self::ready).
    pub fn data(&self) -> Result<Value, CoreError> {
        let guard = self.replica.lock().unwrap();
        let Some(local) = &guard.local else {
            return Err(CoreError::PathNotFound { path: Vec::new() });
        };
        Ok(local.clone())
    }

    /// Subscribe, returning `(v, data)` on the first init. Idempotent —
    /// calling again while already subscribed just ensures the init-timeout
    /// is running.
    pub async fn subscribe(self: &Arc<Self>) -> Result<(u64, Value), SyncMuxError> {
        let rx = {
            let mut guard = self.replica.lock().unwrap();
            if guard.local.is_some() {
                return Ok((guard.v_local, guard.local.clone().unwrap()));
            }
            if guard.pending_init.is_none() {
                let (tx, rx) = oneshot::channel();
                guard.pending_init = Some(tx);
                guard.awaiting_init = true;
                drop(guard);
                self.mux.subscribe(&self.endpoint);
                self.arm_init_timeout();
                rx
            } else {
                return Err(SyncMuxError::Timeout {
                    what: format!("subscribe already in flight for {}", self.endpoint),
                });
            }
        };
        rx.await.map_err(|_| SyncMuxError::ConnectionFailed {
            message: format!("connection closed while awaiting init for {}", self.endpoint),
        })
    }

    pub fn unsubscribe(&self) {
        self.mux.unsubscribe(&self.endpoint);
        let mut guard = self.replica.lock().unwrap();
        guard.local = None;
        guard.v_local = 0;
        guard.awaiting_init = false;
        if let Some(pending) = guard.pending_init.take() {
            drop(pending);
        }
    }

    /// (Re)arm the init-timeout retry loop. Safe to call from a plain
    /// `&self` context (e.g. [`enter_divergence`](Self::enter_divergence)):
    /// upgrades the stored weak self-reference rather than requiring an
    /// owned `Arc<Self>` from the caller.
    fn arm_init_timeout(&self) {
        let Some(this) = self.self_weak.lock().unwrap().upgrade() else { return };
        let timeout = self.init_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let still_waiting = {
                let guard = this.replica.lock().unwrap();
                guard.local.is_none() && guard.awaiting_init
            };
            if still_waiting {
                warn!(endpoint = %this.endpoint, "init timeout, re-subscribing");
                this.mux.subscribe(&this.endpoint);
                this.arm_init_timeout();
            }
        });
    }

    async fn timing_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        interval.tick().await;
        loop {
            interval.tick().await;
            let average = {
                let mut guard = self.replica.lock().unwrap();
                if guard.latencies_ms.is_empty() {
                    None
                } else {
                    let sum: f64 = guard.latencies_ms.iter().sum();
                    let average = sum / guard.latencies_ms.len() as f64;
                    guard.latencies_ms.clear();
                    Some(average)
                }
            };
            if let Some(average_ms) = average {
                let _ = self.events.send(SharedObjectEvent::Timing { average_ms });
            }
        }
    }

    fn enter_divergence(&self) {
        let mut guard = self.replica.lock().unwrap();
        guard.local = None;
        guard.v_local = 0;
        guard.awaiting_init = true;
        drop(guard);
        let _ = self.events.send(SharedObjectEvent::Disconnected);
        self.mux.subscribe(&self.endpoint);
        self.arm_init_timeout();
    }
}

impl EndpointHandler for SharedObjectClient {
    fn on_init(&self, data: Value, v: u64) {
        let mut guard = self.replica.lock().unwrap();
        guard.local = Some(data.clone());
        guard.v_local = v;
        guard.awaiting_init = false;
        if let Some(pending) = guard.pending_init.take() {
            let _ = pending.send((v, data));
        }
        drop(guard);
        let _ = self.events.send(SharedObjectEvent::Init);
    }

    fn on_update(&self, delta: Delta, v: u64, now: String) {
        let not_ready = self.replica.lock().unwrap().local.is_none();
        if not_ready {
            return;
        }
        let expected = self.replica.lock().unwrap().v_local + 1;
        if v != expected {
            warn!(endpoint = %self.endpoint, expected, got = v, "version gap, treating as divergence");
            self.enter_divergence();
            return;
        }
        let mut guard = self.replica.lock().unwrap();
        let Some(local) = guard.local.as_mut() else { return };
        if let Err(e) = apply_delta(local, &delta) {
            warn!(endpoint = %self.endpoint, error = %e, "delta apply failed, treating as divergence");
            drop(guard);
            self.enter_divergence();
            return;
        }
        guard.v_local = v;
        if let Some(sent_at) = syncmux_core::date_format::try_parse(&Value::String(now)) {
            let elapsed_ms = (chrono::Utc::now() - sent_at).num_milliseconds().max(0) as f64;
            guard.latencies_ms.push(elapsed_ms);
        }
        drop(guard);
        let _ = self.events.send(SharedObjectEvent::Update);
    }

    fn on_disconnected(&self) {
        self.enter_divergence();
    }
}

/// A transparent, read-only wrapper a caller can hold instead of re-reading
/// `SharedObjectClient::data()` for every field access.
pub fn read_only(value: &Value) -> ReadOnlyView<'_> {
    ReadOnlyView::new(value)
}
