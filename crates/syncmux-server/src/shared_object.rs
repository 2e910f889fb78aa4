//! The authoritative half of a replicated object: owns the value, its
//! snapshot baseline, the monotonic version counter, and the pending-path
//! batching that backs `autoNotify`.

use crate::hub::{Hub, InitHandler};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use syncmux_core::{
    compute_delta_for_path, apply_delta, nav, CoreError, Intercepted, PathTree, SchemaResolver,
};
use syncmux_wire::delta::Delta;
use syncmux_wire::frame::ServerFrame;
use syncmux_wire::path::Path;
use tracing::{error, warn};

struct State {
    intercepted: Intercepted,
    scratch: Arc<Mutex<Vec<Path>>>,
    snapshot: Value,
    v: u64,
    pending: PathTree,
    flush_scheduled: bool,
}

/// Owns a server-authoritative JSON value replicated to every subscriber of
/// `endpoint`. Mutate it through [`SharedObjectServer::set`] and friends (or
/// [`SharedObjectServer::mutate`] for a batch) and either let `autoNotify`
/// publish the change on the next cooperative turn, or call
/// [`SharedObjectServer::notify`] yourself when the descriptor disables it.
pub struct SharedObjectServer {
    endpoint: String,
    hub: Arc<Hub>,
    schema: SchemaResolver,
    auto_notify: bool,
    manual_notify_warned: AtomicBool,
    state: Mutex<State>,
}

impl SharedObjectServer {
    pub fn new(
        endpoint: impl Into<String>,
        hub: Arc<Hub>,
        object_schema: Value,
        auto_notify: bool,
        initial: Value,
    ) -> Result<Arc<Self>, CoreError> {
        let schema = SchemaResolver::new(object_schema)?;
        if let Err(e) = schema.validate_root(&initial) {
            return Err(CoreError::SchemaInvalid { path: Vec::new(), message: e });
        }
        let snapshot = initial.clone();
        let scratch: Arc<Mutex<Vec<Path>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_scratch = scratch.clone();
        let intercepted = Intercepted::new(initial, move |path| {
            sink_scratch.lock().unwrap().push(path);
        })?;

        let endpoint = endpoint.into();
        let server = Arc::new(Self {
            endpoint: endpoint.clone(),
            hub: hub.clone(),
            schema,
            auto_notify,
            manual_notify_warned: AtomicBool::new(false),
            state: Mutex::new(State {
                intercepted,
                scratch,
                snapshot,
                v: 0,
                pending: PathTree::default(),
                flush_scheduled: false,
            }),
        });
        hub.register_init_handler(&endpoint, server.clone() as Arc<dyn InitHandler>);
        Ok(server)
    }

    pub fn version(&self) -> u64 {
        self.state.lock().unwrap().v
    }

    /// A clone of the current authoritative value.
    pub fn data(&self) -> Value {
        self.state.lock().unwrap().intercepted.get().clone()
    }

    pub fn set(self: &Arc<Self>, path: &Path, value: Value) -> Result<(), CoreError> {
        self.with_intercepted(|i| i.set(path, value))
    }

    pub fn delete(self: &Arc<Self>, path: &Path) -> Result<(), CoreError> {
        self.with_intercepted(|i| i.delete(path))
    }

    pub fn push(self: &Arc<Self>, array_path: &Path, item: Value) -> Result<(), CoreError> {
        self.with_intercepted(|i| i.push(array_path, item))
    }

    pub fn pop(self: &Arc<Self>, array_path: &Path) -> Result<Option<Value>, CoreError> {
        self.with_intercepted(|i| i.pop(array_path))
    }

    pub fn splice(
        self: &Arc<Self>,
        array_path: &Path,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, CoreError> {
        self.with_intercepted(|i| i.splice(array_path, start, delete_count, items))
    }

    /// Run a batch of mutations, draining paths into the pending tree once
    /// at the end rather than after every call.
    pub fn mutate<F, R>(self: &Arc<Self>, f: F) -> R
    where
        F: FnOnce(&mut Intercepted) -> R,
    {
        let mut guard = self.state.lock().unwrap();
        let result = f(&mut guard.intercepted);
        self.drain_scratch_and_maybe_schedule(&mut guard);
        result
    }

    fn with_intercepted<F, R>(self: &Arc<Self>, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut Intercepted) -> Result<R, CoreError>,
    {
        let mut guard = self.state.lock().unwrap();
        let result = f(&mut guard.intercepted);
        if result.is_ok() {
            self.drain_scratch_and_maybe_schedule(&mut guard);
        } else {
            guard.scratch.lock().unwrap().clear();
        }
        result
    }

    fn drain_scratch_and_maybe_schedule(self: &Arc<Self>, guard: &mut State) {
        let drained: Vec<Path> = guard.scratch.lock().unwrap().drain(..).collect();
        for path in drained {
            guard.pending.add(path);
        }
        if self.auto_notify && !guard.pending.is_empty() && !guard.flush_scheduled {
            guard.flush_scheduled = true;
            let this = self.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                this.flush_pending();
            });
        }
    }

    /// Explicit publish. `hint` narrows validation and diffing to a
    /// subtree; omit it to validate and diff the whole value. Manual calls
    /// while `autoNotify` is on are allowed but warned about once. A schema
    /// validation failure aborts without advancing the version and is
    /// returned to the caller, not just logged — unlike the auto-notify
    /// flush, which has no caller to report back to.
    pub fn notify(self: &Arc<Self>, hint: Option<&Path>) -> Result<(), CoreError> {
        if self.auto_notify && !self.manual_notify_warned.swap(true, Ordering::Relaxed) {
            warn!(
                endpoint = %self.endpoint,
                "notify() called explicitly on an auto-notify SharedObject; this is redundant with automatic flushing"
            );
        }
        let mut guard = self.state.lock().unwrap();
        match hint {
            Some(path) if !path.is_empty() => self.publish_path(&mut guard, path.clone()),
            _ => self.publish_root(&mut guard),
        }
    }

    fn flush_pending(self: &Arc<Self>) {
        let mut guard = self.state.lock().unwrap();
        guard.flush_scheduled = false;
        let paths = guard.pending.get_paths();
        guard.pending.clear();
        if paths.is_empty() {
            return;
        }

        let mut combined: Delta = Vec::new();
        for path in paths {
            match self.diff_and_apply_path(&mut guard, &path) {
                Ok(Some(delta)) => combined.extend(delta),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        endpoint = %self.endpoint,
                        path = %format_path(&path),
                        error = %e,
                        "auto-notify validation failed, skipping path"
                    );
                }
            }
        }
        self.finish_broadcast(&mut guard, combined);
    }

    fn publish_path(self: &Arc<Self>, guard: &mut State, path: Path) -> Result<(), CoreError> {
        let combined = self.diff_and_apply_path(guard, &path)?.unwrap_or_default();
        self.finish_broadcast(guard, combined);
        Ok(())
    }

    fn publish_root(self: &Arc<Self>, guard: &mut State) -> Result<(), CoreError> {
        self.schema
            .validate_root(guard.intercepted.get())
            .map_err(|e| CoreError::SchemaInvalid { path: Vec::new(), message: e })?;
        let delta = compute_delta_for_path(&guard.snapshot, guard.intercepted.get(), &Vec::new());
        if delta.is_empty() {
            return Ok(());
        }
        apply_delta(&mut guard.snapshot, &delta)?;
        self.finish_broadcast(guard, delta);
        Ok(())
    }

    /// Validate the subtree at `path`, diff it against the snapshot, and
    /// apply that diff to the snapshot immediately so the next path in this
    /// flush sees an up-to-date baseline. `Ok(None)` means there was nothing
    /// to publish (the path vanished or the diff was empty); `Err` means
    /// schema validation or delta application failed.
    fn diff_and_apply_path(&self, guard: &mut State, path: &Path) -> Result<Option<Delta>, CoreError> {
        let Ok(subtree) = nav::get(guard.intercepted.get(), path) else {
            return Ok(None);
        };
        let subtree = subtree.clone();
        let resolved = self.schema.resolve(path);
        resolved
            .validate(&subtree)
            .map_err(|e| CoreError::SchemaInvalid { path: path.clone(), message: e })?;
        let delta = compute_delta_for_path(&guard.snapshot, guard.intercepted.get(), path);
        if delta.is_empty() {
            return Ok(None);
        }
        apply_delta(&mut guard.snapshot, &delta)?;
        Ok(Some(delta))
    }

    fn finish_broadcast(&self, guard: &mut State, delta: Delta) {
        if delta.is_empty() {
            return;
        }
        guard.v += 1;
        let frame = ServerFrame::Update {
            endpoint: self.endpoint.clone(),
            delta,
            v: guard.v,
            now: syncmux_core::date_format::format(chrono::Utc::now()),
        };
        self.hub.broadcast(&self.endpoint, &frame);
    }
}

impl InitHandler for SharedObjectServer {
    fn init_frame(&self) -> (Value, u64) {
        let guard = self.state.lock().unwrap();
        (guard.intercepted.get().clone(), guard.v)
    }
}

impl std::fmt::Debug for SharedObjectServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedObjectServer").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

fn format_path(path: &Path) -> String {
    path.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use serde_json::json;

    fn test_hub() -> Arc<Hub> {
        Hub::new("test-hash".to_owned(), HubConfig::default())
    }

    #[tokio::test]
    async fn constructor_rejects_value_that_fails_schema() {
        let hub = test_hub();
        let schema = json!({"type": "object", "required": ["count"]});
        let err = SharedObjectServer::new("board", hub, schema, true, json!({})).unwrap_err();
        assert!(matches!(err, CoreError::SchemaInvalid { .. }));
    }

    #[tokio::test]
    async fn manual_set_then_notify_broadcasts_an_update() {
        let hub = test_hub();
        let schema = json!({"type": "object", "properties": {"count": {"type": "number"}}});
        let server = SharedObjectServer::new("board", hub, schema, false, json!({"count": 0})).unwrap();
        server.set(&vec!["count".into()], json!(1)).unwrap();
        assert_eq!(server.version(), 0);
        server.notify(None).unwrap();
        assert_eq!(server.version(), 1);
        assert_eq!(server.data()["count"], 1);
    }

    #[tokio::test]
    async fn auto_notify_flushes_on_the_next_turn() {
        let hub = test_hub();
        let schema = json!({"type": "object", "properties": {"count": {"type": "number"}}});
        let server = SharedObjectServer::new("board", hub, schema, true, json!({"count": 0})).unwrap();
        server.set(&vec!["count".into()], json!(1)).unwrap();
        assert_eq!(server.version(), 0);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(server.version(), 1);
    }

    #[tokio::test]
    async fn empty_delta_does_not_advance_version() {
        let hub = test_hub();
        let schema = json!({"type": "object", "properties": {"count": {"type": "number"}}});
        let server = SharedObjectServer::new("board", hub, schema, false, json!({"count": 0})).unwrap();
        server.set(&vec!["count".into()], json!(0)).unwrap();
        server.notify(None).unwrap();
        assert_eq!(server.version(), 0);
    }

    #[tokio::test]
    async fn manual_notify_propagates_a_schema_validation_failure() {
        let hub = test_hub();
        let schema = json!({"type": "object", "properties": {"count": {"type": "number"}}});
        let server = SharedObjectServer::new("board", hub, schema, false, json!({"count": 0})).unwrap();
        server.set(&vec!["count".into()], json!("not a number")).unwrap();

        let err = server.notify(Some(&vec!["count".into()])).unwrap_err();
        assert!(matches!(err, CoreError::SchemaInvalid { .. }));
        assert_eq!(server.version(), 0, "an aborted notify must not advance the version");
    }

    #[tokio::test]
    async fn manual_notify_root_propagates_a_schema_validation_failure() {
        let hub = test_hub();
        let schema = json!({"type": "object", "required": ["count"]});
        let server = SharedObjectServer::new("board", hub, schema, false, json!({"count": 0})).unwrap();
        server.delete(&vec!["count".into()]).unwrap();

        let err = server.notify(None).unwrap_err();
        assert!(matches!(err, CoreError::SchemaInvalid { .. }));
        assert_eq!(server.version(), 0);
    }
}
