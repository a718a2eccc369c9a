//! Generic publish/subscribe event channel.
//!
//! A minimal mapping from event name to an ordered list of callbacks, with
//! persistent (`on`) and one-shot (`once`) registrations. It exists to
//! decouple the session state machine from its callers and is deliberately
//! name-agnostic: [`crate::session::SessionClient`] instantiates it with a
//! closed event-kind enum, but any hashable key works.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::relock;

/// Token identifying a single registration.
///
/// Closures have no identity equality in Rust, so removal is by token.
/// Registering the same closure twice yields two independent registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<A> = Arc<Mutex<dyn FnMut(&A) + Send>>;

struct Entry<A> {
    id: ListenerId,
    callback: Callback<A>,
}

impl<A> Clone for Entry<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

struct Registry<K, A> {
    next_id: u64,
    persistent: HashMap<K, Vec<Entry<A>>>,
    one_shot: HashMap<K, Vec<Entry<A>>>,
}

impl<K, A> Registry<K, A> {
    fn allocate(&mut self) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Ordered listener registry keyed by event name.
///
/// Cheap to clone; clones share the same registry.
pub struct EventChannel<K, A> {
    registry: Arc<Mutex<Registry<K, A>>>,
}

impl<K, A> Clone for EventChannel<K, A> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K, A> Default for EventChannel<K, A>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> EventChannel<K, A>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                persistent: HashMap::new(),
                one_shot: HashMap::new(),
            })),
        }
    }

    /// Register a persistent listener. Listeners for the same name accumulate
    /// in call order; there is no de-duplication.
    pub fn on(&self, name: K, callback: impl FnMut(&A) + Send + 'static) -> ListenerId {
        let mut registry = relock(&self.registry);
        let id = registry.allocate();
        registry.persistent.entry(name).or_default().push(Entry {
            id,
            callback: Arc::new(Mutex::new(callback)),
        });
        id
    }

    /// Register a listener invoked at most once across the channel's lifetime.
    pub fn once(&self, name: K, callback: impl FnMut(&A) + Send + 'static) -> ListenerId {
        let mut registry = relock(&self.registry);
        let id = registry.allocate();
        registry.one_shot.entry(name).or_default().push(Entry {
            id,
            callback: Arc::new(Mutex::new(callback)),
        });
        id
    }

    /// Invoke all persistent listeners for `name` in registration order, then
    /// all one-shot listeners in registration order.
    ///
    /// Listener sets are snapshotted at each phase, so removals during an
    /// emission affect subsequent emissions, not the in-flight one. One-shot
    /// registrations are drained before invocation, so a re-entrant `emit`
    /// from inside a one-shot callback cannot fire it a second time.
    ///
    /// Emitting to a name with no listeners is a no-op.
    pub fn emit(&self, name: &K, payload: &A) {
        let persistent: Vec<Entry<A>> = {
            let registry = relock(&self.registry);
            registry
                .persistent
                .get(name)
                .map(|entries| entries.to_vec())
                .unwrap_or_default()
        };
        for entry in &persistent {
            (&mut *relock(&entry.callback))(payload);
        }

        let one_shot: Vec<Entry<A>> = {
            let mut registry = relock(&self.registry);
            registry
                .one_shot
                .get_mut(name)
                .map(std::mem::take)
                .unwrap_or_default()
        };
        for entry in &one_shot {
            (&mut *relock(&entry.callback))(payload);
        }
    }

    /// Remove one registration, whether it was made via [`Self::on`] or
    /// [`Self::once`]. The callback never fires for emissions after this
    /// call returns.
    pub fn remove_listener(&self, name: &K, id: ListenerId) {
        let mut registry = relock(&self.registry);
        if let Some(entries) = registry.persistent.get_mut(name) {
            entries.retain(|entry| entry.id != id);
        }
        if let Some(entries) = registry.one_shot.get_mut(name) {
            entries.retain(|entry| entry.id != id);
        }
    }

    /// Clear every persistent and one-shot listener for `name`. Listeners for
    /// other names are untouched.
    pub fn remove_all_listeners(&self, name: &K) {
        let mut registry = relock(&self.registry);
        if let Some(entries) = registry.persistent.get_mut(name) {
            entries.clear();
        }
        if let Some(entries) = registry.one_shot.get_mut(name) {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&String) + Send>) {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let log_for_make = Arc::clone(&log);
        let make = move |tag: &str| -> Box<dyn FnMut(&String) + Send> {
            let log = Arc::clone(&log_for_make);
            let tag = tag.to_owned();
            Box::new(move |payload: &String| {
                log.lock().unwrap().push(format!("{tag}:{payload}"));
            })
        };
        (log, make)
    }

    #[test]
    fn persistent_listeners_fire_once_per_emit() {
        let channel: EventChannel<String, String> = EventChannel::new();
        let (log, make) = recorder();
        channel.on("tick".into(), make("a"));

        channel.emit(&"tick".into(), &"1".into());
        channel.emit(&"tick".into(), &"2".into());

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "a:2"]);
    }

    #[test]
    fn listeners_run_in_registration_order_with_one_shots_last() {
        let channel: EventChannel<String, String> = EventChannel::new();
        let (log, make) = recorder();
        channel.once("tick".into(), make("once"));
        channel.on("tick".into(), make("first"));
        channel.on("tick".into(), make("second"));

        channel.emit(&"tick".into(), &"x".into());

        assert_eq!(*log.lock().unwrap(), vec!["first:x", "second:x", "once:x"]);
    }

    #[test]
    fn once_fires_at_most_once() {
        let channel: EventChannel<String, String> = EventChannel::new();
        let (log, make) = recorder();
        channel.once("tick".into(), make("once"));

        channel.emit(&"tick".into(), &"1".into());
        channel.emit(&"tick".into(), &"2".into());

        assert_eq!(*log.lock().unwrap(), vec!["once:1"]);
    }

    #[test]
    fn same_callback_registered_twice_fires_twice() {
        let channel: EventChannel<String, String> = EventChannel::new();
        let (log, make) = recorder();
        channel.on("tick".into(), make("a"));
        channel.on("tick".into(), make("a"));

        channel.emit(&"tick".into(), &"1".into());

        assert_eq!(*log.lock().unwrap(), vec!["a:1", "a:1"]);
    }

    #[test]
    fn remove_listener_covers_both_registrations() {
        let channel: EventChannel<String, String> = EventChannel::new();
        let (log, make) = recorder();
        let persistent = channel.on("tick".into(), make("on"));
        let one_shot = channel.once("tick".into(), make("once"));
        channel.remove_listener(&"tick".into(), persistent);
        channel.remove_listener(&"tick".into(), one_shot);

        channel.emit(&"tick".into(), &"1".into());

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn remove_all_listeners_scoped_to_one_name() {
        let channel: EventChannel<String, String> = EventChannel::new();
        let (log, make) = recorder();
        channel.on("tick".into(), make("tick"));
        channel.once("tick".into(), make("tick-once"));
        channel.on("tock".into(), make("tock"));

        channel.remove_all_listeners(&"tick".into());
        channel.emit(&"tick".into(), &"1".into());
        channel.emit(&"tock".into(), &"2".into());

        assert_eq!(*log.lock().unwrap(), vec!["tock:2"]);
    }

    #[test]
    fn emitting_unregistered_name_is_a_noop() {
        let channel: EventChannel<String, String> = EventChannel::new();
        channel.emit(&"nobody".into(), &"1".into());
    }

    #[test]
    fn reentrant_emit_cannot_refire_a_one_shot() {
        let channel: EventChannel<String, u32> = EventChannel::new();
        let count = Arc::new(Mutex::new(0u32));

        let inner_channel = channel.clone();
        let inner_count = Arc::clone(&count);
        channel.once("tick".to_owned(), move |payload: &u32| {
            *inner_count.lock().unwrap() += 1;
            if *payload == 0 {
                inner_channel.emit(&"tick".to_owned(), &1);
            }
        });

        channel.emit(&"tick".to_owned(), &0);

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn removal_during_emission_affects_later_emissions_only() {
        let channel: EventChannel<String, String> = EventChannel::new();
        let (log, make) = recorder();

        let removal_target = channel.on("tick".into(), make("target"));
        let remover_channel = channel.clone();
        channel.on("tick".into(), move |_: &String| {
            remover_channel.remove_listener(&"tick".to_owned(), removal_target);
        });

        channel.emit(&"tick".into(), &"1".into());
        channel.emit(&"tick".into(), &"2".into());

        assert_eq!(*log.lock().unwrap(), vec!["target:1"]);
    }
}
