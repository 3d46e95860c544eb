// ── Device-state store ──
//
// Shared in-memory state of one account: flattened device records and
// action capabilities, both keyed by serial number. Written by the
// poller and the event listener, read by consumers. Mutations bump a
// version counter on a `watch` channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::flatten::{DeviceMap, FlatDevice};

/// Thread-safe store for one account's appliances.
///
/// Records are replaced wholesale, never patched: a fetch replaces the
/// whole device set, a push replaces the records it carries.
pub struct DeviceStore {
    devices: DashMap<String, Arc<FlatDevice>>,
    actions: DashMap<String, Arc<Value>>,
    version: watch::Sender<u64>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
    last_push: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        let (last_refresh, _) = watch::channel(None);
        let (last_push, _) = watch::channel(None);

        Self {
            devices: DashMap::new(),
            actions: DashMap::new(),
            version,
            last_refresh,
            last_push,
        }
    }

    // ── Device records ───────────────────────────────────────────────

    /// Replace the full device set with the result of a fetch.
    pub fn replace_devices(&self, devices: DeviceMap) {
        self.devices.retain(|serial, _| devices.contains_key(serial));
        for (serial, device) in devices {
            self.devices.insert(serial, Arc::new(device));
        }
        self.last_refresh.send_replace(Some(Utc::now()));
        self.bump_version();
    }

    /// Replace the records of the devices carried by a push event.
    /// Devices not mentioned are left alone.
    pub fn upsert_devices(&self, devices: DeviceMap) {
        for (serial, device) in devices {
            self.devices.insert(serial, Arc::new(device));
        }
        self.last_push.send_replace(Some(Utc::now()));
        self.bump_version();
    }

    pub fn device(&self, serial: &str) -> Option<Arc<FlatDevice>> {
        self.devices.get(serial).map(|entry| Arc::clone(entry.value()))
    }

    /// All devices, ordered by serial.
    pub fn devices_snapshot(&self) -> BTreeMap<String, Arc<FlatDevice>> {
        self.devices
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.devices.iter().map(|e| e.key().clone()).collect();
        serials.sort();
        serials
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // ── Action capabilities ──────────────────────────────────────────

    /// Set the capabilities of one device.
    pub fn set_actions(&self, serial: impl Into<String>, actions: Value) {
        self.actions.insert(serial.into(), Arc::new(actions));
        self.bump_version();
    }

    /// Replace the capability records carried by an `actions` push.
    pub fn upsert_actions(&self, payload: Map<String, Value>) {
        for (serial, actions) in payload {
            self.actions.insert(serial, Arc::new(actions));
        }
        self.last_push.send_replace(Some(Utc::now()));
        self.bump_version();
    }

    pub fn actions(&self, serial: &str) -> Option<Arc<Value>> {
        self.actions.get(serial).map(|entry| Arc::clone(entry.value()))
    }

    pub fn actions_snapshot(&self) -> BTreeMap<String, Arc<Value>> {
        self.actions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    // ── Change notification ──────────────────────────────────────────

    /// Receiver that changes whenever any record is written.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    pub fn last_push(&self) -> Option<DateTime<Utc>> {
        *self.last_push.borrow()
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
