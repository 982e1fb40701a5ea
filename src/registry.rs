//! Device registry (C2): owns every open port, keyed by a user-facing
//! nickname, and is the only thing allowed to open, close, or recycle a
//! `midir` connection. Mappings and the clock hold `Arc<Input>`/`Arc<Output>`
//! handles into this registry but never open or close a port themselves.

use crate::device::{Device, Input, Output, PortRecord};
use crate::error::RouterError;
use crate::log_error;
use midir::{MidiIO, MidiInput};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// Maps nicknames and (name, port) addresses to the `PortRecord` they name,
/// enforcing that both are unique across the whole registry.
#[derive(Default)]
struct PortIndex {
    by_nickname: BTreeMap<String, PortRecord>,
    addresses: HashSet<(String, u32)>,
}

impl PortIndex {
    fn insert(&mut self, record: PortRecord) -> Result<(), RouterError> {
        if self.by_nickname.contains_key(&record.nickname) {
            return Err(RouterError::config(format!(
                "nickname '{}' already registered",
                record.nickname
            )));
        }
        let addr = (record.name.clone(), record.port);
        if self.addresses.contains(&addr) {
            return Err(RouterError::config(format!(
                "port ({}, {}) already registered under a different nickname",
                addr.0, addr.1
            )));
        }
        self.addresses.insert(addr);
        self.by_nickname.insert(record.nickname.clone(), record);
        Ok(())
    }

    fn get(&self, nickname: &str) -> Option<&PortRecord> {
        self.by_nickname.get(nickname)
    }
}

/// Result of a bulk open: the ports that succeeded plus the errors for the
/// ones that didn't, so one bad port never blocks the rest.
pub struct OpenResult<T> {
    pub opened: Vec<Arc<T>>,
    pub failed: Vec<RouterError>,
}

pub struct DeviceRegistry {
    client_name: String,
    index: Mutex<PortIndex>,
    inputs: Mutex<BTreeMap<String, Arc<Input>>>,
    outputs: Mutex<BTreeMap<String, Arc<Output>>>,
    recycled_inputs: Mutex<Vec<Arc<Input>>>,
    recycled_outputs: Mutex<Vec<Arc<Output>>>,
    ignore: Mutex<HashSet<String>>,
    hotplug: Mutex<bool>,
}

impl DeviceRegistry {
    pub fn new(client_name: impl Into<String>) -> Arc<Self> {
        Arc::new(DeviceRegistry {
            client_name: client_name.into(),
            index: Mutex::new(PortIndex::default()),
            inputs: Mutex::new(BTreeMap::new()),
            outputs: Mutex::new(BTreeMap::new()),
            recycled_inputs: Mutex::new(Vec::new()),
            recycled_outputs: Mutex::new(Vec::new()),
            ignore: Mutex::new(HashSet::new()),
            hotplug: Mutex::new(true),
        })
    }

    pub fn set_ignored(&self, names: impl IntoIterator<Item = String>) {
        *self.ignore.lock().unwrap() = names.into_iter().collect();
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.lock().unwrap().contains(name)
    }

    pub fn hotplug(&self) -> bool {
        *self.hotplug.lock().unwrap()
    }

    pub fn set_hotplug(&self, enabled: bool) {
        *self.hotplug.lock().unwrap() = enabled;
    }

    pub fn register_port(&self, nickname: &str, name: &str, port: u32) -> Result<(), RouterError> {
        self.index.lock().unwrap().insert(PortRecord {
            name: name.to_string(),
            port,
            nickname: nickname.to_string(),
        })
    }

    fn record_for(&self, nickname: &str) -> Result<PortRecord, RouterError> {
        self.index
            .lock()
            .unwrap()
            .get(nickname)
            .cloned()
            .ok_or_else(|| RouterError::config(format!("unknown device nickname '{}'", nickname)))
    }

    pub fn open_input(&self, nickname: &str) -> Result<Arc<Input>, RouterError> {
        let record = self.record_for(nickname)?;
        if self.is_ignored(&record.name) {
            return Err(RouterError::device(&record.name, "device is on the ignore list"));
        }
        // Reconnect the same `Arc<Input>` a hotplug remove left behind
        // (rather than building a fresh one) so a mapping that already
        // holds this handle re-binds for free: its dispatcher is still
        // registered in the handle's own handler list.
        if let Some(existing) = self.inputs.lock().unwrap().get(nickname).cloned() {
            if !existing.is_open() {
                existing.connect(&self.client_name)?;
            }
            return Ok(existing);
        }
        let input = self.take_or_create_input(&record);
        input.connect(&self.client_name)?;
        self.inputs
            .lock()
            .unwrap()
            .insert(nickname.to_string(), input.clone());
        Ok(input)
    }

    pub fn open_output(&self, nickname: &str) -> Result<Arc<Output>, RouterError> {
        let record = self.record_for(nickname)?;
        if self.is_ignored(&record.name) {
            return Err(RouterError::device(&record.name, "device is on the ignore list"));
        }
        if let Some(existing) = self.outputs.lock().unwrap().get(nickname).cloned() {
            if !existing.is_open() {
                existing.connect(&self.client_name)?;
            }
            return Ok(existing);
        }
        let output = self.take_or_create_output(&record);
        output.connect(&self.client_name)?;
        self.outputs
            .lock()
            .unwrap()
            .insert(nickname.to_string(), output.clone());
        Ok(output)
    }

    pub fn open_inputs(&self, nicknames: &[String]) -> OpenResult<Input> {
        let mut opened = Vec::new();
        let mut failed = Vec::new();
        for nickname in nicknames {
            match self.open_input(nickname) {
                Ok(i) => opened.push(i),
                Err(e) => {
                    log_error!("failed to open input '{}': {}", nickname, e);
                    failed.push(e);
                }
            }
        }
        OpenResult { opened, failed }
    }

    pub fn open_outputs(&self, nicknames: &[String]) -> OpenResult<Output> {
        let mut opened = Vec::new();
        let mut failed = Vec::new();
        for nickname in nicknames {
            match self.open_output(nickname) {
                Ok(o) => opened.push(o),
                Err(e) => {
                    log_error!("failed to open output '{}': {}", nickname, e);
                    failed.push(e);
                }
            }
        }
        OpenResult { opened, failed }
    }

    /// Opens every discovered system input port under an auto nickname
    /// equal to its system name (de-duplicated by appending the port index
    /// for repeated names), honoring the ignore list.
    pub fn open_all_inputs(&self) -> OpenResult<Input> {
        let names = match MidiInput::new(&self.client_name) {
            Ok(midi_in) => {
                let ports = midi_in.ports();
                let mut counts: BTreeMap<String, u32> = BTreeMap::new();
                let mut out = Vec::new();
                for port in &ports {
                    if let Ok(name) = midi_in.port_name(port) {
                        let idx = *counts.get(&name).unwrap_or(&0);
                        counts.insert(name.clone(), idx + 1);
                        out.push((name, idx));
                    }
                }
                out
            }
            Err(e) => {
                return OpenResult {
                    opened: Vec::new(),
                    failed: vec![RouterError::device("midi_input", e.to_string())],
                }
            }
        };

        let mut opened = Vec::new();
        let mut failed = Vec::new();
        for (name, idx) in names {
            if self.is_ignored(&name) {
                continue;
            }
            let nickname = format!("{}#{}", name, idx);
            if self.index.lock().unwrap().get(&nickname).is_none() {
                if let Err(e) = self.register_port(&nickname, &name, idx) {
                    failed.push(e);
                    continue;
                }
            }
            match self.open_input(&nickname) {
                Ok(i) => opened.push(i),
                Err(e) => failed.push(e),
            }
        }
        OpenResult { opened, failed }
    }

    fn take_or_create_input(&self, record: &PortRecord) -> Arc<Input> {
        let mut pool = self.recycled_inputs.lock().unwrap();
        if let Some(pos) = pool.iter().position(|i| i.record() == record) {
            return pool.remove(pos);
        }
        Input::new(record.clone())
    }

    fn take_or_create_output(&self, record: &PortRecord) -> Arc<Output> {
        let mut pool = self.recycled_outputs.lock().unwrap();
        if let Some(pos) = pool.iter().position(|o| o.record() == record) {
            return pool.remove(pos);
        }
        Output::new(record.clone())
    }

    pub fn close_input(&self, nickname: &str) {
        if let Some(input) = self.inputs.lock().unwrap().remove(nickname) {
            input.close();
            self.recycled_inputs.lock().unwrap().push(input);
        }
    }

    pub fn close_output(&self, nickname: &str) {
        if let Some(output) = self.outputs.lock().unwrap().remove(nickname) {
            output.close();
            self.recycled_outputs.lock().unwrap().push(output);
        }
    }

    /// Nickname -> open/closed snapshot of every device this registry has
    /// ever opened (closed ports remain listed until evicted by `on_exit`).
    pub fn device_map(&self) -> BTreeMap<String, bool> {
        let mut map = BTreeMap::new();
        for (nickname, input) in self.inputs.lock().unwrap().iter() {
            map.insert(nickname.clone(), input.is_open());
        }
        for (nickname, output) in self.outputs.lock().unwrap().iter() {
            map.entry(nickname.clone()).or_insert(output.is_open());
        }
        map
    }

    pub fn device_map_by_name(&self, name: &str) -> Vec<String> {
        self.index
            .lock()
            .unwrap()
            .by_nickname
            .values()
            .filter(|r| r.name == name)
            .map(|r| r.nickname.clone())
            .collect()
    }

    /// Reconciles a hotplug add: reopens any registered-but-closed port
    /// matching `system_name`, returning the nicknames that came back.
    pub fn handle_device_added(&self, system_name: &str) -> Vec<String> {
        if !self.hotplug() || self.is_ignored(system_name) {
            return Vec::new();
        }
        let candidates: Vec<String> = self
            .index
            .lock()
            .unwrap()
            .by_nickname
            .values()
            .filter(|r| r.name == system_name)
            .map(|r| r.nickname.clone())
            .collect();
        let mut reopened = Vec::new();
        for nickname in candidates {
            if self.open_input(&nickname).is_ok() {
                reopened.push(nickname.clone());
            }
            if self.open_output(&nickname).is_ok() && !reopened.contains(&nickname) {
                reopened.push(nickname);
            }
        }
        reopened
    }

    /// Reconciles a hotplug remove: marks matching open ports closed
    /// without discarding their registry entry, so `open_input`/
    /// `open_output` reconnect the very same handle on re-add instead of
    /// leaking a new one per cycle.
    pub fn handle_device_removed(&self, system_name: &str) -> Vec<String> {
        let candidates: Vec<String> = self
            .index
            .lock()
            .unwrap()
            .by_nickname
            .values()
            .filter(|r| r.name == system_name)
            .map(|r| r.nickname.clone())
            .collect();
        for nickname in &candidates {
            if let Some(input) = self.inputs.lock().unwrap().get(nickname) {
                input.close();
            }
            if let Some(output) = self.outputs.lock().unwrap().get(nickname) {
                output.close();
            }
        }
        candidates
    }

    pub fn on_exit(&self) {
        for (_, input) in self.inputs.lock().unwrap().iter() {
            input.close();
        }
        for (_, output) in self.outputs.lock().unwrap().iter() {
            output.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_nickname_rejected() {
        let registry = DeviceRegistry::new("test");
        registry.register_port("a", "Widget", 0).unwrap();
        let err = registry.register_port("a", "Other", 0).unwrap_err();
        assert!(matches!(err, RouterError::Config { .. }));
    }

    #[test]
    fn duplicate_address_rejected() {
        let registry = DeviceRegistry::new("test");
        registry.register_port("a", "Widget", 0).unwrap();
        let err = registry.register_port("b", "Widget", 0).unwrap_err();
        assert!(matches!(err, RouterError::Config { .. }));
    }

    #[test]
    fn ignored_device_refuses_to_open() {
        let registry = DeviceRegistry::new("test");
        registry.register_port("a", "Widget", 0).unwrap();
        // The ignore list holds device names, not nicknames; "a" is only
        // ever the nickname here.
        registry.set_ignored(["Widget".to_string()].into_iter());
        let err = registry.open_input("a").unwrap_err();
        assert!(matches!(err, RouterError::Device { .. }));
    }
}
