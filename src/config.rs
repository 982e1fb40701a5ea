//! Configuration binding (C6/C10): the JSON document shape from the
//! external interface spec, plus loading, validation, and materialization
//! into a live `Router` + `DeviceRegistry` + `ClockMaster`.

use crate::clock::ClockMaster;
use crate::error::RouterError;
use crate::filter::chord::ChordTemplate;
use crate::filter::{ChannelFilter, ChordFilter, Filter, MessageTypeFilter, ToggleConfig, TransposeFilter, VelocityFilter, VelocityMode};
use crate::log_warn;
use crate::message::MessageType;
use crate::registry::DeviceRegistry;
use crate::routing::{Mapping, Router};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfiguration {
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
    #[serde(default)]
    pub mappings: BTreeMap<String, MappingConfig>,
    #[serde(default)]
    pub clock: Option<ClockConfig>,
    #[serde(default)]
    pub options: OptionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub port: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub channels: Option<ChannelConfig>,
    #[serde(default)]
    pub message_types: Option<MessageTypeConfig>,
    #[serde(default)]
    pub velocity: Option<VelocityConfig>,
    #[serde(default)]
    pub transpose: Option<TransposeConfig>,
    #[serde(default)]
    pub chord: Option<ChordConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub whitelist: Vec<u8>,
    #[serde(default)]
    pub blacklist: Vec<u8>,
    #[serde(default)]
    pub map: BTreeMap<String, u8>,
    #[serde(default)]
    pub toggle_controller: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageTypeConfig {
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub toggle_controller: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityConfig {
    pub min: u8,
    pub max: u8,
    pub mode: String,
    #[serde(default)]
    pub toggle_controller: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransposeConfig {
    pub step: i8,
    #[serde(default)]
    pub toggle_controller: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordConfig {
    pub chord: String,
    #[serde(default)]
    pub toggle_controller: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockConfig {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    pub bpm: f64,
    pub ppqn: u32,
    pub pattern_length: u32,
    #[serde(default)]
    pub tap_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsConfig {
    #[serde(default = "default_true")]
    pub hotplug: bool,
    #[serde(default)]
    pub sync_config_to_usb: bool,
    #[serde(default)]
    pub verbose: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OptionsConfig {
    fn default() -> Self {
        OptionsConfig {
            hotplug: true,
            sync_config_to_usb: false,
            verbose: false,
        }
    }
}

impl RouterConfiguration {
    pub fn load_from_path(path: &Path) -> Result<Self, RouterError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RouterError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let cfg: RouterConfiguration = serde_json::from_str(&text)
            .map_err(|e| RouterError::config(format!("malformed config {}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), RouterError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| RouterError::config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, text)
            .map_err(|e| RouterError::config(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        for (name, mapping) in &self.mappings {
            for input in &mapping.inputs {
                if !self.devices.contains_key(input) {
                    return Err(RouterError::config(format!(
                        "mapping '{}' references undeclared device '{}'",
                        name, input
                    )));
                }
            }
            for output in &mapping.outputs {
                if !self.devices.contains_key(output) {
                    return Err(RouterError::config(format!(
                        "mapping '{}' references undeclared device '{}'",
                        name, output
                    )));
                }
            }
        }
        if let Some(clock) = &self.clock {
            for nickname in clock.inputs.iter().chain(clock.outputs.iter()) {
                if !self.devices.contains_key(nickname) {
                    return Err(RouterError::config(format!(
                        "clock references undeclared device '{}'",
                        nickname
                    )));
                }
            }
        }
        Ok(())
    }
}

fn build_filters(mapping: &MappingConfig) -> Result<Vec<Filter>, RouterError> {
    let mut filters = Vec::new();
    if let Some(c) = &mapping.channels {
        // The document's channel numbers are the user-facing 1..16 range;
        // the wire/`Message::channel()` nibble is 0..15.
        let to_wire = |ch: u8| ch.saturating_sub(1);
        filters.push(Filter::Channel(ChannelFilter {
            whitelist: c.whitelist.iter().copied().map(to_wire).collect(),
            blacklist: c.blacklist.iter().copied().map(to_wire).collect(),
            remap: c
                .map
                .iter()
                .filter_map(|(k, v)| k.parse::<u8>().ok().map(|from| (to_wire(from), to_wire(*v))))
                .collect::<HashMap<u8, u8>>(),
            paused: false,
            toggle: c.toggle_controller.map(|controller| ToggleConfig { controller }),
        }));
    }
    if let Some(m) = &mapping.message_types {
        let parse_list = |names: &[String]| -> Result<Vec<MessageType>, RouterError> {
            names
                .iter()
                .map(|n| {
                    MessageType::from_type_string(n)
                        .ok_or_else(|| RouterError::config(format!("unknown message type '{}'", n)))
                })
                .collect()
        };
        filters.push(Filter::MessageType(MessageTypeFilter {
            whitelist: parse_list(&m.whitelist)?,
            blacklist: parse_list(&m.blacklist)?,
            paused: false,
            toggle: m.toggle_controller.map(|controller| ToggleConfig { controller }),
        }));
    }
    if let Some(v) = &mapping.velocity {
        let mode = match v.mode.as_str() {
            "clip" => VelocityMode::Clip,
            "drop" => VelocityMode::Drop,
            "scaled" => VelocityMode::Scaled,
            other => return Err(RouterError::config(format!("unknown velocity mode '{}'", other))),
        };
        filters.push(Filter::Velocity(VelocityFilter {
            min: v.min,
            max: v.max,
            mode,
            paused: false,
            toggle: v.toggle_controller.map(|controller| ToggleConfig { controller }),
        }));
    }
    if let Some(t) = &mapping.transpose {
        if !(-10..=10).contains(&t.step) {
            return Err(RouterError::config("transpose step must be within [-10, 10]"));
        }
        filters.push(Filter::Transpose(TransposeFilter {
            step: t.step,
            paused: false,
            toggle: t.toggle_controller.map(|controller| ToggleConfig { controller }),
        }));
    }
    if let Some(c) = &mapping.chord {
        let chord = ChordTemplate::from_name(&c.chord)
            .ok_or_else(|| RouterError::config(format!("unknown chord template '{}'", c.chord)))?;
        filters.push(Filter::Chord(ChordFilter {
            chord,
            paused: false,
            toggle: c.toggle_controller.map(|controller| ToggleConfig { controller }),
        }));
    }
    Ok(filters)
}

/// Materializes a loaded configuration into a registry, router, and
/// (optionally) a clock master, opening every device a mapping or the
/// clock actually references. A device that fails to open drops only the
/// mappings that needed it, logged and otherwise ignored.
pub fn apply_configuration(
    cfg: &RouterConfiguration,
    registry: &Arc<DeviceRegistry>,
    router: &Router,
) -> Result<Option<Arc<ClockMaster>>, RouterError> {
    registry.set_ignored(cfg.ignore.iter().cloned());
    registry.set_hotplug(cfg.options.hotplug);

    for (nickname, device) in &cfg.devices {
        registry.register_port(nickname, &device.name, device.port)?;
    }

    for (name, mapping_cfg) in &cfg.mappings {
        let inputs = registry.open_inputs(&mapping_cfg.inputs);
        let outputs = registry.open_outputs(&mapping_cfg.outputs);
        for e in inputs.failed.iter().chain(outputs.failed.iter()) {
            log_warn!("mapping '{}': {}", name, e);
        }
        let filters = build_filters(mapping_cfg)?;
        let mapping = Arc::new(Mapping::new(name.clone(), inputs.opened, outputs.opened, filters));
        router.add_mapping(mapping);
    }
    router.activate_all();

    let clock = match &cfg.clock {
        Some(clock_cfg) => {
            let master = ClockMaster::new(
                clock_cfg.bpm,
                clock_cfg.ppqn,
                clock_cfg.pattern_length,
                clock_cfg.tap_enabled,
            );
            let outputs = registry.open_outputs(&clock_cfg.outputs);
            for e in &outputs.failed {
                log_warn!("clock: {}", e);
            }
            master.set_outputs(outputs.opened);
            master.start_worker();

            let inputs = registry.open_inputs(&clock_cfg.inputs);
            for e in &inputs.failed {
                log_warn!("clock: {}", e);
            }
            for input in inputs.opened {
                let master = master.clone();
                input.subscribe(Box::new(move |msg| master.handle_message(msg)));
            }
            Some(master)
        }
        None => None,
    };

    Ok(clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid_and_empty() {
        let cfg = RouterConfiguration::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.options.hotplug);
        assert!(cfg.mappings.is_empty());
    }

    #[test]
    fn mapping_referencing_undeclared_device_is_rejected() {
        let mut cfg = RouterConfiguration::default();
        cfg.mappings.insert(
            "m".to_string(),
            MappingConfig {
                inputs: vec!["ghost".to_string()],
                ..Default::default()
            },
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let mut cfg = RouterConfiguration::default();
        cfg.devices.insert(
            "kbd".to_string(),
            DeviceConfig {
                name: "Keyboard".to_string(),
                port: 0,
            },
        );
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: RouterConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.devices.len(), 1);
    }

    #[test]
    fn channel_whitelist_and_remap_matches_worked_example() {
        use crate::filter::run_pipeline;
        use crate::message::{Message, MessageFields, MessageType};

        let mapping_cfg = MappingConfig {
            channels: Some(ChannelConfig {
                whitelist: vec![1, 6],
                blacklist: vec![],
                map: BTreeMap::from([("6".to_string(), 1u8)]),
                toggle_controller: None,
            }),
            ..Default::default()
        };
        let mut filters = build_filters(&mapping_cfg).unwrap();

        let note_on = |channel: u8| {
            Message::from_properties(
                MessageType::NoteOn,
                Some(channel),
                MessageFields {
                    note: Some(60),
                    velocity: Some(100),
                    ..Default::default()
                },
            )
            .unwrap()
        };

        // Channel 5 (1-based) isn't whitelisted: dropped.
        assert!(run_pipeline(&mut filters, note_on(4)).is_empty());
        // Channel 1 (1-based, wire 0): passes through unchanged.
        let out = run_pipeline(&mut filters, note_on(0));
        assert_eq!(out[0].channel(), Some(0));
        // Channel 6 (1-based, wire 5): remapped to channel 1 (wire 0).
        let out = run_pipeline(&mut filters, note_on(5));
        assert_eq!(out[0].channel(), Some(0));
        match out[0].payload() {
            crate::message::Payload::NoteOn { velocity, .. } => assert_eq!(*velocity, 100),
            _ => panic!("expected NoteOn"),
        }
    }
}
