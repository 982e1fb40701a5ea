//! Clock core (C5): a master that owns tempo/transport state and a worker
//! thread that emits ticks with nanosecond drift compensation. The master
//! drives MIDI realtime output (Clock/Start/Stop/Continue bytes) and hosts
//! the clock's three built-in adjusters (play-pause, stop, tempo), all
//! bound to CC 0x0B per the fixed wiring this hardware integration uses.

pub mod tap_tempo;
pub mod worker;

use crate::device::{Device, Output};
use crate::filter::adjuster::{AdjusterRule, TriggerValue};
use crate::message::{Message, MessageFields, MessageType, Payload};
use crate::{log_error, log_warn};
use crossbeam_channel::Sender as CbSender;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;
use tap_tempo::TapTempo;
use worker::{WorkerCommand, WorkerEvent};

pub const BPM_MIN: f64 = 60.0;
pub const BPM_MAX: f64 = 300.0;
const TEMPO_CONTROLLER: u8 = 0x0B;

/// A derived position in the tick stream, computed as ticks are emitted.
/// `index` is ticks since the last Start; whole/half/quarter/eighth/
/// sixteenth-note boundaries are derived from it and `ppqn` by division,
/// never stored redundantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub index: u64,
    pub ppqn: u32,
    pub beat: u32,
    pub position: u32,
}

impl Tick {
    pub fn whole_note(&self) -> u32 {
        self.beat / 4
    }

    pub fn is_quarter_note(&self) -> bool {
        self.index % self.ppqn as u64 == 0
    }

    pub fn is_half_note(&self) -> bool {
        self.index % (self.ppqn as u64 * 2) == 0
    }

    pub fn is_whole_note(&self) -> bool {
        self.index % (self.ppqn as u64 * 4) == 0
    }

    pub fn is_eighth_note(&self) -> bool {
        self.index % (self.ppqn as u64 / 2).max(1) == 0
    }

    pub fn is_sixteenth_note(&self) -> bool {
        self.index % (self.ppqn as u64 / 4).max(1) == 0
    }
}

fn bpm_to_tick_length_ns(bpm: f64, ppqn: u32) -> u64 {
    (60_000_000_000.0 / (bpm * ppqn as f64)).round() as u64
}

pub struct ClockMaster {
    bpm: Mutex<f64>,
    ppqn: u32,
    pattern_length: u32,
    tick_count: AtomicU64,
    started: AtomicBool,
    paused: AtomicBool,
    outputs: Mutex<Vec<Arc<Output>>>,
    cmd_tx: Mutex<Option<CbSender<WorkerCommand>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
    tap: Mutex<TapTempo>,
    tap_enabled: bool,
    listeners: Mutex<Vec<Box<dyn Fn(Tick) + Send + Sync>>>,
    play_pause_rule: AdjusterRule,
    stop_rule: AdjusterRule,
    tempo_rule: AdjusterRule,
}

impl ClockMaster {
    pub fn new(bpm: f64, ppqn: u32, pattern_length: u32, tap_enabled: bool) -> Arc<Self> {
        let bpm = bpm.clamp(BPM_MIN, BPM_MAX);
        Arc::new(ClockMaster {
            bpm: Mutex::new(bpm),
            ppqn,
            pattern_length: pattern_length.max(1),
            tick_count: AtomicU64::new(0),
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            outputs: Mutex::new(Vec::new()),
            cmd_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
            pump_handle: Mutex::new(None),
            tap: Mutex::new(TapTempo::new()),
            tap_enabled,
            listeners: Mutex::new(Vec::new()),
            play_pause_rule: AdjusterRule::new(
                "clock.play_pause",
                MessageType::ControlChange,
                vec![
                    ("controller", TriggerValue::Equals(TEMPO_CONTROLLER as i64)),
                    ("value", TriggerValue::Equals(127)),
                ],
                "value",
                false,
            ),
            stop_rule: AdjusterRule::new(
                "clock.stop",
                MessageType::ControlChange,
                vec![
                    ("controller", TriggerValue::Equals(TEMPO_CONTROLLER as i64)),
                    ("value", TriggerValue::Equals(127)),
                ],
                "value",
                false,
            ),
            tempo_rule: AdjusterRule::new(
                "clock.tempo",
                MessageType::ControlChange,
                vec![("controller", TriggerValue::Equals(TEMPO_CONTROLLER as i64))],
                "value",
                true,
            ),
        })
    }

    pub fn set_outputs(&self, outputs: Vec<Arc<Output>>) {
        *self.outputs.lock().unwrap() = outputs;
    }

    pub fn on_tick(&self, listener: Box<dyn Fn(Tick) + Send + Sync>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn bpm(&self) -> f64 {
        *self.bpm.lock().unwrap()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Spawns the worker thread and a pump thread that turns its events
    /// into MIDI realtime output and tick-listener callbacks.
    pub fn start_worker(self: &Arc<Self>) {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (evt_tx, evt_rx) = crossbeam_channel::unbounded();
        let handle = worker::spawn(cmd_rx, evt_tx);
        *self.worker_handle.lock().unwrap() = Some(handle);
        *self.cmd_tx.lock().unwrap() = Some(cmd_tx.clone());

        let this = self.clone();
        let pump = std::thread::spawn(move || {
            for event in evt_rx.iter() {
                match event {
                    WorkerEvent::Ready => {
                        this.push_tick_length();
                    }
                    WorkerEvent::State { started } => {
                        // Worker start/stop is an internal ticking toggle,
                        // distinct from the master's own started/paused
                        // transport state, which the public API already
                        // updated before issuing the command.
                        let _ = started;
                    }
                    WorkerEvent::Tick => this.emit_tick(),
                    WorkerEvent::Error(e) => {
                        log_error!("clock worker: {}", e);
                        this.started.store(false, Ordering::SeqCst);
                        this.paused.store(false, Ordering::SeqCst);
                    }
                }
            }
        });
        *self.pump_handle.lock().unwrap() = Some(pump);
    }

    fn push_tick_length(&self) {
        if let Some(tx) = self.cmd_tx.lock().unwrap().as_ref() {
            let ns = bpm_to_tick_length_ns(self.bpm(), self.ppqn);
            let _ = tx.send(WorkerCommand::Config { tick_length_ns: ns });
        }
    }

    fn emit_tick(&self) {
        let index = self.tick_count.fetch_add(1, Ordering::SeqCst);
        let beat = index as u32 / self.ppqn;
        let position = (index % self.pattern_length as u64) as u32;
        let tick = Tick {
            index,
            ppqn: self.ppqn,
            beat,
            position,
        };
        for output in self.outputs.lock().unwrap().iter() {
            if output.is_open() {
                let msg = Message::from_properties(MessageType::Clock, None, MessageFields::default())
                    .expect("Clock message always constructible");
                if let Err(e) = output.send(msg.bytes()) {
                    log_error!("clock output send failed: {}", e);
                }
            }
        }
        for listener in self.listeners.lock().unwrap().iter() {
            listener(tick);
        }
    }

    fn broadcast_realtime(&self, kind: MessageType) {
        let msg = Message::from_properties(kind, None, MessageFields::default())
            .expect("realtime message always constructible");
        for output in self.outputs.lock().unwrap().iter() {
            if output.is_open() {
                let _ = output.send(msg.bytes());
            }
        }
    }

    pub fn play(self: &Arc<Self>) {
        let was_started = self.started.swap(true, Ordering::SeqCst);
        let was_paused = self.paused.swap(false, Ordering::SeqCst);
        if !was_started {
            self.tick_count.store(0, Ordering::SeqCst);
            self.broadcast_realtime(MessageType::Start);
        } else if was_paused {
            self.broadcast_realtime(MessageType::Continue);
        } else {
            return;
        }
        self.push_tick_length();
        if let Some(tx) = self.cmd_tx.lock().unwrap().as_ref() {
            let _ = tx.send(WorkerCommand::Start);
        }
    }

    pub fn pause(&self) {
        if !self.started.load(Ordering::SeqCst) || self.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.cmd_tx.lock().unwrap().as_ref() {
            let _ = tx.send(WorkerCommand::Stop);
        }
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.broadcast_realtime(MessageType::Stop);
        if let Some(tx) = self.cmd_tx.lock().unwrap().as_ref() {
            let _ = tx.send(WorkerCommand::Stop);
        }
    }

    pub fn set_tempo(&self, bpm: f64) {
        *self.bpm.lock().unwrap() = bpm.clamp(BPM_MIN, BPM_MAX);
        self.push_tick_length();
    }

    pub fn tap(self: &Arc<Self>) {
        if let Some(bpm) = self.tap.lock().unwrap().tap(Instant::now()) {
            self.set_tempo(bpm);
        }
    }

    /// Feeds an inbound message to the clock's built-in adjusters (and, if
    /// tap tempo is enabled, treats a NoteOn on a clock input as a tap).
    ///
    /// `play-pause` and `stop` share an identical trigger (CC 0x0B,
    /// value=127); checked in declaration order, `play-pause` always wins
    /// and consumes the message first, same as any other filter whose
    /// adjusters have overlapping triggers.
    pub fn handle_message(self: &Arc<Self>, msg: &Message) {
        if self.tap_enabled && matches!(msg.payload(), Payload::NoteOn { .. }) {
            self.tap();
            return;
        }
        if self.play_pause_rule.fire(msg).is_some() {
            if self.is_started() && !self.is_paused() {
                self.pause();
            } else {
                self.play();
            }
            return;
        }
        if self.stop_rule.fire(msg).is_some() {
            self.stop();
            return;
        }
        if let Some(value) = self.tempo_rule.fire(msg) {
            let bpm = ((value as f64 + 1.0) * (BPM_MAX - BPM_MIN) / 128.0) + BPM_MIN;
            self.set_tempo(bpm);
        } else {
            log_warn!("clock: unrecognized control message ignored");
        }
    }

    pub fn destroy(&self) {
        if let Some(tx) = self.cmd_tx.lock().unwrap().take() {
            let _ = tx.send(WorkerCommand::Destroy);
        }
        if let Some(handle) = self.worker_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.pump_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_clips_to_bounds() {
        let clock = ClockMaster::new(59.0, 24, 96, false);
        assert_eq!(clock.bpm(), 60.0);
        clock.set_tempo(301.0);
        assert_eq!(clock.bpm(), 300.0);
    }

    #[test]
    fn tick_length_matches_worked_example() {
        // 120 BPM @ 24 PPQN => 20,833,333ns per tick.
        assert_eq!(bpm_to_tick_length_ns(120.0, 24), 20_833_333);
    }

    #[test]
    fn tick_derivation_after_96_ticks_at_24_ppqn() {
        let clock = ClockMaster::new(120.0, 24, 96, false);
        for _ in 0..96 {
            clock.emit_tick();
        }
        let index = clock.tick_count.load(Ordering::SeqCst);
        assert_eq!(index, 96);
        assert_eq!(index as u32 / clock.ppqn, 4);
    }

    #[test]
    fn tick_reports_whole_note_and_quarter_note_boundaries() {
        let clock = ClockMaster::new(120.0, 24, 96, false);
        let seen: Arc<Mutex<Vec<Tick>>> = Arc::new(Mutex::new(Vec::new()));
        let collector = seen.clone();
        clock.on_tick(Box::new(move |tick| collector.lock().unwrap().push(tick)));
        for _ in 0..97 {
            clock.emit_tick();
        }
        let ticks = seen.lock().unwrap();
        let quarter_positions: Vec<u64> = ticks.iter().filter(|t| t.is_quarter_note()).map(|t| t.index).collect();
        assert_eq!(quarter_positions, vec![0, 24, 48, 72, 96]);
        let last = ticks.last().unwrap();
        assert_eq!(last.index, 96);
        assert_eq!(last.whole_note(), 1);
        assert!(last.is_whole_note());
    }
}
