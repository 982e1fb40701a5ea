//! The clock worker: a dedicated high-priority OS thread that emits one
//! event per tick with nanosecond-scale drift compensation. Structured the
//! way this codebase's real-time world loop is built — a
//! `ThreadBuilder`-spawned thread, a bounded control channel, and
//! `recv_timeout` doing double duty as both "wait for the next command"
//! and "sleep until the next tick" — except simplified from an arbitrary
//! priority-queue dispatcher down to a single periodic tick source.

use crate::error::RouterError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thread_priority::{ThreadBuilder, ThreadPriority};

pub enum WorkerCommand {
    /// Sets the tick length; takes effect starting at the next tick
    /// boundary, never mid-tick.
    Config { tick_length_ns: u64 },
    Start,
    Stop,
    Destroy,
}

pub enum WorkerEvent {
    Ready,
    State { started: bool },
    Tick,
    Error(RouterError),
}

const DEFAULT_TICK_NS: u64 = 20_833_333; // 120 BPM @ 24 PPQN

pub fn spawn(cmd_rx: Receiver<WorkerCommand>, evt_tx: Sender<WorkerEvent>) -> JoinHandle<()> {
    ThreadBuilder::default()
        .name("midi-clock-worker")
        .priority(ThreadPriority::Max)
        .spawn(move |_| run(cmd_rx, evt_tx))
        .expect("failed to spawn clock worker thread")
}

fn run(cmd_rx: Receiver<WorkerCommand>, evt_tx: Sender<WorkerEvent>) {
    let _ = evt_tx.send(WorkerEvent::Ready);
    let mut tick_length = Duration::from_nanos(DEFAULT_TICK_NS);
    let mut running = false;
    let mut next_at = Instant::now();

    loop {
        if running {
            let now = Instant::now();
            let remaining = next_at.saturating_duration_since(now);
            match cmd_rx.recv_timeout(remaining) {
                Ok(cmd) => {
                    if !apply_command(cmd, &mut tick_length, &mut running, &mut next_at, &evt_tx) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let fire_at = next_at;
                    next_at += tick_length;
                    let now = Instant::now();
                    if now.saturating_duration_since(fire_at) > tick_length {
                        let diff = now.saturating_duration_since(fire_at).as_nanos() as i64;
                        let _ = evt_tx.send(WorkerEvent::Error(RouterError::timing(diff)));
                        running = false;
                        let _ = evt_tx.send(WorkerEvent::State { started: false });
                    } else {
                        let _ = evt_tx.send(WorkerEvent::Tick);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        } else {
            match cmd_rx.recv() {
                Ok(cmd) => {
                    if !apply_command(cmd, &mut tick_length, &mut running, &mut next_at, &evt_tx) {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    }
}

fn apply_command(
    cmd: WorkerCommand,
    tick_length: &mut Duration,
    running: &mut bool,
    next_at: &mut Instant,
    evt_tx: &Sender<WorkerEvent>,
) -> bool {
    match cmd {
        WorkerCommand::Config { tick_length_ns } => {
            *tick_length = Duration::from_nanos(tick_length_ns);
        }
        WorkerCommand::Start => {
            // The tick emitted here stands for tick zero; advance `next_at`
            // past it so the loop's next `recv_timeout` waits a full tick
            // length rather than firing again immediately at t0.
            *next_at = Instant::now() + *tick_length;
            *running = true;
            let _ = evt_tx.send(WorkerEvent::State { started: true });
            let _ = evt_tx.send(WorkerEvent::Tick);
        }
        WorkerCommand::Stop => {
            *running = false;
            let _ = evt_tx.send(WorkerEvent::State { started: false });
        }
        WorkerCommand::Destroy => return false,
    }
    true
}
