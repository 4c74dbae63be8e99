// The timing thread. It owns the Scheduler and the only clock, talks to the
// host over two bounded channels, and never touches the UI or the audio device,
// so neither can starve it.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, tick, Receiver, Sender, TrySendError};
use log::{debug, warn};

use crate::config::SchedulerSettings;
use crate::sequencer::scheduler::{Scheduler, SchedulerUpdate, TriggerEvent};
use crate::shared::StepPosition;

// Host to scheduler.
#[derive(Clone, Debug)]
pub enum HostMessage {
    Start,
    Stop,
    Update(SchedulerUpdate),
    Shutdown,
}

// Scheduler to host.
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerMessage {
    // one batch per tick, so simultaneous steps stay simultaneous
    Triggers { issued_at: Instant, triggers: Vec<TriggerEvent> },
    Step(StepPosition),
}

pub struct SchedulerHandle {
    tx: Sender<HostMessage>,
    rx: Receiver<SchedulerMessage>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn spawn(settings: SchedulerSettings, initial: SchedulerUpdate) -> std::io::Result<Self> {
        let capacity = settings.channel_capacity.max(1);
        let (tx, cmd_rx) = crossbeam_channel::bounded::<HostMessage>(capacity);
        let (event_tx, rx) = crossbeam_channel::bounded::<SchedulerMessage>(capacity);

        let join = std::thread::Builder::new()
            .name("beatgrid-timing".into())
            .spawn(move || run(settings, initial, cmd_rx, event_tx))?;

        Ok(Self { tx, rx, join: Some(join) })
    }

    pub fn start(&self) {
        self.send(HostMessage::Start);
    }

    pub fn stop(&self) {
        self.send(HostMessage::Stop);
    }

    pub fn update(&self, update: SchedulerUpdate) {
        self.send(HostMessage::Update(update));
    }

    pub fn try_recv(&self) -> Option<SchedulerMessage> {
        self.rx.try_recv().ok()
    }

    pub fn events(&self) -> &Receiver<SchedulerMessage> {
        &self.rx
    }

    fn send(&self, msg: HostMessage) {
        // blocking send: control messages must not be lost, and the thread drains quickly
        if self.tx.send(msg).is_err() {
            warn!("timing thread is gone, message dropped");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(HostMessage::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run(
    settings: SchedulerSettings,
    initial: SchedulerUpdate,
    cmd_rx: Receiver<HostMessage>,
    event_tx: Sender<SchedulerMessage>,
) {
    let epoch = Instant::now();
    let now_ms = || ms_since(epoch, Instant::now());
    let ticker = tick(Duration::from_millis(settings.tick_interval_ms.max(1)));
    let mut scheduler = Scheduler::new(settings, initial);

    loop {
        let tick_rx = if scheduler.is_running() { ticker.clone() } else { never() };
        select! {
            recv(cmd_rx) -> msg => {
                let Ok(msg) = msg else { break };
                match msg {
                    HostMessage::Start => {
                        let pos = scheduler.start(now_ms());
                        if !emit(&event_tx, SchedulerMessage::Step(pos)) {
                            break;
                        }
                        // first step goes out immediately, not one tick later
                        if !run_tick(&mut scheduler, epoch, &event_tx) {
                            break;
                        }
                    }
                    HostMessage::Stop => {
                        let pos = scheduler.stop();
                        if !emit(&event_tx, SchedulerMessage::Step(pos)) {
                            break;
                        }
                    }
                    HostMessage::Update(update) => scheduler.update(update, now_ms()),
                    HostMessage::Shutdown => break,
                }
            }
            recv(tick_rx) -> _ => {
                if !run_tick(&mut scheduler, epoch, &event_tx) {
                    break;
                }
            }
        }
    }
    debug!("timing thread exiting");
}

// false once the host has hung up
fn run_tick(scheduler: &mut Scheduler, epoch: Instant, tx: &Sender<SchedulerMessage>) -> bool {
    let issued_at = Instant::now();
    let out = scheduler.tick(ms_since(epoch, issued_at));
    if !out.triggers.is_empty() {
        let batch = SchedulerMessage::Triggers { issued_at, triggers: out.triggers };
        if !emit(tx, batch) {
            return false;
        }
    }
    match out.step {
        Some(pos) => emit(tx, SchedulerMessage::Step(pos)),
        None => true,
    }
}

fn ms_since(epoch: Instant, at: Instant) -> f64 {
    at.duration_since(epoch).as_secs_f64() * 1000.0
}

// fire-and-forget: a full queue drops the message rather than stalling the clock
fn emit(tx: &Sender<SchedulerMessage>, msg: SchedulerMessage) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("host is not draining scheduler events, dropping one");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}
