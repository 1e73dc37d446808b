//! Task orchestration: shared state, priorities and the worker loops.
//!
//! ```text
//!            ┌──────────────── SharedState ────────────────┐
//!            │ settings (RwLock)   bus (Mutex)   run guard │
//!            │ pulse counter       status channel  history │
//!            └─────────────────────────────────────────────┘
//!   telemetry (2)    console (3)    supervisor (4) ──spawn──▶ executor (5)
//! ```
//!
//! One [`SharedState`] is leaked at boot and handed to every task by
//! `&'static` reference.  The supervisor polls the clock, detects the
//! rising edge of an alarm window (or a manual request), and runs the
//! watering executor on its own highest-priority task.  While an alarm run
//! is in progress the supervisor keeps watching the clock and asks the
//! executor to stop after the current plant once the window has closed.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::io;
use std::sync::{Mutex, PoisonError, RwLock};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};

use crate::adapters::hardware::BusActuators;
use crate::adapters::log_sink::{HistoryLogger, LogHistory, StatusConsole};
use crate::adapters::time::{TaskDelay, uptime_secs};
use crate::app::payload::{AlarmTable, PlantTable};
use crate::app::ports::{ActuatorBus, ClockSource};
use crate::bus::SharedBus;
use crate::config::{Settings, WateringConfig};
use crate::drivers::buzzer::Buzzer;
use crate::drivers::task_pin::{Core, spawn_task};
use crate::executor::{RunError, RunReport, RunGuard, WateringExecutor};
use crate::flow::PulseCounter;
use crate::schedule::{AlarmSlot, ClockTime, SlotId, active_slot};
use crate::status::{LatestStatus, StatusChannel, StatusPublisher};

/// FreeRTOS priorities, lowest first.
pub mod priority {
    pub const TELEMETRY: u8 = 2;
    pub const CONSOLE: u8 = 3;
    pub const SUPERVISOR: u8 = 4;
    pub const EXECUTOR: u8 = 5;
}

const SUPERVISOR_STACK_KB: usize = 8;
const EXECUTOR_STACK_KB: usize = 8;
const TELEMETRY_STACK_KB: usize = 6;
const TELEMETRY_PERIOD_MS: u32 = 250;

// ═══════════════════════════════════════════════════════════════
//  Shared state
// ═══════════════════════════════════════════════════════════════

pub struct SharedState<I> {
    settings: RwLock<Settings>,
    pub bus: SharedBus<I>,
    pub run_guard: RunGuard,
    pub pulses: PulseCounter,
    pub status: StatusChannel,
    pub latest_status: LatestStatus,
    pub history: LogHistory,
    pub watering: WateringConfig,
    manual_run: AtomicBool,
    stop_run: AtomicBool,
    buzzer: Mutex<Buzzer>,
}

impl<I: I2c> SharedState<I> {
    pub fn new(bus: SharedBus<I>, settings: Settings, watering: WateringConfig) -> Self {
        Self {
            settings: RwLock::new(settings),
            bus,
            run_guard: RunGuard::new(),
            pulses: PulseCounter::new(),
            status: StatusChannel::new(),
            latest_status: LatestStatus::new(),
            history: LogHistory::new(),
            watering,
            manual_run: AtomicBool::new(false),
            stop_run: AtomicBool::new(false),
            buzzer: Mutex::new(Buzzer::new()),
        }
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn alarms(&self) -> AlarmTable {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .alarms
            .clone()
    }

    pub fn plants(&self) -> PlantTable {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .plants
            .clone()
    }

    /// Swap in settings that have already been validated and persisted.
    pub fn replace_settings(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Ask the supervisor for a run at its next poll.
    pub fn request_manual_run(&self) {
        self.manual_run.store(true, Ordering::Release);
    }

    pub fn take_manual_request(&self) -> bool {
        self.manual_run.swap(false, Ordering::AcqRel)
    }

    /// Ask the current run to finish after the plant in progress.
    pub fn request_stop(&self) {
        self.stop_run.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_run.load(Ordering::Acquire)
    }

    pub fn is_watering(&self) -> bool {
        self.run_guard.is_running()
    }

    pub fn beep(&self, count: u8, delay: &mut impl DelayNs) {
        self.buzzer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .beep(count, delay);
    }

    pub fn beeps(&self) -> u32 {
        self.buzzer.lock().unwrap_or_else(PoisonError::into_inner).beeps()
    }
}

/// Local epoch seconds from the clock, or uptime when there is none.
pub fn timestamp<C: ClockSource>(clock: Option<&C>) -> i64 {
    match clock.map(|c| c.now()) {
        Some(Ok(now)) => now.unix,
        Some(Err(e)) => {
            warn!("clock read failed ({}), using uptime", e);
            uptime_secs()
        }
        None => uptime_secs(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Watering run
// ═══════════════════════════════════════════════════════════════

/// Claim the run guard and water every enabled plant.
///
/// Returns [`RunError::AlreadyRunning`] without touching any output if
/// another run holds the guard.  Plants after the first are skipped once
/// [`SharedState::request_stop`] has been called.
pub fn run_watering<I: I2c, D: DelayNs>(
    state: &SharedState<I>,
    mut delay: D,
    started_unix: i64,
) -> Result<RunReport, RunError> {
    let _token = state.run_guard.try_acquire().ok_or(RunError::AlreadyRunning)?;
    state.stop_run.store(false, Ordering::Release);

    let settings = state.settings();
    let plants: PlantTable = settings.enabled_plants().copied().collect();
    if settings.capabilities.has_mcp {
        state.beep(1, &mut delay);
    }

    let publisher = StatusPublisher::new(
        &state.status,
        &state.latest_status,
        state.watering.status_publish_timeout,
    );
    let mut executor = WateringExecutor::new(
        BusActuators::new(state.bus.clone()),
        HistoryLogger::new(&state.history),
        delay,
        &state.pulses,
        publisher,
        state.watering,
    );
    executor.run_until(
        &plants,
        settings.capabilities,
        settings.flow_calibration_factor,
        started_unix,
        || !state.stop_requested(),
    )
}

/// Run on the executor task and wait for it to finish.
///
/// `still_wanted` is polled at the supervisor period while the run is in
/// progress; once it returns `false` the run stops after the current plant.
pub fn dispatch_run<I>(
    state: &'static SharedState<I>,
    started_unix: i64,
    mut still_wanted: impl FnMut() -> bool,
) -> Result<RunReport, RunError>
where
    I: I2c + Send + 'static,
{
    let handle = match spawn_task(Core::App, priority::EXECUTOR, EXECUTOR_STACK_KB, "executor\0", move || {
        run_watering(state, TaskDelay, started_unix)
    }) {
        Ok(handle) => handle,
        Err(e) => {
            error!("executor task spawn failed: {}", e);
            return Err(RunError::Aborted);
        }
    };

    let mut delay = TaskDelay;
    let mut stopping = false;
    while !handle.is_finished() {
        if !still_wanted() {
            if !stopping {
                info!("supervisor: window closed, stopping after the current plant");
                stopping = true;
            }
            // Repeated so a run that had not yet cleared the flag still sees it.
            state.request_stop();
        }
        delay.delay_ms(poll_ms(state.watering.supervisor_poll));
    }

    handle.join().unwrap_or_else(|_| {
        error!("executor task panicked");
        Err(RunError::Aborted)
    })
}

fn poll_ms(period: core::time::Duration) -> u32 {
    u32::try_from(period.as_millis()).unwrap_or(u32::MAX)
}

/// Whether alarm `slot` still contains the current time.  A failed clock
/// read counts as open; the next poll looks again.
pub fn window_open<C: ClockSource>(alarms: &[AlarmSlot], slot: SlotId, clock: Option<&C>) -> bool {
    match clock.map(|c| c.now()) {
        Some(Ok(now)) => alarms
            .get(slot)
            .is_some_and(|s| s.is_armed() && s.contains(&now)),
        Some(Err(_)) | None => true,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Supervisor
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Alarm { slot: SlotId, started_unix: i64 },
    Manual { started_unix: i64 },
}

impl Trigger {
    pub fn started_unix(&self) -> i64 {
        match *self {
            Self::Alarm { started_unix, .. } | Self::Manual { started_unix } => started_unix,
        }
    }

    /// Whether the run this trigger started should go on.  Manual runs are
    /// not bound to a window.
    pub fn still_wanted<I: I2c, C: ClockSource>(&self, state: &SharedState<I>, clock: Option<&C>) -> bool {
        match *self {
            Self::Alarm { slot, .. } => window_open(&state.alarms(), slot, clock),
            Self::Manual { .. } => true,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alarm { slot, .. } => write!(f, "alarm slot {slot}"),
            Self::Manual { .. } => write!(f, "manual request"),
        }
    }
}

/// Edge detector over the alarm windows.
///
/// A run starts once when a window opens, not on every poll inside it.
#[derive(Debug, Default)]
pub struct Supervisor {
    was_active: bool,
}

impl Supervisor {
    pub const fn new() -> Self {
        Self { was_active: false }
    }

    /// The slot whose window just opened, if any.
    pub fn poll(&mut self, alarms: &[AlarmSlot], now: &ClockTime) -> Option<SlotId> {
        let slot = active_slot(alarms, now);
        let rising = !self.was_active;
        self.was_active = slot.is_some();
        slot.filter(|_| rising)
    }

    /// Re-arm so the next poll inside the same window triggers again.
    pub fn retry(&mut self) {
        self.was_active = false;
    }

    /// Decide whether a run should start now.
    pub fn next_trigger<I: I2c, C: ClockSource>(
        &mut self,
        state: &SharedState<I>,
        clock: Option<&C>,
    ) -> Option<Trigger> {
        let manual = state.take_manual_request();

        let alarm = match clock.map(|c| c.now()) {
            Some(Ok(now)) => self
                .poll(&state.alarms(), &now)
                .map(|slot| Trigger::Alarm {
                    slot,
                    started_unix: now.unix,
                }),
            Some(Err(e)) => {
                warn!("supervisor: clock read failed ({}), retrying next poll", e);
                None
            }
            None => None,
        };

        if alarm.is_some() {
            if manual {
                debug!("supervisor: manual request served by alarm run");
            }
            return alarm;
        }
        manual.then(|| Trigger::Manual {
            started_unix: timestamp(clock),
        })
    }

    /// Log the outcome; a bus error re-arms the current window.
    pub fn settle(&mut self, result: &Result<RunReport, RunError>) {
        match result {
            Ok(report) => info!(
                "supervisor: run finished, {} plant(s), {:.1} ml, {} skipped",
                report.plants.len(),
                report.total_ml(),
                report.skipped
            ),
            Err(RunError::Bus(e)) => {
                warn!("supervisor: run aborted ({}), retrying next poll", e);
                self.retry();
            }
            Err(RunError::AlreadyRunning) => debug!("supervisor: run already in progress"),
            Err(e) => warn!("supervisor: {}", e),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Task loops
// ═══════════════════════════════════════════════════════════════

pub fn supervisor_loop<I, C>(state: &'static SharedState<I>, clock: Option<C>)
where
    I: I2c + Send + 'static,
    C: ClockSource,
{
    let mut supervisor = Supervisor::new();
    let mut delay = TaskDelay;
    let period_ms = poll_ms(state.watering.supervisor_poll);
    if clock.is_none() {
        warn!("supervisor: no RTC, alarms disabled (manual runs only)");
    }

    loop {
        if let Some(trigger) = supervisor.next_trigger(state, clock.as_ref()) {
            info!("supervisor: starting run ({})", trigger);
            let result = dispatch_run(state, trigger.started_unix(), || {
                trigger.still_wanted(state, clock.as_ref())
            });
            supervisor.settle(&result);
        }
        delay.delay_ms(period_ms);
    }
}

pub fn telemetry_loop<I: I2c>(state: &SharedState<I>) {
    let subscriber = match state.status.subscriber() {
        Ok(s) => s,
        Err(e) => {
            error!("telemetry: no status subscription ({:?})", e);
            return;
        }
    };
    let mut console = StatusConsole::new(subscriber);
    let actuators = BusActuators::new(state.bus.clone());
    let mut delay = TaskDelay;
    let mut last_outputs = None;

    loop {
        console.drain();
        let outputs = actuators.output_state();
        if last_outputs != Some(outputs) {
            info!("OUTPUTS | {:#06x}", outputs);
            last_outputs = Some(outputs);
        }
        delay.delay_ms(TELEMETRY_PERIOD_MS);
    }
}

/// Start the supervisor and telemetry tasks.
pub fn spawn_workers<I, C>(state: &'static SharedState<I>, clock: Option<C>) -> io::Result<()>
where
    I: I2c + Send + 'static,
    C: ClockSource + Send + 'static,
{
    spawn_task(Core::App, priority::SUPERVISOR, SUPERVISOR_STACK_KB, "supervisor\0", move || {
        supervisor_loop(state, clock);
    })?;
    spawn_task(Core::Pro, priority::TELEMETRY, TELEMETRY_STACK_KB, "telemetry\0", move || {
        telemetry_loop(state);
    })?;
    Ok(())
}
