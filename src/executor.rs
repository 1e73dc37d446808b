//! Watering executor: valve / pump sequencing and the flow-metering loop.
//!
//! One *run* waters every enabled plant in table order.  Each plant goes
//! through the linear phases
//!
//! ```text
//!  Idle ──▶ Priming ──▶ PumpOn ──▶ Flowing ──▶ Finished
//!           valve open   pump on    sample @1Hz  pump off, valve off
//! ```
//!
//! Every plant is bracketed by "all outputs off": once before the valve
//! opens and once after the valve closes.  The closing bracket runs on
//! every exit path, including a bus error in the middle of the sequence.
//!
//! A plant that has started always runs to completion.  Between plants
//! the executor asks its caller whether to carry on, which is how an alarm
//! run ends once its window closes.  [`RunGuard`] makes sure at most one
//! run exists at a time.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{error, info, warn};

use crate::app::ports::{ActuatorBus, LogRecord, OutputLevel, WateringLogger};
use crate::config::{Capabilities, MAX_PLANTS, Plant, WateringConfig};
use crate::error::{BusError, CapabilityError};
use crate::flow::{FlowMeter, PulseCounter};
use crate::pins::PUMP_OUTPUT;
use crate::status::{StatusPublisher, WateringPhase, WateringStatus};

/// Label attached to every watering log record.
pub const LOG_LABEL: &str = "water";

// ═══════════════════════════════════════════════════════════════
//  Run guard
// ═══════════════════════════════════════════════════════════════

/// Single-owner run flag.
#[derive(Debug, Default)]
pub struct RunGuard(AtomicBool);

impl RunGuard {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Claim the right to run.  `None` if a run is already active.
    pub fn try_acquire(&self) -> Option<RunToken<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken(self))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Proof of an active run; releases the guard when dropped.
#[derive(Debug)]
pub struct RunToken<'a>(&'a RunGuard);

impl Drop for RunToken<'_> {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Results
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    /// Another run holds the guard.
    AlreadyRunning,
    /// Required hardware is not fitted; nothing was actuated.
    Capability(CapabilityError),
    /// A bus transaction failed; outputs were driven off and the run
    /// abandoned.
    Bus(BusError),
    /// The executor task could not be started or did not return.
    Aborted,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "watering already in progress"),
            Self::Capability(e) => write!(f, "cannot water: {e}"),
            Self::Bus(e) => write!(f, "watering aborted: {e}"),
            Self::Aborted => write!(f, "watering task failed"),
        }
    }
}

impl From<BusError> for RunError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<CapabilityError> for RunError {
    fn from(e: CapabilityError) -> Self {
        Self::Capability(e)
    }
}

/// Why the flowing phase of a plant ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    DurationElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantReport {
    pub plant_id: u8,
    pub volume_ml: f32,
    pub elapsed_s: u32,
    pub samples: u32,
    pub stop: StopReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub plants: Vec<PlantReport, MAX_PLANTS>,
    /// Plants left unwatered because the run was told to stop.
    pub skipped: usize,
}

impl RunReport {
    pub fn total_ml(&self) -> f32 {
        self.plants.iter().map(|p| p.volume_ml).sum()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Executor
// ═══════════════════════════════════════════════════════════════

pub struct WateringExecutor<'a, A, L, D> {
    actuators: A,
    logger: L,
    delay: D,
    pulses: &'a PulseCounter,
    status: StatusPublisher<'a>,
    config: WateringConfig,
}

impl<'a, A, L, D> WateringExecutor<'a, A, L, D>
where
    A: ActuatorBus,
    L: WateringLogger,
    D: DelayNs,
{
    pub fn new(
        actuators: A,
        logger: L,
        delay: D,
        pulses: &'a PulseCounter,
        status: StatusPublisher<'a>,
        config: WateringConfig,
    ) -> Self {
        Self {
            actuators,
            logger,
            delay,
            pulses,
            status,
            config,
        }
    }

    /// Water `plants` (already filtered to the enabled ones) in order.
    ///
    /// `started_unix` stamps the log records; without an RTC it is only
    /// uptime-relative.
    pub fn run(
        &mut self,
        plants: &[Plant],
        capabilities: Capabilities,
        calibration_factor: f32,
        started_unix: i64,
    ) -> Result<RunReport, RunError> {
        self.run_until(plants, capabilities, calibration_factor, started_unix, || true)
    }

    /// Like [`run`](Self::run), but `keep_going` is consulted before every
    /// plant after the first; once it returns `false` the remaining plants
    /// are skipped.
    pub fn run_until(
        &mut self,
        plants: &[Plant],
        capabilities: Capabilities,
        calibration_factor: f32,
        started_unix: i64,
        mut keep_going: impl FnMut() -> bool,
    ) -> Result<RunReport, RunError> {
        if !capabilities.has_mcp {
            error!("watering skipped: {}", CapabilityError::NoActuatorBus);
            return Err(CapabilityError::NoActuatorBus.into());
        }
        if !capabilities.has_rtc {
            warn!("no RTC fitted, watering log timestamps are not wall-clock");
        }

        info!("watering run: {} plant(s)", plants.len());
        let mut report = RunReport::default();
        let mut meter = FlowMeter::new(self.pulses, calibration_factor);
        let mut clock_s = 0u32;

        for (n, plant) in plants.iter().enumerate() {
            if n > 0 && !keep_going() {
                report.skipped = plants.len() - n;
                info!("watering run stopped, {} plant(s) skipped", report.skipped);
                break;
            }
            let done = self.water_plant(plant, &mut meter)?;
            clock_s = clock_s.saturating_add(done.elapsed_s);
            self.logger.record(LogRecord {
                timestamp: started_unix + i64::from(clock_s),
                label: LOG_LABEL,
                plant_id: done.plant_id,
                volume_ml: done.volume_ml,
                duration_s: done.elapsed_s,
            });
            // Capacity equals MAX_PLANTS and the plant table is bounded by it.
            let _ = report.plants.push(done);
        }

        info!("watering run complete: {:.1} ml total", report.total_ml());
        Ok(report)
    }

    fn water_plant(&mut self, plant: &Plant, meter: &mut FlowMeter<'_>) -> Result<PlantReport, BusError> {
        let target_ml = self.config.target_volume_ml(plant);
        let duration = self.config.run_duration(plant);
        info!(
            "plant {}: target {:.0} ml, at most {} s",
            plant.id,
            target_ml,
            duration.as_secs()
        );

        self.actuators.set_all_outputs(OutputLevel::Off)?;

        let flowed = self.open_and_meter(plant.id, target_ml, duration, meter);
        let closed = self.close(plant.id);

        // Finished is published on the abort path too.
        self.publish(WateringStatus {
            plant_id: plant.id,
            flow_ml: meter.cumulative_ml(),
            elapsed_s: flowed.as_ref().map_or(0, |r| r.elapsed_s),
            phase: WateringPhase::Finished,
        });

        let report = flowed?;
        closed?;
        info!(
            "plant {}: {:.1} ml in {} s ({:?})",
            plant.id, report.volume_ml, report.elapsed_s, report.stop
        );
        Ok(report)
    }

    /// Priming → PumpOn → Flowing.
    fn open_and_meter(
        &mut self,
        valve: u8,
        target_ml: f32,
        duration: core::time::Duration,
        meter: &mut FlowMeter<'_>,
    ) -> Result<PlantReport, BusError> {
        let mut snapshot = WateringStatus {
            plant_id: valve,
            ..WateringStatus::default()
        };

        self.actuators.set_output(valve, OutputLevel::On)?;
        snapshot.phase = WateringPhase::Priming;
        self.publish(snapshot);
        self.delay.delay_ms(duration_ms(self.config.valve_settle));

        self.actuators.set_output(PUMP_OUTPUT, OutputLevel::On)?;
        snapshot.phase = WateringPhase::PumpOn;
        self.publish(snapshot);
        self.delay.delay_ms(duration_ms(self.config.pump_settle));

        meter.reset();
        let window_ms = duration_ms(self.config.sample_window).max(1);
        let max_samples = duration_ms(duration).div_ceil(window_ms);
        let mut samples = 0u32;
        let mut elapsed_ms = 0u32;

        snapshot.phase = WateringPhase::Flowing;
        let stop = loop {
            if samples >= max_samples {
                break StopReason::DurationElapsed;
            }
            self.delay.delay_ms(window_ms);
            meter.sample_window(window_ms);
            samples += 1;
            elapsed_ms = elapsed_ms.saturating_add(window_ms);

            snapshot.flow_ml = meter.cumulative_ml();
            snapshot.elapsed_s = elapsed_ms / 1000;
            self.publish(snapshot);

            if meter.cumulative_ml() >= target_ml {
                break StopReason::TargetReached;
            }
        };

        Ok(PlantReport {
            plant_id: valve,
            volume_ml: meter.cumulative_ml(),
            elapsed_s: elapsed_ms / 1000,
            samples,
            stop,
        })
    }

    /// Pump off, then valve off, then everything off.  Every step is
    /// attempted even if an earlier one failed; the first error wins.
    fn close(&mut self, valve: u8) -> Result<(), BusError> {
        let pump = self.actuators.set_output(PUMP_OUTPUT, OutputLevel::Off);
        self.delay.delay_ms(duration_ms(self.config.pump_settle));
        let closed = self.actuators.set_output(valve, OutputLevel::Off);
        self.delay.delay_ms(duration_ms(self.config.valve_settle));
        let all = self.actuators.set_all_outputs(OutputLevel::Off);

        if let Err(e) = all {
            error!("outputs could not be forced off: {}", e);
        }
        pump.and(closed).and(all)
    }

    fn publish(&mut self, status: WateringStatus) {
        self.status.publish(status, &mut self.delay);
    }
}

fn duration_ms(d: core::time::Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
