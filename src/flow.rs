//! Hall-effect flow metering.
//!
//! The sensor emits one pulse per fixed volume of water.  The GPIO ISR
//! calls [`PulseCounter::on_edge`], which only bumps two atomics.  Once
//! per sampling window the executor calls [`FlowMeter::sample_window`],
//! which swaps the window counter to zero and converts the pulses into a
//! rate and a volume increment.
//!
//! The swap is the single handoff point between interrupt and task
//! context: every edge lands either in the window being sampled or in the
//! next one, so nothing is lost or counted twice.

use core::sync::atomic::{AtomicU32, Ordering};

/// Edge counters written from interrupt context.
///
/// Lives in the shared state for the whole program; the ISR receives a
/// `&'static PulseCounter` through its argument pointer.
#[derive(Debug, Default)]
pub struct PulseCounter {
    window: AtomicU32,
    lifetime: AtomicU32,
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            window: AtomicU32::new(0),
            lifetime: AtomicU32::new(0),
        }
    }

    /// ISR entry point.  Never blocks or allocates.
    #[inline]
    pub fn on_edge(&self) {
        self.window.fetch_add(1, Ordering::Relaxed);
        self.lifetime.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the current window count, leaving zero behind.
    pub fn take_window(&self) -> u32 {
        self.window.swap(0, Ordering::AcqRel)
    }

    /// Edges seen since the last [`reset`](Self::reset).
    pub fn lifetime(&self) -> u32 {
        self.lifetime.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.window.store(0, Ordering::Release);
        self.lifetime.store(0, Ordering::Release);
    }
}

/// Result of one sampling window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSample {
    pub pulses: u32,
    /// Calibrated flow rate (pulses per second over the calibration factor).
    pub rate: f32,
    /// Volume delivered during the window, in ml.
    pub delta_ml: f32,
}

/// Per-run flow integrator.
#[derive(Debug)]
pub struct FlowMeter<'a> {
    pulses: &'a PulseCounter,
    calibration_factor: f32,
    cumulative_ml: f32,
}

impl<'a> FlowMeter<'a> {
    pub fn new(pulses: &'a PulseCounter, calibration_factor: f32) -> Self {
        Self {
            pulses,
            calibration_factor,
            cumulative_ml: 0.0,
        }
    }

    /// Zero the cumulative volume and both pulse counters.
    pub fn reset(&mut self) {
        self.pulses.reset();
        self.cumulative_ml = 0.0;
    }

    /// Convert the pulses of the window that just ended.
    pub fn sample_window(&mut self, elapsed_ms: u32) -> FlowSample {
        let pulses = self.pulses.take_window();

        let rate = if elapsed_ms == 0 || self.calibration_factor <= 0.0 {
            0.0
        } else {
            (1000.0 / elapsed_ms as f32) * pulses as f32 / self.calibration_factor
        };
        let delta_ml = if pulses == 0 {
            0.0
        } else {
            (rate / 60.0) * 1000.0
        };

        self.cumulative_ml += delta_ml;
        FlowSample {
            pulses,
            rate,
            delta_ml,
        }
    }

    pub fn cumulative_ml(&self) -> f32 {
        self.cumulative_ml
    }

    pub fn lifetime_pulses(&self) -> u32 {
        self.pulses.lifetime()
    }
}
