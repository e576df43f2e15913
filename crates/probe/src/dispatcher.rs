//! Hotplug dispatcher
//!
//! Owns the USB platform for the lifetime of the process. It installs one
//! arrival subscription (with initial enumeration), pumps events until the
//! termination flag is raised, and hands every arrived device to a fresh
//! probe worker so the pump is never blocked by a slow device.
//!
//! Teardown order is fixed: unsubscribe, wait a bounded time for in-flight
//! workers, then shut the platform down.

use crate::error::{PlatformError, ProbeError};
use crate::sink::ReportSink;
use crate::tracker::WorkerTracker;
use crate::usb::{ArrivalFilter, HotplugSink, UsbDevice, UsbPlatform};
use crate::worker::{ProbeSettings, dispatch_probe};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Trace line written for every hotplug callback
pub const HOTPLUG_TRACE_LINE: &str = "got hotplug event callback.";

/// Default bound on a single pump call (100 ms)
pub const DEFAULT_PUMP_TIMEOUT: Duration = Duration::from_millis(100);

/// Default wait for in-flight workers at shutdown (3 seconds)
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Upper bound on one pump call; also how quickly termination is seen
    pub pump_timeout: Duration,
    /// How long shutdown waits for running workers
    pub drain_timeout: Duration,
    pub probe: ProbeSettings,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            pump_timeout: DEFAULT_PUMP_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            probe: ProbeSettings::default(),
        }
    }
}

/// Process lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Init,
    Registered,
    Pumping,
    Draining,
    Exit,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatcherState::Init => "init",
            DispatcherState::Registered => "registered",
            DispatcherState::Pumping => "pumping",
            DispatcherState::Draining => "draining",
            DispatcherState::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed dispatcher run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Probe workers started over the run
    pub workers_started: usize,
    /// Workers still running when the drain timeout expired
    pub workers_abandoned: usize,
}

pub struct Dispatcher<P: UsbPlatform> {
    platform: P,
    settings: DispatcherSettings,
    sink: Arc<dyn ReportSink>,
    shutdown: Arc<AtomicBool>,
    workers: WorkerTracker,
}

impl<P: UsbPlatform> Dispatcher<P> {
    /// Create a dispatcher over an initialized platform
    ///
    /// `shutdown` is the termination flag; the run loop exits at the next
    /// pump boundary after it becomes true.
    pub fn new(
        platform: P,
        settings: DispatcherSettings,
        sink: Arc<dyn ReportSink>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            platform,
            settings,
            sink,
            shutdown,
            workers: WorkerTracker::new(),
        }
    }

    /// Tracker of this dispatcher's probe workers
    pub fn workers(&self) -> WorkerTracker {
        self.workers.clone()
    }

    /// Subscribe, pump until terminated, then tear down
    ///
    /// Only subscription failure is returned as an error; the platform is
    /// shut down before returning in every case.
    pub fn run(self) -> Result<DispatchSummary, ProbeError> {
        let Self {
            platform,
            settings,
            sink,
            shutdown,
            workers,
        } = self;
        let mut state = DispatcherState::Init;

        let handler = ArrivalHandler {
            sink: sink.clone(),
            workers: workers.clone(),
            settings: settings.probe.clone(),
        };

        let registration =
            match platform.subscribe_arrivals(ArrivalFilter::any(), true, Box::new(handler)) {
                Ok(registration) => registration,
                Err(e) => {
                    platform.shutdown();
                    return Err(ProbeError::SubscribeFailed(e));
                }
            };
        transition(&mut state, DispatcherState::Registered);
        info!("Waiting for USB devices");

        while !shutdown.load(Ordering::SeqCst) {
            if state == DispatcherState::Registered {
                transition(&mut state, DispatcherState::Pumping);
            }

            match platform.pump_once(settings.pump_timeout) {
                Ok(()) => {}
                Err(PlatformError::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(settings.pump_timeout);
                }
            }
        }

        transition(&mut state, DispatcherState::Draining);
        platform.unsubscribe(registration);

        let abandoned = workers.drain(settings.drain_timeout);
        if abandoned > 0 {
            warn!(
                "{} probe worker(s) still running after {:?}, abandoning",
                abandoned, settings.drain_timeout
            );
        }

        platform.shutdown();
        transition(&mut state, DispatcherState::Exit);

        Ok(DispatchSummary {
            workers_started: workers.started(),
            workers_abandoned: abandoned,
        })
    }
}

fn transition(state: &mut DispatcherState, next: DispatcherState) {
    debug!("Dispatcher state: {} -> {}", state, next);
    *state = next;
}

/// Hotplug callback: hands each arrival to a new probe worker
struct ArrivalHandler {
    sink: Arc<dyn ReportSink>,
    workers: WorkerTracker,
    settings: ProbeSettings,
}

impl<D: UsbDevice> HotplugSink<D> for ArrivalHandler {
    fn device_arrived(&mut self, device: D) {
        self.sink.report(HOTPLUG_TRACE_LINE);
        dispatch_probe(device, &self.settings, &self.sink, &self.workers);
    }

    // libusb delivers departures to every hotplug callback; they are not
    // part of the report
    fn device_left(&mut self, device: D) {
        debug!(
            "Ignoring hotplug event: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
    }
}
