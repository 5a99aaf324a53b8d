// ABOUTME: Background pollers started while a device is enabled: signal quality and registration info
// ABOUTME: They stand in for notifications a device cannot send and stop with the device

use crate::customizer::BoxFuture;
use crate::signals::Signal;
use crate::wrapper::Wrapper;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// Polling periods of the daemon collection.
///
/// # Example
///
/// ```rust
/// use modemd::daemon::PollIntervals;
/// use std::time::Duration;
///
/// let intervals = PollIntervals::default().with_rssi(Duration::from_secs(30));
/// assert_eq!(intervals.registration, Duration::from_secs(120));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PollIntervals {
    /// Signal quality poll (default: 15 seconds)
    pub rssi: Duration,
    /// Registration info poll (default: 120 seconds)
    pub registration: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            rssi: Duration::from_secs(15),
            registration: Duration::from_secs(120),
        }
    }
}

impl PollIntervals {
    pub fn with_rssi(mut self, rssi: Duration) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn with_registration(mut self, registration: Duration) -> Self {
        self.registration = registration;
        self
    }
}

/// The running pollers of one device.
#[derive(Debug)]
pub struct Daemons {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Daemons {
    /// Start the registration poller and, when `poll_rssi`, the signal
    /// quality poller. Pollers hold the device weakly and end on their own
    /// once it is gone.
    pub fn start(wrapper: &Arc<Wrapper>, intervals: PollIntervals, poll_rssi: bool) -> Daemons {
        let mut tasks = Vec::new();
        if poll_rssi {
            tasks.push((
                "signal-quality",
                spawn_poller(Arc::downgrade(wrapper), intervals.rssi, poll_signal_quality),
            ));
        }
        tasks.push((
            "registration",
            spawn_poller(
                Arc::downgrade(wrapper),
                intervals.registration,
                poll_registration,
            ),
        ));
        info!(
            daemons = ?tasks.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            "daemons started"
        );
        Daemons { tasks }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    pub fn stop(self) {
        for (name, task) in self.tasks {
            task.abort();
            debug!(daemon = name, "daemon stopped");
        }
    }
}

type PollFn = for<'a> fn(&'a Wrapper) -> BoxFuture<'a, ()>;

fn spawn_poller(wrapper: Weak<Wrapper>, period: Duration, poll: PollFn) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(wrapper) = wrapper.upgrade() else {
                return;
            };
            poll(&wrapper).await;
        }
    })
}

fn poll_signal_quality(wrapper: &Wrapper) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        match wrapper.get_signal_quality().await {
            Ok(quality) => wrapper.emit(Signal::SignalQuality(quality)),
            Err(e) => warn!(error = %e, "signal quality poll failed"),
        }
    })
}

/// Registration info is announced by the wrapper only when it changed.
fn poll_registration(wrapper: &Wrapper) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if let Err(e) = wrapper.get_netreg_info().await {
            warn!(error = %e, "registration poll failed");
        }
    })
}
