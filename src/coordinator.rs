use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::client::{FetchError, SajClient};
use crate::config::MonitorConfig;
use crate::fields::Sample;
use crate::sample_buffer::SampleBuffer;

/// Condition reported when a whole storage interval passes without a sample.
pub const NO_SAMPLES_ERROR: &str = "No samples collected";

/// Consumer-visible state: the published snapshot plus the outcome of the most
/// recent publish attempt. Carried on a watch channel, so reading it never
/// blocks and every publish or failure wakes the subscribers.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    /// Last published snapshot; `None` only before the first refresh.
    pub snapshot: Option<Sample>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
}

/// Decouples the fast poll loop from the slow publish loop.
///
/// The poller buffers samples under the shared lock; the publisher drains the
/// buffer into an averaged snapshot once per storage interval. A fetch failure
/// costs one sample, never the interval.
pub struct MonitorCoordinator {
    client: Arc<tokio::sync::Mutex<SajClient>>,
    buffer: Arc<Mutex<SampleBuffer>>,
    state_tx: watch::Sender<MonitorState>,
    scan_interval: Duration,
    storage_interval: Duration,
    scan_task: Option<JoinHandle<()>>,
    storage_task: Option<JoinHandle<()>>,
}

impl MonitorCoordinator {
    pub fn new(host: &str, scan_interval: Duration, storage_interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(MonitorState::default());
        Self {
            client: Arc::new(tokio::sync::Mutex::new(SajClient::new(host))),
            buffer: Arc::new(Mutex::new(SampleBuffer::new())),
            state_tx,
            scan_interval,
            storage_interval,
            scan_task: None,
            storage_task: None,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            &config.host,
            config.scan_interval(),
            config.storage_interval(),
        )
    }

    /// Fetches one sample synchronously and publishes the initial snapshot, so
    /// consumers never observe an absent snapshot after setup completes.
    ///
    /// The sample also enters the buffer and counts toward the first storage
    /// interval. Unlike periodic polls, failure here propagates: there is no
    /// prior snapshot to fall back to.
    pub async fn first_refresh(&self) -> Result<(), FetchError> {
        let sample = self.client.lock().await.fetch_sample().await?;
        let initial = {
            let mut buffer = lock_buffer(&self.buffer);
            buffer.record_sample(sample);
            buffer.aggregate()
        };
        if let Some(snapshot) = initial {
            publish_snapshot(&self.state_tx, snapshot);
        }
        Ok(())
    }

    /// Spawns the poll and publish tasks. Calling twice is a no-op.
    pub fn start(&mut self) {
        if self.scan_task.is_some() || self.storage_task.is_some() {
            return;
        }

        let client = Arc::clone(&self.client);
        let poll_buffer = Arc::clone(&self.buffer);
        let scan_interval = self.scan_interval;
        self.scan_task = Some(tokio::spawn(async move {
            let mut ticks = interval(scan_interval);
            loop {
                ticks.tick().await;
                run_poll_cycle(&client, &poll_buffer).await;
            }
        }));

        let publish_buffer = Arc::clone(&self.buffer);
        let state_tx = self.state_tx.clone();
        let storage_interval = self.storage_interval;
        self.storage_task = Some(tokio::spawn(async move {
            let mut ticks = interval(storage_interval);
            // The immediate first tick would publish an empty interval.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                run_publish_cycle(&publish_buffer, &state_tx);
            }
        }));
    }

    /// Cancels both periodic tasks so no callback fires after teardown.
    /// Idempotent: a second call finds nothing to cancel.
    pub fn stop(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
        if let Some(task) = self.storage_task.take() {
            task.abort();
        }
    }

    /// Current published snapshot, if any.
    pub fn data(&self) -> Option<Sample> {
        self.state_tx.borrow().snapshot.clone()
    }

    pub fn last_update_success(&self) -> bool {
        self.state_tx.borrow().last_update_success
    }

    /// Receiver woken on every successful publish and every failure signal.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state_tx.subscribe()
    }
}

impl Drop for MonitorCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poller tick: fetch, parse, buffer. Failures are logged and swallowed so
/// a single bad poll never interrupts the cycle.
async fn run_poll_cycle(
    client: &tokio::sync::Mutex<SajClient>,
    buffer: &Mutex<SampleBuffer>,
) {
    match client.lock().await.fetch_sample().await {
        Ok(sample) => lock_buffer(buffer).record_sample(sample),
        Err(err) => debug!("sample poll failed: {err}"),
    }
}

/// One publisher tick: drain the interval under the lock, then publish the
/// aggregate (or the failure signal) with the lock released.
fn run_publish_cycle(buffer: &Mutex<SampleBuffer>, state_tx: &watch::Sender<MonitorState>) {
    let aggregate = lock_buffer(buffer).drain_and_reset();
    match aggregate {
        Some(snapshot) => publish_snapshot(state_tx, snapshot),
        None => {
            warn!("{NO_SAMPLES_ERROR} during storage interval");
            state_tx.send_modify(|state| {
                state.last_update_success = false;
                state.last_error = Some(NO_SAMPLES_ERROR.to_string());
            });
        }
    }
}

fn publish_snapshot(state_tx: &watch::Sender<MonitorState>, snapshot: Sample) {
    state_tx.send_modify(|state| {
        state.snapshot = Some(snapshot);
        state.last_update_success = true;
        state.last_error = None;
    });
}

fn lock_buffer(buffer: &Mutex<SampleBuffer>) -> std::sync::MutexGuard<'_, SampleBuffer> {
    buffer.lock().expect("sample buffer lock poisoned")
}
