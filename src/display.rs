//! A mounted banner slot: fetches the eligible banners for one placement,
//! rotates through them on a timer and reports what was shown and clicked.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::banner::{selector, Banner, Placement};
use crate::database::Database;
use crate::error::Error;
use crate::rotator::{Rotator, DEFAULT_ROTATION_INTERVAL};
use crate::tracker::{self, Tracker};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    Loading,
    Failed,
    Ready,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotOptions {
    pub rotation_interval: Duration,
    pub fetch_timeout: Duration,
    pub fetch_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for SlotOptions {
    fn default() -> SlotOptions {
        SlotOptions {
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            fetch_timeout: Duration::from_secs(5),
            fetch_attempts: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

struct SlotState {
    status: SlotStatus,
    rotator: Rotator,
    unmounted: bool,
}

struct Shared {
    placement: Placement,
    options: SlotOptions,
    db: Arc<dyn Database>,
    tracker: Arc<dyn Tracker>,
    state: Mutex<SlotState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(&self) -> Result<Vec<Banner>, Error> {
        let mut backoff = self.options.retry_backoff;
        let mut attempt = 1;
        loop {
            let fetched = timeout(
                self.options.fetch_timeout,
                selector::get_eligible_banners(&*self.db, self.placement),
            )
            .await;
            let result = fetched.unwrap_or(Err(Error::StoreTimedOut));

            match result {
                Err(err) if err.is_transient() && attempt < self.options.fetch_attempts => {
                    debug!(
                        "fetching {} banners failed (attempt {}): {}",
                        self.placement, attempt, err
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn load(&self) -> Result<(), Error> {
        let result = self.fetch().await;

        let mut state = self.lock();
        if state.unmounted {
            return Ok(());
        }

        match result {
            Ok(banners) => {
                state.status = SlotStatus::Ready;
                if let Some(banner) = state.rotator.replace(banners) {
                    tracker::on_became_current(self.tracker.clone(), banner);
                }
                Ok(())
            }
            Err(err) => {
                warn!("failed to load {} banners: {}", self.placement, err);
                if state.status != SlotStatus::Ready {
                    state.status = SlotStatus::Failed;
                }
                Err(err)
            }
        }
    }

    fn tick(&self) {
        let mut state = self.lock();
        if state.unmounted || state.status != SlotStatus::Ready {
            return;
        }

        if let Some(banner) = state.rotator.advance() {
            tracker::on_became_current(self.tracker.clone(), banner);
        }
    }
}

/// One display instance of a placement. Dropping it tears it down.
pub struct BannerSlot {
    shared: Arc<Shared>,
    ticker: Option<JoinHandle<()>>,
}

impl BannerSlot {
    /// Starts loading the slot in the background and begins rotating once the
    /// banners arrive. Must be called from within a tokio runtime.
    pub fn mount(
        db: Arc<dyn Database>,
        tracker: Arc<dyn Tracker>,
        placement: Placement,
        options: SlotOptions,
    ) -> BannerSlot {
        let shared = Arc::new(Shared {
            placement,
            options,
            db,
            tracker,
            state: Mutex::new(SlotState {
                status: SlotStatus::Loading,
                rotator: Rotator::new(vec![]),
                unmounted: false,
            }),
        });

        let ticker = tokio::spawn(run(shared.clone()));

        BannerSlot {
            shared,
            ticker: Some(ticker),
        }
    }

    pub fn placement(&self) -> Placement {
        self.shared.placement
    }

    pub fn status(&self) -> SlotStatus {
        self.shared.lock().status
    }

    pub fn current(&self) -> Option<Banner> {
        self.shared.lock().rotator.current().cloned()
    }

    /// Handles the viewer clicking the current banner. Returns the url to
    /// navigate to; the click is recorded in the background.
    pub fn activate(&self) -> Option<String> {
        let banner = self.current()?;

        Some(tracker::on_activated(self.shared.tracker.clone(), &banner))
    }

    /// Refetches the eligible banners and restarts rotation from the first
    /// one. Also serves as the manual retry after a failed load; a failure
    /// after a successful load keeps showing the previous banners.
    pub async fn refresh(&self) -> Result<(), Error> {
        self.shared.load().await
    }

    /// Stops rotation. Once this returns no further tick is processed.
    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.shared.lock().unmounted = true;
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for BannerSlot {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run(shared: Arc<Shared>) {
    // errors are already logged and reflected in the slot status
    let _ = shared.load().await;

    let period = shared.options.rotation_interval;
    let mut interval = interval_at(Instant::now() + period, period);
    loop {
        interval.tick().await;
        shared.tick();
    }
}
