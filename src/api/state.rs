use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::{
    config::Config,
    db::EventStore,
    services::{EngineSettings, Recommender},
};

/// Shared application state
///
/// Only immutable handles live here; every request builds its own [`Recommender`].
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub settings: EngineSettings,
    pub default_num_recommendations: usize,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, config: &Config) -> Self {
        Self {
            store,
            settings: config.engine_settings(),
            default_num_recommendations: config.default_num_recommendations,
            request_timeout: config.request_timeout(),
        }
    }

    /// A recommender over the shared store, cancelled when `deadline` expires
    pub fn recommender(&self, deadline: &RequestDeadline) -> Recommender {
        Recommender::new(Arc::clone(&self.store), self.settings.clone())
            .with_cancel_flag(deadline.flag())
    }

    pub fn deadline(&self) -> RequestDeadline {
        RequestDeadline::start(self.request_timeout)
    }
}

/// Sets a cancel flag once the request has run for too long
///
/// The timer task is aborted when the guard drops, so finished requests leave nothing behind.
pub struct RequestDeadline {
    flag: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

impl RequestDeadline {
    pub fn start(timeout: Duration) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let timer_flag = Arc::clone(&flag);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Request deadline exceeded");
            timer_flag.store(true, Ordering::SeqCst);
        });

        Self { flag, timer }
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    pub fn expired(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Drop for RequestDeadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
