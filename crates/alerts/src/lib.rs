//! Rate-limited operator alerts.
//!
//! Fatal filesystem trouble and record-store outages page an operator.
//! Delivery itself (SMTP or otherwise) lives behind [`AlertSink`]; this
//! crate owns the process-wide cooldown so an error storm collapses into
//! one message per interval.

use hoard_config::AlertsConfig;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::error;

/// Transport contract for delivering one alert message.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, subject: &str, message: &str);
}

/// Fallback sink: alerts land in the log stream.
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, subject: &str, message: &str) {
        error!(subject, message, "alert");
    }
}

/// Process-wide alert dispatcher with a cooldown between deliveries.
pub struct Alerter {
    enabled: bool,
    subject: String,
    cooldown: Duration,
    sink: Box<dyn AlertSink>,
    next_allowed: Mutex<Option<Instant>>,
}

impl Alerter {
    pub fn new(config: &AlertsConfig, sink: Box<dyn AlertSink>) -> Self {
        Self {
            enabled: config.enabled,
            subject: config.subject.clone(),
            cooldown: Duration::from_secs(config.cooldown),
            sink,
            next_allowed: Mutex::new(None),
        }
    }

    /// An alerter that never delivers; for tests and proxies running without
    /// alerting configured.
    pub fn disabled() -> Self {
        Self::new(&AlertsConfig::default(), Box::new(LogSink))
    }

    /// Dispatch an alert unless one went out within the cooldown interval.
    pub fn dispatch(&self, message: &str) {
        if !self.enabled {
            return;
        }
        {
            let mut next_allowed = self.next_allowed.lock().expect("alert cooldown lock poisoned");
            let now = Instant::now();
            if next_allowed.is_some_and(|at| now < at) {
                return;
            }
            *next_allowed = Some(now + self.cooldown);
        }
        self.sink.deliver(&self.subject, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(std::sync::Arc<AtomicUsize>);
    impl AlertSink for CountingSink {
        fn deliver(&self, _subject: &str, _message: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_alerter(enabled: bool, cooldown: u64) -> (Alerter, std::sync::Arc<AtomicUsize>) {
        let count = std::sync::Arc::new(AtomicUsize::new(0));
        let config = AlertsConfig { enabled, cooldown, subject: "test".to_string() };
        (Alerter::new(&config, Box::new(CountingSink(count.clone()))), count)
    }

    #[test]
    fn storms_collapse_into_one_delivery() {
        let (alerter, count) = counting_alerter(true, 300);
        for _ in 0..10 {
            alerter.dispatch("disk on fire");
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_cooldown_delivers_every_time() {
        let (alerter, count) = counting_alerter(true, 0);
        alerter.dispatch("one");
        alerter.dispatch("two");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disabled_alerter_stays_silent() {
        let (alerter, count) = counting_alerter(false, 0);
        alerter.dispatch("nobody home");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
