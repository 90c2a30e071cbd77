//! Background loops for token refresh and the suppression sweep. Each loop
//! sleeps until its next cron firing and runs one pass; the pass logs its own
//! report.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use autoresponder_core::config::SchedulerConfig;
use autoresponder_core::lifecycle::LifecycleManager;
use autoresponder_core::platform::Clock;
use autoresponder_core::schedule::{
    clamp_sweep_minutes, suppression_sweep_recurrence, token_refresh_recurrence, Recurrence,
    ScheduleError,
};

pub struct Scheduler {
    lifecycle: LifecycleManager,
    clock: Arc<dyn Clock>,
    token_refresh: Recurrence,
    suppression_sweep: Recurrence,
}

pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl Scheduler {
    pub fn from_config(
        config: &SchedulerConfig,
        lifecycle: LifecycleManager,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ScheduleError> {
        let token_refresh =
            token_refresh_recurrence(&config.token_refresh_days, config.token_refresh_hour)?;

        let minutes = clamp_sweep_minutes(&config.suppression_sweep_minutes);
        if interval_defaulted(&config.suppression_sweep_minutes, minutes) {
            warn!(
                event_name = "scheduler.sweep.interval_defaulted",
                correlation_id = "scheduler",
                configured = %config.suppression_sweep_minutes,
                minutes,
                "sweep interval outside 1..=59 minutes, using default"
            );
        }
        let suppression_sweep = suppression_sweep_recurrence(minutes)?;

        Ok(Self { lifecycle, clock, token_refresh, suppression_sweep })
    }

    pub fn spawn(self) -> SchedulerHandle {
        info!(
            event_name = "scheduler.start",
            correlation_id = "scheduler",
            token_refresh = self.token_refresh.expression(),
            suppression_sweep = self.suppression_sweep.expression(),
            "lifecycle schedules registered"
        );

        let refresh_lifecycle = self.lifecycle.clone();
        let refresh = tokio::spawn(run_on_schedule(
            "token_refresh",
            self.token_refresh,
            self.clock.clone(),
            move || run_token_refresh(refresh_lifecycle.clone()),
        ));

        let sweep_lifecycle = self.lifecycle;
        let sweep = tokio::spawn(run_on_schedule(
            "suppression_sweep",
            self.suppression_sweep,
            self.clock,
            move || run_suppression_sweep(sweep_lifecycle.clone()),
        ));

        SchedulerHandle { tasks: vec![refresh, sweep] }
    }
}

/// True when the configured text does not parse to the interval in use.
fn interval_defaulted(raw: &str, minutes: u32) -> bool {
    raw.trim().parse::<u32>().ok() != Some(minutes)
}

async fn run_on_schedule<F, Fut>(
    job: &'static str,
    recurrence: Recurrence,
    clock: Arc<dyn Clock>,
    run: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let Some(delay) = delay_until_next(&recurrence, clock.now()) else {
            error!(
                event_name = "scheduler.job.exhausted",
                correlation_id = "scheduler",
                job,
                expression = recurrence.expression(),
                "schedule has no further firings"
            );
            return;
        };
        tokio::time::sleep(delay).await;
        run().await;
    }
}

/// Time to sleep before the first firing strictly after `now`.
pub fn delay_until_next(recurrence: &Recurrence, now: DateTime<Utc>) -> Option<Duration> {
    let next = recurrence.next_after(now)?;
    (next - now).to_std().ok()
}

// `LifecycleManager` logs the report and any listing failure.
pub async fn run_token_refresh(lifecycle: LifecycleManager) {
    let _ = lifecycle.refresh_tokens().await;
}

pub async fn run_suppression_sweep(lifecycle: LifecycleManager) {
    let _ = lifecycle.sweep_suppressions().await;
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use secrecy::ExposeSecret;

    use autoresponder_core::config::{AppConfig, SchedulerConfig};
    use autoresponder_core::lifecycle::LifecycleManager;
    use autoresponder_core::schedule::{
        suppression_sweep_recurrence, token_refresh_recurrence, ScheduleError,
    };
    use autoresponder_core::store::ConfigStore;
    use autoresponder_core::testing::{account, fixed_clock, ScriptedPlatform};

    use super::{
        delay_until_next, interval_defaulted, run_suppression_sweep, run_token_refresh, Scheduler,
    };

    #[derive(Clone, Default)]
    struct LogCapture {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    struct LogWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
        type Writer = LogWriter;

        fn make_writer(&'a self) -> Self::Writer {
            LogWriter { buffer: Arc::clone(&self.buffer) }
        }
    }

    impl Write for LogWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut guard = self.buffer.lock().unwrap_or_else(|poison| poison.into_inner());
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn text(&self) -> String {
            let guard = self.buffer.lock().unwrap_or_else(|poison| poison.into_inner());
            String::from_utf8_lossy(&guard).into_owned()
        }
    }

    fn lifecycle(store: ConfigStore) -> LifecycleManager {
        LifecycleManager::new(Arc::new(ScriptedPlatform::new()), store, Arc::new(fixed_clock()))
    }

    fn scheduler_for(config: &SchedulerConfig) -> Result<Scheduler, ScheduleError> {
        Scheduler::from_config(config, lifecycle(ConfigStore::in_memory()), Arc::new(fixed_clock()))
    }

    #[test]
    fn delay_runs_to_next_firing() {
        let now = fixed_clock().now_value();

        // fixed clock sits on Monday 09:00, refresh runs Tuesday noon
        let refresh = token_refresh_recurrence("Sun,Tue,Thu,Sat", 12).expect("recurrence");
        assert_eq!(delay_until_next(&refresh, now), Some(Duration::from_secs(27 * 3600)));

        let sweep = suppression_sweep_recurrence(30).expect("recurrence");
        assert_eq!(delay_until_next(&sweep, now), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn scheduler_accepts_default_config_and_defaults_bad_sweep_interval() {
        let mut config = AppConfig::default().scheduler;
        assert!(scheduler_for(&config).is_ok());

        config.suppression_sweep_minutes = "90".to_owned();
        let scheduler = scheduler_for(&config).expect("falls back to default interval");
        assert_eq!(scheduler.suppression_sweep.expression(), "0 */30 * * * *");
    }

    #[test]
    fn interval_warning_follows_the_parsed_value() {
        for raw in ["5", "05", "+5", " 5 "] {
            assert!(!interval_defaulted(raw, 5), "{raw:?} should not warn");
        }
        for raw in ["90", "abc", "", "5.0"] {
            assert!(interval_defaulted(raw, 30), "{raw:?} should warn");
        }
    }

    #[test]
    fn scheduler_rejects_unknown_refresh_day() {
        let mut config = AppConfig::default().scheduler;
        config.token_refresh_days = "Someday".to_owned();

        assert_eq!(
            scheduler_for(&config).err(),
            Some(ScheduleError::UnknownWeekday("Someday".to_owned()))
        );
    }

    #[tokio::test]
    async fn refresh_job_writes_new_tokens() {
        let store = ConfigStore::in_memory();
        let seeded = account(true);
        store.accounts.save(seeded.clone()).await.expect("seed");

        run_token_refresh(lifecycle(store.clone())).await;

        let refreshed = store.accounts.find_by_id(&seeded.id).await.expect("load").expect("account");
        assert_eq!(refreshed.tokens.refresh_token.expose_secret(), "owner-refresh-next");
        assert_eq!(refreshed.primary_email, seeded.primary_email);
        assert_eq!(refreshed.suppression, seeded.suppression);
    }

    #[tokio::test]
    async fn each_pass_logs_its_completion_once() {
        let capture = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_target(false)
            .with_ansi(false)
            .with_writer(capture.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let store = ConfigStore::in_memory();
        store.accounts.save(account(true)).await.expect("seed");

        run_token_refresh(lifecycle(store.clone())).await;
        run_suppression_sweep(lifecycle(store)).await;

        let logs = capture.text();
        assert_eq!(logs.matches("scheduler.token_refresh.completed").count(), 1, "{logs}");
        assert_eq!(logs.matches("scheduler.suppression_sweep.completed").count(), 1, "{logs}");
    }

    #[tokio::test]
    async fn spawned_loops_stop_on_shutdown() {
        let scheduler = scheduler_for(&AppConfig::default().scheduler).expect("scheduler");

        let handle = scheduler.spawn();
        assert_eq!(handle.tasks.len(), 2);
        handle.shutdown();
    }
}
