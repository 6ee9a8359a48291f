use crate::config::SchedulerConfig;
use crate::crawler::{effective_settings, CrawlOrchestrator};
use crate::types::{AutoFetchPreference, CycleReport, Result, MIN_AUTO_FETCH_INTERVAL_SECS};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No user has auto-fetch enabled.
    Idle,
    Polling { interval: Duration },
}

impl SchedulerState {
    /// Shortest enabled interval, floored.
    pub fn from_preferences(preferences: &[AutoFetchPreference]) -> Self {
        preferences
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.interval_seconds().max(MIN_AUTO_FETCH_INTERVAL_SECS))
            .min()
            .map(|secs| SchedulerState::Polling {
                interval: Duration::from_secs(secs),
            })
            .unwrap_or(SchedulerState::Idle)
    }

    pub fn sleep_duration(&self, idle: Duration) -> Duration {
        match self {
            SchedulerState::Idle => idle,
            SchedulerState::Polling { interval } => *interval,
        }
    }
}

/// Background crawl loop driven by users' auto-fetch preferences.
pub struct AutoFetchScheduler {
    orchestrator: Arc<CrawlOrchestrator>,
    config: SchedulerConfig,
}

impl AutoFetchScheduler {
    pub fn new(orchestrator: Arc<CrawlOrchestrator>, config: SchedulerConfig) -> Self {
        Self { orchestrator, config }
    }

    /// Reads a fresh preference snapshot.
    pub async fn current_state(&self) -> SchedulerState {
        match self.orchestrator.stores().preferences.list_enabled().await {
            Ok(preferences) => SchedulerState::from_preferences(&preferences),
            Err(e) => {
                warn!("Failed to load auto-fetch preferences: {}", e);
                SchedulerState::Idle
            }
        }
    }

    /// Crawls every due active source, one after another.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let sources = self.orchestrator.stores().sources.list_active().await?;
        let now = Utc::now();
        let mut report = CycleReport::default();

        for source in sources.iter().filter(|s| s.is_due(now)) {
            let settings = effective_settings(source, None);
            let run = self
                .orchestrator
                .crawl_source(source, &settings, false, &self.config.system_user_id)
                .await;
            if let Some(error) = &run.error {
                warn!("Source {} failed this cycle: {}", source.name, error);
            }
            report.sources.push(run);
        }

        let skipped = sources.len() - report.sources.len();
        if skipped > 0 {
            debug!("{} sources not due yet", skipped);
        }
        info!(
            "Auto-fetch cycle stored {} articles from {} sources ({} failed)",
            report.total_inserted(),
            report.sources.len(),
            report.failed_sources()
        );
        Ok(report)
    }

    /// One iteration: snapshot preferences, crawl if anyone is polling.
    pub async fn tick(&self) -> SchedulerState {
        let state = self.current_state().await;
        match state {
            SchedulerState::Idle => debug!("Auto-fetch idle"),
            SchedulerState::Polling { interval } => {
                debug!("Auto-fetch polling every {}s", interval.as_secs());
                if let Err(e) = self.run_cycle().await {
                    warn!("Auto-fetch cycle failed: {}", e);
                }
            }
        }
        state
    }

    /// Runs until the token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Auto-fetch scheduler started");
        let idle = Duration::from_secs(self.config.default_interval_seconds);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let wait = self.tick().await.sleep_duration(idle);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Auto-fetch scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref(user: &str, enabled: bool, secs: u64) -> AutoFetchPreference {
        AutoFetchPreference::new(user, enabled, secs).unwrap()
    }

    #[test]
    fn test_shortest_enabled_interval_wins() {
        let prefs = vec![pref("a", true, 90), pref("b", true, 30), pref("c", false, 10)];
        assert_eq!(
            SchedulerState::from_preferences(&prefs),
            SchedulerState::Polling {
                interval: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn test_idle_without_enabled_preferences() {
        assert_eq!(SchedulerState::from_preferences(&[]), SchedulerState::Idle);
        assert_eq!(
            SchedulerState::from_preferences(&[pref("a", false, 60)]),
            SchedulerState::Idle
        );
        assert_eq!(
            SchedulerState::Idle.sleep_duration(Duration::from_secs(300)),
            Duration::from_secs(300)
        );
    }
}
