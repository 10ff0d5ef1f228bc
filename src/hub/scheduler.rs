use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use chrono::Utc;
use log::{debug, info, warn};

use crate::config::MIN_REFRESH_INTERVAL_SECS;
use crate::error::HubError;
use crate::hub::message::BroadcastMessage;
use crate::hub::queue::BroadcastQueue;
use crate::hub::shutdown::ShutdownSignal;
use crate::hub::valuation::portfolio_value;
use crate::hub::Collaborators;

// Shared refresh period. Read once at the start of every cycle, so a change
// applies from the next tick on.
#[derive(Clone)]
pub struct RefreshInterval(Arc<RwLock<Duration>>);

fn check_period(period: Duration) -> Result<(), HubError> {
    if period < Duration::from_secs(MIN_REFRESH_INTERVAL_SECS) {
        return Err(HubError::InvalidInterval);
    }
    Ok(())
}

impl RefreshInterval {
    pub fn new(period: Duration) -> Result<Self, HubError> {
        check_period(period)?;
        Ok(Self(Arc::new(RwLock::new(period))))
    }

    pub fn get(&self) -> Duration {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, period: Duration) -> Result<(), HubError> {
        check_period(period)?;
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = period;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    pub skipped: usize,
    pub portfolio_sent: bool,
    pub cancelled: bool,
}

pub struct UpdateScheduler {
    collaborators: Collaborators,
    queue: Arc<BroadcastQueue>,
    interval: RefreshInterval,
}

impl UpdateScheduler {
    pub fn new(collaborators: Collaborators, queue: Arc<BroadcastQueue>, interval: RefreshInterval) -> Self {
        Self {
            collaborators,
            queue,
            interval,
        }
    }

    // Ticks are serialized: the next wait only starts once the previous tick
    // has finished, so a slow tick delays the next one instead of overlapping.
    pub async fn run(self, shutdown: ShutdownSignal) {
        info!("Update scheduler started (interval {:?})", self.interval.get());
        let mut stop = shutdown.clone();

        loop {
            let period = self.interval.get();
            tokio::select! {
                biased;
                _ = stop.triggered() => break,
                _ = tokio::time::sleep(period) => {}
            }

            let report = tokio::select! {
                biased;
                _ = stop.triggered() => break,
                report = self.run_tick(&shutdown) => report,
            };

            if report.cancelled {
                break;
            }
        }

        info!("Update scheduler stopped");
    }

    pub async fn run_tick(&self, shutdown: &ShutdownSignal) -> TickReport {
        let mut report = TickReport::default();

        let codes = match self.collaborators.positions.subscribed_codes().await {
            Ok(codes) => codes,
            Err(e) => {
                warn!("Failed to list subscribed funds, skipping tick: {}", e);
                return report;
            }
        };

        for code in &codes {
            if shutdown.is_triggered() {
                report.cancelled = true;
                return report;
            }

            let valuation = match self.collaborators.valuate(code).await {
                Ok(valuation) => valuation,
                Err(HubError::UnknownFund(_)) => {
                    debug!("Position for {} disappeared during refresh, skipping", code);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to refresh fund {}: {}", code, e);
                    report.skipped += 1;
                    continue;
                }
            };

            self.queue.push(BroadcastMessage::fund_update(valuation.record.clone())).await;

            if let Err(e) = self.collaborators.history.append(&valuation.record).await {
                warn!("Failed to save value history for {}: {}", code, e);
            }
            if let Err(e) = self.collaborators.history.save_quote(&valuation.quote).await {
                warn!("Failed to save latest quote for {}: {}", code, e);
            }
            report.updated += 1;
        }

        if shutdown.is_triggered() {
            report.cancelled = true;
            return report;
        }

        match self.collaborators.portfolio.summarize().await {
            Ok(summary) => {
                let record = portfolio_value(&summary, Utc::now());
                self.queue.push(BroadcastMessage::portfolio_update(record)).await;
                report.portfolio_sent = true;
            }
            Err(e) => {
                warn!("Failed to compute portfolio summary: {}", e);
            }
        }

        debug!(
            "Tick finished: {} of {} funds updated, {} skipped, portfolio sent: {}",
            report.updated,
            codes.len(),
            report.skipped,
            report.portfolio_sent
        );
        report
    }
}
