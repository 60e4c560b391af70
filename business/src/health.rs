/*  tiny-roles: Tiny Role Resolver
 *  Copyright (C) 2024 The tiny-roles developers
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument, warn};

/// Cadence for operational dashboards.
pub const FAST_CADENCE: Duration = Duration::from_secs(10);

/// Cadence for the directory-specific check.
pub const SLOW_CADENCE: Duration = Duration::from_secs(15 * 60);

/// Outcome of one live check. Never cached.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthRecord {
    pub healthy: bool,
    pub details: Value,
}

impl HealthRecord {
    pub fn healthy(details: Value) -> Self {
        Self {
            healthy: true,
            details,
        }
    }

    pub fn unhealthy(details: Value) -> Self {
        Self {
            healthy: false,
            details,
        }
    }
}

pub struct HealthChecker(pub Vec<HealthCheck>);

impl HealthChecker {
    pub async fn execute_all(&self) -> Vec<HealthStatement> {
        let mut result = Vec::default();
        for check in &self.0 {
            result.push(check.execute().await);
        }
        result
    }
}

#[derive(Clone)]
pub struct HealthCheck {
    name: String,
    command: Arc<dyn HealthCheckCommand>,
}

impl HealthCheck {
    pub fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(name = self.name))]
    pub async fn execute(&self) -> HealthStatement {
        HealthStatement {
            name: self.name.clone(),
            record: self.command.check().await,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatement {
    pub name: String,
    #[serde(flatten)]
    pub record: HealthRecord,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HealthCheckCommand: Send + Sync {
    async fn check(&self) -> HealthRecord;
}

/// Receives the statements of a [`HealthReporter`], e.g. a monitoring registry.
#[async_trait]
pub trait HealthSink: Send + Sync {
    async fn publish(&self, statement: HealthStatement);
}

pub struct LoggingHealthSink;

#[async_trait]
impl HealthSink for LoggingHealthSink {
    async fn publish(&self, statement: HealthStatement) {
        if statement.record.healthy {
            info!(name = %statement.name, details = %statement.record.details, "healthy");
        } else {
            warn!(name = %statement.name, details = %statement.record.details, "unhealthy");
        }
    }
}

pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Runs one check on a fixed cadence on its own task. The first check runs
/// immediately.
pub struct HealthReporter {
    check: HealthCheck,
    period: Duration,
}

impl HealthReporter {
    pub fn spawn(self, sink: Arc<dyn HealthSink>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let statement = self.check.execute().await;
                sink.publish(statement).await;
            }
        })
    }
}

pub mod inject {
    use super::*;
    use std::sync::Arc;

    pub fn health_check(name: &str, command: Arc<dyn HealthCheckCommand>) -> HealthCheck {
        HealthCheck {
            name: name.to_owned(),
            command,
        }
    }

    /// A zero period is raised to [`MIN_PERIOD`].
    pub fn health_reporter(check: HealthCheck, period: Duration) -> HealthReporter {
        HealthReporter {
            check,
            period: period.max(MIN_PERIOD),
        }
    }
}
