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

use crate::config::Config;
use crate::constructor::Constructor;
use crate::terminate::terminator;
use std::sync::Arc;
use thiserror::Error;
use tiny_roles_business::health::{HealthSink, LoggingHealthSink};
use tiny_roles_ldap::error::LdapError;
use tracing::{error, info, instrument};

#[derive(Error, Debug)]
pub enum Error {
    #[error("directory setup failed: {0}")]
    Ldap(#[from] LdapError),
    #[error("role lookup failed: {0}")]
    Lookup(#[from] tiny_roles_business::role::Error),
    #[error("io error: {0}")]
    StdIoError(#[from] std::io::Error),
    #[error("serialisation failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task {
    Lookup(String),
    Health,
    Watch,
}

/// Returns whether the task succeeded.
pub fn run(config: Config, task: Task) -> Result<bool, Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name(env!("CARGO_PKG_NAME"))
        .build()
        .map_err(|e| {
            error!(%e, "failed to start tokio runtime");
            e
        })?;
    runtime.block_on(execute(config, task))
}

#[instrument(skip(config))]
async fn execute(config: Config, task: Task) -> Result<bool, Error> {
    let constructor = Constructor::new(&config)?;
    match task {
        Task::Lookup(user) => {
            let roles = constructor.roles_provider().get_user_roles(&user).await?;
            for role in roles {
                println!("{}", role);
            }
            Ok(true)
        }
        Task::Health => {
            let statements = constructor.health_checker().execute_all().await;
            println!("{}", serde_json::to_string_pretty(&statements)?);
            Ok(statements.iter().all(|v| v.record.healthy))
        }
        Task::Watch => {
            let sink: Arc<dyn HealthSink> = Arc::new(LoggingHealthSink);
            let reporters: Vec<_> = constructor
                .health_reporters()
                .into_iter()
                .map(|reporter| reporter.spawn(sink.clone()))
                .collect();
            info!(reporters = reporters.len(), "watching health");
            let result = terminator().await;
            for reporter in reporters {
                reporter.abort();
            }
            result?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::tests::config;
    use test_log::test;

    #[test(tokio::test)]
    async fn lookup_of_unseen_user_fails_without_directory() {
        let actual = execute(config(), Task::Lookup("bob".to_owned())).await;

        assert!(matches!(actual, Err(Error::Lookup(ref e)) if e.is_directory_unavailable()));
    }

    #[test(tokio::test)]
    async fn unreachable_directory_fails_health() {
        let actual = execute(config(), Task::Health).await;

        assert!(!actual.unwrap());
    }
}
