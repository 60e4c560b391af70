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

use crate::cache::TwoTierRoleCache;
use crate::health::HealthRecord;
use crate::role::{Error, RoleSet, UserIdentifier};
use crate::store::RolesProvider;
use crate::util::wrap_err;
use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, instrument, warn};

type Lookup = Shared<BoxFuture<'static, Result<RoleSet, Error>>>;
type InFlight = Arc<Mutex<HashMap<UserIdentifier, Lookup>>>;

/// Serves roles from the primary cache region, refreshes them from the
/// directory on a miss and falls back to the last known roles while the
/// directory is failing.
pub struct ResilientRolesProvider {
    directory: Arc<dyn RolesProvider>,
    cache: Arc<TwoTierRoleCache>,
    in_flight: Option<InFlight>,
}

impl ResilientRolesProvider {
    pub fn invalidate(&self, user: &str) {
        self.cache.invalidate(user);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    async fn query_directory(&self, user: &str) -> Result<RoleSet, Error> {
        let in_flight = match &self.in_flight {
            None => return self.directory.get_user_roles(user).await,
            Some(v) => v,
        };

        let lookup = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user.to_owned())
            .or_insert_with(|| self.spawn_lookup(in_flight.clone(), user))
            .clone();
        lookup.await
    }

    /// The lookup runs on its own task and removes its map entry when done,
    /// even if every caller waiting on it went away.
    fn spawn_lookup(&self, in_flight: InFlight, user: &str) -> Lookup {
        let directory = self.directory.clone();
        let user = user.to_owned();
        let task = tokio::spawn(async move {
            let result = directory.get_user_roles(&user).await;
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&user);
            result
        });
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(wrap_err(e)),
            }
        }
        .boxed()
        .shared()
    }
}

#[async_trait]
impl RolesProvider for ResilientRolesProvider {
    #[instrument(skip_all, fields(user = user))]
    async fn get_user_roles(&self, user: &str) -> Result<RoleSet, Error> {
        if let Some(roles) = self.cache.get(user) {
            debug!("cache hit");
            return Ok(roles);
        }

        debug!("cache miss");
        match self.query_directory(user).await {
            Ok(roles) => {
                self.cache.put(user, roles.clone());
                Ok(roles)
            }
            Err(e) => match self.cache.get_from_fallback(user) {
                Some(roles) => {
                    warn!(%e, "directory lookup failed, serving fallback roles");
                    Ok(roles)
                }
                None => {
                    warn!(%e, "directory lookup failed without fallback");
                    Err(e)
                }
            },
        }
    }

    async fn check_health(&self) -> HealthRecord {
        self.directory.check_health().await
    }
}

pub mod inject {
    use super::*;

    pub fn resilient_provider(
        directory: Arc<dyn RolesProvider>,
        cache: Arc<TwoTierRoleCache>,
    ) -> ResilientRolesProvider {
        ResilientRolesProvider {
            directory,
            cache,
            in_flight: None,
        }
    }

    /// Like [`resilient_provider`] but concurrent misses for one user share a
    /// single directory call.
    pub fn coalescing_resilient_provider(
        directory: Arc<dyn RolesProvider>,
        cache: Arc<TwoTierRoleCache>,
    ) -> ResilientRolesProvider {
        ResilientRolesProvider {
            directory,
            cache,
            in_flight: Some(InFlight::default()),
        }
    }
}
