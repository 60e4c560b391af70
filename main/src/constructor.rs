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
use crate::runtime::Error;
use std::sync::Arc;
use std::time::Duration;
use tiny_roles_business::cache::{CacheConfig, TwoTierRoleCache};
use tiny_roles_business::health::inject::{health_check, health_reporter};
use tiny_roles_business::health::{HealthCheck, HealthChecker, HealthReporter};
use tiny_roles_business::resilient::inject::{coalescing_resilient_provider, resilient_provider};
use tiny_roles_business::store::{ProviderHealth, RolesProvider};
use tiny_roles_ldap::config::DirectoryConfig;
use tiny_roles_ldap::inject::{connection_pool, health_check as ldap_health_check, role_client};
use tiny_roles_ldap::LdapRoleClient;
use tracing::{debug, info};

pub struct Constructor {
    directory_name: String,

    client: Arc<LdapRoleClient>,

    provider: Arc<dyn RolesProvider>,

    fast_cadence: Duration,

    slow_cadence: Duration,
}

impl Constructor {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let directory = DirectoryConfig::from(&config.directory);
        debug!(?directory, "directory configuration");
        let pool = connection_pool(&directory)?;
        let client = role_client(&directory, pool);

        let cache_config = CacheConfig::from(&config.cache);
        debug!(?cache_config, "cache configuration");
        let cache = Arc::new(TwoTierRoleCache::new(&cache_config));
        let provider: Arc<dyn RolesProvider> = if config.cache.coalesce_misses {
            info!("coalescing concurrent cache misses");
            Arc::new(coalescing_resilient_provider(client.clone(), cache))
        } else {
            Arc::new(resilient_provider(client.clone(), cache))
        };

        Ok(Self {
            directory_name: format!("ldap {}:{}", directory.host, directory.port),
            client,
            provider,
            fast_cadence: config.health.fast_cadence(),
            slow_cadence: config.health.slow_cadence(),
        })
    }

    pub fn roles_provider(&self) -> Arc<dyn RolesProvider> {
        self.provider.clone()
    }

    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker(vec![self.provider_check(), self.directory_check()])
    }

    /// The provider check feeds dashboards on the fast cadence, the directory
    /// check runs on the slow one.
    pub fn health_reporters(&self) -> Vec<HealthReporter> {
        vec![
            health_reporter(self.provider_check(), self.fast_cadence),
            health_reporter(self.directory_check(), self.slow_cadence),
        ]
    }

    fn provider_check(&self) -> HealthCheck {
        health_check(
            "roles provider",
            Arc::new(ProviderHealth(self.provider.clone())),
        )
    }

    fn directory_check(&self) -> HealthCheck {
        health_check(
            &self.directory_name,
            Arc::new(ldap_health_check(self.client.clone())),
        )
    }
}
