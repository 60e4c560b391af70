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

use crate::health::{HealthCheckCommand, HealthRecord};
use crate::role::{Error, RoleSet};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

/// The only capability authentication modules depend on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RolesProvider: Send + Sync {
    async fn get_user_roles(&self, user: &str) -> Result<RoleSet, Error>;

    async fn check_health(&self) -> HealthRecord;
}

/// Exposes a provider's self check to a health registry.
pub struct ProviderHealth(pub Arc<dyn RolesProvider>);

#[async_trait]
impl HealthCheckCommand for ProviderHealth {
    async fn check(&self) -> HealthRecord {
        self.0.check_health().await
    }
}
