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

use crate::client::LdapRoleClient;
use async_trait::async_trait;
use std::sync::Arc;
use tiny_roles_business::health::{HealthCheckCommand, HealthRecord};
use tiny_roles_business::store::RolesProvider;
use tracing::instrument;

/// Directory connectivity check, independent of any cache in front of the
/// client.
pub struct LdapHealth {
    pub(crate) client: Arc<LdapRoleClient>,
}

#[async_trait]
impl HealthCheckCommand for LdapHealth {
    #[instrument(skip_all)]
    async fn check(&self) -> HealthRecord {
        self.client.check_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryConfig;
    use crate::inject::{connection_pool, role_client};
    use std::net::TcpListener;
    use test_log::test;

    #[test(tokio::test)]
    async fn unreachable_directory_is_reported() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = DirectoryConfig::new("127.0.0.1", port, "dc=example,dc=com");
        config.bind_dn = Some("cn=monitor,dc=example,dc=com".to_owned());
        config.connect_timeout = std::time::Duration::from_millis(200);
        let client = role_client(&config, connection_pool(&config).unwrap());
        let uut = LdapHealth { client };

        let actual = uut.check().await;

        assert!(!actual.healthy);
        assert_eq!("cn=monitor,dc=example,dc=com", actual.details["bindDn"]);
    }
}
