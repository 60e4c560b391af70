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
use crate::config::DirectoryConfig;
use crate::connect::{load_trust_store, Connector};
use crate::error::LdapError;
use crate::health::LdapHealth;
use crate::pool::ConnectionPool;
use std::sync::Arc;
use tracing::warn;

pub fn connector(config: &DirectoryConfig) -> Result<Connector, LdapError> {
    let tls_config = match (&config.trust_store, config.tls) {
        (Some(path), true) => Some(load_trust_store(path)?),
        (Some(path), false) => {
            warn!(path = %path.display(), "trust store ignored without tls");
            None
        }
        (None, _) => None,
    };
    if config.trust_store_password.is_some() {
        warn!("trust store password ignored, trust stores are read as PEM bundles");
    }
    Ok(Connector {
        url: config.url()?,
        connect_timeout: config.connect_timeout,
        response_timeout: config.response_timeout,
        tls_config,
        bind_dn: config.bind_identity().to_owned(),
        bind_password: config.bind_password.clone().unwrap_or_default(),
    })
}

/// The pool is not opened before its first use.
pub fn connection_pool(config: &DirectoryConfig) -> Result<Arc<ConnectionPool>, LdapError> {
    Ok(Arc::new(ConnectionPool::new(
        connector(config)?,
        config.pool_size,
        config.max_connection_age,
        config.connect_timeout,
        config.keep_alive,
    )))
}

pub fn role_client(config: &DirectoryConfig, pool: Arc<ConnectionPool>) -> Arc<LdapRoleClient> {
    Arc::new(LdapRoleClient {
        pool,
        search_base: config.search_base.clone(),
        user_id_attribute: config.user_id_attribute.clone(),
        group_attribute: config.group_attribute.clone(),
        response_timeout: config.response_timeout,
        debug: config.debug,
        strict_ambiguity: config.strict_ambiguity,
    })
}

pub fn health_check(client: Arc<LdapRoleClient>) -> LdapHealth {
    LdapHealth { client }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config() -> DirectoryConfig {
        let mut config = DirectoryConfig::new("ldap.example.com", 389, "dc=example,dc=com");
        config.bind_dn = Some("cn=reader,dc=example,dc=com".to_owned());
        config.bind_password = Some("secret".to_owned());
        config.connect_timeout = Duration::from_millis(1_500);
        config
    }

    #[test]
    fn connector_takes_directory_settings() {
        let actual = connector(&config()).unwrap();

        assert_eq!("ldap://ldap.example.com:389", actual.url().as_str());
        assert_eq!("cn=reader,dc=example,dc=com", actual.bind_identity());
        assert_eq!("secret", actual.bind_password);
        assert_eq!(Duration::from_millis(1_500), actual.connect_timeout);
        assert!(actual.tls_config.is_none());
    }

    #[test]
    fn unreadable_trust_store_fails_construction() {
        let mut config = config();
        config.tls = true;
        config.trust_store = Some(PathBuf::from("/nonexistent/tiny-roles/ca.pem"));

        assert!(matches!(
            connector(&config),
            Err(LdapError::TrustStore { .. })
        ));
    }

    #[test]
    fn trust_store_is_unused_without_tls() {
        let mut config = config();
        config.trust_store = Some(PathBuf::from("/nonexistent/tiny-roles/ca.pem"));

        assert!(connector(&config).is_ok());
    }

    #[test]
    fn pool_is_opened_lazily() {
        let actual = connection_pool(&config()).unwrap();

        assert!(!actual.is_initialised());
    }
}
