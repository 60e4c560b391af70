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

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_MAX_CONNECTION_AGE: Duration = Duration::from_millis(15_000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3_000);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(3_000);
pub const DEFAULT_USER_ID_ATTRIBUTE: &str = "uid";
pub const DEFAULT_GROUP_ATTRIBUTE: &str = "memberOf";

/// Immutable settings of one directory target.
///
/// A pool built from this value reads it once on initialisation. Build a new
/// pool to apply different settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// PEM bundle of trusted CA certificates. Platform roots if absent.
    pub trust_store: Option<PathBuf>,
    pub trust_store_password: Option<String>,
    /// Anonymous if absent.
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    pub search_base: String,
    pub user_id_attribute: String,
    pub group_attribute: String,
    pub pool_size: usize,
    pub max_connection_age: Duration,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub keep_alive: bool,
    pub debug: bool,
    /// Fail lookups matching several entries instead of resolving no roles.
    pub strict_ambiguity: bool,
}

impl DirectoryConfig {
    pub fn new(host: &str, port: u16, search_base: &str) -> Self {
        Self {
            host: host.to_owned(),
            port,
            tls: false,
            trust_store: None,
            trust_store_password: None,
            bind_dn: None,
            bind_password: None,
            search_base: search_base.to_owned(),
            user_id_attribute: DEFAULT_USER_ID_ATTRIBUTE.to_owned(),
            group_attribute: DEFAULT_GROUP_ATTRIBUTE.to_owned(),
            pool_size: DEFAULT_POOL_SIZE,
            max_connection_age: DEFAULT_MAX_CONNECTION_AGE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            keep_alive: true,
            debug: false,
            strict_ambiguity: false,
        }
    }

    pub fn url(&self) -> Result<Url, url::ParseError> {
        let scheme = if self.tls { "ldaps" } else { "ldap" };
        Url::parse(&format!("{}://{}:{}", scheme, self.host, self.port))
    }

    pub fn bind_identity(&self) -> &str {
        self.bind_dn.as_deref().unwrap_or_default()
    }
}

impl Debug for DirectoryConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("trust_store", &self.trust_store)
            .field("bind_dn", &self.bind_dn)
            .field("search_base", &self.search_base)
            .field("user_id_attribute", &self.user_id_attribute)
            .field("group_attribute", &self.group_attribute)
            .field("pool_size", &self.pool_size)
            .field("max_connection_age", &self.max_connection_age)
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("debug", &self.debug)
            .field("strict_ambiguity", &self.strict_ambiguity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_applied() {
        let uut = DirectoryConfig::new("localhost", 389, "dc=example,dc=com");

        assert_eq!(5, uut.pool_size);
        assert_eq!(Duration::from_millis(15_000), uut.max_connection_age);
        assert_eq!(Duration::from_millis(3_000), uut.connect_timeout);
        assert_eq!(Duration::from_millis(3_000), uut.response_timeout);
        assert!(uut.keep_alive);
        assert!(!uut.tls);
        assert_eq!("", uut.bind_identity());
    }

    #[test]
    fn tls_selects_ldaps() {
        let mut uut = DirectoryConfig::new("ldap.example.com", 636, "dc=example,dc=com");
        uut.tls = true;

        assert_eq!("ldaps://ldap.example.com:636", uut.url().unwrap().as_str());
    }

    #[test]
    fn plain_url() {
        let uut = DirectoryConfig::new("ldap.example.com", 389, "dc=example,dc=com");

        assert_eq!("ldap://ldap.example.com:389", uut.url().unwrap().as_str());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut uut = DirectoryConfig::new("localhost", 389, "dc=example,dc=com");
        uut.bind_password = Some("hunter2".to_owned());
        uut.trust_store_password = Some("changeit".to_owned());

        let debug = format!("{uut:?}");

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("changeit"));
    }
}
