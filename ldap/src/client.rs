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

use crate::dn::first_common_name;
use crate::error::LdapError;
use crate::pool::ConnectionPool;
use async_trait::async_trait;
use ldap3::{ldap_escape, Scope, SearchEntry, SearchResult};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tiny_roles_business::health::HealthRecord;
use tiny_roles_business::role::{Error, RoleSet};
use tiny_roles_business::store::RolesProvider;
use tracing::{debug, info, instrument, trace, warn};

/// Resolves roles from the group membership attribute of a user's entry.
pub struct LdapRoleClient {
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) search_base: String,
    pub(crate) user_id_attribute: String,
    pub(crate) group_attribute: String,
    pub(crate) response_timeout: Duration,
    pub(crate) debug: bool,
    pub(crate) strict_ambiguity: bool,
}

impl LdapRoleClient {
    fn filter(&self, user: &str) -> String {
        format!("({}={})", self.user_id_attribute, ldap_escape(user))
    }

    async fn search(&self, user: &str) -> Result<Vec<SearchEntry>, LdapError> {
        let filter = self.filter(user);
        let mut ldap = self.pool.acquire().await?;
        debug!(base = %self.search_base, %filter, "searching");
        let (entries, _) = ldap
            .with_timeout(self.response_timeout)
            .search(
                &self.search_base,
                Scope::Subtree,
                &filter,
                vec![self.group_attribute.as_str()],
            )
            .await
            .and_then(SearchResult::success)
            .map_err(|e| {
                warn!(%e, "searching for user failed");
                LdapError::SearchErrorWithContext(e)
            })?;
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    fn roles_from_entries(&self, user: &str, entries: &[SearchEntry]) -> Result<RoleSet, Error> {
        match entries {
            [] => {
                debug!("no directory entry matches");
                Ok(RoleSet::new())
            }
            [entry] => Ok(self.roles_of(entry)),
            _ => {
                let count = entries.len();
                if self.strict_ambiguity {
                    return Err(Error::AmbiguousUser {
                        user: user.to_owned(),
                        count,
                    });
                }
                warn!(count, "user is ambiguous, resolving no roles");
                Ok(RoleSet::new())
            }
        }
    }

    fn roles_of(&self, entry: &SearchEntry) -> RoleSet {
        let groups: Vec<&String> = entry
            .attrs
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(&self.group_attribute))
            .flat_map(|(_, values)| values)
            .collect();
        if self.debug {
            info!(dn = %entry.dn, ?groups, "matched entry");
        } else {
            trace!(dn = %entry.dn, ?groups, "matched entry");
        }

        groups
            .into_iter()
            .filter_map(|group| match first_common_name(group) {
                Ok(Some(role)) => Some(role),
                Ok(None) => {
                    debug!(%group, "group has no common name");
                    None
                }
                Err(e) => {
                    warn!(%group, %e, "skipping malformed group dn");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl RolesProvider for LdapRoleClient {
    #[instrument(skip(self))]
    async fn get_user_roles(&self, user: &str) -> Result<RoleSet, Error> {
        let entries = self.search(user).await?;
        self.roles_from_entries(user, &entries)
    }

    async fn check_health(&self) -> HealthRecord {
        let bind_dn = self.pool.connector().bind_identity();
        match self.pool.acquire().await {
            Ok(mut ldap) => {
                let connected = !ldap.is_closed();
                let details = json!({"bindDn": bind_dn, "connected": connected});
                if connected {
                    HealthRecord::healthy(details)
                } else {
                    HealthRecord::unhealthy(details)
                }
            }
            Err(e) => {
                warn!(%e, "directory health check failed");
                HealthRecord::unhealthy(json!({
                    "bindDn": bind_dn,
                    "connected": false,
                    "error": e.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::tests::{
        local_connector, rejecting_server, silent_server, unreachable_connector,
    };
    use crate::connect::Connector;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use std::collections::HashMap;
    use test_log::test;

    const DN: &str = "uid=alice,ou=People,dc=example,dc=com";

    fn client(connector: Connector, strict_ambiguity: bool) -> LdapRoleClient {
        LdapRoleClient {
            pool: Arc::new(ConnectionPool::new(
                connector,
                2,
                Duration::from_secs(60),
                Duration::from_millis(100),
                true,
            )),
            search_base: "dc=example,dc=com".to_owned(),
            user_id_attribute: "uid".to_owned(),
            group_attribute: "memberOf".to_owned(),
            response_timeout: Duration::from_millis(200),
            debug: false,
            strict_ambiguity,
        }
    }

    #[fixture]
    fn uut() -> LdapRoleClient {
        client(unreachable_connector("cn=reader,dc=example,dc=com"), false)
    }

    fn entry(attribute: &str, groups: &[&str]) -> SearchEntry {
        SearchEntry {
            dn: DN.to_owned(),
            attrs: HashMap::from([(
                attribute.to_owned(),
                groups.iter().map(|v| v.to_string()).collect(),
            )]),
            bin_attrs: HashMap::new(),
        }
    }

    fn roles(names: &[&str]) -> RoleSet {
        names.iter().map(|v| v.to_string()).collect()
    }

    #[rstest]
    fn filter_values_are_escaped(uut: LdapRoleClient) {
        let actual = uut.filter("a*(b)\\");

        assert!(
            actual.eq_ignore_ascii_case("(uid=a\\2a\\28b\\29\\5c)"),
            "{actual}"
        );
    }

    #[rstest]
    fn common_name_of_group_is_the_role(uut: LdapRoleClient) {
        let entries = [entry(
            "memberOf",
            &["cn=lightblue-developers,ou=Groups,dc=example,dc=com"],
        )];

        let actual = uut.roles_from_entries("alice", &entries).unwrap();

        assert_eq!(roles(&["lightblue-developers"]), actual);
    }

    #[rstest]
    fn group_attribute_name_is_case_insensitive(uut: LdapRoleClient) {
        let entries = [entry("memberof", &["cn=devs,dc=example,dc=com"])];

        let actual = uut.roles_from_entries("alice", &entries).unwrap();

        assert_eq!(roles(&["devs"]), actual);
    }

    #[rstest]
    fn unusable_groups_are_skipped(uut: LdapRoleClient) {
        let entries = [entry(
            "memberOf",
            &[
                "cn=devs,ou=Groups,dc=example,dc=com",
                "ou=Groups,dc=example,dc=com",
                "cn=\"broken,dc=example",
                "CN=devs,ou=Other,dc=example,dc=com",
                "cn=ops,dc=example,dc=com",
            ],
        )];

        let actual = uut.roles_from_entries("alice", &entries).unwrap();

        assert_eq!(roles(&["devs", "ops"]), actual);
    }

    #[rstest]
    fn entry_without_groups_has_no_roles(uut: LdapRoleClient) {
        let entries = [entry("mail", &["alice@example.com"])];

        let actual = uut.roles_from_entries("alice", &entries).unwrap();

        assert_eq!(RoleSet::new(), actual);
    }

    #[rstest]
    fn unknown_user_has_no_roles(uut: LdapRoleClient) {
        let actual = uut.roles_from_entries("alice", &[]).unwrap();

        assert_eq!(RoleSet::new(), actual);
    }

    #[rstest]
    fn ambiguous_user_has_no_roles(uut: LdapRoleClient) {
        let entries = [
            entry("memberOf", &["cn=devs,dc=example,dc=com"]),
            entry("memberOf", &["cn=ops,dc=example,dc=com"]),
        ];

        let actual = uut.roles_from_entries("alice", &entries).unwrap();

        assert_eq!(RoleSet::new(), actual);
    }

    #[test]
    fn strict_client_rejects_ambiguous_user() {
        let uut = client(unreachable_connector(""), true);
        let entries = [
            entry("memberOf", &["cn=devs,dc=example,dc=com"]),
            entry("memberOf", &["cn=ops,dc=example,dc=com"]),
        ];

        let actual = uut.roles_from_entries("alice", &entries);

        assert!(matches!(
            actual,
            Err(Error::AmbiguousUser { count: 2, .. })
        ));
    }

    #[rstest]
    #[test(tokio::test)]
    async fn unreachable_directory_is_unavailable(uut: LdapRoleClient) {
        for _ in 0..2 {
            let actual = uut.get_user_roles("alice").await;

            assert!(matches!(actual, Err(ref e) if e.is_directory_unavailable()));
        }
    }

    #[test(tokio::test)]
    async fn rejected_bind_is_pool_initialisation_failure() {
        let port = rejecting_server().await;
        let uut = client(local_connector(port, "cn=admin,dc=example,dc=com"), false);

        let actual = uut.get_user_roles("alice").await;

        assert!(matches!(actual, Err(Error::PoolInitialisation(_))));
    }

    #[test(tokio::test)]
    async fn unanswered_search_times_out() {
        let port = silent_server().await;
        let uut = client(local_connector(port, ""), false);

        let actual = uut.get_user_roles("alice").await;

        assert!(matches!(actual, Err(ref e) if e.is_directory_unavailable()));
        assert_eq!(2, uut.pool.idle_connections());
    }

    #[rstest]
    #[test(tokio::test)]
    async fn unreachable_directory_is_unhealthy(uut: LdapRoleClient) {
        let actual = uut.check_health().await;

        assert!(!actual.healthy);
        assert_eq!("cn=reader,dc=example,dc=com", actual.details["bindDn"]);
        assert_eq!(false, actual.details["connected"]);
        assert!(actual.details["error"].is_string());
    }

    #[test(tokio::test)]
    async fn connected_directory_is_healthy() {
        let port = silent_server().await;
        let uut = client(local_connector(port, ""), false);

        let actual = uut.check_health().await;

        assert_eq!(
            HealthRecord::healthy(json!({"bindDn": "", "connected": true})),
            actual
        );
    }
}
