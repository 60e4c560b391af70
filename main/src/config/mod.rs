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

pub mod parser;

use serde_derive::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tiny_roles_business::cache::{
    CacheConfig, DEFAULT_CONCURRENCY_LEVEL, DEFAULT_MAX_ENTRIES, DEFAULT_TTL,
};
use tiny_roles_business::health::{FAST_CADENCE, SLOW_CADENCE};
use tiny_roles_ldap::config::{
    DirectoryConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_GROUP_ATTRIBUTE,
    DEFAULT_MAX_CONNECTION_AGE, DEFAULT_POOL_SIZE, DEFAULT_RESPONSE_TIMEOUT,
    DEFAULT_USER_ID_ATTRIBUTE,
};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub directory: Directory,

    #[serde(default)]
    pub cache: Cache,

    #[serde(default)]
    pub health: Health,

    #[serde(default)]
    pub log: Log,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Directory {
    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub tls: bool,

    #[serde(default)]
    #[serde(rename = "trust store")]
    pub trust_store: Option<PathBuf>,

    #[serde(default)]
    #[serde(rename = "trust store password")]
    pub trust_store_password: Option<String>,

    #[serde(default)]
    #[serde(rename = "bind dn")]
    pub bind_dn: Option<String>,

    #[serde(default)]
    #[serde(rename = "bind password")]
    pub bind_password: Option<String>,

    #[serde(rename = "search base")]
    pub search_base: String,

    #[serde(default = "default_user_id_attribute")]
    #[serde(rename = "user id attribute")]
    pub user_id_attribute: String,

    #[serde(default = "default_group_attribute")]
    #[serde(rename = "group attribute")]
    pub group_attribute: String,

    #[serde(default = "default_pool_size")]
    #[serde(rename = "pool size")]
    pub pool_size: usize,

    #[serde(default = "default_max_connection_age")]
    #[serde(rename = "max connection age in ms")]
    pub max_connection_age_in_ms: u64,

    #[serde(default = "default_connect_timeout")]
    #[serde(rename = "connect timeout in ms")]
    pub connect_timeout_in_ms: u64,

    #[serde(default = "default_response_timeout")]
    #[serde(rename = "response timeout in ms")]
    pub response_timeout_in_ms: u64,

    #[serde(default = "default_true")]
    #[serde(rename = "keep alive")]
    pub keep_alive: bool,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    #[serde(rename = "strict ambiguity")]
    pub strict_ambiguity: bool,
}

impl From<&Directory> for DirectoryConfig {
    fn from(value: &Directory) -> Self {
        Self {
            host: value.host.clone(),
            port: value.port,
            tls: value.tls,
            trust_store: value.trust_store.clone(),
            trust_store_password: value.trust_store_password.clone(),
            bind_dn: value.bind_dn.clone(),
            bind_password: value.bind_password.clone(),
            search_base: value.search_base.clone(),
            user_id_attribute: value.user_id_attribute.clone(),
            group_attribute: value.group_attribute.clone(),
            pool_size: value.pool_size,
            max_connection_age: Duration::from_millis(value.max_connection_age_in_ms),
            connect_timeout: Duration::from_millis(value.connect_timeout_in_ms),
            response_timeout: Duration::from_millis(value.response_timeout_in_ms),
            keep_alive: value.keep_alive,
            debug: value.debug,
            strict_ambiguity: value.strict_ambiguity,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Cache {
    #[serde(default = "default_max_entries")]
    #[serde(rename = "max entries")]
    pub max_entries: u64,

    #[serde(default = "default_ttl")]
    #[serde(rename = "ttl in ms")]
    pub ttl_in_ms: u64,

    #[serde(default = "default_concurrency_level")]
    #[serde(rename = "concurrency level")]
    pub concurrency_level: usize,

    #[serde(default)]
    #[serde(rename = "coalesce misses")]
    pub coalesce_misses: bool,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_in_ms: default_ttl(),
            concurrency_level: default_concurrency_level(),
            coalesce_misses: false,
        }
    }
}

impl From<&Cache> for CacheConfig {
    fn from(value: &Cache) -> Self {
        Self {
            max_entries: value.max_entries,
            ttl: Duration::from_millis(value.ttl_in_ms),
            concurrency_level: value.concurrency_level,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Health {
    #[serde(default = "default_fast_cadence")]
    #[serde(rename = "fast cadence in seconds")]
    pub fast_cadence_in_seconds: u64,

    #[serde(default = "default_slow_cadence")]
    #[serde(rename = "slow cadence in seconds")]
    pub slow_cadence_in_seconds: u64,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            fast_cadence_in_seconds: default_fast_cadence(),
            slow_cadence_in_seconds: default_slow_cadence(),
        }
    }
}

/// Cadences are at least one second.
impl Health {
    pub fn fast_cadence(&self) -> Duration {
        Duration::from_secs(self.fast_cadence_in_seconds.max(1))
    }

    pub fn slow_cadence(&self) -> Duration {
        Duration::from_secs(self.slow_cadence_in_seconds.max(1))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Log {
    #[serde(default)]
    pub format: Format,

    #[serde(default)]
    pub fields: Fields,

    #[serde(default = "default_filter")]
    pub filter: Vec<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            format: Format::default(),
            fields: Fields::default(),
            filter: default_filter(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Fields {
    #[serde(default = "default_true")]
    pub ansi: bool,

    #[serde(default)]
    pub file: bool,

    #[serde(default = "default_true")]
    pub level: bool,

    #[serde(default)]
    #[serde(rename = "line number")]
    pub line_number: bool,

    #[serde(default = "default_true")]
    pub target: bool,

    #[serde(default)]
    #[serde(rename = "thread id")]
    pub thread_id: bool,

    #[serde(default)]
    #[serde(rename = "thread name")]
    pub thread_name: bool,

    #[serde(default)]
    #[serde(rename = "span events")]
    pub span_events: bool,

    #[serde(default)]
    pub time: Time,
}

impl Default for Fields {
    fn default() -> Self {
        Self {
            ansi: true,
            file: false,
            level: true,
            line_number: false,
            target: true,
            thread_id: false,
            thread_name: false,
            span_events: false,
            time: Time::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Default)]
pub enum Format {
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "pretty")]
    Pretty,
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "json")]
    Json {
        #[serde(default)]
        flatten: bool,
        #[serde(default)]
        #[serde(rename = "current span")]
        current_span: bool,
        #[serde(default)]
        #[serde(rename = "span list")]
        span_list: bool,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Default)]
pub enum Time {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "uptime")]
    Uptime,
    #[default]
    #[serde(rename = "system")]
    SystemTime,
    #[serde(rename = "utc")]
    Utc {
        #[serde(default = "default_time_format")]
        format: String,
    },
    #[serde(rename = "local")]
    Local {
        #[serde(default = "default_time_format")]
        format: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_user_id_attribute() -> String {
    DEFAULT_USER_ID_ATTRIBUTE.to_owned()
}

fn default_group_attribute() -> String {
    DEFAULT_GROUP_ATTRIBUTE.to_owned()
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_max_connection_age() -> u64 {
    DEFAULT_MAX_CONNECTION_AGE.as_millis() as u64
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_response_timeout() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_ttl() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

fn default_concurrency_level() -> usize {
    DEFAULT_CONCURRENCY_LEVEL
}

fn default_fast_cadence() -> u64 {
    FAST_CADENCE.as_secs()
}

fn default_slow_cadence() -> u64 {
    SLOW_CADENCE.as_secs()
}

fn default_filter() -> Vec<String> {
    vec!["info".to_owned()]
}

fn default_time_format() -> String {
    "%F %T".to_owned()
}
