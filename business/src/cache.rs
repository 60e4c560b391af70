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

//! Two independent regions over the same keys: a primary region whose
//! entries expire a fixed time after being written, and a fallback region
//! that only loses entries to capacity eviction or invalidation.

use crate::role::{RoleSet, UserIdentifier};
use moka::policy::EvictionPolicy;
use moka::sync::SegmentedCache;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub const DEFAULT_MAX_ENTRIES: u64 = 500;
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);
pub const DEFAULT_CONCURRENCY_LEVEL: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Bound of each region.
    pub max_entries: u64,
    /// Lifetime of primary entries, counted from the write.
    pub ttl: Duration,
    /// Number of independently locked segments.
    pub concurrency_level: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
        }
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    roles: RoleSet,
    inserted_at: Instant,
}

pub struct TwoTierRoleCache {
    primary: SegmentedCache<UserIdentifier, CacheEntry>,
    fallback: SegmentedCache<UserIdentifier, CacheEntry>,
}

impl TwoTierRoleCache {
    pub fn new(config: &CacheConfig) -> Self {
        let segments = config.concurrency_level.max(1);
        Self {
            primary: SegmentedCache::builder(segments)
                .name("tiny-roles primary")
                .max_capacity(config.max_entries)
                .time_to_live(config.ttl)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            fallback: SegmentedCache::builder(segments)
                .name("tiny-roles fallback")
                .max_capacity(config.max_entries)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    pub fn put(&self, user: &str, roles: RoleSet) {
        let entry = CacheEntry {
            roles,
            inserted_at: Instant::now(),
        };
        trace!(user, "caching roles");
        self.primary.insert(user.to_owned(), entry.clone());
        self.fallback.insert(user.to_owned(), entry);
    }

    pub fn get(&self, user: &str) -> Option<RoleSet> {
        self.primary.get(user).map(|entry| entry.roles)
    }

    pub fn get_from_fallback(&self, user: &str) -> Option<RoleSet> {
        self.fallback.get(user).map(|entry| {
            debug!(user, age = ?entry.inserted_at.elapsed(), "fallback hit");
            entry.roles
        })
    }

    pub fn invalidate(&self, user: &str) {
        self.primary.invalidate(user);
        self.fallback.invalidate(user);
    }

    pub fn invalidate_all(&self) {
        self.primary.invalidate_all();
        self.fallback.invalidate_all();
    }
}

impl Default for TwoTierRoleCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
