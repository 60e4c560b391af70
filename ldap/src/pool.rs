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

use crate::connect::Connector;
use crate::error::LdapError;
use ldap3::Ldap;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{OnceCell, Semaphore, SemaphorePermit};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Bounded set of bound directory connections.
///
/// The pool is opened lazily by the first [`acquire`](Self::acquire). If that
/// fails, nothing is kept and the next call tries again. At most `size`
/// connections are checked out at any time.
pub struct ConnectionPool {
    connector: Connector,
    size: usize,
    max_age: Duration,
    checkout_timeout: Duration,
    keep_alive: bool,
    state: OnceCell<PoolState>,
}

struct PoolState {
    idle: Mutex<Vec<PooledConnection>>,
    permits: Semaphore,
}

struct PooledConnection {
    ldap: Ldap,
    created_at: Instant,
}

impl PooledConnection {
    fn is_expired(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() >= max_age
    }

    fn close(self) {
        let mut ldap = self.ldap;
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = ldap.unbind().await {
                    debug!(%e, "unbind failed");
                }
            });
        }
    }
}

impl ConnectionPool {
    pub(crate) fn new(
        connector: Connector,
        size: usize,
        max_age: Duration,
        checkout_timeout: Duration,
        keep_alive: bool,
    ) -> Self {
        Self {
            connector,
            size: size.max(1),
            max_age,
            checkout_timeout,
            keep_alive,
            state: OnceCell::new(),
        }
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn is_initialised(&self) -> bool {
        self.state.initialized()
    }

    pub fn idle_connections(&self) -> usize {
        self.state.get().map_or(0, |state| {
            state
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        })
    }

    /// Borrows a connection until the returned guard is dropped.
    ///
    /// Waits at most the connect timeout for a free slot.
    pub async fn acquire(&self) -> Result<Checkout<'_>, LdapError> {
        let state = self.state.get_or_try_init(|| self.initialise()).await?;
        let permit = match timeout(self.checkout_timeout, state.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            _ => {
                warn!(size = self.size, "connection pool exhausted");
                return Err(LdapError::PoolExhausted(self.checkout_timeout));
            }
        };
        let connection = self.take_idle(state).await?;
        Ok(Checkout {
            pool: self,
            state,
            connection,
            _permit: permit,
        })
    }

    async fn initialise(&self) -> Result<PoolState, LdapError> {
        info!(url = %self.connector.url(), size = self.size, "opening connection pool");
        let first = self.open().await.map_err(|e| {
            if e.is_bind_failure() {
                LdapError::PoolInitialisation(Box::new(e))
            } else {
                e
            }
        })?;
        let mut idle = Vec::with_capacity(self.size);
        idle.push(first);
        while idle.len() < self.size {
            match self.open().await {
                Ok(connection) => idle.push(connection),
                Err(e) => {
                    warn!(%e, opened = idle.len(), "remaining connections are opened on demand");
                    break;
                }
            }
        }
        Ok(PoolState {
            idle: Mutex::new(idle),
            permits: Semaphore::new(self.size),
        })
    }

    async fn open(&self) -> Result<PooledConnection, LdapError> {
        let ldap = self.connector.connect().await?;
        Ok(PooledConnection {
            ldap,
            created_at: Instant::now(),
        })
    }

    async fn take_idle(&self, state: &PoolState) -> Result<PooledConnection, LdapError> {
        loop {
            let candidate = state
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop();
            let Some(mut connection) = candidate else {
                return self.open().await;
            };
            if connection.ldap.is_closed() {
                debug!("replacing closed connection");
            } else if connection.is_expired(self.max_age) {
                debug!("replacing connection exceeding maximum age");
                connection.close();
            } else {
                return Ok(connection);
            }
        }
    }

    fn release(&self, state: &PoolState, mut connection: PooledConnection) {
        if connection.ldap.is_closed() {
            debug!("dropping closed connection");
        } else if !self.keep_alive || connection.is_expired(self.max_age) {
            connection.close();
        } else {
            state
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(connection);
        }
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Dropping the guard hands the connection back, also when the operation
/// using it failed.
pub struct Checkout<'a> {
    pool: &'a ConnectionPool,
    state: &'a PoolState,
    connection: PooledConnection,
    _permit: SemaphorePermit<'a>,
}

impl Deref for Checkout<'_> {
    type Target = Ldap;

    fn deref(&self) -> &Self::Target {
        &self.connection.ldap
    }
}

impl DerefMut for Checkout<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection.ldap
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        // The handle is shared with the connection driver, so this clone
        // refers to the same session.
        let connection = PooledConnection {
            ldap: self.connection.ldap.clone(),
            created_at: self.connection.created_at,
        };
        self.pool.release(self.state, connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::tests::{
        local_connector, rejecting_server, silent_server, unreachable_connector,
    };
    use pretty_assertions::assert_eq;
    use test_log::test;

    const CHECKOUT_TIMEOUT: Duration = Duration::from_millis(100);
    const AGE: Duration = Duration::from_secs(60);

    async fn local_pool(size: usize, max_age: Duration, keep_alive: bool) -> ConnectionPool {
        let port = silent_server().await;
        ConnectionPool::new(
            local_connector(port, ""),
            size,
            max_age,
            CHECKOUT_TIMEOUT,
            keep_alive,
        )
    }

    #[test(tokio::test)]
    async fn failed_initialisation_is_retried() {
        let uut = ConnectionPool::new(
            unreachable_connector(""),
            2,
            AGE,
            CHECKOUT_TIMEOUT,
            true,
        );

        let first = uut.acquire().await;
        let second = uut.acquire().await;

        assert!(matches!(first, Err(LdapError::ConnectErrorWithContext { .. })));
        assert!(matches!(second, Err(LdapError::ConnectErrorWithContext { .. })));
        assert!(!uut.is_initialised());
    }

    #[test(tokio::test)]
    async fn rejected_bind_fails_initialisation() {
        let port = rejecting_server().await;
        let uut = ConnectionPool::new(
            local_connector(port, "cn=admin,dc=example,dc=com"),
            2,
            AGE,
            CHECKOUT_TIMEOUT,
            true,
        );

        let actual = uut.acquire().await;

        assert!(matches!(actual, Err(LdapError::PoolInitialisation(_))));
        assert!(!uut.is_initialised());
    }

    #[test(tokio::test)]
    async fn unanswered_bind_is_not_an_initialisation_failure() {
        let port = silent_server().await;
        let uut = ConnectionPool::new(
            local_connector(port, "cn=admin,dc=example,dc=com"),
            1,
            AGE,
            CHECKOUT_TIMEOUT,
            true,
        );

        let actual = uut.acquire().await;

        assert!(matches!(actual, Err(LdapError::BindErrorWithContext(_))));
    }

    #[test(tokio::test)]
    async fn initialisation_fills_the_pool() {
        let uut = local_pool(3, AGE, true).await;

        let checkout = uut.acquire().await.unwrap();

        assert_eq!(2, uut.idle_connections());
        drop(checkout);
        assert_eq!(3, uut.idle_connections());
    }

    #[test(tokio::test)]
    async fn checkouts_are_bounded_by_pool_size() {
        let uut = local_pool(1, AGE, true).await;
        let held = uut.acquire().await.unwrap();

        let actual = uut.acquire().await;

        assert!(matches!(actual, Err(LdapError::PoolExhausted(_))));
        drop(held);
        assert!(uut.acquire().await.is_ok());
    }

    #[test(tokio::test)]
    async fn waiting_checkout_gets_released_connection() {
        let uut = local_pool(1, AGE, true).await;
        let held = uut.acquire().await.unwrap();

        let (actual, _) = tokio::join!(uut.acquire(), async {
            tokio::time::sleep(CHECKOUT_TIMEOUT / 4).await;
            drop(held);
        });

        assert!(actual.is_ok());
    }

    #[test(tokio::test)]
    async fn connections_are_closed_without_keep_alive() {
        let uut = local_pool(1, AGE, false).await;

        drop(uut.acquire().await.unwrap());

        assert_eq!(0, uut.idle_connections());
        assert!(uut.acquire().await.is_ok());
    }

    #[test(tokio::test)]
    async fn expired_connections_are_not_returned() {
        let uut = local_pool(2, Duration::ZERO, true).await;

        drop(uut.acquire().await.unwrap());

        assert_eq!(0, uut.idle_connections());
    }
}
