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

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiny_roles_business::role::Error as RoleError;
use tiny_roles_business::util::wrap_err;

#[derive(Error, Debug)]
pub enum LdapError {
    #[error("connection to '{url}' failed: {source}")]
    ConnectErrorWithContext {
        url: String,
        #[source]
        source: ldap3::LdapError,
    },
    #[error("invalid credentials for '{0}'")]
    InvalidCredentials(String),
    #[error("unexpected result code {rc} while binding: {text}")]
    BindError { rc: u32, text: String },
    #[error("bind failed: {0}")]
    BindErrorWithContext(#[source] ldap3::LdapError),
    #[error("search failed: {0}")]
    SearchErrorWithContext(#[source] ldap3::LdapError),
    #[error("no pooled connection available within {0:?}")]
    PoolExhausted(Duration),
    #[error("connection pool initialisation failed: {0}")]
    PoolInitialisation(#[source] Box<LdapError>),
    #[error("could not read trust store '{}': {source}", .path.display())]
    TrustStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("trust store '{}' contains no usable certificate", .0.display())]
    EmptyTrustStore(PathBuf),
    #[error("invalid directory url: {0}")]
    Url(#[from] url::ParseError),
}

impl LdapError {
    /// The directory answered and refused the bind. Bind timeouts do not count.
    pub fn is_bind_failure(&self) -> bool {
        match self {
            LdapError::InvalidCredentials(_) | LdapError::BindError { .. } => true,
            LdapError::BindErrorWithContext(ldap3::LdapError::Timeout { .. }) => false,
            LdapError::BindErrorWithContext(_) => true,
            _ => false,
        }
    }
}

impl From<LdapError> for RoleError {
    fn from(value: LdapError) -> Self {
        match value {
            LdapError::PoolInitialisation(_) => RoleError::PoolInitialisation(Arc::new(value)),
            v => wrap_err(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_initialisation_keeps_its_kind() {
        let error = LdapError::PoolInitialisation(Box::new(LdapError::InvalidCredentials(
            "cn=admin".to_owned(),
        )));

        let error: RoleError = error.into();

        assert!(matches!(error, RoleError::PoolInitialisation(_)));
    }

    #[test]
    fn only_refused_binds_are_bind_failures() {
        assert!(LdapError::InvalidCredentials("cn=admin".to_owned()).is_bind_failure());
        assert!(LdapError::BindError {
            rc: 53,
            text: "unwilling".to_owned()
        }
        .is_bind_failure());
        assert!(!LdapError::PoolExhausted(Duration::from_secs(1)).is_bind_failure());
    }

    #[test]
    fn other_errors_mean_directory_unavailable() {
        let error: RoleError = LdapError::PoolExhausted(Duration::from_secs(3)).into();

        assert!(error.is_directory_unavailable());
    }
}
