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

use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Key of every lookup. Compared case-sensitively.
pub type UserIdentifier = String;

/// Common name of a group the user is a member of.
pub type Role = String;

pub type RoleSet = BTreeSet<Role>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("directory unavailable")]
    DirectoryUnavailable,
    #[error("directory unavailable: {0}")]
    DirectoryUnavailableWithContext(#[from] Arc<dyn StdError + Send + Sync>),
    #[error("{count} directory entries match user '{user}'")]
    AmbiguousUser { user: UserIdentifier, count: usize },
    #[error("connection pool initialisation failed: {0}")]
    PoolInitialisation(Arc<dyn StdError + Send + Sync>),
}

impl Error {
    pub fn is_directory_unavailable(&self) -> bool {
        matches!(
            self,
            Self::DirectoryUnavailable | Self::DirectoryUnavailableWithContext(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::wrap_err;
    use pretty_assertions::assert_eq;
    use std::io;

    #[test]
    fn wrapped_errors_are_unavailability() {
        let error: Error = wrap_err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));

        assert!(error.is_directory_unavailable());
        assert_eq!("directory unavailable: timeout", error.to_string());
    }

    #[test]
    fn ambiguity_is_not_unavailability() {
        let error = Error::AmbiguousUser {
            user: "alice".to_owned(),
            count: 2,
        };

        assert!(!error.is_directory_unavailable());
        assert_eq!("2 directory entries match user 'alice'", error.to_string());
    }
}
