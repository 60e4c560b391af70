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

use std::error::Error as StdError;
use std::sync::Arc;

pub fn wrap_err<T: StdError + Send + Sync + 'static, E: From<Arc<dyn StdError + Send + Sync>>>(
    error: T,
) -> E {
    let error: Arc<dyn StdError + Send + Sync> = Arc::new(error);
    E::from(error)
}
