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

use std::process::ExitCode;
use tiny_roles_main::cli_parser;
use tiny_roles_main::cli_parser::FLAG_VERBOSE;
use tiny_roles_main::config::parser::parse_config;
use tiny_roles_main::logging;
use tiny_roles_main::logging::initialise_from_verbosity;
use tiny_roles_main::runtime;
use tracing::{error, info};

fn main() -> ExitCode {
    let arguments = cli_parser::parse_arguments();
    let verbosity_level = arguments.get_count(FLAG_VERBOSE);
    let handles = initialise_from_verbosity(verbosity_level);

    info!("starting up");

    let Some(task) = cli_parser::task(&arguments) else {
        error!("no command given");
        return ExitCode::FAILURE;
    };

    let config_path = arguments
        .get_one(cli_parser::FLAG_CONFIG)
        .map(String::as_str)
        .unwrap_or(cli_parser::FLAG_CONFIG_DEFAULT);
    info!(%config_path, "parsing config");
    let config = match parse_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(%e);
            return ExitCode::FAILURE;
        }
    };
    logging::reload_with_config(&config.log, &handles);

    match runtime::run(config, task) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(%e);
            ExitCode::FAILURE
        }
    }
}
