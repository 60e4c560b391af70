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

use crate::runtime::Task;
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const FLAG_CONFIG: &str = "config";
pub const FLAG_CONFIG_DEFAULT: &str = "/etc/tiny-roles/config.yml";

pub const FLAG_VERBOSE: &str = "verbose";

pub const COMMAND_LOOKUP: &str = "lookup";
pub const ARG_USER: &str = "user";

pub const COMMAND_HEALTH: &str = "health";

pub const COMMAND_WATCH: &str = "watch";

pub fn build() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg(
            Arg::new(FLAG_CONFIG)
                .short('c')
                .long(FLAG_CONFIG)
                .value_name("PATH")
                .help("The config file to run with")
                .num_args(1)
                .default_value(FLAG_CONFIG_DEFAULT),
        )
        .arg(
            Arg::new(FLAG_VERBOSE)
                .short('v')
                .long(FLAG_VERBOSE)
                .help("Log more until the configuration is read. Repeat for more")
                .action(ArgAction::Count),
        )
        .subcommand(
            Command::new(COMMAND_LOOKUP)
                .about("Print the roles of a user")
                .arg(Arg::new(ARG_USER).required(true).value_name("USER")),
        )
        .subcommand(Command::new(COMMAND_HEALTH).about("Run all health checks once"))
        .subcommand(
            Command::new(COMMAND_WATCH).about("Report health periodically until terminated"),
        )
}

pub fn parse_arguments() -> ArgMatches {
    build().get_matches()
}

pub fn task(arguments: &ArgMatches) -> Option<Task> {
    match arguments.subcommand()? {
        (COMMAND_LOOKUP, lookup) => lookup
            .get_one::<String>(ARG_USER)
            .map(|user| Task::Lookup(user.clone())),
        (COMMAND_HEALTH, _) => Some(Task::Health),
        (COMMAND_WATCH, _) => Some(Task::Watch),
        _ => None,
    }
}
