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

use crate::config::{Fields, Format, Log, Time};
use std::env;
use std::str::FromStr;
use tracing::{debug, error, info, Subscriber};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::format::{DefaultFields, FmtSpan, JsonFields};
use tracing_subscriber::fmt::time::{ChronoLocal, ChronoUtc, SystemTime, Uptime};
use tracing_subscriber::fmt::{format, FormatEvent};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::reload::Layer as ReloadLayer;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type FormatHandle = Handle<
    Box<dyn Layer<Layered<ReloadLayer<EnvFilter, Registry>, Registry>> + Send + Sync>,
    Layered<ReloadLayer<EnvFilter, Registry>, Registry>,
>;

type FilterHandle = Handle<EnvFilter, Registry>;

pub struct LogHandles {
    filter: FilterHandle,
    format: FormatHandle,
}

/// Logging until the configuration is read.
pub fn initialise_from_verbosity(verbosity_level: u8) -> LogHandles {
    let filter = match verbosity_level {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
    .to_owned();

    initialise_with_config(&Log {
        format: Format::Full,
        fields: Fields {
            ansi: env::var("NO_COLOR").map_or(true, |v| v.is_empty()),
            span_events: verbosity_level >= 2,
            time: if verbosity_level >= 1 {
                Time::SystemTime
            } else {
                Time::None
            },
            ..Fields::default()
        },
        filter: vec![filter],
    })
}

fn initialise_with_config(config: &Log) -> LogHandles {
    let filter_layer = match EnvFilter::from_str(&config.filter.join(",")) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid log filters: {}", e);
            std::process::exit(1);
        }
    };
    let (filter_layer, filter) = ReloadLayer::new(filter_layer);
    let (format_layer, format) = ReloadLayer::new(build_format_layer(config));

    let subscriber = tracing_subscriber::registry()
        .with(filter_layer)
        .with(format_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {}", e);
        std::process::exit(1);
    }
    // The subscriber is installed without SubscriberInitExt::init so the
    // log bridge below is set up exactly once.
    if let Err(e) = LogTracer::init() {
        eprintln!("failed to forward log records: {}", e);
        std::process::exit(1);
    }

    LogHandles { filter, format }
}

/// Switches to the configured filter and format.
pub fn reload_with_config(config: &Log, handles: &LogHandles) {
    debug!("swapping log filter");
    let mut new_filter = match EnvFilter::from_str(&config.filter.join(",")) {
        Ok(v) => v,
        Err(e) => {
            error!(%e, "invalid log filters, keeping the previous ones");
            return;
        }
    };
    if let Err(e) = handles.filter.modify(|filter| {
        std::mem::swap(&mut new_filter, filter);
    }) {
        error!(%e, "failed to update log filter");
    }

    debug!("swapping log format");
    if let Err(e) = handles.format.reload(build_format_layer(config)) {
        error!(%e, "failed to update log format");
    }
    info!("log configuration applied");
}

macro_rules! with_time {
    ($config:expr, $format:expr, $finish:ident) => {{
        let events = span_events($config);
        match &$config.fields.time {
            Time::None => $finish($format.without_time(), events),
            Time::Uptime => $finish($format.with_timer(Uptime::default()), events),
            Time::SystemTime => $finish($format.with_timer(SystemTime), events),
            Time::Utc { format: pattern } => {
                $finish($format.with_timer(ChronoUtc::new(pattern.clone())), events)
            }
            Time::Local { format: pattern } => {
                $finish($format.with_timer(ChronoLocal::new(pattern.clone())), events)
            }
        }
    }};
}

fn build_format_layer<S>(config: &Log) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    for<'a> S: Subscriber + LookupSpan<'a>,
{
    let format = format()
        .with_target(config.fields.target)
        .with_ansi(config.fields.ansi)
        .with_file(config.fields.file)
        .with_level(config.fields.level)
        .with_line_number(config.fields.line_number)
        .with_thread_ids(config.fields.thread_id)
        .with_thread_names(config.fields.thread_name);

    match config.format {
        Format::Compact => with_time!(config, format.compact(), text_layer),
        Format::Pretty => with_time!(config, format.pretty(), text_layer),
        Format::Full => with_time!(config, format, text_layer),
        Format::Json {
            flatten,
            current_span,
            span_list,
        } => {
            let format = format
                .json()
                .flatten_event(flatten)
                .with_current_span(current_span)
                .with_span_list(span_list);
            with_time!(config, format, json_layer)
        }
    }
}

fn text_layer<S, E>(format: E, events: FmtSpan) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    for<'a> S: Subscriber + LookupSpan<'a>,
    E: FormatEvent<S, DefaultFields> + Send + Sync + 'static,
{
    fmt::layer()
        .with_span_events(events)
        .event_format(format)
        .boxed()
}

fn json_layer<S, E>(format: E, events: FmtSpan) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    for<'a> S: Subscriber + LookupSpan<'a>,
    E: FormatEvent<S, JsonFields> + Send + Sync + 'static,
{
    fmt::layer()
        .with_span_events(events)
        .fmt_fields(JsonFields::new())
        .event_format(format)
        .boxed()
}

fn span_events(config: &Log) -> FmtSpan {
    if config.fields.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::full(Format::Full, Time::SystemTime)]
    #[case::compact(Format::Compact, Time::None)]
    #[case::pretty(Format::Pretty, Time::Uptime)]
    #[case::json(
        Format::Json { flatten: true, current_span: false, span_list: true },
        Time::Utc { format: "%F %T".to_owned() }
    )]
    #[case::local_time(Format::Full, Time::Local { format: "%T".to_owned() })]
    fn every_format_builds_a_layer(
        #[case] format: Format,
        #[case] time: Time,
        #[values(false, true)] span_events: bool,
    ) {
        let config = Log {
            format,
            fields: Fields {
                time,
                span_events,
                ..Fields::default()
            },
            filter: vec!["debug".to_owned()],
        };

        let layer = build_format_layer::<Registry>(&config);
        let _subscriber = tracing_subscriber::registry().with(layer);
    }
}
