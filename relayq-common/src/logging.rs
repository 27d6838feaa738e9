use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Pick the level the subscriber should filter at.
///
/// `LOG_LEVEL` always wins; otherwise verbose runs log at `DEBUG` and
/// everything else at `INFO`.
#[must_use]
pub fn level(verbose: bool, env: Option<&str>) -> LevelFilter {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    env.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber. Output goes to stderr so `mailq` reports
/// on stdout stay clean.
pub fn init(verbose: bool) {
    let env = std::env::var("LOG_LEVEL").ok();
    let level = level(verbose, env.as_deref());

    let installed = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("relayq")
                })),
        )
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_selects_debug() {
        assert_eq!(level(true, None), LevelFilter::DEBUG);
        assert_eq!(level(false, None), LevelFilter::INFO);
    }

    #[test]
    fn env_overrides_verbose() {
        assert_eq!(level(true, Some("warn")), LevelFilter::WARN);
        assert_eq!(level(false, Some("trace")), LevelFilter::TRACE);
    }

    #[test]
    fn invalid_env_falls_back() {
        assert_eq!(level(false, Some("chatty")), LevelFilter::INFO);
    }
}
