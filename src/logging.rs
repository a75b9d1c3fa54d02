//! Logging backend selection: structured stderr output in `--debug` mode,
//! syslog (facility `LOG_AUTH`) otherwise -- matching the "debug: stderr,
//! else: syslog" split this daemon's operators expect.

use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{AgentError, Result};

pub fn init(debug: bool) -> Result<()> {
    if debug {
        init_stderr()
    } else {
        init_syslog()
    }
}

fn init_stderr() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AgentError::FatalStartup(format!("cannot install stderr logger: {e}")))
}

fn init_syslog() -> Result<()> {
    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_AUTH,
        hostname: None,
        process: "keyholderd".into(),
        pid: std::process::id(),
    };
    let logger = syslog::unix(formatter)
        .map_err(|e| AgentError::FatalStartup(format!("cannot connect to syslog: {e}")))?;
    let layer = SyslogLayer::new(logger);
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| AgentError::FatalStartup(format!("cannot install syslog logger: {e}")))
}

/// A minimal `tracing_subscriber::Layer` that formats each event as a
/// single line and forwards it to a syslog writer at a matching severity.
struct SyslogLayer {
    writer: Mutex<syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>>,
}

impl SyslogLayer {
    fn new(logger: syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>) -> Self {
        SyslogLayer {
            writer: Mutex::new(logger),
        }
    }
}

impl<S> Layer<S> for SyslogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let mut logger = self.writer.lock().unwrap();
        let result = match *event.metadata().level() {
            Level::ERROR => logger.err(&message),
            Level::WARN => logger.warning(&message),
            Level::INFO => logger.info(&message),
            Level::DEBUG | Level::TRACE => logger.debug(&message),
        };
        if let Err(err) = result {
            eprintln!("keyholderd: failed to write to syslog: {err}");
        }
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{value:?}"));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}
