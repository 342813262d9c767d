//! Tracing subscriber setup shared by lattice binaries, benches and tests.
//!
//! Everything that installs a `tracing` subscriber goes through
//! [`init_global_tracing`] so output format and filtering stay the same across
//! tools. Backend code only emits events; it never installs a subscriber.

pub mod performance;

#[macro_use]
pub mod macros;

use std::collections::HashSet;
use std::env;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

pub use tracing::{debug, error, info, trace, warn};

#[doc(hidden)]
pub use tracing as __tracing;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

const ENV_PROFILE: &str = "LATTICE_TRACING_PROFILE";
const ENV_DIRECTIVES: &str = "LATTICE_TRACING_DIRECTIVES";
const ENV_FORMAT: &str = "LATTICE_TRACING_FORMAT";
const ENV_REDACT_FIELDS: &str = "LATTICE_TRACING_REDACT_FIELDS";
const ENV_PERF_TRACING: &str = "LATTICE_PERF_TRACING";
const ENV_PERF_THRESHOLD_US: &str = "LATTICE_PERF_THRESHOLD_US";

/// How the shared subscriber filters and formats events.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives such as `lattice_backends=debug,info`. When absent,
    /// `RUST_LOG` is consulted, then [`Self::default_directive`].
    pub directives: Option<String>,
    pub default_directive: String,
    /// Print event targets (module paths)
    pub include_targets: bool,
    pub ansi: bool,
    /// Span lifecycle events to emit
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Field names whose values are replaced by `"***"` in the output
    pub redacted_fields: Vec<String>,
    /// Whether [`performance::PerformanceSpan`] guards report durations
    pub enable_performance_tracing: bool,
    /// Spans shorter than this many microseconds are not reported
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Pretty, coloured output for interactive use.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            redacted_fields: Vec::new(),
            enable_performance_tracing: cfg!(debug_assertions),
            performance_threshold_us: None,
        }
    }

    /// JSON lines without colour codes, for log collectors.
    pub fn for_ci() -> Self {
        Self {
            ansi: false,
            output: TracingOutput::Json,
            enable_performance_tracing: false,
            ..Self::for_local()
        }
    }

    /// JSON output with span close events and debug-level launch logging.
    pub fn for_performance() -> Self {
        Self {
            directives: Some("lattice_backends=debug,lattice_core=debug,info".to_string()),
            ansi: false,
            span_events: FmtSpan::CLOSE,
            output: TracingOutput::Json,
            enable_performance_tracing: true,
            ..Self::for_local()
        }
    }

    /// Preset selected by `LATTICE_TRACING_PROFILE` (`local`, `ci`,
    /// `performance`), then adjusted by:
    ///
    /// - `LATTICE_TRACING_DIRECTIVES`: filter directives
    /// - `LATTICE_TRACING_FORMAT`: `pretty`, `compact` or `json`
    /// - `LATTICE_TRACING_REDACT_FIELDS`: comma-separated field names
    /// - `LATTICE_PERF_TRACING`: `true`/`1`/`yes` enables performance spans
    /// - `LATTICE_PERF_THRESHOLD_US`: minimum reported span duration
    pub fn from_env() -> Self {
        let profile = env::var(ENV_PROFILE).unwrap_or_default().to_ascii_lowercase();
        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "performance" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Ok(directives) = env::var(ENV_DIRECTIVES) {
            if !directives.trim().is_empty() {
                config.directives = Some(directives);
            }
        }

        if let Some(output) = env::var(ENV_FORMAT).ok().and_then(|v| TracingOutput::from_env_value(&v)) {
            if output == TracingOutput::Json {
                config.ansi = false;
            }
            config.output = output;
        }

        if let Ok(fields) = env::var(ENV_REDACT_FIELDS) {
            let fields: Vec<String> = fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            if !fields.is_empty() {
                config.redacted_fields = fields;
            }
        }

        if let Ok(flag) = env::var(ENV_PERF_TRACING) {
            let flag = flag.trim();
            config.enable_performance_tracing =
                flag == "1" || flag.eq_ignore_ascii_case("true") || flag.eq_ignore_ascii_case("yes");
        }

        if let Some(threshold) = env::var(ENV_PERF_THRESHOLD_US).ok().and_then(|v| v.trim().parse().ok()) {
            config.performance_threshold_us = Some(threshold);
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Formatter layer output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum TracingSetupError {
    /// A directive string could not be parsed
    InvalidFilter(String),
    /// A global subscriber is already installed
    SubscriberInit(tracing_subscriber::util::TryInitError),
}

impl fmt::Display for TracingSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter(msg) => write!(f, "invalid tracing directive: {msg}"),
            Self::SubscriberInit(err) => write!(f, "failed to install global tracing subscriber: {err}"),
        }
    }
}

impl Error for TracingSetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriberInit(err) => Some(err),
            Self::InvalidFilter(_) => None,
        }
    }
}

/// Build a subscriber for `config` without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.resolve_filter()?;
    Ok(Registry::default().with(fmt_layer(config)).with(filter))
}

fn fmt_layer(config: &TracingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let redacted: Arc<HashSet<String>> = Arc::new(config.redacted_fields.iter().cloned().collect());
    let redact = !redacted.is_empty();
    let base = tracing_fmt::layer()
        .with_target(config.include_targets)
        .with_span_events(config.span_events.clone());

    match config.output {
        TracingOutput::Compact if redact => Box::new(base.compact().with_ansi(config.ansi).fmt_fields(TextRedacting(redacted))),
        TracingOutput::Compact => Box::new(base.compact().with_ansi(config.ansi)),
        TracingOutput::Pretty if redact => Box::new(base.pretty().with_ansi(config.ansi).fmt_fields(TextRedacting(redacted))),
        TracingOutput::Pretty => Box::new(base.pretty().with_ansi(config.ansi)),
        TracingOutput::Json if redact => Box::new(base.json().with_ansi(false).fmt_fields(JsonRedacting(redacted))),
        TracingOutput::Json => Box::new(base.json().with_ansi(false)),
    }
}

/// Install the configured subscriber process-wide and apply the performance settings.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?
        .try_init()
        .map_err(TracingSetupError::SubscriberInit)?;
    performance::configure(config.enable_performance_tracing, config.performance_threshold_us);
    Ok(())
}

const REDACTED: &str = "***";

#[derive(Clone)]
struct TextRedacting(Arc<HashSet<String>>);

impl<'w> FormatFields<'w> for TextRedacting {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'w>, fields: R) -> fmt::Result {
        let mut visitor = TextVisitor { redacted: &self.0, out: Vec::new() };
        fields.record(&mut visitor);
        writer.write_str(&visitor.out.join(" "))
    }
}

struct TextVisitor<'a> {
    redacted: &'a HashSet<String>,
    out: Vec<String>,
}

impl Visit for TextVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_debug(field, &value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = if self.redacted.contains(field.name()) {
            format!("{REDACTED:?}")
        } else {
            format!("{value:?}")
        };
        self.out.push(format!("{}={rendered}", field.name()));
    }
}

#[derive(Clone)]
struct JsonRedacting(Arc<HashSet<String>>);

impl<'w> FormatFields<'w> for JsonRedacting {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'w>, fields: R) -> fmt::Result {
        let mut visitor = JsonVisitor { redacted: &self.0, out: JsonMap::new() };
        fields.record(&mut visitor);
        let serialized = serde_json::to_string(&JsonValue::Object(visitor.out)).map_err(|_| fmt::Error)?;
        writer.write_str(&serialized)
    }
}

struct JsonVisitor<'a> {
    redacted: &'a HashSet<String>,
    out: JsonMap<String, JsonValue>,
}

impl JsonVisitor<'_> {
    fn insert(&mut self, field: &Field, value: JsonValue) {
        let value = if self.redacted.contains(field.name()) {
            JsonValue::String(REDACTED.to_string())
        } else {
            value
        };
        self.out.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonVisitor<'_> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, JsonValue::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, JsonValue::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = JsonNumber::from_f64(value).map_or_else(|| JsonValue::String(value.to_string()), JsonValue::Number);
        self.insert(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, JsonValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, JsonValue::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, JsonValue::String(format!("{value:?}")));
    }
}
