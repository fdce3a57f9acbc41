//! Command-line interface parsing and configuration management.
//!
//! Endpoint and credential options can also come from the environment
//! (`PLC_*` variables); the CLI layer folds them into an [`AdapterConfig`]
//! that is passed opaquely to the adapter constructors.

use crate::adapters::AdapterConfig;
use crate::benchmark::ValuePolicy;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// PLC Protocol Benchmark Suite - compare controller write performance
/// across Web API, OPC UA and S7.
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Protocols to benchmark (space-separated: webapi, opcua, s7, or all)
    #[clap(short = 'p', long = "protocols", value_enum, default_values_t = vec![Protocol::WebApi], help_heading = "Scenarios", num_args = 1..)]
    pub protocols: Vec<Protocol>,

    /// Target rates for single-operation scenarios, in operations per second
    #[clap(short = 'r', long = "rates", default_values_t = crate::defaults::TARGET_RATES.to_vec(), help_heading = "Scenarios", num_args = 1..)]
    pub rates: Vec<u32>,

    /// Duration of each single-operation scenario (e.g. "10s", "2m")
    #[clap(short = 'd', long, value_parser = parse_duration, default_value = "10s", help_heading = "Scenarios")]
    pub duration: Duration,

    /// Value generation policy for single-write scenarios
    #[clap(long, value_enum, default_value_t = PolicyKind::Bool, help_heading = "Scenarios")]
    pub value_policy: PolicyKind,

    /// Also run a rate-paced single-read scenario per rate
    #[clap(long, default_value_t = false, help_heading = "Scenarios")]
    pub include_reads: bool,

    /// Repetitions of the bulk-write scenario
    #[clap(long, default_value_t = crate::defaults::BULK_REPETITIONS, help_heading = "Scenarios")]
    pub bulk_repetitions: usize,

    /// Number of elements in the generated bulk payload
    #[clap(long, default_value_t = crate::defaults::BULK_ELEMENTS, help_heading = "Scenarios")]
    pub bulk_elements: usize,

    /// Skip the bulk-write scenario
    #[clap(long, default_value_t = false, help_heading = "Scenarios")]
    pub skip_bulk: bool,

    /// Controller variable targeted by single-operation scenarios
    #[clap(long, default_value = crate::defaults::SCALAR_VARIABLE)]
    pub variable: String,

    /// Controller array variable targeted by bulk writes
    #[clap(long, default_value = crate::defaults::BULK_VARIABLE)]
    pub bulk_variable: String,

    /// Output file for results (JSON)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE)]
    pub output_file: PathBuf,

    /// Output file for the text report
    #[clap(long, default_value = crate::defaults::REPORT_FILE)]
    pub report_file: PathBuf,

    /// Continue with the remaining protocols if one fails
    #[clap(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Also write an uncolored copy of the log to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// JSON-RPC endpoint of the controller Web API
    #[clap(long, env = "PLC_WEBAPI_URL", default_value = crate::defaults::WEB_API_URL, help_heading = "Endpoints")]
    pub web_api_url: String,

    /// Web API user name
    #[clap(long, env = "PLC_WEBAPI_USER", default_value = "benchmark", help_heading = "Endpoints")]
    pub web_api_user: String,

    /// Web API password
    #[clap(long, env = "PLC_WEBAPI_PASSWORD", default_value = "", hide_env_values = true, help_heading = "Endpoints")]
    pub web_api_password: String,

    /// Accept the controller's self-signed HTTPS certificate
    #[clap(long, default_value_t = true, help_heading = "Endpoints")]
    pub accept_invalid_certs: bool,

    /// OPC UA endpoint URL
    #[clap(long, env = "PLC_OPCUA_URL", default_value = crate::defaults::OPC_UA_URL, help_heading = "Endpoints")]
    pub opc_ua_url: String,

    /// OPC UA namespace index of the controller variables
    #[clap(long, default_value_t = 3, help_heading = "Endpoints")]
    pub opc_ua_namespace: u16,

    /// S7 controller host
    #[clap(long, env = "PLC_S7_HOST", default_value = crate::defaults::S7_HOST, help_heading = "Endpoints")]
    pub s7_host: String,

    /// S7 ISO-on-TCP port
    #[clap(long, default_value_t = 102, help_heading = "Endpoints")]
    pub s7_port: u16,

    /// S7 rack number
    #[clap(long, env = "PLC_S7_RACK", default_value_t = 0, help_heading = "Endpoints")]
    pub s7_rack: u16,

    /// S7 slot number
    #[clap(long, env = "PLC_S7_SLOT", default_value_t = 1, help_heading = "Endpoints")]
    pub s7_slot: u16,

    /// Data block holding the benchmark variables
    #[clap(long, env = "PLC_S7_DB_NUMBER", default_value_t = 7, help_heading = "Endpoints")]
    pub s7_db_number: u16,

    /// Byte offset of the scalar variable inside the data block
    #[clap(long, default_value_t = 0, help_heading = "Endpoints")]
    pub s7_scalar_offset: u32,

    /// Byte offset of the bulk array inside the data block
    #[clap(long, default_value_t = 136, help_heading = "Endpoints")]
    pub s7_bulk_offset: u32,

    /// Per-request transport timeout
    #[clap(long, value_parser = parse_duration, default_value = "10s", help_heading = "Endpoints")]
    pub request_timeout: Duration,
}

/// Protocol variants available for benchmarking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Protocol {
    /// HTTP JSON-RPC Web API
    #[clap(name = "webapi")]
    WebApi,

    /// OPC UA
    #[clap(name = "opcua")]
    OpcUa,

    /// Native S7 protocol
    #[clap(name = "s7")]
    S7,

    /// All protocols
    #[clap(name = "all")]
    All,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::WebApi => write!(f, "Web API"),
            Protocol::OpcUa => write!(f, "OPC UA"),
            Protocol::S7 => write!(f, "S7"),
            Protocol::All => write!(f, "All Protocols"),
        }
    }
}

impl Protocol {
    /// Expand the "all" variant to the full protocol set.
    pub fn expand_all(protocols: Vec<Protocol>) -> Vec<Protocol> {
        if protocols.contains(&Protocol::All) {
            vec![Protocol::WebApi, Protocol::OpcUa, Protocol::S7]
        } else {
            protocols
        }
    }
}

/// Selectable value-generation policies for single-write scenarios.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Alternate a boolean on every step
    #[clap(name = "bool")]
    Bool,

    /// Bounded incrementing integer
    #[clap(name = "int")]
    Int,

    /// Incrementing floating-point value
    #[clap(name = "real")]
    Real,
}

impl PolicyKind {
    pub fn to_policy(self) -> ValuePolicy {
        match self {
            PolicyKind::Bool => ValuePolicy::AlternatingBool,
            // Bound and scale follow the controller's 16-bit test variables.
            PolicyKind::Int => ValuePolicy::IncrementingInt { bound: 32_767 },
            PolicyKind::Real => ValuePolicy::IncrementingReal { scale: 1.5 },
        }
    }
}

impl From<&Args> for AdapterConfig {
    fn from(args: &Args) -> Self {
        Self {
            web_api_url: args.web_api_url.clone(),
            web_api_user: args.web_api_user.clone(),
            web_api_password: args.web_api_password.clone(),
            web_api_accept_invalid_certs: args.accept_invalid_certs,
            opc_ua_url: args.opc_ua_url.clone(),
            opc_ua_namespace: args.opc_ua_namespace,
            s7_host: args.s7_host.clone(),
            s7_port: args.s7_port,
            s7_rack: args.s7_rack,
            s7_slot: args.s7_slot,
            s7_db_number: args.s7_db_number,
            s7_scalar_offset: args.s7_scalar_offset,
            s7_bulk_offset: args.s7_bulk_offset,
            bulk_variable: args.bulk_variable.clone(),
            request_timeout: args.request_timeout,
        }
    }
}

/// Parse a duration from a human-readable string (e.g. "10s", "5m", "1h").
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (number, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // bare numbers are seconds
    };

    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid number in duration: {number}"))?;
    if !number.is_finite() || number < 0.0 {
        return Err(format!("invalid duration value: {number}"));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(number as u64),
        "s" => Duration::from_secs_f64(number),
        "m" => Duration::from_secs_f64(number * 60.0),
        "h" => Duration::from_secs_f64(number * 3600.0),
        _ => return Err(format!("invalid duration unit: {unit}")),
    };
    Ok(duration)
}
