use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

/// Transport spoken by the student live-update endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveTransport {
    WebSocket,
    Sse,
}

#[derive(Debug, PartialEq, Eq)]
pub struct LiveTransportParseError;

impl FromStr for LiveTransport {
    type Err = LiveTransportParseError;
    fn from_str(transport: &str) -> Result<LiveTransport, Self::Err> {
        match transport.to_lowercase().as_str() {
            "websocket" => Ok(LiveTransport::WebSocket),
            "sse" => Ok(LiveTransport::Sse),
            _ => Err(LiveTransportParseError),
        }
    }
}

impl fmt::Display for LiveTransport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LiveTransport::WebSocket => write!(f, "websocket"),
            LiveTransport::Sse => write!(f, "sse"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,

    /// Number of events each live connection may have waiting before new ones are dropped.
    #[arg(
        long,
        env,
        default_value_t = 256,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    subscriber_queue_capacity: u32,

    /// Seconds between keep-alive comments on idle SSE streams (1 to 3600).
    #[arg(
        long,
        env,
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..=3600)
    )]
    pub sse_keep_alive_secs: u64,

    /// Transport the student live-update endpoint speaks.
    #[arg(
        long,
        env,
        default_value_t = LiveTransport::WebSocket,
        value_parser = clap::builder::PossibleValuesParser::new([
            "WEBSOCKET", "SSE", "websocket", "sse"
        ])
            .map(|s| s.parse::<LiveTransport>().unwrap()),
    )]
    pub student_transport: LiveTransport,

    /// Accept `x-student-id` / `x-admin-user` headers from the authenticating reverse proxy.
    /// Only enable behind a proxy that strips these headers from client requests.
    #[arg(long, env, default_value_t = false)]
    pub trust_identity_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Parse from an explicit argument list; environment fallbacks still apply.
    pub fn try_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Config::try_parse_from(args)
    }

    pub fn subscriber_queue_capacity(&self) -> usize {
        self.subscriber_queue_capacity as usize
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }
}
