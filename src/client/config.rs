//! Publisher configuration
//!
//! Configuration comes from an INI-style `[section] key=value` file with
//! typed accessors and defaults; unknown sections and keys are ignored so
//! config files can be shared across tool versions.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::RTMP_PORT;

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// TCP connect deadline
    pub connect_timeout: Duration,

    /// Socket recv timeout
    pub read_timeout: Duration,

    /// Socket send timeout
    pub write_timeout: Duration,

    /// Connect retry count (total attempts = retries + 1)
    pub max_retry_count: u32,

    /// Delay between connect retries
    pub retry_interval: Duration,

    /// Start the heartbeat task after publish
    pub enable_heartbeat: bool,

    /// Heartbeat period
    pub heartbeat_interval: Duration,

    /// Gate statistics counter updates
    pub enable_statistics: bool,

    /// Informational bound for internal queues
    pub max_queue_size: usize,

    /// Log level name (trace, debug, info, warn, error, critical, off)
    pub log_level: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(10_000),
            read_timeout: Duration::from_millis(3_000),
            write_timeout: Duration::from_millis(3_000),
            max_retry_count: 3,
            retry_interval: Duration::from_millis(1_000),
            enable_heartbeat: true,
            heartbeat_interval: Duration::from_millis(30_000),
            enable_statistics: true,
            max_queue_size: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl PublisherConfig {
    /// Load configuration from an INI-style file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = ConfigFile::load(path)?;
        Ok(Self::from_config(&file))
    }

    /// Build configuration from a parsed config file, falling back to
    /// defaults for missing keys
    pub fn from_config(file: &ConfigFile) -> Self {
        let defaults = Self::default();

        let ms = |section: &str, key: &str, default: Duration| {
            Duration::from_millis(file.get_int(section, key, default.as_millis() as i64) as u64)
        };

        Self {
            connect_timeout: ms("connection", "connect_timeout_ms", defaults.connect_timeout),
            read_timeout: ms("connection", "read_timeout_ms", defaults.read_timeout),
            write_timeout: ms("connection", "write_timeout_ms", defaults.write_timeout),
            max_retry_count: file.get_int(
                "connection",
                "max_retry_count",
                defaults.max_retry_count as i64,
            ) as u32,
            retry_interval: ms("connection", "retry_interval_ms", defaults.retry_interval),
            enable_heartbeat: file.get_bool("rtmp", "enable_heartbeat", defaults.enable_heartbeat),
            heartbeat_interval: ms(
                "rtmp",
                "heartbeat_interval_ms",
                defaults.heartbeat_interval,
            ),
            enable_statistics: file.get_bool(
                "statistics",
                "enable_statistics",
                defaults.enable_statistics,
            ),
            max_queue_size: file.get_int(
                "performance",
                "max_queue_size",
                defaults.max_queue_size as i64,
            ) as usize,
            log_level: file.get_str("logging", "log_level", &defaults.log_level),
        }
    }
}

/// Parsed INI-style configuration file: sections of key/value strings
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl ConfigFile {
    /// Load and parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(Self::parse(&content))
    }

    /// Parse config file content
    pub fn parse(content: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current = line[1..line.len() - 1].trim().to_string();
                sections.entry(current.clone()).or_default();
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                sections
                    .entry(current.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Self { sections }
    }

    /// Check whether a key exists
    pub fn has_key(&self, section: &str, key: &str) -> bool {
        self.sections
            .get(section)
            .map(|s| s.contains_key(key))
            .unwrap_or(false)
    }

    /// Get a string value with a default
    pub fn get_str(&self, section: &str, key: &str, default: &str) -> String {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Get an integer value with a default; unparsable values fall back
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a boolean value with a default
    ///
    /// Recognizes `true`, `1`, `yes`, `on` (case-insensitive) as true;
    /// everything else is false.
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.sections.get(section).and_then(|s| s.get(key)) {
            Some(v) => matches!(
                v.to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ),
            None => default,
        }
    }
}

/// Parsed RTMP URL components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream_key: String,
}

impl RtmpUrl {
    /// Parse `rtmp://HOST[:PORT]/APP/STREAM_KEY`
    ///
    /// A missing port defaults to 1935. Paths with more than two segments
    /// concatenate all but the last into the app name.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("rtmp://")
            .ok_or_else(|| Error::Url(format!("expected rtmp:// scheme: {}", url)))?;

        let (host_port, path) = rest
            .split_once('/')
            .ok_or_else(|| Error::Url(format!("missing app/stream path: {}", url)))?;

        let (host, port) = match host_port.split_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| Error::Url(format!("invalid port: {}", p)))?;
                (h, port)
            }
            None => (host_port, RTMP_PORT),
        };

        if host.is_empty() {
            return Err(Error::Url(format!("missing host: {}", url)));
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return Err(Error::Url(format!(
                "expected rtmp://host[:port]/app/stream: {}",
                url
            )));
        }

        let stream_key = segments[segments.len() - 1];
        let app = segments[..segments.len() - 1].join("/");

        Ok(Self {
            host: host.to_string(),
            port,
            app,
            stream_key: stream_key.to_string(),
        })
    }

    /// The tcUrl value for the connect command: `rtmp://HOST:PORT/APP`
    pub fn tc_url(&self) -> String {
        format!("rtmp://{}:{}/{}", self.host, self.port, self.app)
    }

    /// Socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_parsing() {
        let url = RtmpUrl::parse("rtmp://localhost/live/test").unwrap();
        assert_eq!(url.host, "localhost");
        assert_eq!(url.port, 1935);
        assert_eq!(url.app, "live");
        assert_eq!(url.stream_key, "test");
        assert_eq!(url.tc_url(), "rtmp://localhost:1935/live");

        let url = RtmpUrl::parse("rtmp://10.0.0.5:1936/app/key").unwrap();
        assert_eq!(url.host, "10.0.0.5");
        assert_eq!(url.port, 1936);
        assert_eq!(url.addr(), "10.0.0.5:1936");
    }

    #[test]
    fn test_url_multi_segment_app() {
        let url = RtmpUrl::parse("rtmp://example.com/live/region/eu/stream-1").unwrap();
        assert_eq!(url.app, "live/region/eu");
        assert_eq!(url.stream_key, "stream-1");
    }

    #[test]
    fn test_url_errors() {
        assert!(RtmpUrl::parse("http://example.com/live/s").is_err());
        assert!(RtmpUrl::parse("rtmp://example.com").is_err());
        assert!(RtmpUrl::parse("rtmp://example.com/onlyapp").is_err());
        assert!(RtmpUrl::parse("rtmp://example.com:notaport/live/s").is_err());
        assert!(RtmpUrl::parse("rtmp://:1935/live/s").is_err());
    }

    #[test]
    fn test_config_file_parsing() {
        let content = r#"
# connection settings
[connection]
connect_timeout_ms = 5000
max_retry_count = 5

; heartbeat
[rtmp]
enable_heartbeat = no
heartbeat_interval_ms = 10000

[logging]
log_level = debug

[unknown_section]
whatever = ignored
"#;

        let file = ConfigFile::parse(content);
        assert_eq!(file.get_int("connection", "connect_timeout_ms", 10_000), 5000);
        assert_eq!(file.get_int("connection", "max_retry_count", 3), 5);
        assert!(!file.get_bool("rtmp", "enable_heartbeat", true));
        assert_eq!(file.get_str("logging", "log_level", "info"), "debug");
        assert!(file.has_key("unknown_section", "whatever"));

        // Missing keys fall back to defaults
        assert_eq!(file.get_int("connection", "read_timeout_ms", 3000), 3000);
        assert!(file.get_bool("statistics", "enable_statistics", true));
    }

    #[test]
    fn test_bool_parsing_variants() {
        let content = "[a]\nt1=true\nt2=1\nt3=YES\nt4=On\nf1=false\nf2=0\nf3=anything\n";
        let file = ConfigFile::parse(content);

        for key in ["t1", "t2", "t3", "t4"] {
            assert!(file.get_bool("a", key, false), "{} should be true", key);
        }
        for key in ["f1", "f2", "f3"] {
            assert!(!file.get_bool("a", key, true), "{} should be false", key);
        }
    }

    #[test]
    fn test_publisher_config_from_file_content() {
        let content = r#"
[connection]
connect_timeout_ms = 2000
read_timeout_ms = 1500
write_timeout_ms = 1500
max_retry_count = 1
retry_interval_ms = 250

[rtmp]
enable_heartbeat = false
heartbeat_interval_ms = 5000

[statistics]
enable_statistics = false

[performance]
max_queue_size = 64
"#;

        let config = PublisherConfig::from_config(&ConfigFile::parse(content));
        assert_eq!(config.connect_timeout, Duration::from_millis(2000));
        assert_eq!(config.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.write_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_retry_count, 1);
        assert_eq!(config.retry_interval, Duration::from_millis(250));
        assert!(!config.enable_heartbeat);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(5000));
        assert!(!config.enable_statistics);
        assert_eq!(config.max_queue_size, 64);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.write_timeout, Duration::from_secs(3));
        assert_eq!(config.max_retry_count, 3);
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert!(config.enable_heartbeat);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert!(config.enable_statistics);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.log_level, "info");
    }
}
