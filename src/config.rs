use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::database::TermDescriptor;

pub fn load_config(config_file_path: Option<&Path>) -> anyhow::Result<Config> {
    let mut settings = config::Config::builder();

    if let Some(path) = config_file_path {
        settings = settings.add_source(config::File::from(path).required(true));
    }

    let settings = settings
        .add_source(
            config::Environment::with_prefix("AGG")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize::<Config>()?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Enable the local durable cache: read at startup, rewritten after
    /// every successful scrape.
    #[serde(with = "relaxed_bool", default = "default::cache")]
    pub cache: bool,

    /// Directory holding one `<scraper>.json` snapshot per scraper source.
    /// Must exist; writes into a missing directory are logged and dropped.
    #[serde(default = "default::cache_dir")]
    pub cache_dir: PathBuf,

    /// Seed from the remote object store when the local cache misses.
    #[serde(with = "relaxed_bool", default = "default::s3_read")]
    pub s3_read: bool,

    /// Mirror successful scrapes to the remote object store.
    #[serde(with = "relaxed_bool", default = "default::s3_write")]
    pub s3_write: bool,

    /// Base URL of the remote object store; required when `s3_read` or
    /// `s3_write` is enabled.
    #[serde(default)]
    pub remote_cache_url: Option<Url>,

    /// Bearer token for the remote object store.
    #[serde(default)]
    pub remote_cache_token: Option<String>,

    #[serde(with = "humantime_serde", default = "default::remote_cache_write_interval")]
    pub remote_cache_write_interval: Duration,

    /// Bind the public interface instead of loopback.
    #[serde(with = "relaxed_bool", default = "default::expose")]
    pub expose: bool,

    #[serde(default = "default::port")]
    pub port: u16,

    /// Seconds before an in-flight scrape subprocess is killed.
    #[serde(default = "default::scraper_timeout")]
    pub scraper_timeout: u64,

    /// Pause between scrape cycles.
    #[serde(with = "humantime_serde", default = "default::scrape_interval")]
    pub scrape_interval: Duration,

    /// Ping the success webhook after each successful scrape or POST.
    #[serde(with = "relaxed_bool", default = "default::snitch")]
    pub snitch: bool,

    /// Success webhook URL; required when `snitch` is enabled.
    #[serde(default)]
    pub webhook_url: Option<Url>,

    /// Minimum pause between webhook pings.
    #[serde(with = "humantime_serde", default = "default::webhook_interval")]
    pub webhook_interval: Duration,

    #[serde(with = "relaxed_bool", default = "default::verbose")]
    pub verbose: bool,

    /// Scraper subprocesses to run periodically.
    #[serde(default)]
    pub scrapers: Vec<ScraperSource>,
}

impl Config {
    pub fn listen_address(&self) -> SocketAddr {
        let ip: IpAddr = if self.expose {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv4Addr::LOCALHOST.into()
        };
        SocketAddr::from((ip, self.port))
    }
}

/// One scraper subprocess. The wire protocol carries no term metadata, so
/// the term this source scrapes is part of its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperSource {
    pub id: String,

    /// Program and arguments, executed as-is.
    pub command: Vec<String>,

    pub term: TermDescriptor,
}

/// Boolean config values accept `1`/`0`/`on`/`off` and any prefix of
/// `yes`/`true`/`enabled` or `no`/`false`/`disabled`. The empty string is a
/// prefix of `yes`, so a boolean env var set to nothing reads as true.
/// Anything else is a fatal configuration error.
pub mod relaxed_bool {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        struct RelaxedBoolVisitor;

        impl Visitor<'_> for RelaxedBoolVisitor {
            type Value = bool;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a boolean-ish value such as yes/no, on/off or 1/0")
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
                Ok(value)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
                match value {
                    1 => Ok(true),
                    0 => Ok(false),
                    other => Err(E::custom(format!("malformed boolean value: {other}"))),
                }
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
                self.visit_i64(value as i64)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
                parse(value).ok_or_else(|| E::custom(format!("malformed boolean value: {value:?}")))
            }
        }

        deserializer.deserialize_any(RelaxedBoolVisitor)
    }

    pub(crate) fn parse(value: &str) -> Option<bool> {
        match value {
            "1" | "on" => return Some(true),
            "0" | "off" => return Some(false),
            _ => {}
        }
        let lower = value.to_lowercase();
        if ["yes", "true", "enabled"].iter().any(|word| word.starts_with(&lower)) {
            return Some(true);
        }
        if ["no", "false", "disabled"].iter().any(|word| word.starts_with(&lower)) {
            return Some(false);
        }
        None
    }
}

pub mod default {
    use std::path::PathBuf;
    use std::time::Duration;

    pub fn cache() -> bool {
        true
    }

    pub fn cache_dir() -> PathBuf {
        PathBuf::from("cache")
    }

    pub fn s3_read() -> bool {
        false
    }

    pub fn s3_write() -> bool {
        false
    }

    pub fn remote_cache_write_interval() -> Duration {
        Duration::from_secs(5 * 60)
    }

    pub fn expose() -> bool {
        false
    }

    pub fn port() -> u16 {
        3000
    }

    pub fn scraper_timeout() -> u64 {
        60
    }

    pub fn scrape_interval() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    pub fn snitch() -> bool {
        false
    }

    pub fn webhook_interval() -> Duration {
        Duration::from_secs(5 * 60)
    }

    pub fn verbose() -> bool {
        true
    }
}
