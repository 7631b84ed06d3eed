use std::fmt;
use std::fs;
use std::net::SocketAddr;

use log::{debug, trace};
use pingora::server::configuration::{Opt, ServerConf};
use pingora_error::{Error, ErrorType::*, OrErr, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub listeners: Vec<Listener>,

    /// Ordered pool of pad backends. Order is significant: new sessions are
    /// assigned round-robin over this list and the first entry serves
    /// unpinned traffic.
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub backends: Vec<Backend>,

    #[serde(default = "Config::default_routing_table")]
    pub routing_table: String,

    #[serde(default)]
    #[validate(nested)]
    pub affinity: Affinity,
}

// Config file load and validation
impl Config {
    // Does not have to be async until we want runtime reload
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        if let Some(path) = &opt.conf {
            let mut conf = Self::load_from_yaml(path)?;
            conf.merge_with_opt(opt);
            Ok(conf)
        } else {
            Error::e_explain(ReadError, "No path specified")
        }
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");

        // use validator to validate conf file
        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    pub fn merge_with_opt(&mut self, opt: &Opt) {
        if opt.daemon {
            self.pingora.daemon = true;
        }
    }

    fn default_routing_table() -> String {
        "./routing_table.json".to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Listener {
    pub address: SocketAddr,
}

/// A single pad backend instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Backend {
    #[validate(custom(function = "Backend::validate_host"))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Backend {
    /// Address string used as routing-table value and upstream peer address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    // Custom validation function for `host`
    fn validate_host(host: &str) -> Result<(), ValidationError> {
        // Define the regular expression for valid hosts
        let re =
            Regex::new(r"(?i)^(?:(?:\d{1,3}\.){3}\d{1,3}|\[[0-9a-f:]+\]|[a-z0-9.-]+)$").unwrap();

        if !re.is_match(host) {
            let mut err = ValidationError::new("invalid_backend_host");
            err.add_param("host".into(), &host.to_string());
            return Err(err);
        }
        Ok(())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Knobs for the affinity routing decision.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Affinity {
    /// Path segment that marks a session-root URL, e.g. "p" in `/p/mypad`.
    #[serde(default = "Affinity::default_session_marker")]
    #[validate(length(min = 1))]
    pub session_marker: String,

    /// Substrings of paths that must be pinned to the owning session's
    /// backend even though the path itself does not carry the pad id.
    #[serde(default = "Affinity::default_sticky_paths")]
    pub sticky_paths: Vec<String>,
}

impl Affinity {
    fn default_session_marker() -> String {
        "p".to_string()
    }

    fn default_sticky_paths() -> Vec<String> {
        vec![
            "/socket.io/".to_string(),
            "locale".to_string(),
            "pluginfw".to_string(),
        ]
    }
}

impl Default for Affinity {
    fn default() -> Self {
        Self {
            session_marker: Self::default_session_marker(),
            sticky_paths: Self::default_sticky_paths(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_load_file() {
        init_log();
        let conf_str = r#"
---
pingora:
  version: 1

listeners:
  - address: 0.0.0.0:8000
  - address: "[::1]:8000"

backends:
  - host: 10.0.0.1
    port: 9001
  - host: 10.0.0.1
    port: 9002

routing_table: /var/lib/padpin/routing_table.json

affinity:
  session_marker: p
  sticky_paths:
    - /socket.io/
    - locale
    - pluginfw
        "#
        .to_string();
        let conf = Config::from_yaml(&conf_str).unwrap();
        assert_eq!(1, conf.pingora.version);
        assert_eq!(2, conf.listeners.len());
        assert_eq!(2, conf.backends.len());
        assert_eq!("10.0.0.1:9001", conf.backends[0].addr());
        assert_eq!("/var/lib/padpin/routing_table.json", conf.routing_table);
        assert_eq!("p", conf.affinity.session_marker);
        assert_eq!(3, conf.affinity.sticky_paths.len());
    }

    #[test]
    fn test_load_file_defaults() {
        init_log();
        let conf_str = r#"
---
listeners:
  - address: 0.0.0.0:8000

backends:
  - host: 127.0.0.1
    port: 9001
        "#
        .to_string();
        let conf = Config::from_yaml(&conf_str).unwrap();
        assert_eq!("./routing_table.json", conf.routing_table);
        assert_eq!("p", conf.affinity.session_marker);
        assert!(conf
            .affinity
            .sticky_paths
            .contains(&"/socket.io/".to_string()));
    }

    #[test]
    fn test_valid_listeners_length() {
        init_log();
        let conf_str = r#"
---
listeners: []

backends:
  - host: 127.0.0.1
    port: 9001
        "#
        .to_string();
        let conf = Config::from_yaml(&conf_str);
        match conf {
            Ok(_) => panic!("Expected error, but got a valid config"),
            Err(e) => {
                eprintln!("Error: {:?}", e);
            }
        }
    }

    #[test]
    fn test_valid_backends_length() {
        init_log();
        let conf_str = r#"
---
listeners:
  - address: 0.0.0.0:8000

backends: []
        "#
        .to_string();
        let conf = Config::from_yaml(&conf_str);
        match conf {
            Ok(_) => panic!("Expected error, but got a valid config"),
            Err(e) => {
                eprintln!("Error: {:?}", e);
            }
        }
    }

    #[test]
    fn test_valid_backend_host() {
        init_log();
        let conf_str = r#"
---
listeners:
  - address: 0.0.0.0:8000

backends:
  - host: "not a host!"
    port: 9001
        "#
        .to_string();
        let conf = Config::from_yaml(&conf_str);
        match conf {
            Ok(_) => panic!("Expected error, but got a valid config"),
            Err(e) => {
                eprintln!("Error: {:?}", e);
            }
        }
    }

    #[test]
    fn test_valid_session_marker() {
        init_log();
        let conf_str = r#"
---
listeners:
  - address: 0.0.0.0:8000

backends:
  - host: 127.0.0.1
    port: 9001

affinity:
  session_marker: ""
        "#
        .to_string();
        let conf = Config::from_yaml(&conf_str);
        match conf {
            Ok(_) => panic!("Expected error, but got a valid config"),
            Err(e) => {
                eprintln!("Error: {:?}", e);
            }
        }
    }
}
