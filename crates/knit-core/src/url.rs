//! Parameter carrier used for adaptive dispatch and activation matching.
//!
//! The registry only ever reads a carrier. [`ParameterCarrier`] is the narrow
//! contract it depends on; [`Url`] is the concrete carrier shipped with the
//! crate, written as `protocol://host:port/path?key=value&...`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Read-only, ordered key/value lookup with a protocol field.
pub trait ParameterCarrier: Send + Sync {
    /// The protocol field, if any.
    fn protocol(&self) -> Option<&str>;

    /// Global parameter lookup.
    fn parameter(&self, key: &str) -> Option<&str>;

    /// All parameters in key order.
    fn parameters(&self) -> Vec<(&str, &str)>;

    /// Per-method lookup: `method.key` overrides `key`.
    fn method_parameter(&self, method: &str, key: &str) -> Option<&str> {
        let scoped = format!("{method}.{key}");
        self.parameter(&scoped)
            .filter(|v| !v.is_empty())
            .or_else(|| self.parameter(key))
    }

    /// Rendered form used in diagnostics.
    fn describe(&self) -> String;

    /// Parameter value, or `default` when missing or empty.
    fn parameter_or(&self, key: &str, default: &str) -> String {
        match self.parameter(key) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => default.to_string(),
        }
    }

    /// Per-method parameter value, or `default` when missing or empty.
    fn method_parameter_or(&self, method: &str, key: &str, default: &str) -> String {
        match self.method_parameter(method, key) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => default.to_string(),
        }
    }

    /// Protocol, or `default` when missing or empty.
    fn protocol_or(&self, default: &str) -> String {
        match self.protocol() {
            Some(protocol) if !protocol.is_empty() => protocol.to_string(),
            _ => default.to_string(),
        }
    }
}

/// Immutable URL-style carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url {
    protocol: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    parameters: BTreeMap<String, String>,
}

impl Url {
    /// Create a carrier with a protocol and no parameters
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: Some(protocol.into()),
            ..Default::default()
        }
    }

    /// Create a carrier without a protocol
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the host and port
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Set the path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Return a copy with one more parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl ParameterCarrier for Url {
    fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    fn parameters(&self) -> Vec<(&str, &str)> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(protocol) = &self.protocol {
            write!(f, "{protocol}://")?;
        }
        if let Some(host) = &self.host {
            write!(f, "{host}")?;
            if let Some(port) = self.port {
                write!(f, ":{port}")?;
            }
        }
        if let Some(path) = &self.path {
            write!(f, "/{path}")?;
        }
        for (i, (key, value)) in self.parameters.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Url {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidUrl {
                url: s.to_string(),
                message: "url is empty".into(),
            });
        }

        let mut url = Url::default();
        let (rest, query) = match s.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (s, None),
        };

        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                url.parameters.insert(key.trim().into(), value.trim().into());
            }
        }

        let rest = match rest.split_once("://") {
            Some((protocol, rest)) => {
                if !protocol.is_empty() {
                    url.protocol = Some(protocol.to_string());
                }
                rest
            }
            None => rest,
        };

        let (address, path) = match rest.split_once('/') {
            Some((address, path)) => (address, Some(path)),
            None => (rest, None),
        };
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            url.path = Some(path.to_string());
        }

        if !address.is_empty() {
            match address.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|e| Error::InvalidUrl {
                        url: s.to_string(),
                        message: format!("invalid port {port}: {e}"),
                    })?;
                    url.host = Some(host.to_string());
                    url.port = Some(port);
                }
                None => url.host = Some(address.to_string()),
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let url: Url = "tri://10.0.0.1:20880/demo.Service?b=2&a=1".parse().unwrap();

        assert_eq!(ParameterCarrier::protocol(&url), Some("tri"));
        assert_eq!(url.host(), Some("10.0.0.1"));
        assert_eq!(url.port(), Some(20880));
        assert_eq!(url.path(), Some("demo.Service"));
        // Parameters render in key order
        assert_eq!(url.to_string(), "tri://10.0.0.1:20880/demo.Service?a=1&b=2");
    }

    #[test]
    fn test_method_parameter_overrides_global() {
        let url = Url::new("test")
            .with_parameter("greeter", "en")
            .with_parameter("hello.greeter", "fr");

        assert_eq!(url.method_parameter("hello", "greeter"), Some("fr"));
        assert_eq!(url.method_parameter("bye", "greeter"), Some("en"));
        assert_eq!(url.method_parameter_or("bye", "missing", "dflt"), "dflt");
    }

    #[test]
    fn test_empty_values_fall_back() {
        let url = Url::empty().with_parameter("greeter", "");

        assert_eq!(url.parameter_or("greeter", "en"), "en");
        assert_eq!(url.protocol_or("local"), "local");
        assert_eq!(Url::new("").protocol_or("local"), "local");
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        match "x://host:port".parse::<Url>() {
            Err(Error::InvalidUrl { url, message }) => {
                assert_eq!(url, "x://host:port");
                assert!(message.contains("port"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let err = "".parse::<Url>().unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
        assert!(!err.is_compilation());
    }
}
