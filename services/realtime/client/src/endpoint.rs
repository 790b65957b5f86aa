//! Target endpoint for the realtime channel.

/// Fixed path the server mounts the realtime channel on
pub const WS_PATH: &str = "/ws";

/// Where the realtime server lives, derived from the caller's runtime
/// environment (the host serving the application and whether it is
/// served securely).
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Host with optional port, e.g. `app.workwise.example` or `127.0.0.1:8080`
    pub host: String,
    /// Use `wss://` when the surrounding application is served over TLS
    pub secure: bool,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
        }
    }

    /// Plain `ws://` endpoint
    pub fn insecure(host: impl Into<String>) -> Self {
        Self::new(host, false)
    }

    /// Full connection URL: scheme, host, and the fixed channel path
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, WS_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_scheme_follows_security() {
        assert_eq!(Endpoint::insecure("localhost:8080").url(), "ws://localhost:8080/ws");
        assert_eq!(
            Endpoint::new("app.workwise.example", true).url(),
            "wss://app.workwise.example/ws"
        );
    }
}
