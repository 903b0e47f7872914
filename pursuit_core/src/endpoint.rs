//! Backend endpoint addressing.

/// Location of the simulation backend.
///
/// The live-channel scheme mirrors the REST scheme: a secure endpoint
/// speaks `https`/`wss`, an insecure one `http`/`ws`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl ServerEndpoint {
    /// Endpoint on the default backend port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 8000,
            secure: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Base URL of the REST API.
    pub fn api_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/api/v1", scheme, self.host, self.port)
    }

    /// URL of the live channel for one simulation.
    pub fn channel_url(&self, simulation_id: u64) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/api/v1/ws/simulations/{}",
            scheme, self.host, self.port, simulation_id
        )
    }

    /// A host is usable when it is non-empty and carries no path or
    /// whitespace; anything else cannot form a channel URL.
    pub fn is_usable(&self) -> bool {
        !self.host.is_empty()
            && !self.host.contains('/')
            && !self.host.contains(char::is_whitespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base() {
        let endpoint = ServerEndpoint::new("localhost");
        assert_eq!(endpoint.api_base(), "http://localhost:8000/api/v1");

        let secure = ServerEndpoint::new("sim.example.org")
            .with_port(443)
            .with_secure(true);
        assert_eq!(secure.api_base(), "https://sim.example.org:443/api/v1");
    }

    #[test]
    fn test_channel_url_mirrors_security_scheme() {
        let endpoint = ServerEndpoint::new("localhost");
        assert_eq!(
            endpoint.channel_url(12),
            "ws://localhost:8000/api/v1/ws/simulations/12"
        );

        let secure = ServerEndpoint::new("localhost").with_secure(true);
        assert_eq!(
            secure.channel_url(12),
            "wss://localhost:8000/api/v1/ws/simulations/12"
        );
    }

    #[test]
    fn test_unusable_hosts() {
        assert!(!ServerEndpoint::new("").is_usable());
        assert!(!ServerEndpoint::new("host/path").is_usable());
        assert!(!ServerEndpoint::new("ho st").is_usable());
        assert!(ServerEndpoint::new("10.0.0.5").is_usable());
    }
}
