// Error types for the VPN route resolver

use thiserror::Error;

/// Failure to produce a route snapshot from the kernel routing table
#[derive(Error, Debug)]
pub enum RouteTableError {
    #[error("failed to execute {command}: {source}")]
    CommandExecution {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("failed to parse route listing: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid route destination {value:?}: {reason}")]
    InvalidDestination { value: String, reason: String },

    #[error("invalid gateway address {0:?}")]
    InvalidGateway(String),

    #[error("resolving device {device}: {source}")]
    UnknownDevice {
        device: String,
        #[source]
        source: LinkError,
    },
}

/// Failure to look up a network link's attributes
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("no link with index {0}")]
    IndexNotFound(u32),

    #[error("no link named {0}")]
    NameNotFound(String),

    #[error("malformed ifindex {value:?} for link {name}")]
    MalformedIndex { name: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the two route resolution queries
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("listing routes: {0}")]
    ListRoutes(#[from] RouteTableError),

    #[error("default route link not found: in {route_count} route(s)")]
    DefaultRouteNotFound { route_count: usize },

    #[error("VPN destination IP address not found: in {route_count} route(s)")]
    VpnDestinationNotFound { route_count: usize },

    #[error("finding link at index {index}: {source}")]
    LinkLookupFailed {
        index: u32,
        #[source]
        source: LinkError,
    },

    #[error("VPN local gateway IP address not found: in {route_count} route(s)")]
    VpnLocalGatewayNotFound { route_count: usize },

    #[error("tunnel interface name must not be empty")]
    InvalidInterfaceName,
}

impl ResolveError {
    /// Number of routes scanned before giving up, when the query got that far
    pub fn route_count(&self) -> Option<usize> {
        match self {
            ResolveError::DefaultRouteNotFound { route_count }
            | ResolveError::VpnDestinationNotFound { route_count }
            | ResolveError::VpnLocalGatewayNotFound { route_count } => Some(*route_count),
            _ => None,
        }
    }

    /// Whether the error only means the VPN connection is not fully established yet.
    /// Nothing is retried here; this lets a caller decide on its own backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolveError::DefaultRouteNotFound { .. }
                | ResolveError::VpnDestinationNotFound { .. }
                | ResolveError::VpnLocalGatewayNotFound { .. }
        )
    }
}

/// Top-level error type for the binary
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("reading routing table: {0}")]
    RouteTable(#[from] RouteTableError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Resolve(ResolveError::ListRoutes(_)) | AppError::RouteTable(_) => {
                "Failed to read routing table. Make sure iproute2 is installed and you have proper permissions.".to_string()
            }
            AppError::Resolve(ResolveError::DefaultRouteNotFound { .. }) => {
                "No default route found. Check your network connection.".to_string()
            }
            AppError::Resolve(ResolveError::VpnDestinationNotFound { .. }) => {
                "No route to the VPN server found yet. The VPN connection may still be starting.".to_string()
            }
            AppError::Resolve(ResolveError::VpnLocalGatewayNotFound { .. }) => {
                "No default route through the tunnel interface found yet. The VPN connection may still be starting.".to_string()
            }
            AppError::Resolve(ResolveError::LinkLookupFailed { index, .. }) => {
                format!("Network interface {} disappeared while reading routes. Try again.", index)
            }
            AppError::Resolve(ResolveError::InvalidInterfaceName) => {
                "Please provide a tunnel interface name.".to_string()
            }
            AppError::Config(_) => {
                "Configuration error. Check your config file or command-line arguments.".to_string()
            }
            AppError::Serialization(_) => {
                "Data format error. This might be a bug, please report it.".to_string()
            }
            AppError::Io(_) => "Failed to write output.".to_string(),
        }
    }

    /// Stable name of the error kind, for machine-readable output
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Resolve(ResolveError::ListRoutes(_)) | AppError::RouteTable(_) => "RouteTableRead",
            AppError::Resolve(ResolveError::DefaultRouteNotFound { .. }) => "DefaultRouteNotFound",
            AppError::Resolve(ResolveError::VpnDestinationNotFound { .. }) => "VpnDestinationNotFound",
            AppError::Resolve(ResolveError::LinkLookupFailed { .. }) => "LinkLookupFailed",
            AppError::Resolve(ResolveError::VpnLocalGatewayNotFound { .. }) => "VpnLocalGatewayNotFound",
            AppError::Resolve(ResolveError::InvalidInterfaceName) => "InvalidInterfaceName",
            AppError::Config(_) => "Config",
            AppError::Serialization(_) => "Serialization",
            AppError::Io(_) => "Io",
        }
    }

    pub fn route_count(&self) -> Option<usize> {
        match self {
            AppError::Resolve(e) => e.route_count(),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Resolve(e) if e.is_retryable())
    }

    /// Process exit code: 2 when the VPN is not up yet, 1 for everything else
    pub fn exit_code(&self) -> u8 {
        if self.is_retryable() { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(ResolveError::DefaultRouteNotFound { route_count: 0 }.is_retryable());
        assert!(ResolveError::VpnDestinationNotFound { route_count: 3 }.is_retryable());
        assert!(ResolveError::VpnLocalGatewayNotFound { route_count: 1 }.is_retryable());
        assert!(!ResolveError::InvalidInterfaceName.is_retryable());
        assert!(
            !ResolveError::LinkLookupFailed {
                index: 7,
                source: LinkError::IndexNotFound(7),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ResolveError::VpnDestinationNotFound { route_count: 12 };
        assert_eq!(err.to_string(), "VPN destination IP address not found: in 12 route(s)");
        assert_eq!(err.route_count(), Some(12));

        let err = ResolveError::LinkLookupFailed {
            index: 4,
            source: LinkError::IndexNotFound(4),
        };
        assert_eq!(err.to_string(), "finding link at index 4: no link with index 4");
        assert_eq!(err.route_count(), None);
    }

    #[test]
    fn test_exit_codes() {
        let not_up = AppError::from(ResolveError::VpnLocalGatewayNotFound { route_count: 0 });
        assert_eq!(not_up.exit_code(), 2);
        assert_eq!(not_up.kind(), "VpnLocalGatewayNotFound");
        assert_eq!(not_up.route_count(), Some(0));
        let fatal = AppError::Config("bad".to_string());
        assert_eq!(fatal.exit_code(), 1);
    }
}
