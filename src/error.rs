use reqwest::StatusCode;
use thiserror::Error;

/// Closed set of failure kinds observed at the transport boundary.
///
/// Classification happens at the lowest layer that sees the raw outcome;
/// callers propagate these without reinterpreting them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The edge (Cloudflare) blocked the request, HTTP 403.
    #[error("request blocked at the edge (403)")]
    Forbidden,
    /// Upstream is overloaded, surfaced as HTTP 405.
    #[error("service is busy (405)")]
    ServiceBusy,
    /// The session response carried no usable access token.
    #[error("not authenticated")]
    Unauthorized,
    /// Any other failure, optionally with detail.
    #[error("{}", .0.as_deref().unwrap_or("unknown error"))]
    Unknown(Option<String>),
}

impl ClientError {
    /// Stable name of this error kind, matching the names used on the
    /// extension message bus.
    pub fn name(&self) -> &'static str {
        match self {
            ClientError::Forbidden => "CloudflareException",
            ClientError::ServiceBusy => "ServiceBusyException",
            ClientError::Unauthorized => "UnauthorizedException",
            ClientError::Unknown(_) => "UnknownException",
        }
    }

    /// Rehydrate an error kind from its bus name.
    pub fn from_name(name: &str) -> Option<ClientError> {
        match name {
            "CloudflareException" => Some(ClientError::Forbidden),
            "ServiceBusyException" => Some(ClientError::ServiceBusy),
            "UnauthorizedException" => Some(ClientError::Unauthorized),
            "UnknownException" => Some(ClientError::Unknown(None)),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Unknown(Some(err.to_string()))
    }
}

/// Map a non-success HTTP status to its error kind.
///
/// The same mapping applies to the unauthenticated session fetch and to
/// every authenticated call.
pub fn classify_status(status: StatusCode) -> ClientError {
    match status {
        StatusCode::FORBIDDEN => ClientError::Forbidden,
        StatusCode::METHOD_NOT_ALLOWED => ClientError::ServiceBusy,
        _ => ClientError::Unknown(Some(format!("unexpected status {status}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_statuses() {
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            ClientError::Forbidden
        );
        assert_eq!(
            classify_status(StatusCode::METHOD_NOT_ALLOWED),
            ClientError::ServiceBusy
        );
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            ClientError::Unknown(Some(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            ClientError::Unknown(Some(_))
        ));
    }

    #[test]
    fn classify_is_pure() {
        for status in [
            StatusCode::FORBIDDEN,
            StatusCode::METHOD_NOT_ALLOWED,
            StatusCode::BAD_GATEWAY,
        ] {
            assert_eq!(classify_status(status), classify_status(status));
        }
    }

    #[test]
    fn name_round_trips() {
        for err in [
            ClientError::Forbidden,
            ClientError::ServiceBusy,
            ClientError::Unauthorized,
            ClientError::Unknown(None),
        ] {
            assert_eq!(ClientError::from_name(err.name()), Some(err));
        }
        assert_eq!(ClientError::from_name("SomethingElse"), None);
    }

    #[test]
    fn unknown_detail_shows_in_display() {
        let err = ClientError::Unknown(Some("boom".to_string()));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(ClientError::Unknown(None).to_string(), "unknown error");
    }
}
