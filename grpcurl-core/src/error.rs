use std::fmt;

/// All error kinds produced by the invocation engine.
///
/// Each variant is a stable, substring-testable signature rather than an
/// opaque wrapper, so callers can match on kind instead of message text.
#[derive(Debug)]
pub enum GrpcurlError {
    /// Malformed CLI invocation: bad flag combination, bad positional shape.
    UsageError(String),

    /// Corrupt protoset, unresolvable proto imports, or parse failure while
    /// building a descriptor source.
    SchemaLoadError(String),

    /// The server does not support the gRPC reflection API (UNIMPLEMENTED on
    /// both `v1` and `v1alpha`). Sticky for the remaining lifetime of the
    /// reflection source that returned it.
    ReflectionNotSupported,

    /// The requested symbol (service, method, message, etc.) was not found.
    SymbolNotFound(String),

    /// JSON/text parse error on a request message.
    InvalidRequestData(String),

    /// Dial failure, TLS handshake failure, peer reset, deadline exceeded,
    /// or an unsupported transport selection (e.g. `-alts`).
    TransportError(String),

    /// An I/O error (file read, network, etc.).
    Io(std::io::Error),

    /// A gRPC status error from the server. Never returned from `InvokeRPC`;
    /// only ever carried through trailers.
    GrpcStatus(tonic::Status),

    /// Any other internal error that doesn't fit a named kind above.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for GrpcurlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrpcurlError::UsageError(msg) => write!(f, "usage error: {msg}"),
            GrpcurlError::SchemaLoadError(msg) => write!(f, "schema load error: {msg}"),
            GrpcurlError::ReflectionNotSupported => {
                write!(f, "server does not support the reflection API")
            }
            GrpcurlError::SymbolNotFound(name) => write!(f, "Symbol not found: {name}"),
            GrpcurlError::InvalidRequestData(msg) => write!(f, "invalid request data: {msg}"),
            GrpcurlError::TransportError(msg) => write!(f, "transport error: {msg}"),
            GrpcurlError::Io(err) => write!(f, "I/O error: {err}"),
            GrpcurlError::GrpcStatus(status) => {
                write!(f, "gRPC error: {} - {}", status.code(), status.message())
            }
            GrpcurlError::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for GrpcurlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GrpcurlError::Io(err) => Some(err),
            GrpcurlError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GrpcurlError {
    fn from(err: std::io::Error) -> Self {
        GrpcurlError::Io(err)
    }
}

impl From<tonic::Status> for GrpcurlError {
    fn from(status: tonic::Status) -> Self {
        GrpcurlError::GrpcStatus(status)
    }
}

/// Convenience type alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GrpcurlError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn is_not_found_error(err: &GrpcurlError) -> bool {
        match err {
            GrpcurlError::SymbolNotFound(_) => true,
            GrpcurlError::GrpcStatus(status) => status.code() == tonic::Code::NotFound,
            _ => false,
        }
    }

    #[test]
    fn not_found_error_detected() {
        let err = GrpcurlError::SymbolNotFound("my.Service".into());
        assert!(is_not_found_error(&err));
    }

    #[test]
    fn grpc_not_found_detected() {
        let status = tonic::Status::not_found("service not found");
        let err = GrpcurlError::GrpcStatus(status);
        assert!(is_not_found_error(&err));
    }

    #[test]
    fn other_errors_not_detected_as_not_found() {
        let err = GrpcurlError::UsageError("bad input".into());
        assert!(!is_not_found_error(&err));

        let err = GrpcurlError::ReflectionNotSupported;
        assert!(!is_not_found_error(&err));
    }

    #[test]
    fn display_formatting() {
        let err = GrpcurlError::SymbolNotFound("my.Service".into());
        assert_eq!(err.to_string(), "Symbol not found: my.Service");

        let err = GrpcurlError::ReflectionNotSupported;
        assert_eq!(
            err.to_string(),
            "server does not support the reflection API"
        );

        let err = GrpcurlError::TransportError("dial failed".into());
        assert_eq!(err.to_string(), "transport error: dial failed");

        let err =
            GrpcurlError::UsageError("-plaintext and -insecure are mutually exclusive".into());
        assert!(err.to_string().starts_with("usage error:"));
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: GrpcurlError = io_err.into();
        assert!(matches!(err, GrpcurlError::Io(_)));
    }
}
