//! Error types for mywire operations.

use std::fmt;

/// The primary error type for all mywire operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, authentication, lost session)
    Connection(ConnectionError),
    /// The server rejected a command with an ERR packet
    Server(ServerError),
    /// The server rejected a statement while preparing it
    Prepare(ServerError),
    /// Malformed or unsynchronized bytes on the wire
    Protocol(ProtocolError),
    /// A value could not be mapped to a wire type
    Bind(BindError),
    /// The caller issued operations in an order the protocol cannot honour
    Usage(UsageError),
    /// Row value conversion errors
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors from caller-supplied sources (long data readers)
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection refused
    Refused,
    /// Authentication failed
    Authentication,
    /// The session was invalidated and must reconnect
    Disconnected,
}

/// An ERR packet returned by the server.
///
/// The server always completes its response before sending ERR, so the
/// session stays usable after one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// MySQL error number (e.g. 1064 for a syntax error)
    pub code: u16,
    /// Five character SQLSTATE, when the server sent one
    pub sql_state: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl ServerError {
    /// Check if this is a unique constraint violation (ER_DUP_ENTRY).
    pub fn is_duplicate_key(&self) -> bool {
        self.code == 1062
    }

    /// Check if this is a foreign key constraint violation.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.code == 1451 || self.code == 1452
    }

    /// Check if this is a syntax error (ER_PARSE_ERROR).
    pub fn is_syntax_error(&self) -> bool {
        self.code == 1064
    }
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone)]
pub struct BindError {
    pub kind: BindErrorKind,
    /// Zero-based parameter position, when known
    pub position: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindErrorKind {
    /// No wire type exists for the supplied value
    UnsupportedType,
}

#[derive(Debug, Clone)]
pub struct UsageError {
    pub kind: UsageErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageErrorKind {
    /// Bound parameter count differs from the statement's placeholder count
    ParamCountMismatch,
    /// The statement was closed
    StatementClosed,
    /// The statement was prepared on an earlier connection and must be re-prepared
    StatementInvalidated,
    /// A result stream is still active on the session
    ResultStreamBusy,
    /// `next_result` was called before the current set was exhausted
    ResultNotExhausted,
    /// A message exceeds the configured maximum packet size
    PacketTooLarge,
    /// Parameter index is out of range for the statement
    InvalidParamIndex,
    /// Chunk size for long data must be non-zero
    InvalidChunkSize,
    /// A parameter carries both long data and an inline value
    LongDataConflict,
    /// The session was closed
    SessionClosed,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Does this error leave the session unusable until it reconnects?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Connection(_))
    }

    /// Was this error reported by the server (ERR packet)?
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Server(_) | Error::Prepare(_))
    }

    /// Is this an `UnsupportedBindType` failure?
    pub fn is_unsupported_bind_type(&self) -> bool {
        matches!(
            self,
            Error::Bind(BindError {
                kind: BindErrorKind::UnsupportedType,
                ..
            })
        )
    }

    /// Get the server error code if available.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Server(e) | Error::Prepare(e) => Some(e.code),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g. "42S02" for an unknown table)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(e) | Error::Prepare(e) => e.sql_state.as_deref(),
            _ => None,
        }
    }

    /// Get the usage error kind, if this is a caller-ordering violation.
    pub fn usage_kind(&self) -> Option<UsageErrorKind> {
        match self {
            Error::Usage(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Build a usage error.
    pub fn usage(kind: UsageErrorKind, message: impl Into<String>) -> Self {
        Error::Usage(UsageError {
            kind,
            message: message.into(),
        })
    }

    /// Build a protocol error without a source.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(ProtocolError {
            message: message.into(),
            raw_data: None,
            source: None,
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Server(e) => write!(f, "Server error: {}", e),
            Error::Prepare(e) => write!(f, "Prepare error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::Bind(e) => write!(f, "Bind error: {}", e),
            Error::Usage(e) => write!(f, "Usage error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Protocol(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "{} (code {}, SQLSTATE {})", self.message, self.code, state),
            None => write!(f, "{} (code {})", self.message, self.code),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "parameter {}: {}", pos, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<BindError> for Error {
    fn from(err: BindError) -> Self {
        Error::Bind(err)
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Self {
        Error::Usage(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for mywire operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_helpers() {
        let err = ServerError {
            code: 1062,
            sql_state: Some("23000".to_string()),
            message: "Duplicate entry '1' for key 'PRIMARY'".to_string(),
        };
        assert!(err.is_duplicate_key());
        assert!(!err.is_foreign_key_violation());

        let err = Error::Server(err);
        assert!(err.is_server_error());
        assert!(!err.is_fatal());
        assert_eq!(err.server_code(), Some(1062));
        assert_eq!(err.sqlstate(), Some("23000"));
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::protocol("sequence mismatch").is_fatal());
        assert!(
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: "lost connection".to_string(),
                source: None,
            })
            .is_fatal()
        );

        let busy = Error::usage(UsageErrorKind::ResultStreamBusy, "busy");
        assert!(!busy.is_fatal());
        assert_eq!(busy.usage_kind(), Some(UsageErrorKind::ResultStreamBusy));
    }

    #[test]
    fn bind_error_display() {
        let err = Error::Bind(BindError {
            kind: BindErrorKind::UnsupportedType,
            position: Some(2),
            message: "unknown wire type 0x42".to_string(),
        });
        assert!(err.is_unsupported_bind_type());
        assert_eq!(
            err.to_string(),
            "Bind error: parameter 2: unknown wire type 0x42"
        );
    }

    #[test]
    fn prepare_error_display() {
        let err = Error::Prepare(ServerError {
            code: 1064,
            sql_state: Some("42000".to_string()),
            message: "You have an error in your SQL syntax".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Prepare error: You have an error in your SQL syntax (code 1064, SQLSTATE 42000)"
        );
    }
}
