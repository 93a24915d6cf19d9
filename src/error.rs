use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Broad classification of session errors.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Error resolving or validating the session configuration
    Config,
    /// Error connecting to or communicating over the WebSocket transport
    WebSocket,
    /// Error related to the outbound frame queue
    Queue,
    /// Error raised by (or on behalf of) the user-supplied message handler
    Handler,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        ConfigInvalid {
            reason: message.into(),
        }
        .into()
    }

    #[must_use]
    pub fn missing_env(name: &'static str) -> Self {
        MissingEnv { name }.into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A required environment variable was not set.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct MissingEnv {
    pub name: &'static str,
}

impl fmt::Display for MissingEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "required environment variable {} is not set", self.name)
    }
}

impl StdError for MissingEnv {}

impl From<MissingEnv> for Error {
    fn from(err: MissingEnv) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

/// The configuration carried a value the session cannot work with.
#[non_exhaustive]
#[derive(Debug)]
pub struct ConfigInvalid {
    pub reason: String,
}

impl fmt::Display for ConfigInvalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.reason)
    }
}

impl StdError for ConfigInvalid {}

impl From<ConfigInvalid> for Error {
    fn from(err: ConfigInvalid) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

/// Transport-level error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tungstenite::Error),
    /// The connection attempt did not complete within the configured timeout
    ConnectTimeout {
        /// The timeout that elapsed
        after: Duration,
    },
    /// The transport was closed and can no longer accept frames
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectTimeout { after } => {
                write!(f, "connection attempt timed out after {after:?}")
            }
            Self::Closed => write!(f, "WebSocket transport closed"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::with_source(Kind::WebSocket, e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::with_source(Kind::WebSocket, TransportError::Connection(e))
    }
}

impl From<tungstenite::http::header::InvalidHeaderValue> for Error {
    fn from(e: tungstenite::http::header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Config, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Config, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_display_names_the_variable() {
        let error: Error = MissingEnv { name: "WS_URL" }.into();

        assert_eq!(error.kind(), Kind::Config);
        assert!(error.to_string().contains("WS_URL"));
    }

    #[test]
    fn transport_closed_maps_to_websocket_kind() {
        let error: Error = TransportError::Closed.into();

        assert_eq!(error.kind(), Kind::WebSocket);
        assert!(error.downcast_ref::<TransportError>().is_some());
    }

    #[test]
    fn config_helper_carries_reason() {
        let error = Error::config("overflow policy must be drop_oldest or drop_newest");

        assert_eq!(error.kind(), Kind::Config);
        assert!(error.to_string().contains("overflow policy"));
    }
}
