//! Error types for the ndots webhook
//!
//! Variants carry the context that is useful when reading logs in production:
//! which namespace a lookup was for, which part of the server failed, and so on.

use thiserror::Error;

/// Main error type for webhook operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid process configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Reading a namespace's annotations failed
    #[error("namespace lookup failed for {namespace}: {message}")]
    NamespaceLookup {
        /// Namespace that was being read
        namespace: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// HTTP/TLS server error
    #[error("server error [{context}]: {message}")]
    Server {
        /// Which server failed (e.g., "webhook", "metrics", "tls")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a namespace lookup error
    pub fn namespace_lookup(namespace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NamespaceLookup {
            namespace: namespace.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a server error with context
    pub fn server(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Server {
            context: context.into(),
            message: msg.into(),
        }
    }
}
