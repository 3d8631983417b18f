// src/error.rs

//! Error taxonomy for the broadcast engine.
//!
//! Only [`ConfigError`] (at registration), [`TimerError`] (initial arm) and
//! [`RenderError::Alloc`] (staging buffer) are fatal, and only during startup.
//! Everything raised while the dispatcher runs is logged and counted.

use std::collections::TryReserveError;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::{SessionId, VarType};

/// Failures reported by an external variable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("variable already exists: {0}")]
    AlreadyExists(String),

    #[error("no such variable: {0}")]
    NotFound(String),

    #[error("type mismatch for {name}: variable is {declared}, value is {given}")]
    TypeMismatch {
        name: String,
        declared: VarType,
        given: VarType,
    },

    #[error("value for {name} exceeds {max_len} bytes")]
    TooLong { name: String, max_len: usize },

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("variable {0} does not accept report requests")]
    NotReportable(String),

    #[error("no pending report session {0}")]
    NoSession(SessionId),

    #[error("event channel closed")]
    Closed,
}

/// Registration-time failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("variable {name} already exists as {existing}, requested {requested}")]
    TypeMismatch {
        name: String,
        existing: VarType,
        requested: VarType,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Template open or render failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot open template {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rendered payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("rendered payload contains an embedded NUL byte")]
    EmbeddedNul,

    #[error("cannot allocate render buffer: {0}")]
    Alloc(#[from] TryReserveError),
}

/// Timer create/set failure.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("cannot create timer: {0}")]
    Create(String),

    #[error("cannot set timer to {seconds}s interval")]
    Set { seconds: u32 },
}

/// Per-send socket failure. Never fatal.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("cannot open datagram socket: {0}")]
    Open(#[source] io::Error),

    #[error("cannot enable broadcast option: {0}")]
    SetOption(#[source] io::Error),

    #[error("send to {destination} failed: {source}")]
    Send {
        destination: SocketAddr,
        #[source]
        source: io::Error,
    },
}
