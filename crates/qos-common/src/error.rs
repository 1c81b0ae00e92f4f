//! Error types for the QoS core
//!
//! Only configuration loading and start-up can fail. The packet path never
//! returns these.

use thiserror::Error;

/// QoS error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QosError {
    /// Unparseable ISD-AS address
    #[error("invalid IA: {0}")]
    InvalidIa(String),

    /// Unknown match mode string
    #[error("invalid match mode: {0}")]
    InvalidMatchMode(String),

    /// Malformed or inverted range
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Unknown L4 protocol
    #[error("invalid L4 type: {0}")]
    InvalidL4Type(String),

    /// Queue configuration out of bounds
    #[error("invalid queue {id}: {reason}")]
    InvalidQueue {
        /// Queue id
        id: u32,
        /// What is wrong with it
        reason: String,
    },

    /// Rule points at a queue that does not exist
    #[error("rule {rule:?} references unknown queue {queue}")]
    UnknownQueue {
        /// Rule name
        rule: String,
        /// Referenced queue number
        queue: u32,
    },

    /// Two queues share an id
    #[error("duplicate queue id {0}")]
    DuplicateQueue(u32),

    /// Queue 0 carries unmatched traffic and must exist
    #[error("queue 0 (default class) is not configured")]
    MissingDefaultQueue,

    /// Scheduler has nothing to serve
    #[error("no queues configured")]
    NoQueues,

    /// Reload tried to change the set of queues
    #[error("reload cannot change the queue layout")]
    QueueLayoutChanged,

    /// Generic configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Worker thread could not be started
    #[error("failed to spawn {0}")]
    Spawn(String),
}

/// Result type for the QoS core
pub type QosResult<T> = Result<T, QosError>;
