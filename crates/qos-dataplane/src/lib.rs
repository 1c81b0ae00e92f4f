//! QoS data plane
//!
//! Policing, per-class queues and dequeue scheduling for the border router.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          QOS ENGINE                              │
//! │                                                                  │
//! │   inbound channel                                                │
//! │        │                                                         │
//! │        ▼                                                         │
//! │  ┌───────────┐   ┌────────────┐   ┌─────────────┐                │
//! │  │  Workers  │─▶│ Classifier │─▶│ Policer +   │──▶ notifications│
//! │  └───────────┘   │ (ArcSwap)  │   │ fill profile│                │
//! │                  └────────────┘   └──────┬──────┘                │
//! │                                          ▼                       │
//! │                 ┌─────────┐ ┌─────────┐     ┌─────────┐          │
//! │                 │ Queue 0 │ │ Queue 1 │ ... │ Queue N │          │
//! │                 └────┬────┘ └────┬────┘     └────┬────┘          │
//! │                      └───────────┼───────────────┘               │
//! │                                  ▼                               │
//! │                  ┌───────────────────────────────┐               │
//! │                  │ Scheduler (CIR/PIR + surplus) │──▶ forwarder  │
//! │                  └───────────────────────────────┘               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Disciplines
//!
//! | Discipline | Quantum | Rate control |
//! |------------|---------|--------------|
//! | Round robin | whole queue | none |
//! | Deficit round robin | `priority` packets | global bucket, backpressure |
//! | Rate round robin | share of `cycle_budget` | CIR/PIR/global buckets, surplus pool |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bucket;
pub mod engine;
pub mod notify;
pub mod queue;
pub mod scheduler;
pub mod stats;

pub use bucket::TokenBucket;
pub use engine::{EngineStatsSnapshot, Generation, QosCore, QosEngine};
pub use notify::{Notification, Notifier};
pub use queue::{build_queue, profile_action, ChannelQueue, PacketQueue, QPkt, QueueState, RingQueue};
pub use scheduler::{
    build_scheduler, CycleReport, DeficitRoundRobin, Forwarder, RateRoundRobin, RoundRobin, Scheduler,
    SchedulerDriver, SurplusPool,
};
pub use stats::{QosStats, QosStatsSnapshot};
