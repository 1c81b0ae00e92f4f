//! Traffic Classifier
//!
//! Resolves every packet to exactly one traffic class rule.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Classification                           │
//! │                                                             │
//! │  (src, dst, ingress, l4)                                    │
//! │        │                                                    │
//! │        ▼          Miss / stale    ┌──────────────────────┐  │
//! │  ┌─────────────┐ ───────────────► │      Rule Index      │  │
//! │  │   Cache     │                  │ exact/range, AS, ISD │  │
//! │  │ (DashMap)   │ ◄─────────────── │ one-sided, interface │  │
//! │  └─────────────┘    store winner  │ L4-only              │  │
//! │        │ Hit (re-validated)       └──────────────────────┘  │
//! │        ▼                                                    │
//! │   [ClassRule]          no match → default rule (queue 0)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rule sets are immutable once published. A reload builds a new index and
//! an empty cache and swaps both in with a single atomic store.

#![warn(missing_docs)]

pub mod cache;
pub mod classifier;
pub mod index;
pub mod rule;

pub use cache::{CacheKey, ClassificationCache};
pub use classifier::{Classifier, ClassifierStats, RuleSet};
pub use index::{RuleId, RuleIndex};
pub use rule::{ClassRule, MatchSpec};
