//! # tannoy-core
//!
//! Channel membership, bounded message history, and connector fan-out for
//! the Tannoy message-distribution engine.
//!
//! Game logic groups players into named channels and pushes route + JSON
//! payload messages at them; the engine tracks which connector process
//! each member is attached to, keeps a bounded backlog of sequenced
//! messages per channel, and turns each push into one remote call per
//! connector.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **ChannelDoc / PlayerChannelDoc** - The two membership documents
//! - **MembershipStore** - Exclusive-lease persistence contract plus an
//!   in-memory backend
//! - **ChannelService** - join / quit / connect / disconnect / push /
//!   history
//! - **Router** - Per-connector delivery fan-out over a [`ConnectorLink`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Caller     │────▶│  ChannelService  │────▶│ MembershipStore │
//! └─────────────┘     └──────────────────┘     └─────────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐     ┌─────────────────┐
//!                     │   Router    │────▶│  ConnectorLink  │
//!                     └─────────────┘     └─────────────────┘
//! ```

pub mod channel;
pub mod membership;
pub mod message;
pub mod reconcile;
pub mod router;
pub mod service;
pub mod store;

pub use channel::{ChannelDoc, ChannelId, ConnectorGroups, ConnectorId, PlayerId, OFFLINE};
pub use membership::PlayerChannelDoc;
pub use message::PushRecord;
pub use reconcile::{reconcile, ReconcileReport};
pub use router::{ConnectorLink, DeliveryError, DeliveryKind, DeliveryOptions, Router};
pub use service::{ChannelError, ChannelService, ServiceConfig, ServiceStats, DEFAULT_MAX_MSG_COUNT};
pub use store::{ChannelLease, DocLease, MembershipStore, MemoryStore, PlayerLease, StoreError, StoreResult};
