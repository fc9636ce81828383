//! # Herald Core
//!
//! Shared foundation for the Herald notification engine: the error
//! taxonomy, the TOML configuration, the event/notification data model,
//! and the `DeliveryChannel` trait that transports implement.
//!
//! Nothing in this crate touches the network or the database — those
//! concerns live in `herald-notify` and `herald-channels`.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
pub use traits::DeliveryChannel;
pub use types::{
    Anchor, Event, EventParticipant, EventPhase, NewNotification, Notification,
    NotificationStatus,
};
