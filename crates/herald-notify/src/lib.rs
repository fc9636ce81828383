//! # Herald Notify
//!
//! The event-notification scheduling & delivery engine.
//!
//! ## Architecture
//! ```text
//! event source (scraper / management API / manual entry)
//!   └── EventLifecycle (create / update / remove / resync)
//!         └── NotificationScheduler
//!               ├── PolicyTable      (profile, category) → offsets
//!               ├── TemplateRegistry template key per fire-time
//!               └── NotificationStore (SQLite, shared file)
//!                     └── Dispatcher poll cycle
//!                           reap stale → claim due → render → deliver
//!                           └── DeliveryChannel (api / webhook)
//! ```
//!
//! Scheduling and dispatching may run in separate processes sharing only
//! the SQLite file; `NotificationStore::claim_due` is the single
//! synchronization point. Delivery is at-least-once: a crash between a
//! successful send and `finalize_sent` is recovered by stale-claim
//! reaping and may resend.

pub mod dispatcher;
pub mod lifecycle;
pub mod policy;
pub mod scheduler;
pub mod store;
pub mod templates;

pub use dispatcher::{spawn_dispatcher, CycleStats, Dispatcher};
pub use lifecycle::EventLifecycle;
pub use policy::PolicyTable;
pub use scheduler::NotificationScheduler;
pub use store::NotificationStore;
pub use templates::TemplateRegistry;
