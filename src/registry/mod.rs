//! Session registry
//!
//! Maps each producer to at most one relay session. The ingest server talks
//! to sessions only through the registry.
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                   ┌────────────────────────────┐
//!                   │ sessions: HashMap<Producer,│
//!                   │   SessionEntry {           │
//!                   │     handle: SessionHandle, │
//!                   │   }                        │
//!                   │ >                          │
//!                   └─────────────┬──────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!   [SessionWorker]         [SessionWorker]         [SessionWorker]
//!      ── TCP ──►              ── TCP ──►              ── TCP ──►
//!    broadcast server       broadcast server       broadcast server
//! ```
//!
//! A second `start` for a producer whose session is still running is
//! refused; once that session has finished its slot is reused.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::SessionEntry;
pub use error::RegistryError;
pub use store::SessionRegistry;
