//! Session registries and track fan-out
//!
//! The source registry accepts at most one source session; the sink registry
//! accepts any number of sink sessions. When the source reports a new track,
//! the source registry hands it to the sink registry, which switches every
//! sink to it.
//!
//! # Architecture
//!
//! ```text
//!   Arc<SourceRegistry>                    Arc<SinkRegistry>
//!  ┌──────────────────────┐              ┌─────────────────────────────┐
//!  │ slot: Option<{       │ switch_track │ current_track: Option<Track>│
//!  │   session,           │─────────────►│ sessions: HashMap<          │
//!  │   track,             │              │   ConnectionId, Session>    │
//!  │ }>                   │              └──────────────┬──────────────┘
//!  └──────────▲───────────┘                             │
//!             │ on_track hook              ┌────────────┼────────────┐
//!             │                            ▼            ▼            ▼
//!      [source session]                 [sink]       [sink]       [sink]
//!                                     remove+add   remove+add   remove+add
//! ```
//!
//! Each sink renegotiates on its own after the switch; the registries never
//! wait for a negotiation to complete.

pub mod error;
pub mod sink;
pub mod source;

pub use error::RegistryError;
pub use sink::SinkRegistry;
pub use source::SourceRegistry;
