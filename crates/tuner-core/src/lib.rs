//! Single-active-stream station control.
//!
//! ```text
//!   select_station(id)
//!         │
//!   StationController ── stop() ──► DisplaySink (inactive), MetadataPoller::stop, Player::stop/unload
//!         │
//!         └── play(id) ──► PlayerCache::acquire ─► Player::play
//!                          DisplaySink (active)
//!                          MetadataPoller::start ─► TitleUpdate channel ─► handle_title ─► DisplaySink
//! ```

pub mod controller;
pub mod error;
pub mod metadata;
pub mod player;
pub mod poller;
pub mod registry;
pub mod sink;

pub use controller::{StationController, TitleUpdate};
pub use error::{ControllerError, MetadataError};
pub use metadata::{HttpMetadataFetcher, MetadataFetcher};
pub use player::{Player, PlayerCache, PlayerFactory};
pub use poller::MetadataPoller;
pub use registry::StationRegistry;
pub use sink::DisplaySink;
