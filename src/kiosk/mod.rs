pub mod bootstrap;
pub mod command;
pub mod context;
pub mod controller;
pub mod display;
pub mod slideshow;
pub mod state;
pub mod storage;
pub mod transport;
pub mod types;


pub use bootstrap::resolve_display_id;
pub use command::{Action, Command};
pub use context::SyncContext;
pub use controller::ControllerEngine;
pub use display::DisplayEngine;
pub use slideshow::SlideshowTimer;
pub use state::StateStore;
pub use storage::{
    DisabledStore, JsonFileStore, KeyValueStore, MemoryStore, Persistence, StorageChange,
    StorageMedium,
};
pub use transport::{DeliveryPath, Inbound, Transport};
pub use types::{parse_sponsor_lines, DisplayMode, DisplayState, FeedSlot, Sponsor};
