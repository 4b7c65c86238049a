//! Round, share and effort accounting for a merge-mining pool.
//!
//! Events from the stratum layer are turned into batches of state store
//! commands by [`shares::ShareEngine`] and [`blocks::BlockEngine`], and applied
//! atomically by [`orchestrator::ShareProcessor`].

pub mod backends;
pub mod blocks;
pub mod config;
pub mod effort;
pub mod error;
pub mod keys;
pub mod orchestrator;
pub mod session;
pub mod shares;
pub mod snapshot;
pub mod state_store;
pub mod stats;
pub mod types;
pub mod utils;

pub use config::AccountingConfig;
pub use error::*;
pub use orchestrator::{EventOutcome, ShareProcessor};
pub use state_store::*;
pub use types::*;
