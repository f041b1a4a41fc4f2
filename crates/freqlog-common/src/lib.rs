#![doc = "Common types shared across the freqlog workspace."]

pub mod config;
pub mod convert;
pub mod error;
pub mod metrics;
pub mod record;
pub mod shutdown;
pub mod state;
pub mod time;

pub use config::*;
pub use convert::*;
pub use error::*;
pub use metrics::*;
pub use record::*;
pub use shutdown::*;
pub use state::*;
pub use time::*;
