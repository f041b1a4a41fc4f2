#![doc = "Acquisition loop for the frequency logger."]

pub mod runner;
pub mod sampler;
pub mod session;
pub mod sink;

pub use runner::*;
pub use sampler::*;
pub use session::*;
pub use sink::*;
