//! Runtime support for pull-based sample decoding

pub mod emitter;
pub mod errors;
pub mod sample;
pub mod waiter;

pub use emitter::{Emitter, FnEmitter};
pub use errors::{ConfigError, DecodeError, DecodeResult};
pub use sample::{BusSample, Line};
pub use waiter::{Condition, Edge, EdgeWaiter, Matched};
