#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod window;
pub use window::*;

mod clock;
pub use clock::*;

mod store;
pub use store::*;

mod counter;
pub use counter::*;

mod limiter;
pub use limiter::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests;
