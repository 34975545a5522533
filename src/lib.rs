pub mod chain;
pub mod error;
pub mod shutdown;
pub mod storage;
pub mod sync;

pub use error::Error;
