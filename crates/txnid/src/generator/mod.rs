mod hook;
mod lock;
mod mutex;
mod status;

pub use hook::*;
pub use lock::*;
pub(crate) use mutex::*;
pub use status::*;
