mod record;
mod store;

pub use record::*;
pub use store::*;
