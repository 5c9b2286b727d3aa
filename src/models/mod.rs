pub mod user_record;
pub mod sync_state;

pub use user_record::*;
pub use sync_state::*;
