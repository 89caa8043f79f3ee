pub mod intent;
pub mod order;
pub mod position;
pub mod trade;

pub use intent::*;
pub use order::*;
pub use position::*;
pub use trade::*;
