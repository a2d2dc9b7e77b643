pub mod runtime;
pub mod profiles;

pub use runtime::*;
pub use profiles::*;
