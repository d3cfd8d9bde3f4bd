mod dispatch;
mod health_check;
mod helpers;
mod recipients;
mod status;

pub use dispatch::*;
pub use health_check::*;
pub use recipients::*;
pub use status::*;
