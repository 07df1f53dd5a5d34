pub mod backends;
pub mod progress;
pub mod util;
pub mod verify;

pub use backends::*;
pub use progress::*;
pub use util::*;
pub use verify::*;
