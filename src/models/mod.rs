pub mod dashboard;
pub mod post;
pub mod profile;
pub mod reference;

pub use dashboard::*;
pub use post::*;
pub use profile::*;
pub use reference::*;
