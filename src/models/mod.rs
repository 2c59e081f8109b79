pub mod file;
pub mod plan;
pub mod project;
pub mod user;

pub use file::*;
pub use plan::*;
pub use project::*;
pub use user::*;
