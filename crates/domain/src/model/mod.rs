mod entity;
mod intent;
mod provider;
mod security;

pub use entity::*;
pub use intent::*;
pub use provider::*;
pub use security::*;
