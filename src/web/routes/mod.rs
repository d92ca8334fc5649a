// Route handler modules

pub mod chat;
pub mod health;
pub mod model;
pub mod sessions;
pub mod settings;
pub mod system;
pub mod themes;
