pub mod config;
pub mod error;
pub mod gesture;
pub mod illuminator;
pub mod lamp;
pub mod light;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod spell;
pub mod store;
pub mod vision;
