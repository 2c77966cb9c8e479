// Small helpers shared across the installer

pub mod disk;
pub mod logging;
pub mod version;
