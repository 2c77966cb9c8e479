// Direct database administration for the platform database

pub mod connection;
pub mod provisioning;
