// Data carried between the CLI, the orchestrator and the state file

pub mod requests;
pub mod state;
