mod commands;
mod connection;

pub use commands::{run_command, ClientArgs, Commands, DEFAULT_PORT};
pub use connection::{Connection, DEFAULT_TIMEOUT};
