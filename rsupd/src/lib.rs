pub mod server;
pub mod supervisor;
