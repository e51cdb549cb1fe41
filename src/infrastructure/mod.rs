pub mod maps;
pub mod model;
pub mod server;
