pub mod callee_routes;
pub mod envelope;
pub mod relay_routes;
pub mod server;
