pub mod health;
pub mod scenario;
pub mod session;
pub mod ws;
