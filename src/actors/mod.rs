pub mod copilot_session;
pub mod health;
pub mod registry;
