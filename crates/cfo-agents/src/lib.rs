pub mod cancel;
pub mod engine;
pub mod events;
pub mod executor;
pub mod guardrails;
pub mod history;
pub mod lifecycle;
pub mod registry;
pub mod roles;
pub mod scheduler;
pub mod schema;
pub mod synthesis;
