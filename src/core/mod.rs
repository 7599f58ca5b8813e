pub mod checkpoint;
pub mod errors;
pub mod events;
pub mod findings;
pub mod models;
pub mod scheduler;
pub mod stage;
pub mod state;
