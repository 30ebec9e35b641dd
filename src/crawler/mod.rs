pub mod controller;
pub mod extract;
pub mod record;
pub mod scheduler;
