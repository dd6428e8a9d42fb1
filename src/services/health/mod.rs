pub mod sweeper;

pub use sweeper::HealthSweeper;
