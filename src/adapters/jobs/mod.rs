//! Background jobs.

mod reservation_sweeper;

pub use reservation_sweeper::{ReservationSweeper, ReservationSweeperConfig, SweepReport};
