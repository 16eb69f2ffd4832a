//! LoanPush notification worker.
//!
//! - [`scheduler`]: drives batch and reminder cycles on fixed cadences
//! - [`state`]: health state shared with the HTTP surface
//! - [`routes`]: `/health`

pub mod routes;
pub mod scheduler;
pub mod state;
