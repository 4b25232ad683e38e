//! Routing core for DAG-shaped processing pipelines spread across devices.
//!
//! A [`Task`](content::Task) carries its own [`Dag`](content::Dag) and a
//! cursor into it. Each device runs a [`Controller`](controller::Controller)
//! that moves tasks one stage at a time: forking them at fan-outs, parking
//! them at joins until every branch has arrived, and merging the branches
//! back into one task.

pub mod config;
pub mod content;
pub mod controller;
pub mod error;
pub mod estimation;
pub mod logging;
pub mod server;
pub mod solver;
pub mod storage;
pub mod transport;

pub use content::{Dag, DagBuilder, Service, Task};
pub use controller::{Action, Controller, TaskCoordinator};
pub use error::{StructuralError, TaskError};
