//! Tasks and the DAGs they travel through.

pub mod builder;
pub mod counter;
pub mod dag;
pub mod service;
pub mod task;

pub use builder::DagBuilder;
pub use counter::TaskCounter;
pub use dag::{Dag, END, Node, START};
pub use service::{ExecuteData, Service};
pub use task::{ParallelJoint, Task};
