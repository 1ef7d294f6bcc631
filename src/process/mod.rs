// Process module - supervision of individual processes and the fleet

mod cell;
mod manager;
pub mod spawner;
mod supervisor;
pub mod types;

pub use manager::Manager;
pub use supervisor::{parse_signal, ProcessSupervisor};
pub use types::{ProcessInfo, Status};
