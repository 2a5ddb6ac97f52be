//! Domain vocabulary shared by the coordination layer.

pub mod audit;
pub mod events;
