//! Write-path services: mutation tracking, navigation, audit and their composition.

pub mod audit;
pub mod error;
pub mod mutations;
pub mod navigation;
pub mod repos;
pub mod transport;
pub mod write_path;
