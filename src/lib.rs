pub mod config;
pub mod error;
pub mod pose;
pub mod retarget;
pub mod rig;
