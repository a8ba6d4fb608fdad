pub mod commands;
pub mod photos;
