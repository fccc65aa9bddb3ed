pub mod config;
pub mod draw;
pub mod graph;
pub mod models;
pub mod shader_model;
