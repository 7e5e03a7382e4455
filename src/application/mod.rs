pub mod bootstrap;
pub mod commands;
pub mod persistence;
pub mod reconciler;
pub mod timer_service;
