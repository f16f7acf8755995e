pub mod app_command;
pub mod submit;

pub use app_command::{AppCommand, HELP_TEXT};
