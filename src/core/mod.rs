pub mod agenda;
pub mod app_state;
pub mod local_task;
pub mod task;
