pub mod actions;
pub mod groups;
pub mod health;
pub mod schedules;
