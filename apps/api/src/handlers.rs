pub mod access;
pub mod clusters;
pub mod health;
pub mod slack;
pub mod users;
