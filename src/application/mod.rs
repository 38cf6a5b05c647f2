pub mod auth;
pub mod bootstrap;
pub mod calendar;
pub mod google;
pub mod oauth;
pub mod state;
pub mod tasks;
pub mod timer;
