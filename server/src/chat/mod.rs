pub mod delivery;
pub mod messages;
pub mod model;
pub mod presence;
pub mod service;
pub mod store;
pub mod unread;
