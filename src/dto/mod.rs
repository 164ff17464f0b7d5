pub mod account;
pub mod admin;
pub mod analytics;
pub mod auth;
pub mod cart;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod uploads;
