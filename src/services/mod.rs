pub mod account_service;
pub mod admin_service;
pub mod analytics_service;
pub mod auth_service;
pub mod cart_service;
pub mod catalog_service;
pub mod checkout_service;
pub mod order_service;
pub mod review_service;
pub mod seller_service;
pub mod upload_service;
pub mod webhook_service;
