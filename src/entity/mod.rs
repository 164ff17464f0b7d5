pub mod audit_logs;
pub mod cart_items;
pub mod events_interaction;
pub mod events_view;
pub mod order_items;
pub mod orders;
pub mod product_images;
pub mod products;
pub mod review_flags;
pub mod reviews;
pub mod seller_applications;
pub mod users;
pub mod variants;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use events_interaction::Entity as InteractionEvents;
pub use events_view::Entity as ViewEvents;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_images::Entity as ProductImages;
pub use products::Entity as Products;
pub use review_flags::Entity as ReviewFlags;
pub use reviews::Entity as Reviews;
pub use seller_applications::Entity as SellerApplications;
pub use users::Entity as Users;
pub use variants::Entity as Variants;
