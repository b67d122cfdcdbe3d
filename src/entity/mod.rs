pub mod enums;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod product_images;
pub mod products;
pub mod reviews;
pub mod tents;
pub mod users;

pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use product_images::Entity as ProductImages;
pub use products::Entity as Products;
pub use reviews::Entity as Reviews;
pub use tents::Entity as Tents;
pub use users::Entity as Users;
