pub mod mystery_box;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;
pub mod verification_token;

pub use mystery_box::{Entity as MysteryBox, Model as MysteryBoxModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use user::{Entity as User, Model as UserModel};
pub use verification_token::{Entity as VerificationToken, Model as VerificationTokenModel};
