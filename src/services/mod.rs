pub mod auth;
pub mod bootstrap_admin;
pub mod catalog;
pub mod email;
pub mod invoice;
pub mod order;
pub mod payfast;
pub mod stripe;
pub mod verification;

pub use auth::AuthService;
pub use catalog::CatalogService;
pub use email::EmailService;
pub use order::OrderService;
pub use payfast::PayfastService;
pub use stripe::StripeService;
pub use verification::VerificationService;
