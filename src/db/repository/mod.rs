pub mod user;
pub mod wishlist;

pub use user::UserRepository;
pub use wishlist::WishlistRepository;
