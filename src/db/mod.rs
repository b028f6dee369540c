pub mod models;
pub mod repository;
pub mod store;

pub use models::{NewWishlistEntry, User, WishlistEntry};
pub use repository::UserRepository;
pub use store::{SqliteUserDirectory, SqliteWishlistStore, UserDirectory, WishlistStore};
