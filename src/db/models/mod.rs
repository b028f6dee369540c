pub mod user;
pub mod wishlist;

pub use self::user::*;
pub use self::wishlist::*;
