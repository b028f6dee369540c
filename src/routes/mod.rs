pub mod current_user;
pub mod health;
pub mod wishlist;
