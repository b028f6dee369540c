pub mod clock;
pub mod init;
pub mod scheduler;
pub mod sink;
pub mod wishlist;
