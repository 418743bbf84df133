pub mod events;
pub mod images;
pub mod runs;
pub mod session;
