pub mod compilation;
pub mod events;
pub mod players;
pub mod questions;
pub mod room;
pub mod solution;
