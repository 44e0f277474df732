mod common;
mod events;
mod players;
mod rooms;
mod submission;
