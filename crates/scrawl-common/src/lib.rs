pub mod canvas;
pub mod game;
pub mod lobby;
pub mod protocol;
pub mod words;
