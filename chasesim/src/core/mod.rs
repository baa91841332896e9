pub mod chase;
pub mod handle_chase;
pub mod powerup;
pub mod track;
pub mod traffic;
pub mod vehicle;
pub mod world;
