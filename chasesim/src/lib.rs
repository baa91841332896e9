pub mod core;
pub mod decision;
pub mod interfaces;
pub mod post;
pub mod pre;
