pub mod observer_interface;
