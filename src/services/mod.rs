pub mod local_store;
pub mod palette;
pub mod remote_store;
pub mod trips;
pub mod watch;
