pub mod abort_guard;
pub mod random;
