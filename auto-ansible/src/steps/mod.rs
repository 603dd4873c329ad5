//! The individual host-mutating steps. Each one checks whether its work has already been
//! done before changing anything, so the whole sequence can simply be re-run after a failure.

pub mod account;
pub mod collection;
pub mod home_fs;
pub mod inventory;
pub mod keys;
pub mod packages;
pub mod tool;
pub mod trust;
