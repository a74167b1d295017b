pub mod entries;
pub mod status;
