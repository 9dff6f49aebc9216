pub mod convert;
pub mod filename;
