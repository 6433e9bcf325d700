pub mod bench;
pub mod doctor;
pub mod validate;
