pub mod audit;
pub mod custom_field;
pub mod user;
pub mod verification;
