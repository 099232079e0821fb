pub mod athlete;
pub mod audit;
pub mod credential;
pub mod did;
