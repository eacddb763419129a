pub mod client;
pub mod health;
pub mod objects;
pub mod serve;
