pub mod embed;
pub mod system;
