pub mod contact;
pub mod group;
pub mod identity;
pub mod message;
