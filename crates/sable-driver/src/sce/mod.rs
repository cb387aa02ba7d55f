pub mod gnm;
pub mod resource;
pub mod tracker;
