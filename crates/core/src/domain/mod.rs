pub mod conversation;
pub mod specialist;
pub mod tool;
