pub mod attempts;
pub mod gate;
pub mod init;
pub mod score;
pub mod signature;
pub mod submit;
