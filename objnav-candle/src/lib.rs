pub mod categorical;
pub mod init;
pub mod model;
pub mod policy;
