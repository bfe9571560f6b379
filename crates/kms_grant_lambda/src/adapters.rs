pub mod key_management;
pub mod kms;
pub mod response;
