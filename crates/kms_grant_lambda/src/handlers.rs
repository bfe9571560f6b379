pub mod custom_resource;
pub mod grant;
