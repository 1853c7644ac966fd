pub mod creds;
pub mod poll;
pub mod presence;
pub mod proto_helpers;
pub mod reply;
pub mod request;
pub mod types;
pub mod version;
