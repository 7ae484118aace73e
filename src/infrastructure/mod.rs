pub mod in_memory;
pub mod sms_http;
