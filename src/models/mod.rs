pub mod api_token;
pub mod dns_request;
pub mod dns_server;
pub mod zone;
