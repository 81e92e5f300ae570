pub mod bill;
pub mod payment_request;
