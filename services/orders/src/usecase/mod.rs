pub mod order;
pub mod payment_result;
