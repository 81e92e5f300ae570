
mod order_test;
mod payment_result_test;
