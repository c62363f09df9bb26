#[cfg(test)]
pub mod http_api_tests;
#[cfg(test)]
pub mod login_flow_tests;
#[cfg(test)]
pub mod sponsored_transaction_tests;
