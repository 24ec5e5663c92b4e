pub mod accounts;
pub mod coupons;
pub mod metrics;
pub mod orders;
