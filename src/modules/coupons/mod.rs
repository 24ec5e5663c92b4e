pub mod model;

pub use model::{Coupon, CouponError, CouponStatus, DiscountType};
