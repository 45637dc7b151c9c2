pub mod coupon;
pub mod order;
