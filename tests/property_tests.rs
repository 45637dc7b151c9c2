//! Property-based tests for discount and amount arithmetic.
//!
//! These tests use proptest to check the discount bounds and minor-unit
//! conversion across a wide range of carts and coupon definitions.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_api::entities::coupon::{DiscountType, Model as CouponModel};
use storefront_api::services::coupons::compute_discount;
use storefront_api::services::payments::{cart_subtotal, to_minor_units, CartLine};
use uuid::Uuid;

fn coupon(
    discount_type: DiscountType,
    discount_value: Decimal,
    max_discount_amount: Option<Decimal>,
) -> CouponModel {
    let now = Utc::now();
    CouponModel {
        id: Uuid::new_v4(),
        code: "PROP".to_string(),
        discount_type,
        discount_value,
        min_purchase: None,
        max_discount_amount,
        usage_limit: 0,
        per_user_limit: 0,
        usage_count: 0,
        expiration_date: now + Duration::days(1),
        active: true,
        created_at: now,
        updated_at: now,
    }
}

// Amounts with two decimal places, as carts carry them
fn money_strategy(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (0i64..max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000).prop_map(|basis_points| Decimal::new(basis_points, 2))
}

fn cart_strategy() -> impl Strategy<Value = Vec<CartLine>> {
    prop::collection::vec(
        (money_strategy(100_000), 1u32..20).prop_map(|(price, quantity)| CartLine { price, quantity }),
        1..8,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn discount_never_exceeds_subtotal(
        subtotal in money_strategy(10_000_000),
        fixed in money_strategy(10_000_000),
        percent in percentage_strategy(),
    ) {
        let fixed_discount = compute_discount(&coupon(DiscountType::Fixed, fixed, None), subtotal);
        prop_assert!(fixed_discount >= Decimal::ZERO);
        prop_assert!(fixed_discount <= subtotal);

        let percent_discount =
            compute_discount(&coupon(DiscountType::Percentage, percent, None), subtotal);
        prop_assert!(percent_discount >= Decimal::ZERO);
        prop_assert!(percent_discount <= subtotal);
    }

    #[test]
    fn percentage_discount_respects_cap(
        subtotal in money_strategy(10_000_000),
        percent in percentage_strategy(),
        cap in money_strategy(100_000),
    ) {
        let discount =
            compute_discount(&coupon(DiscountType::Percentage, percent, Some(cap)), subtotal);
        prop_assert!(discount <= cap);
        prop_assert!(discount <= subtotal);
    }

    #[test]
    fn fixed_discount_ignores_cap(
        subtotal in money_strategy(10_000_000),
        fixed in money_strategy(100_000),
        cap in money_strategy(100_000),
    ) {
        let with_cap = compute_discount(&coupon(DiscountType::Fixed, fixed, Some(cap)), subtotal);
        let without_cap = compute_discount(&coupon(DiscountType::Fixed, fixed, None), subtotal);
        prop_assert_eq!(with_cap, without_cap);
    }

    #[test]
    fn minor_units_match_cents(cents in 0i64..1_000_000_000) {
        prop_assert_eq!(to_minor_units(Decimal::new(cents, 2)).unwrap(), cents);
    }

    #[test]
    fn cart_subtotal_is_sum_of_lines(items in cart_strategy()) {
        let expected: Decimal = items
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum();
        prop_assert_eq!(cart_subtotal(&items).unwrap(), expected);
    }
}

#[test]
fn half_cents_round_away_from_zero() {
    assert_eq!(to_minor_units(Decimal::new(10005, 3)).unwrap(), 1001);
    assert_eq!(to_minor_units(Decimal::new(10004, 3)).unwrap(), 1000);
}
