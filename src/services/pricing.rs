//! Coupon math and order totals.
//!
//! Everything here is pure: prices come in, prices go out. Order placement and
//! settlement both price lines through these functions so the total charged
//! and the amounts recorded at settlement can never drift apart.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use uuid::Uuid;

use crate::entities::{
    coupon::{self, CouponOperator, CouponScope},
    course,
    order::{CourseMeta, OrderMeta, ProductMeta},
    product,
};

/// Rounds a money amount to cents, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Applies a coupon operator to a base price.
///
/// `Flat` subtracts and may go below zero. `Percentage` returns the
/// percentage of the price (the discount amount, not the reduced price);
/// callers store that value as the line's discounted price.
pub fn apply_coupon(price: Decimal, operator: CouponOperator, discount: Decimal) -> Decimal {
    match operator {
        CouponOperator::Flat => price - discount,
        CouponOperator::Percentage => round_money(price / Decimal::ONE_HUNDRED * discount),
    }
}

/// Whether the coupon covers this product.
pub fn coupon_matches_product(coupon: &coupon::Model, product: &product::Model) -> bool {
    match coupon.scope {
        CouponScope::Global => true,
        CouponScope::Product => coupon.products.contains(&product.id),
        CouponScope::Category => product
            .category_id
            .is_some_and(|category| coupon.categories.contains(&category)),
        CouponScope::Course => false,
    }
}

/// Whether the coupon covers this course when bought on its own.
pub fn coupon_matches_course(coupon: &coupon::Model, course: &course::Model) -> bool {
    match coupon.scope {
        CouponScope::Global => true,
        CouponScope::Course => coupon.courses.contains(&course.id),
        CouponScope::Category => course
            .category_id
            .is_some_and(|category| coupon.categories.contains(&category)),
        CouponScope::Product => false,
    }
}

/// Discounted price for a line, or `None` when the coupon does not apply.
pub fn discounted_price(
    coupon: Option<&coupon::Model>,
    price: Decimal,
    matches: impl FnOnce(&coupon::Model) -> bool,
) -> Option<Decimal> {
    coupon
        .filter(|c| matches(c))
        .map(|c| apply_coupon(price, c.operator, c.discount))
}

pub fn product_cost(line: &ProductMeta) -> Decimal {
    line.effective_price()
}

/// Cost of a directly purchased course; recurring lines are charged per month.
pub fn course_cost(line: &CourseMeta) -> Decimal {
    let price = line.effective_price();
    match line.months {
        Some(months) => price * Decimal::from(months),
        None => price,
    }
}

/// Cost of the bundle a bundle-derived line belongs to. Zero for direct lines.
pub fn bundle_cost(line: &CourseMeta) -> Decimal {
    let price = line.bundle_price.unwrap_or(Decimal::ZERO);
    match line.months {
        Some(months) => price * Decimal::from(months),
        None => price,
    }
}

/// First line of each bundle group, in the order the groups appear.
pub fn bundle_representatives(courses: &[CourseMeta]) -> Vec<&CourseMeta> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    courses
        .iter()
        .filter(|line| line.bundle_id.is_some_and(|bundle_id| seen.insert(bundle_id)))
        .collect()
}

/// Total charged for an order: one charge per bundle group, every direct
/// course and every product, rounded to cents.
pub fn order_amount(meta: &OrderMeta) -> Decimal {
    let bundles: Decimal = bundle_representatives(&meta.courses)
        .into_iter()
        .map(bundle_cost)
        .sum();
    let courses: Decimal = meta
        .courses
        .iter()
        .filter(|line| !line.is_bundled())
        .map(course_cost)
        .sum();
    let products: Decimal = meta.products.iter().map(product_cost).sum();

    round_money(bundles + courses + products)
}
