//! Turns cart lines into the frozen `OrderMeta` snapshot.
//!
//! Resolvers only read the catalog. Unknown ids are dropped; out-of-stock
//! products fail the whole cart with every offending title named.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::pricing::{coupon_matches_course, coupon_matches_product, discounted_price};
use crate::entities::{
    bundle, bundle_course, coupon, course,
    order::{CourseMeta, ProductMeta},
    product,
};
use crate::errors::ServiceError;

/// A course in the cart, optionally with a subscription length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourseLine {
    pub course_id: Uuid,
    #[serde(default)]
    pub months: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleLine {
    pub bundle_id: Uuid,
    #[serde(default)]
    pub months: Option<u32>,
}

/// Priced lines plus the catalog rows they came from.
#[derive(Debug, Default)]
pub struct ResolvedProducts {
    pub products: Vec<product::Model>,
    pub lines: Vec<ProductMeta>,
}

#[derive(Debug, Default)]
pub struct ResolvedCourses {
    pub courses: Vec<course::Model>,
    pub lines: Vec<CourseMeta>,
}

fn dedup(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Recurring items default to a single month when none was asked for.
fn months_for(recurring: bool, requested: Option<u32>) -> Option<u32> {
    recurring.then(|| requested.unwrap_or(1))
}

/// Prices products, failing if any of them is out of stock.
pub fn price_products(
    products: Vec<product::Model>,
    coupon: Option<&coupon::Model>,
) -> Result<ResolvedProducts, ServiceError> {
    let out_of_stock: Vec<&str> = products
        .iter()
        .filter(|p| p.is_out_of_stock())
        .map(|p| p.title.as_str())
        .collect();
    if !out_of_stock.is_empty() {
        return Err(ServiceError::NotFound(format!(
            "products out of stock: {}",
            out_of_stock.join(", ")
        )));
    }

    let lines = products
        .iter()
        .map(|p| ProductMeta {
            id: p.id,
            price: p.price,
            discounted_price: discounted_price(coupon, p.price, |c| coupon_matches_product(c, p)),
        })
        .collect();

    Ok(ResolvedProducts { products, lines })
}

/// Prices directly purchased courses. `requests` decides order and months.
pub fn price_courses(
    courses: Vec<course::Model>,
    requests: &[CourseLine],
    coupon: Option<&coupon::Model>,
) -> ResolvedCourses {
    let by_id: HashMap<Uuid, course::Model> = courses.into_iter().map(|c| (c.id, c)).collect();
    let mut resolved = ResolvedCourses::default();
    let mut seen = HashSet::new();

    for request in requests {
        let Some(course) = by_id.get(&request.course_id) else {
            continue;
        };
        if !seen.insert(course.id) {
            continue;
        }
        resolved.lines.push(CourseMeta {
            id: course.id,
            course_title: course.title.clone(),
            price: course.price,
            discounted_price: discounted_price(coupon, course.price, |c| {
                coupon_matches_course(c, course)
            }),
            months: months_for(course.billing.is_recurring(), request.months),
            bundle_id: None,
            bundle_title: None,
            bundle_price: None,
        });
        resolved.courses.push(course.clone());
    }

    resolved
}

/// Expands bundles into one line per member course, all tagged with the
/// bundle. Coupons never apply inside a bundle.
pub fn price_bundles(
    bundles: Vec<bundle::Model>,
    members: Vec<bundle_course::Model>,
    courses: Vec<course::Model>,
    requests: &[BundleLine],
) -> ResolvedCourses {
    let bundles: HashMap<Uuid, bundle::Model> = bundles.into_iter().map(|b| (b.id, b)).collect();
    let courses: HashMap<Uuid, course::Model> = courses.into_iter().map(|c| (c.id, c)).collect();
    let mut resolved = ResolvedCourses::default();
    let mut seen_bundles = HashSet::new();

    for request in requests {
        let Some(bundle) = bundles.get(&request.bundle_id) else {
            continue;
        };
        if !seen_bundles.insert(bundle.id) {
            continue;
        }
        let months = months_for(bundle.billing.is_recurring(), request.months);

        let member_courses = members
            .iter()
            .filter(|m| m.bundle_id == bundle.id)
            .filter_map(|m| courses.get(&m.course_id));
        for course in member_courses {
            resolved.lines.push(CourseMeta {
                id: course.id,
                course_title: course.title.clone(),
                price: course.price,
                discounted_price: None,
                months,
                bundle_id: Some(bundle.id),
                bundle_title: Some(bundle.title.clone()),
                bundle_price: Some(bundle.price),
            });
            resolved.courses.push(course.clone());
        }
    }

    resolved
}

#[instrument(skip(db, coupon), fields(requested = ids.len()))]
pub async fn resolve_products<C: ConnectionTrait>(
    db: &C,
    ids: &[Uuid],
    coupon: Option<&coupon::Model>,
) -> Result<ResolvedProducts, ServiceError> {
    let ids = dedup(ids.iter().copied());
    if ids.is_empty() {
        return Ok(ResolvedProducts::default());
    }

    let mut products = product::Entity::find()
        .filter(product::Column::Id.is_in(ids.clone()))
        .all(db)
        .await?;
    // Keep the cart's order
    products.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
    debug!(found = products.len(), "Resolved products");

    price_products(products, coupon)
}

#[instrument(skip(db, requests, coupon), fields(requested = requests.len()))]
pub async fn resolve_courses<C: ConnectionTrait>(
    db: &C,
    requests: &[CourseLine],
    coupon: Option<&coupon::Model>,
) -> Result<ResolvedCourses, ServiceError> {
    let ids = dedup(requests.iter().map(|r| r.course_id));
    if ids.is_empty() {
        return Ok(ResolvedCourses::default());
    }

    let courses = course::Entity::find()
        .filter(course::Column::Id.is_in(ids))
        .all(db)
        .await?;
    debug!(found = courses.len(), "Resolved courses");

    Ok(price_courses(courses, requests, coupon))
}

#[instrument(skip(db, requests), fields(requested = requests.len()))]
pub async fn resolve_bundles<C: ConnectionTrait>(
    db: &C,
    requests: &[BundleLine],
) -> Result<ResolvedCourses, ServiceError> {
    let ids = dedup(requests.iter().map(|r| r.bundle_id));
    if ids.is_empty() {
        return Ok(ResolvedCourses::default());
    }

    let bundles = bundle::Entity::find()
        .filter(bundle::Column::Id.is_in(ids.clone()))
        .all(db)
        .await?;
    let members = bundle_course::Entity::find()
        .filter(bundle_course::Column::BundleId.is_in(ids))
        .all(db)
        .await?;
    let course_ids = dedup(members.iter().map(|m| m.course_id));
    let courses = if course_ids.is_empty() {
        Vec::new()
    } else {
        course::Entity::find()
            .filter(course::Column::Id.is_in(course_ids))
            .all(db)
            .await?
    };
    debug!(
        bundles = bundles.len(),
        courses = courses.len(),
        "Resolved bundles"
    );

    Ok(price_bundles(bundles, members, courses, requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        coupon::{CouponOperator, CouponScope},
        course::BillingType,
        product::{ProductKind, ProductStatus},
        IdList,
    };
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn product(title: &str, price: Decimal, status: ProductStatus) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            title: title.into(),
            category_id: None,
            price,
            status,
            kind: ProductKind::Physical,
            created_at: Utc::now(),
        }
    }

    fn course(title: &str, price: Decimal, billing: BillingType) -> course::Model {
        course::Model {
            id: Uuid::new_v4(),
            title: title.into(),
            category_id: None,
            price,
            billing,
            created_at: Utc::now(),
        }
    }

    fn global_flat(discount: Decimal) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "FLAT".into(),
            scope: CouponScope::Global,
            operator: CouponOperator::Flat,
            discount,
            products: IdList::default(),
            courses: IdList::default(),
            categories: IdList::default(),
            active: true,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn out_of_stock_names_every_title() {
        let products = vec![
            product("Mug", dec!(10), ProductStatus::OutOfStock),
            product("Pen", dec!(2), ProductStatus::Available),
            product("Hoodie", dec!(40), ProductStatus::OutOfStock),
        ];

        let err = price_products(products, None).unwrap_err();
        assert_matches!(err, ServiceError::NotFound(msg) if msg.contains("Mug") && msg.contains("Hoodie") && !msg.contains("Pen"));
    }

    #[test]
    fn products_carry_coupon_price() {
        let c = global_flat(dec!(5));
        let resolved =
            price_products(vec![product("Pen", dec!(20), ProductStatus::Available)], Some(&c))
                .unwrap();
        assert_eq!(resolved.lines[0].discounted_price, Some(dec!(15)));
        assert_eq!(resolved.products.len(), 1);
    }

    #[test]
    fn months_kept_only_for_recurring_courses() {
        let one_time = course("Intro", dec!(100), BillingType::OneTime);
        let monthly = course("Mentoring", dec!(25), BillingType::Monthly);
        let requests = [
            CourseLine {
                course_id: one_time.id,
                months: Some(6),
            },
            CourseLine {
                course_id: monthly.id,
                months: Some(3),
            },
        ];

        let resolved = price_courses(vec![monthly.clone(), one_time.clone()], &requests, None);
        assert_eq!(resolved.lines.len(), 2);
        assert_eq!(resolved.lines[0].id, one_time.id);
        assert_eq!(resolved.lines[0].months, None);
        assert_eq!(resolved.lines[1].months, Some(3));
    }

    #[test]
    fn recurring_course_without_months_defaults_to_one() {
        let monthly = course("Mentoring", dec!(25), BillingType::Monthly);
        let requests = [CourseLine {
            course_id: monthly.id,
            months: None,
        }];
        let resolved = price_courses(vec![monthly], &requests, None);
        assert_eq!(resolved.lines[0].months, Some(1));
    }

    #[test]
    fn unknown_course_ids_are_dropped() {
        let known = course("Intro", dec!(100), BillingType::OneTime);
        let requests = [
            CourseLine {
                course_id: Uuid::new_v4(),
                months: None,
            },
            CourseLine {
                course_id: known.id,
                months: None,
            },
        ];
        let resolved = price_courses(vec![known], &requests, None);
        assert_eq!(resolved.lines.len(), 1);
    }

    #[test]
    fn bundle_lines_are_tagged_and_never_discounted() {
        let a = course("A", dec!(100), BillingType::OneTime);
        let b = course("B", dec!(100), BillingType::OneTime);
        let pack = bundle::Model {
            id: Uuid::new_v4(),
            title: "Starter pack".into(),
            price: dec!(150),
            billing: BillingType::OneTime,
            created_at: Utc::now(),
        };
        let members = vec![
            bundle_course::Model {
                bundle_id: pack.id,
                course_id: a.id,
            },
            bundle_course::Model {
                bundle_id: pack.id,
                course_id: b.id,
            },
        ];
        let requests = [BundleLine {
            bundle_id: pack.id,
            months: Some(4),
        }];

        let resolved = price_bundles(vec![pack.clone()], members, vec![a, b], &requests);
        assert_eq!(resolved.lines.len(), 2);
        for line in &resolved.lines {
            assert_eq!(line.bundle_id, Some(pack.id));
            assert_eq!(line.bundle_title.as_deref(), Some("Starter pack"));
            assert_eq!(line.bundle_price, Some(dec!(150)));
            assert_eq!(line.discounted_price, None);
            assert_eq!(line.months, None);
        }
    }
}
