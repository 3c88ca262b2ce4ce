//! Cart pricing, eligibility and persistence through `POST /api/v1/orders`.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use courseware_api::entities::{
    coupon::{self, CouponOperator, CouponScope},
    course::BillingType,
    notification::{self, NotificationKind},
    order::{self, CourseMeta, OrderMeta, OrderStatus},
    order_course, order_product,
    product::{ProductKind, ProductStatus},
    IdList,
};
use courseware_api::repositories::{NewOrder, OrderRepository};
use common::{money, new_coupon, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn places_pending_order_with_snapshot_links_and_notification() {
    let app = TestApp::new().await;
    let book = app
        .seed_product("Rust Book", dec!(100), ProductStatus::Available, ProductKind::Physical)
        .await;
    let course = app.seed_course("Async Rust", dec!(50), BillingType::OneTime).await;

    let (status, body) = app
        .place_order(json!({
            "productIds": [book.id],
            "courses": [{ "courseId": course.id }]
        }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(money(&body["data"]["amount"]), dec!(150));
    assert_eq!(body["data"]["settled"], false);

    let order_id = Uuid::parse_str(body["data"]["id"].as_str().unwrap()).unwrap();
    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.executed.is_none());
    assert_eq!(order.user_id, app.user_id);
    assert_eq!(order.meta.version, 1);
    assert_eq!(order.meta.products.len(), 1);
    assert_eq!(order.meta.courses[0].course_title, "Async Rust");
    assert!(order.meta.courses[0].months.is_none());

    let course_links = order_course::Entity::find()
        .filter(order_course::Column::OrderId.eq(order_id))
        .count(&*app.db)
        .await
        .unwrap();
    let product_links = order_product::Entity::find()
        .filter(order_product::Column::OrderId.eq(order_id))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!((course_links, product_links), (1, 1));

    let placed = notification::Entity::find()
        .filter(notification::Column::OrderId.eq(order_id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].kind, NotificationKind::OrderPlaced);
}

#[tokio::test]
async fn product_scoped_coupon_discounts_only_listed_products() {
    let app = TestApp::new().await;
    let hoodie = app
        .seed_product("Hoodie", dec!(100), ProductStatus::Available, ProductKind::Physical)
        .await;
    let sticker = app
        .seed_product("Sticker", dec!(40), ProductStatus::Available, ProductKind::Physical)
        .await;
    let course = app.seed_course("Tokio", dec!(50), BillingType::OneTime).await;
    app.seed_coupon(coupon::Model {
        products: IdList(vec![hoodie.id]),
        ..new_coupon("HOODIE10", CouponScope::Product, CouponOperator::Flat, dec!(10))
    })
    .await;

    let order_id = app
        .place_order_ok(json!({
            "productIds": [hoodie.id, sticker.id],
            "courses": [{ "courseId": course.id }],
            "coupon": "HOODIE10"
        }))
        .await;

    let order = app.order(order_id).await;
    assert_eq!(order.amount, dec!(180));
    let hoodie_line = order.meta.products.iter().find(|p| p.id == hoodie.id).unwrap();
    assert_eq!(hoodie_line.discounted_price, Some(dec!(90)));
    let sticker_line = order.meta.products.iter().find(|p| p.id == sticker.id).unwrap();
    assert_eq!(sticker_line.discounted_price, None);
    assert_eq!(order.meta.courses[0].discounted_price, None);
    assert!(order.coupon_id.is_some());
}

#[tokio::test]
async fn category_coupon_matches_courses_in_category() {
    let app = TestApp::new().await;
    let category = Uuid::new_v4();
    let inside = app
        .seed_course_in("Systems", dec!(60), BillingType::OneTime, Some(category))
        .await;
    let outside = app.seed_course("Design", dec!(40), BillingType::OneTime).await;
    app.seed_coupon(coupon::Model {
        categories: IdList(vec![category]),
        ..new_coupon("SYS", CouponScope::Category, CouponOperator::Flat, dec!(20))
    })
    .await;

    let order_id = app
        .place_order_ok(json!({
            "courses": [{ "courseId": inside.id }, { "courseId": outside.id }],
            "coupon": "SYS"
        }))
        .await;

    assert_eq!(app.order(order_id).await.amount, dec!(80));
}

#[tokio::test]
async fn percentage_coupon_stores_discount_amount_as_price() {
    let app = TestApp::new().await;
    let course = app.seed_course("Macros", dec!(80), BillingType::OneTime).await;
    app.seed_coupon(new_coupon("QUARTER", CouponScope::Global, CouponOperator::Percentage, dec!(25)))
        .await;

    let order_id = app
        .place_order_ok(json!({ "courses": [{ "courseId": course.id }], "coupon": "QUARTER" }))
        .await;

    let order = app.order(order_id).await;
    assert_eq!(order.meta.courses[0].discounted_price, Some(dec!(20)));
    assert_eq!(order.amount, dec!(20));
}

#[tokio::test]
async fn unknown_inactive_or_expired_coupons_price_at_full() {
    let app = TestApp::new().await;
    let course = app.seed_course("Traits", dec!(50), BillingType::OneTime).await;
    app.seed_coupon(coupon::Model {
        active: false,
        ..new_coupon("OFF", CouponScope::Global, CouponOperator::Flat, dec!(10))
    })
    .await;
    app.seed_coupon(coupon::Model {
        expires_at: Some(Utc::now() - Duration::days(1)),
        ..new_coupon("OLD", CouponScope::Global, CouponOperator::Flat, dec!(10))
    })
    .await;

    for code in ["NOPE", "OFF", "OLD"] {
        let (status, body) = app
            .request(
                Method::POST,
                "/api/v1/orders",
                Some(json!({ "courses": [{ "courseId": course.id }], "coupon": code })),
                Some(Uuid::new_v4()),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}: {}", code, body);
        assert_eq!(money(&body["data"]["amount"]), dec!(50), "{}", code);
    }
}

#[tokio::test]
async fn months_are_kept_only_for_recurring_courses() {
    let app = TestApp::new().await;
    let monthly = app.seed_course("Mentoring", dec!(10), BillingType::Monthly).await;
    let one_time = app.seed_course("Basics", dec!(25), BillingType::OneTime).await;
    let unspecified = app.seed_course("Office Hours", dec!(5), BillingType::Monthly).await;

    let order_id = app
        .place_order_ok(json!({
            "courses": [
                { "courseId": monthly.id, "months": 3 },
                { "courseId": one_time.id, "months": 6 },
                { "courseId": unspecified.id }
            ]
        }))
        .await;

    let order = app.order(order_id).await;
    let months: Vec<Option<u32>> = order.meta.courses.iter().map(|c| c.months).collect();
    assert_eq!(months, vec![Some(3), None, Some(1)]);
    assert_eq!(order.amount, dec!(60));
}

#[tokio::test]
async fn bundle_is_charged_once_and_tags_every_course() {
    let app = TestApp::new().await;
    let a = app.seed_course("A", dec!(50), BillingType::Monthly).await;
    let b = app.seed_course("B", dec!(50), BillingType::Monthly).await;
    let c = app.seed_course("C", dec!(50), BillingType::Monthly).await;
    let bundle = app
        .seed_bundle("Full Stack", dec!(120), BillingType::Monthly, &[&a, &b, &c])
        .await;
    app.seed_coupon(new_coupon("ALL", CouponScope::Global, CouponOperator::Flat, dec!(30)))
        .await;

    let order_id = app
        .place_order_ok(json!({
            "bundles": [{ "bundleId": bundle.id, "months": 2 }],
            "coupon": "ALL"
        }))
        .await;

    let order = app.order(order_id).await;
    assert_eq!(order.meta.courses.len(), 3);
    assert!(order
        .meta
        .courses
        .iter()
        .all(|line| line.bundle_id == Some(bundle.id)
            && line.discounted_price.is_none()
            && line.months == Some(2)));
    assert_eq!(order.amount, dec!(240));
}

#[tokio::test]
async fn course_in_cart_and_bundle_is_rejected_without_creating_order() {
    let app = TestApp::new().await;
    let shared = app.seed_course("Ownership", dec!(30), BillingType::OneTime).await;
    let other = app.seed_course("Lifetimes", dec!(30), BillingType::OneTime).await;
    let bundle = app
        .seed_bundle("Memory", dec!(50), BillingType::OneTime, &[&shared, &other])
        .await;

    let (status, body) = app
        .place_order(json!({
            "courses": [{ "courseId": shared.id }],
            "bundles": [{ "bundleId": bundle.id }]
        }))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Ownership"), "{}", message);
    assert!(!message.contains("Lifetimes"), "{}", message);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn active_enrollment_blocks_repurchase_but_expired_one_does_not() {
    let app = TestApp::new().await;
    let perpetual = app.seed_course("Generics", dec!(20), BillingType::OneTime).await;
    let lapsed = app.seed_course("Iterators", dec!(20), BillingType::Monthly).await;
    app.seed_enrollment(app.user_id, perpetual.id, None).await;
    app.seed_enrollment(app.user_id, lapsed.id, Some(Utc::now() - Duration::days(3)))
        .await;

    let (status, body) = app
        .place_order(json!({
            "courses": [{ "courseId": perpetual.id }, { "courseId": lapsed.id }]
        }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("already enrolled in: Generics"), "{}", message);
    assert!(!message.contains("Iterators"), "{}", message);

    app.place_order_ok(json!({ "courses": [{ "courseId": lapsed.id, "months": 1 }] }))
        .await;
}

#[tokio::test]
async fn overlap_and_enrollment_problems_are_reported_together() {
    let app = TestApp::new().await;
    let owned = app.seed_course("Owned", dec!(20), BillingType::OneTime).await;
    let twice = app.seed_course("Twice", dec!(20), BillingType::OneTime).await;
    let bundle = app
        .seed_bundle("Pack", dec!(30), BillingType::OneTime, &[&twice])
        .await;
    app.seed_enrollment(app.user_id, owned.id, None).await;

    let (status, body) = app
        .place_order(json!({
            "courses": [{ "courseId": owned.id }, { "courseId": twice.id }],
            "bundles": [{ "bundleId": bundle.id }]
        }))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Twice"), "{}", message);
    assert!(message.contains("Owned"), "{}", message);
}

#[tokio::test]
async fn any_out_of_stock_product_fails_the_whole_cart() {
    let app = TestApp::new().await;
    let available = app
        .seed_product("Mug", dec!(15), ProductStatus::Available, ProductKind::Physical)
        .await;
    let gone = app
        .seed_product("Poster", dec!(10), ProductStatus::OutOfStock, ProductKind::Physical)
        .await;
    let also_gone = app
        .seed_product("Cap", dec!(20), ProductStatus::OutOfStock, ProductKind::Physical)
        .await;

    let (status, body) = app
        .place_order(json!({ "productIds": [available.id, gone.id, also_gone.id] }))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Poster") && message.contains("Cap"), "{}", message);
    assert!(!message.contains("Mug"), "{}", message);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn empty_or_unresolvable_carts_are_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app.place_order(json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .place_order(json!({ "courses": [{ "courseId": Uuid::new_v4() }] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .place_order(json!({ "courses": [{ "courseId": Uuid::new_v4(), "months": 0 }] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed");

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn free_order_settles_at_placement() {
    let app = TestApp::new().await;
    let course = app.seed_course("Intro", dec!(30), BillingType::OneTime).await;
    app.seed_coupon(new_coupon("FREE", CouponScope::Global, CouponOperator::Flat, dec!(30)))
        .await;

    let (status, body) = app
        .place_order(json!({ "courses": [{ "courseId": course.id }], "coupon": "FREE" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["settled"], true);

    let order_id = Uuid::parse_str(body["data"]["id"].as_str().unwrap()).unwrap();
    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.executed.is_some());
    assert_eq!(order.amount, dec!(0));

    let enrollments = app.enrollments_for(order_id).await;
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0].course_id, course.id);
    assert!(enrollments[0].expiry.is_none());

    let statements = app.statements_for(order_id).await;
    assert_eq!(statements.len(), 1);
    assert!(statements[0].payment_id.is_none());
    assert_eq!(app.gateway.created.load(std::sync::atomic::Ordering::SeqCst), 0);
}

/// A free order committed without its settlement, as when settling at
/// placement failed.
async fn unsettled_free_order(app: &TestApp, placed_ago: Duration) -> Uuid {
    let course = app.seed_course("Gift", dec!(0), BillingType::OneTime).await;
    let line = CourseMeta {
        id: course.id,
        course_title: course.title.clone(),
        price: dec!(0),
        discounted_price: None,
        months: None,
        bundle_id: None,
        bundle_title: None,
        bundle_price: None,
    };
    let order = OrderRepository::new(app.db.clone())
        .create_order(
            &*app.db,
            NewOrder {
                user_id: app.user_id,
                meta: OrderMeta::new(vec![], vec![line]),
                coupon_id: None,
                course_ids: vec![course.id],
                product_ids: vec![],
            },
        )
        .await
        .unwrap();
    order::Entity::update_many()
        .set(order::ActiveModel {
            created_at: Set(Utc::now() - placed_ago),
            ..Default::default()
        })
        .filter(order::Column::Id.eq(order.id))
        .exec(&*app.db)
        .await
        .unwrap();
    order.id
}

#[tokio::test]
async fn sweeper_settles_free_orders_left_pending() {
    let app = TestApp::new().await;
    let stuck = unsettled_free_order(&app, Duration::minutes(5)).await;
    let fresh = unsettled_free_order(&app, Duration::zero()).await;

    assert_eq!(app.state.orders.settle_free_orders().await.unwrap(), 1);

    let order = app.order(stuck).await;
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.executed.is_some());
    assert_eq!(app.enrollments_for(stuck).await.len(), 1);

    // Still inside the window where placement settles it itself.
    assert_eq!(app.order(fresh).await.status, OrderStatus::Pending);
    assert_eq!(app.state.orders.settle_free_orders().await.unwrap(), 0);
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let course = app.seed_course("Private", dec!(10), BillingType::OneTime).await;
    let order_id = app
        .place_order_ok(json!({ "courses": [{ "courseId": course.id }] }))
        .await;
    let uri = format!("/api/v1/orders/{}", order_id);

    let (status, body) = app.request(Method::GET, &uri, None, Some(app.user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Pending");

    let (status, _) = app.request(Method::GET, &uri, None, Some(Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", Uuid::new_v4()),
            None,
            Some(app.user_id),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_orders_pages_newest_first() {
    let app = TestApp::new().await;
    let mut ids = Vec::new();
    for i in 0..3 {
        let course = app
            .seed_course(&format!("Course {}", i), dec!(10), BillingType::OneTime)
            .await;
        ids.push(
            app.place_order_ok(json!({ "courses": [{ "courseId": course.id }] }))
                .await,
        );
    }

    let (status, body) = app
        .request(Method::GET, "/api/v1/orders?page=1&limit=2", None, Some(app.user_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["orders"][0]["id"], ids[2].to_string());

    let (_, body) = app
        .request(Method::GET, "/api/v1/orders?page=2&limit=2", None, Some(app.user_id))
        .await;
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .request(Method::GET, "/api/v1/orders", None, Some(Uuid::new_v4()))
        .await;
    assert_eq!(body["data"]["total"], 0);
}
