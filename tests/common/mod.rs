#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use courseware_api::{
    auth::USER_ID_HEADER,
    config::AppConfig,
    db,
    entities::{
        bundle, bundle_course, coupon,
        IdList,
        course::{self, BillingType},
        enrollment::{self, EnrollmentStatus},
        order,
        payment::PaymentProvider,
        product::{self, ProductKind, ProductStatus},
        statement,
    },
    events::{self, EventSender},
    payments::{
        ApprovedCharge, ChargeRequest, CreatedCharge, GatewayError, GatewayRegistry,
        PaymentGateway, WebhookRequest,
    },
    AppState,
};

pub const SIGNATURE_HEADER: &str = "x-test-signature";
pub const VALID_SIGNATURE: &str = "valid";

/// Gateway double. Charges succeed unless told otherwise; webhooks are
/// `{"chargeId": "..."}` bodies signed with [`VALID_SIGNATURE`].
#[derive(Default)]
pub struct FakeGateway {
    pub fail_create: AtomicBool,
    pub created: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Yoco
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 422,
                body: "card declined".into(),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedCharge {
            external_charge_id: charge_id_for(request.order_id),
            redirect_url: format!("https://pay.test/checkout/{}", request.order_id),
            provider_meta: json!({ "amount": request.amount, "currency": request.currency }),
        })
    }

    async fn approve_charge(
        &self,
        request: &WebhookRequest,
    ) -> Result<ApprovedCharge, GatewayError> {
        if request.header(SIGNATURE_HEADER) != Some(VALID_SIGNATURE) {
            return Err(GatewayError::InvalidSignature("bad test signature".into()));
        }
        let event: Value = serde_json::from_slice(&request.body)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
        match event.get("chargeId").and_then(Value::as_str) {
            Some(id) => Ok(ApprovedCharge {
                charge_id: Some(id.to_string()),
                meta: Some(event.clone()),
            }),
            None => Ok(ApprovedCharge::ignored()),
        }
    }
}

pub fn charge_id_for(order_id: Uuid) -> String {
    format!("ch_{}", order_id.simple())
}

/// Application wired to an in-memory SQLite database and a [`FakeGateway`].
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub events: EventSender,
    pub gateway: Arc<FakeGateway>,
    pub user_id: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection, or every query would see its own empty database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let events = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::default());
        let registry = GatewayRegistry::new(PaymentProvider::Yoco).register(gateway.clone());

        let state = AppState::new(db.clone(), cfg, events.clone(), registry);
        let router = courseware_api::app(state.clone());

        Self {
            router,
            state,
            db,
            events,
            gateway,
            user_id: Uuid::new_v4(),
            _event_task: event_task,
        }
    }

    // ---- HTTP ----

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        user: Option<Uuid>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json response")
        };
        (status, json)
    }

    pub async fn place_order(&self, cart: Value) -> (StatusCode, Value) {
        self.request(Method::POST, "/api/v1/orders", Some(cart), Some(self.user_id))
            .await
    }

    /// Places an order that must succeed and returns its id.
    pub async fn place_order_ok(&self, cart: Value) -> Uuid {
        let (status, body) = self.place_order(cart).await;
        assert_eq!(status, StatusCode::CREATED, "unexpected response: {}", body);
        Uuid::parse_str(body["data"]["id"].as_str().unwrap()).unwrap()
    }

    pub async fn webhook(&self, provider: &str, event: Value, signature: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/payments/webhook/{}", provider))
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(event.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    // ---- Catalog seeding ----

    pub async fn seed_course(&self, title: &str, price: Decimal, billing: BillingType) -> course::Model {
        self.seed_course_in(title, price, billing, None).await
    }

    pub async fn seed_course_in(
        &self,
        title: &str,
        price: Decimal,
        billing: BillingType,
        category_id: Option<Uuid>,
    ) -> course::Model {
        course::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            category_id: Set(category_id),
            price: Set(price),
            billing: Set(billing),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed course")
    }

    pub async fn seed_bundle(
        &self,
        title: &str,
        price: Decimal,
        billing: BillingType,
        courses: &[&course::Model],
    ) -> bundle::Model {
        let bundle = bundle::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            price: Set(price),
            billing: Set(billing),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed bundle");

        for course in courses {
            bundle_course::ActiveModel {
                bundle_id: Set(bundle.id),
                course_id: Set(course.id),
            }
            .insert(&*self.db)
            .await
            .expect("seed bundle course");
        }
        bundle
    }

    pub async fn seed_product(
        &self,
        title: &str,
        price: Decimal,
        status: ProductStatus,
        kind: ProductKind,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            category_id: Set(None),
            price: Set(price),
            status: Set(status),
            kind: Set(kind),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_coupon(&self, coupon: coupon::Model) -> coupon::Model {
        coupon::ActiveModel {
            id: Set(coupon.id),
            code: Set(coupon.code),
            scope: Set(coupon.scope),
            operator: Set(coupon.operator),
            discount: Set(coupon.discount),
            products: Set(coupon.products),
            courses: Set(coupon.courses),
            categories: Set(coupon.categories),
            active: Set(coupon.active),
            expires_at: Set(coupon.expires_at),
            created_at: Set(coupon.created_at),
        }
        .insert(&*self.db)
        .await
        .expect("seed coupon")
    }

    pub async fn seed_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        expiry: Option<DateTime<Utc>>,
    ) -> enrollment::Model {
        enrollment::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            course_id: Set(course_id),
            order_id: Set(Uuid::new_v4()),
            expiry: Set(expiry),
            status: Set(EnrollmentStatus::Active),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed enrollment")
    }

    // ---- Reads ----

    pub async fn order(&self, id: Uuid) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .unwrap()
            .expect("order exists")
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find().count(&*self.db).await.unwrap()
    }

    pub async fn enrollments_for(&self, order_id: Uuid) -> Vec<enrollment::Model> {
        enrollment::Entity::find()
            .filter(enrollment::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .unwrap()
    }

    pub async fn statements_for(&self, order_id: Uuid) -> Vec<statement::Model> {
        statement::Entity::find()
            .filter(statement::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .unwrap()
    }
}

/// Coupon with every field filled in; adjust with struct update syntax.
pub fn new_coupon(
    code: &str,
    scope: coupon::CouponScope,
    operator: coupon::CouponOperator,
    discount: Decimal,
) -> coupon::Model {
    coupon::Model {
        id: Uuid::new_v4(),
        code: code.to_string(),
        scope,
        operator,
        discount,
        products: IdList(Vec::new()),
        courses: IdList(Vec::new()),
        categories: IdList(Vec::new()),
        active: true,
        expires_at: None,
        created_at: Utc::now(),
    }
}

/// Reads a money field whether it was serialized as a string or a number.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a money value: {}", other),
    }
}
