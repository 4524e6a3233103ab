use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use domain::services::{CheckoutProvider, NotificationDispatcher};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, images, payments, registrations, reminders, tickets};
use crate::services::{
    CheckoutSettings, EventImageService, PaymentNotificationService, RegistrationService,
    ReminderService, TicketIssuer,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub registrations: RegistrationService,
    pub payment_notifications: PaymentNotificationService,
    pub images: EventImageService,
    pub reminders: ReminderService,
    pub tickets: TicketIssuer,
}

impl AppState {
    /// Wires the services around one pool and the two external seams.
    pub fn new(
        config: Arc<Config>,
        pool: PgPool,
        dispatcher: Arc<dyn NotificationDispatcher>,
        checkout: Arc<dyn CheckoutProvider>,
    ) -> Self {
        let tickets = TicketIssuer::new(&config.tickets.signing_secret);

        Self {
            registrations: RegistrationService::new(
                pool.clone(),
                tickets.clone(),
                checkout,
                Arc::clone(&dispatcher),
                CheckoutSettings::from(&config.payments),
            ),
            payment_notifications: PaymentNotificationService::new(
                pool.clone(),
                tickets.clone(),
                Arc::clone(&dispatcher),
                config.payments.max_notification_attempts,
            ),
            images: EventImageService::new(pool.clone()),
            reminders: ReminderService::new(pool.clone(), dispatcher),
            tickets,
            pool,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Provider callbacks, authenticated by signature inside the handler, and
    // the operator review queue.
    let payment_routes = Router::new()
        .route(
            "/api/v1/payments/webhook",
            post(payments::receive_notification),
        )
        .route(
            "/api/v1/payments/notifications/review",
            get(payments::list_review_queue),
        );

    let registration_routes = Router::new()
        .route(
            "/api/v1/events/:event_id/registrations",
            post(registrations::create_registration),
        )
        .route(
            "/api/v1/registrations/:id",
            get(registrations::get_registration),
        )
        .route(
            "/api/v1/registrations/:id/attendees",
            put(registrations::update_attendees),
        )
        .route(
            "/api/v1/registrations/:id/checkout",
            post(registrations::begin_checkout),
        )
        .route("/api/v1/tickets/verify", post(tickets::verify_ticket))
        .route("/api/v1/reminders", post(reminders::try_send_reminder));

    let image_routes = Router::new()
        .route(
            "/api/v1/events/:event_id/images",
            get(images::list_images).post(images::add_image),
        )
        .route(
            "/api/v1/events/:event_id/images/ensure-primary",
            post(images::ensure_primary),
        )
        .route(
            "/api/v1/events/:event_id/images/:image_id",
            delete(images::remove_image),
        )
        .route(
            "/api/v1/events/:event_id/images/:image_id/primary",
            put(images::set_primary),
        );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(payment_routes)
        .merge(registration_routes)
        .merge(image_routes)
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(middleware::from_fn(trace_id))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics_middleware))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                )))
                .layer(CompressionLayer::new())
                .layer(DefaultBodyLimit::max(config.server.max_body_size)),
        )
        .with_state(state)
}
