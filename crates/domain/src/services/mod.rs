//! Domain services for the event commerce backend.
//!
//! Services here are seams to external collaborators.

pub mod checkout;
pub mod notification;

pub use checkout::{
    CheckoutError, CheckoutProvider, CheckoutRequest, CheckoutSession, MockCheckoutProvider,
};
pub use notification::{
    MockNotificationDispatcher, Notification, NotificationDispatcher, NotificationResult,
    NotificationType,
};
