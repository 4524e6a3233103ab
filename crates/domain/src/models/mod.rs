//! Domain models for the event commerce backend.

pub mod event;
pub mod event_image;
pub mod money;
pub mod payment;
pub mod payment_notification;
pub mod registration;
pub mod reminder;
pub mod ticket;

pub use event::Event;
pub use event_image::{EventImage, ImageSlot, PrimaryRepair};
pub use money::Money;
pub use payment::{decide, PaymentStatus, PaymentTrigger, SideEffect, TransitionDecision};
pub use payment_notification::{
    AttemptClaim, NotificationOutcome, PaymentNotificationRecord, ProviderNotification,
};
pub use registration::{validate_format, AttendeeShape, Registration, RegistrationFields};
pub use reminder::{ReminderType, TrySendOutcome};
pub use ticket::{IssueOutcome, Ticket, TicketVerification};
