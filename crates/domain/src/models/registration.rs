//! Registration domain model and format validation.
//!
//! A registration reserves a place at an event in exactly one of three shapes:
//! - authenticated single attendee: a user reference, no attendee descriptor
//! - anonymous single attendee: an attendee descriptor, no user
//! - multi-attendee: an ordered attendee list plus a shared contact
//!
//! A contact without an attendee list rides along on either single-attendee
//! shape.
//!
//! Storage keeps the raw nullable columns ([`RegistrationFields`]); the rest of
//! the system only handles the typed [`AttendeeShape`] produced by
//! [`validate_format`], so an invalid combination cannot be persisted through
//! this code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::money::Money;
use super::payment::PaymentStatus;

/// Maximum attendees on a single multi-attendee registration.
pub const MAX_ATTENDEES_PER_REGISTRATION: usize = 10;

/// Reasons a registration payload does not match any recognized shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationFormatError {
    #[error("registration needs a user, an anonymous attendee, or an attendee list with contact")]
    MissingAttendee,

    #[error("a registration cannot reference both a user and an anonymous attendee")]
    UserAndAnonymousAttendee,

    #[error("an attendee list requires contact information")]
    AttendeesWithoutContact,

    #[error("contact information needs a user, an anonymous attendee, or an attendee list")]
    ContactWithoutAttendees,

    #[error("at least one attendee is required")]
    EmptyAttendeeList,

    #[error("at most {MAX_ATTENDEES_PER_REGISTRATION} attendees are allowed per registration")]
    TooManyAttendees,

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("invalid {field}: {message}")]
    InvalidField { field: String, message: String },
}

/// Anonymous single-attendee descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct AttendeeInfo {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 50, message = "Phone number must be at most 50 characters"))]
    pub phone_number: Option<String>,
}

/// One attendee on a multi-attendee registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct AttendeeDetails {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(custom(function = "shared::validation::validate_attendee_age"))]
    pub age: i32,
}

/// Shared contact for a multi-attendee registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct RegistrationContact {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 50, message = "Phone number must be 1-50 characters"))]
    pub phone_number: String,

    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,
}

/// Raw attendee-related fields as they arrive from a request or a database row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegistrationFields {
    pub user_id: Option<Uuid>,
    pub attendee_info: Option<AttendeeInfo>,
    pub attendees: Option<Vec<AttendeeDetails>>,
    pub contact: Option<RegistrationContact>,
    #[serde(default)]
    pub quantity: Option<i32>,
}

/// The only three recognized registration shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttendeeShape {
    Authenticated {
        user_id: Uuid,
        quantity: i32,
        contact: Option<RegistrationContact>,
    },
    Anonymous {
        attendee: AttendeeInfo,
        quantity: i32,
        contact: Option<RegistrationContact>,
    },
    MultiAttendee {
        user_id: Option<Uuid>,
        /// Carried when present; the multi-attendee shape does not depend on it.
        attendee_info: Option<AttendeeInfo>,
        attendees: Vec<AttendeeDetails>,
        contact: RegistrationContact,
    },
}

impl AttendeeShape {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AttendeeShape::Authenticated { user_id, .. } => Some(*user_id),
            AttendeeShape::Anonymous { .. } => None,
            AttendeeShape::MultiAttendee { user_id, .. } => *user_id,
        }
    }

    /// Number of places this registration occupies.
    pub fn attendee_count(&self) -> i32 {
        match self {
            AttendeeShape::Authenticated { quantity, .. }
            | AttendeeShape::Anonymous { quantity, .. } => *quantity,
            AttendeeShape::MultiAttendee { attendees, .. } => attendees.len() as i32,
        }
    }

    /// Email address stored on the registration itself, if any.
    ///
    /// Authenticated registrations without a contact resolve their address
    /// through the user record.
    pub fn contact_email(&self) -> Option<&str> {
        match self {
            AttendeeShape::Authenticated { contact, .. } => {
                contact.as_ref().map(|c| c.email.as_str())
            }
            AttendeeShape::Anonymous { attendee, .. } => Some(&attendee.email),
            AttendeeShape::MultiAttendee { contact, .. } => Some(&contact.email),
        }
    }

    /// Lowers the shape back into the nullable column representation.
    pub fn to_fields(&self) -> RegistrationFields {
        match self.clone() {
            AttendeeShape::Authenticated {
                user_id,
                quantity,
                contact,
            } => RegistrationFields {
                user_id: Some(user_id),
                quantity: Some(quantity),
                contact,
                ..Default::default()
            },
            AttendeeShape::Anonymous {
                attendee,
                quantity,
                contact,
            } => RegistrationFields {
                attendee_info: Some(attendee),
                quantity: Some(quantity),
                contact,
                ..Default::default()
            },
            AttendeeShape::MultiAttendee {
                user_id,
                attendee_info,
                attendees,
                contact,
            } => RegistrationFields {
                user_id,
                attendee_info,
                quantity: Some(attendees.len() as i32),
                attendees: Some(attendees),
                contact: Some(contact),
            },
        }
    }
}

/// Classifies raw fields into exactly one shape, or explains why none applies.
///
/// Pure and side-effect free. Runs on every create and every attendee update.
pub fn validate_format(fields: &RegistrationFields) -> Result<AttendeeShape, RegistrationFormatError> {
    let shape = match (
        fields.user_id,
        &fields.attendee_info,
        &fields.attendees,
        &fields.contact,
    ) {
        (user_id, attendee_info, Some(attendees), Some(contact)) => {
            if attendees.is_empty() {
                return Err(RegistrationFormatError::EmptyAttendeeList);
            }
            if attendees.len() > MAX_ATTENDEES_PER_REGISTRATION {
                return Err(RegistrationFormatError::TooManyAttendees);
            }
            AttendeeShape::MultiAttendee {
                user_id,
                attendee_info: attendee_info.clone(),
                attendees: attendees.clone(),
                contact: contact.clone(),
            }
        }
        (_, _, Some(_), None) => return Err(RegistrationFormatError::AttendeesWithoutContact),
        (Some(_), Some(_), None, _) => {
            return Err(RegistrationFormatError::UserAndAnonymousAttendee)
        }
        (Some(user_id), None, None, contact) => AttendeeShape::Authenticated {
            user_id,
            quantity: single_quantity(fields.quantity)?,
            contact: contact.clone(),
        },
        (None, Some(attendee), None, contact) => AttendeeShape::Anonymous {
            attendee: attendee.clone(),
            quantity: single_quantity(fields.quantity)?,
            contact: contact.clone(),
        },
        (None, None, None, Some(_)) => {
            return Err(RegistrationFormatError::ContactWithoutAttendees)
        }
        (None, None, None, None) => return Err(RegistrationFormatError::MissingAttendee),
    };

    validate_shape_fields(&shape)?;
    Ok(shape)
}

fn single_quantity(quantity: Option<i32>) -> Result<i32, RegistrationFormatError> {
    match quantity.unwrap_or(1) {
        q if q >= 1 && q as usize <= MAX_ATTENDEES_PER_REGISTRATION => Ok(q),
        _ => Err(RegistrationFormatError::InvalidQuantity),
    }
}

fn validate_shape_fields(shape: &AttendeeShape) -> Result<(), RegistrationFormatError> {
    match shape {
        AttendeeShape::Authenticated { contact, .. } => optional_contact(contact),
        AttendeeShape::Anonymous {
            attendee, contact, ..
        } => {
            field_errors("attendee_info", attendee)?;
            optional_contact(contact)
        }
        AttendeeShape::MultiAttendee {
            attendee_info,
            attendees,
            contact,
            ..
        } => {
            if let Some(info) = attendee_info {
                field_errors("attendee_info", info)?;
            }
            for (index, attendee) in attendees.iter().enumerate() {
                field_errors(&format!("attendees[{}]", index), attendee)?;
            }
            field_errors("contact", contact)
        }
    }
}

fn optional_contact(contact: &Option<RegistrationContact>) -> Result<(), RegistrationFormatError> {
    match contact {
        Some(contact) => field_errors("contact", contact),
        None => Ok(()),
    }
}

fn field_errors<T: Validate>(prefix: &str, value: &T) -> Result<(), RegistrationFormatError> {
    value.validate().map_err(|errors| {
        let (field, message) = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    (
                        field.to_string(),
                        e.message.as_ref().map(|m| m.to_string()).unwrap_or_default(),
                    )
                })
            })
            .min()
            .unwrap_or_default();
        RegistrationFormatError::InvalidField {
            field: format!("{}.{}", prefix, field),
            message,
        }
    })
}

/// Persisted registration in domain form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub shape: AttendeeShape,
    pub total_price: Option<Money>,
    pub payment_status: PaymentStatus,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub checkout_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn user_id(&self) -> Option<Uuid> {
        self.shape.user_id()
    }

    /// True when a charge is owed for this registration.
    pub fn requires_payment(&self) -> bool {
        self.total_price.as_ref().is_some_and(|p| !p.is_zero())
    }
}

/// Request payload for creating a registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CreateRegistrationRequest {
    #[serde(flatten)]
    pub fields: RegistrationFields,
}

/// Request payload for replacing the attendee-related fields of a registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UpdateAttendeesRequest {
    #[serde(flatten)]
    pub fields: RegistrationFields,
}

/// Response payload for registration operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RegistrationResponse {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub attendee_count: i32,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RegistrationResponse {
    pub fn new(
        registration: &Registration,
        checkout_url: Option<String>,
        ticket_code: Option<String>,
    ) -> Self {
        Self {
            registration_id: registration.id,
            event_id: registration.event_id,
            attendee_count: registration.shape.attendee_count(),
            payment_status: registration.payment_status,
            total_price: registration.total_price.clone(),
            checkout_url,
            ticket_code,
            created_at: registration.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::faker::name::en::Name;
    use fake::Fake;

    fn attendee_info() -> AttendeeInfo {
        AttendeeInfo {
            name: Name().fake(),
            email: SafeEmail().fake(),
            phone_number: None,
        }
    }

    fn attendee(age: i32) -> AttendeeDetails {
        AttendeeDetails {
            name: Name().fake(),
            age,
        }
    }

    fn contact() -> RegistrationContact {
        RegistrationContact {
            email: SafeEmail().fake(),
            phone_number: "+94 77 123 4567".to_string(),
            address: None,
        }
    }

    #[test]
    fn test_authenticated_shape() {
        let user_id = Uuid::new_v4();
        let fields = RegistrationFields {
            user_id: Some(user_id),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&fields),
            Ok(AttendeeShape::Authenticated {
                user_id,
                quantity: 1,
                contact: None,
            })
        );
    }

    #[test]
    fn test_anonymous_shape() {
        let info = attendee_info();
        let fields = RegistrationFields {
            attendee_info: Some(info.clone()),
            quantity: Some(2),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&fields),
            Ok(AttendeeShape::Anonymous {
                attendee: info,
                quantity: 2,
                contact: None,
            })
        );
    }

    #[test]
    fn test_multi_attendee_shape_with_and_without_user() {
        for user_id in [None, Some(Uuid::new_v4())] {
            let fields = RegistrationFields {
                user_id,
                attendees: Some(vec![attendee(30), attendee(8)]),
                contact: Some(contact()),
                ..Default::default()
            };
            let shape = validate_format(&fields).unwrap();
            assert!(matches!(shape, AttendeeShape::MultiAttendee { .. }));
            assert_eq!(shape.attendee_count(), 2);
            assert_eq!(shape.user_id(), user_id);
        }
    }

    #[test]
    fn test_multi_attendee_tolerates_attendee_info() {
        let fields = RegistrationFields {
            attendee_info: Some(attendee_info()),
            attendees: Some(vec![attendee(40)]),
            contact: Some(contact()),
            ..Default::default()
        };
        assert!(matches!(
            validate_format(&fields),
            Ok(AttendeeShape::MultiAttendee { .. })
        ));
    }

    #[test]
    fn test_user_and_anonymous_rejected() {
        let fields = RegistrationFields {
            user_id: Some(Uuid::new_v4()),
            attendee_info: Some(attendee_info()),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&fields),
            Err(RegistrationFormatError::UserAndAnonymousAttendee)
        );
    }

    #[test]
    fn test_attendees_without_contact_rejected() {
        let fields = RegistrationFields {
            user_id: Some(Uuid::new_v4()),
            attendees: Some(vec![attendee(20)]),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&fields),
            Err(RegistrationFormatError::AttendeesWithoutContact)
        );
    }

    #[test]
    fn test_user_with_contact_is_authenticated() {
        let user_id = Uuid::new_v4();
        let c = contact();
        let fields = RegistrationFields {
            user_id: Some(user_id),
            contact: Some(c.clone()),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&fields),
            Ok(AttendeeShape::Authenticated {
                user_id,
                quantity: 1,
                contact: Some(c),
            })
        );
    }

    #[test]
    fn test_anonymous_with_contact_is_anonymous() {
        let fields = RegistrationFields {
            attendee_info: Some(attendee_info()),
            contact: Some(contact()),
            ..Default::default()
        };
        let shape = validate_format(&fields).unwrap();
        assert!(matches!(
            shape,
            AttendeeShape::Anonymous {
                contact: Some(_),
                ..
            }
        ));
        assert_eq!(shape.attendee_count(), 1);
    }

    #[test]
    fn test_invalid_contact_on_single_attendee_rejected() {
        let mut bad_contact = contact();
        bad_contact.email = "nobody".to_string();
        let fields = RegistrationFields {
            user_id: Some(Uuid::new_v4()),
            contact: Some(bad_contact),
            ..Default::default()
        };
        assert!(matches!(
            validate_format(&fields),
            Err(RegistrationFormatError::InvalidField { field, .. }) if field == "contact.email"
        ));
    }

    #[test]
    fn test_contact_alone_rejected() {
        let fields = RegistrationFields {
            contact: Some(contact()),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&fields),
            Err(RegistrationFormatError::ContactWithoutAttendees)
        );
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert_eq!(
            validate_format(&RegistrationFields::default()),
            Err(RegistrationFormatError::MissingAttendee)
        );
    }

    #[test]
    fn test_attendee_list_bounds() {
        let empty = RegistrationFields {
            attendees: Some(vec![]),
            contact: Some(contact()),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&empty),
            Err(RegistrationFormatError::EmptyAttendeeList)
        );

        let too_many = RegistrationFields {
            attendees: Some((0..11).map(|_| attendee(25)).collect()),
            contact: Some(contact()),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&too_many),
            Err(RegistrationFormatError::TooManyAttendees)
        );
    }

    #[test]
    fn test_quantity_bounds() {
        let fields = RegistrationFields {
            user_id: Some(Uuid::new_v4()),
            quantity: Some(0),
            ..Default::default()
        };
        assert_eq!(
            validate_format(&fields),
            Err(RegistrationFormatError::InvalidQuantity)
        );
    }

    #[test]
    fn test_invalid_nested_field_reports_path() {
        let mut bad_contact = contact();
        bad_contact.email = "not-an-email".to_string();
        let fields = RegistrationFields {
            attendees: Some(vec![attendee(25)]),
            contact: Some(bad_contact),
            ..Default::default()
        };
        match validate_format(&fields) {
            Err(RegistrationFormatError::InvalidField { field, message }) => {
                assert_eq!(field, "contact.email");
                assert_eq!(message, "Invalid email format");
            }
            other => panic!("expected InvalidField, got {:?}", other),
        }

        let fields = RegistrationFields {
            attendees: Some(vec![attendee(25), attendee(200)]),
            contact: Some(contact()),
            ..Default::default()
        };
        match validate_format(&fields) {
            Err(RegistrationFormatError::InvalidField { field, .. }) => {
                assert_eq!(field, "attendees[1].age")
            }
            other => panic!("expected InvalidField, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_roundtrips_through_fields() {
        let shapes = vec![
            AttendeeShape::Authenticated {
                user_id: Uuid::new_v4(),
                quantity: 3,
                contact: None,
            },
            AttendeeShape::Authenticated {
                user_id: Uuid::new_v4(),
                quantity: 1,
                contact: Some(contact()),
            },
            AttendeeShape::Anonymous {
                attendee: attendee_info(),
                quantity: 1,
                contact: None,
            },
            AttendeeShape::MultiAttendee {
                user_id: None,
                attendee_info: None,
                attendees: vec![attendee(33), attendee(4)],
                contact: contact(),
            },
        ];
        for shape in shapes {
            assert_eq!(validate_format(&shape.to_fields()), Ok(shape));
        }
    }

    #[test]
    fn test_contact_email() {
        let info = attendee_info();
        let anonymous = AttendeeShape::Anonymous {
            attendee: info.clone(),
            quantity: 1,
            contact: None,
        };
        assert_eq!(anonymous.contact_email(), Some(info.email.as_str()));

        let c = contact();
        let multi = AttendeeShape::MultiAttendee {
            user_id: None,
            attendee_info: None,
            attendees: vec![attendee(20)],
            contact: c.clone(),
        };
        assert_eq!(multi.contact_email(), Some(c.email.as_str()));

        let authenticated = AttendeeShape::Authenticated {
            user_id: Uuid::new_v4(),
            quantity: 1,
            contact: None,
        };
        assert_eq!(authenticated.contact_email(), None);

        let with_contact = AttendeeShape::Authenticated {
            user_id: Uuid::new_v4(),
            quantity: 1,
            contact: Some(c.clone()),
        };
        assert_eq!(with_contact.contact_email(), Some(c.email.as_str()));
    }
}
