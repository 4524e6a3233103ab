//! Event image model and the primary-image election rules.
//!
//! For an event with at least one image exactly one image carries the primary
//! flag; with no images, none does. The planning functions here are pure:
//! they look at a snapshot read under the event lock and say which rows to
//! flip. Repositories apply the plan inside the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// An image attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct EventImage {
    pub id: Uuid,
    pub event_id: Uuid,
    pub image_url: String,
    pub display_order: i32,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// The subset of an image row the election rules need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSlot {
    pub id: Uuid,
    pub display_order: i32,
    pub is_primary: bool,
}

impl From<&EventImage> for ImageSlot {
    fn from(image: &EventImage) -> Self {
        Self {
            id: image.id,
            display_order: image.display_order,
            is_primary: image.is_primary,
        }
    }
}

/// Flag changes needed to restore the invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryRepair {
    NoImages,
    Consistent { primary: Uuid },
    Reassign { promote: Uuid, demote: Vec<Uuid> },
}

impl PrimaryRepair {
    pub fn needs_write(&self) -> bool {
        matches!(self, PrimaryRepair::Reassign { .. })
    }

    /// The image that is primary once the plan is applied.
    pub fn primary(&self) -> Option<Uuid> {
        match self {
            PrimaryRepair::NoImages => None,
            PrimaryRepair::Consistent { primary } => Some(*primary),
            PrimaryRepair::Reassign { promote, .. } => Some(*promote),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image {image_id} does not belong to event {event_id}")]
    NotFound { event_id: Uuid, image_id: Uuid },

    #[error("display order {0} is already used by another image of this event")]
    DisplayOrderTaken(i32),
}

/// Lowest display order wins; id breaks ties so the choice is deterministic.
fn elect(slots: &[ImageSlot]) -> Option<&ImageSlot> {
    slots.iter().min_by_key(|s| (s.display_order, s.id))
}

/// Plans the repair of an event's image set.
///
/// A single existing primary is left alone. Zero or several primaries are
/// replaced by the lowest-display-order image. Idempotent: applying the plan
/// and planning again yields `Consistent`.
pub fn plan_primary_repair(slots: &[ImageSlot]) -> PrimaryRepair {
    let primaries: Vec<&ImageSlot> = slots.iter().filter(|s| s.is_primary).collect();

    if let [only] = primaries.as_slice() {
        return PrimaryRepair::Consistent { primary: only.id };
    }

    match elect(slots) {
        None => PrimaryRepair::NoImages,
        Some(winner) => PrimaryRepair::Reassign {
            promote: winner.id,
            demote: primaries
                .iter()
                .filter(|s| s.id != winner.id)
                .map(|s| s.id)
                .collect(),
        },
    }
}

/// Plans an explicit primary selection.
pub fn plan_set_primary(
    event_id: Uuid,
    slots: &[ImageSlot],
    target: Uuid,
) -> Result<PrimaryRepair, ImageError> {
    if !slots.iter().any(|s| s.id == target) {
        return Err(ImageError::NotFound {
            event_id,
            image_id: target,
        });
    }

    let demote: Vec<Uuid> = slots
        .iter()
        .filter(|s| s.is_primary && s.id != target)
        .map(|s| s.id)
        .collect();
    let target_is_primary = slots.iter().any(|s| s.id == target && s.is_primary);

    if demote.is_empty() && target_is_primary {
        Ok(PrimaryRepair::Consistent { primary: target })
    } else {
        Ok(PrimaryRepair::Reassign {
            promote: target,
            demote,
        })
    }
}

/// Plans the re-election after `removed` has been deleted.
///
/// `remaining` is the image set without the removed row.
pub fn plan_after_removal(remaining: &[ImageSlot]) -> PrimaryRepair {
    plan_primary_repair(remaining)
}

/// Whether a newly added image should become primary: only when the event
/// has no primary yet.
pub fn new_image_is_primary(existing: &[ImageSlot]) -> bool {
    !existing.iter().any(|s| s.is_primary)
}

/// Next free display order after the existing images.
pub fn next_display_order(existing: &[ImageSlot]) -> i32 {
    existing
        .iter()
        .map(|s| s.display_order)
        .max()
        .map_or(0, |max| max + 1)
}

/// Request payload for attaching an image to an event.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct AddEventImageRequest {
    #[validate(url(message = "Image URL must be a valid URL"))]
    #[validate(length(max = 2048, message = "Image URL must be at most 2048 characters"))]
    pub image_url: String,

    #[validate(custom(function = "shared::validation::validate_display_order"))]
    pub display_order: Option<i32>,
}

/// Response for image set mutations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct EventImagesResponse {
    pub event_id: Uuid,
    pub primary_image_id: Option<Uuid>,
    pub images: Vec<EventImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(order: i32, primary: bool) -> ImageSlot {
        ImageSlot {
            id: Uuid::new_v4(),
            display_order: order,
            is_primary: primary,
        }
    }

    fn apply(slots: &[ImageSlot], plan: &PrimaryRepair) -> Vec<ImageSlot> {
        slots
            .iter()
            .map(|s| {
                let mut s = *s;
                if let PrimaryRepair::Reassign { promote, demote } = plan {
                    if demote.contains(&s.id) {
                        s.is_primary = false;
                    }
                    if s.id == *promote {
                        s.is_primary = true;
                    }
                }
                s
            })
            .collect()
    }

    fn primary_count(slots: &[ImageSlot]) -> usize {
        slots.iter().filter(|s| s.is_primary).count()
    }

    #[test]
    fn test_no_images() {
        assert_eq!(plan_primary_repair(&[]), PrimaryRepair::NoImages);
    }

    #[test]
    fn test_single_primary_is_consistent() {
        let slots = vec![slot(1, false), slot(2, true), slot(3, false)];
        assert_eq!(
            plan_primary_repair(&slots),
            PrimaryRepair::Consistent { primary: slots[1].id }
        );
    }

    #[test]
    fn test_zero_primaries_elects_lowest_order() {
        let slots = vec![slot(3, false), slot(1, false), slot(2, false)];
        assert_eq!(
            plan_primary_repair(&slots),
            PrimaryRepair::Reassign {
                promote: slots[1].id,
                demote: vec![]
            }
        );
    }

    #[test]
    fn test_multiple_primaries_collapse_to_lowest_order() {
        let slots = vec![slot(2, true), slot(5, true), slot(1, false)];
        let plan = plan_primary_repair(&slots);
        assert_eq!(plan.primary(), Some(slots[2].id));
        let repaired = apply(&slots, &plan);
        assert_eq!(primary_count(&repaired), 1);
        assert!(repaired[2].is_primary);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let slots = vec![slot(4, true), slot(0, true), slot(9, false)];
        let once = apply(&slots, &plan_primary_repair(&slots));
        assert!(!plan_primary_repair(&once).needs_write());
    }

    #[test]
    fn test_set_primary_moves_flag() {
        let slots = vec![slot(1, true), slot(2, false)];
        let plan = plan_set_primary(Uuid::new_v4(), &slots, slots[1].id).unwrap();
        assert_eq!(
            plan,
            PrimaryRepair::Reassign {
                promote: slots[1].id,
                demote: vec![slots[0].id]
            }
        );
        let after = apply(&slots, &plan);
        assert_eq!(primary_count(&after), 1);
        assert!(after[1].is_primary);
    }

    #[test]
    fn test_set_primary_on_current_primary_is_noop() {
        let slots = vec![slot(1, true), slot(2, false)];
        let plan = plan_set_primary(Uuid::new_v4(), &slots, slots[0].id).unwrap();
        assert!(!plan.needs_write());
    }

    #[test]
    fn test_set_primary_unknown_image() {
        let event_id = Uuid::new_v4();
        let image_id = Uuid::new_v4();
        assert_eq!(
            plan_set_primary(event_id, &[slot(1, true)], image_id),
            Err(ImageError::NotFound { event_id, image_id })
        );
    }

    #[test]
    fn test_removing_primary_promotes_next_lowest() {
        // Orders 1 (primary), 2, 3; the order-1 image is deleted.
        let slots = vec![slot(1, true), slot(2, false), slot(3, false)];
        let remaining = &slots[1..];
        assert_eq!(
            plan_after_removal(remaining),
            PrimaryRepair::Reassign {
                promote: slots[1].id,
                demote: vec![]
            }
        );
    }

    #[test]
    fn test_removing_non_primary_changes_nothing() {
        let slots = vec![slot(1, true), slot(2, false), slot(3, false)];
        let remaining = vec![slots[0], slots[2]];
        assert!(!plan_after_removal(&remaining).needs_write());
    }

    #[test]
    fn test_removing_last_image() {
        assert_eq!(plan_after_removal(&[]), PrimaryRepair::NoImages);
    }

    #[test]
    fn test_new_image_primary_and_order() {
        assert!(new_image_is_primary(&[]));
        assert_eq!(next_display_order(&[]), 0);
        let slots = vec![slot(0, true), slot(4, false)];
        assert!(!new_image_is_primary(&slots));
        assert_eq!(next_display_order(&slots), 5);
    }

    #[test]
    fn test_any_operation_sequence_keeps_one_primary() {
        let mut slots = vec![slot(1, false), slot(2, false), slot(3, false), slot(4, false)];
        slots = apply(&slots, &plan_primary_repair(&slots));
        assert_eq!(primary_count(&slots), 1);

        let target = slots[3].id;
        slots = apply(&slots, &plan_set_primary(Uuid::new_v4(), &slots, target).unwrap());
        assert_eq!(primary_count(&slots), 1);

        slots.retain(|s| s.id != target);
        slots = apply(&slots, &plan_after_removal(&slots));
        assert_eq!(primary_count(&slots), 1);
        assert_eq!(slots.iter().find(|s| s.is_primary).map(|s| s.display_order), Some(1));
    }
}
