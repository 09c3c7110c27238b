//! Contact Events and World Listeners
//!
//! Contact-point lifecycle events (begin / persist / end) are buffered while
//! the world steps and delivered to the registered [`ContactListener`] after
//! the solver finishes, so listeners observe a consistent post-step world and
//! may freely mutate it.
//!
//! Also home to the other world callback seams: [`ContactFilter`] for custom
//! pair filtering and [`BoundaryListener`] for bodies escaping the world
//! AABB.
//!
//! Author: Moroya Sakamoto

use crate::collide::ContactId;
use crate::filter::Filter;
use crate::math::Vec2;
use crate::shape::Shape;

// ============================================================================
// Contact Events
// ============================================================================

/// Lifecycle phase of a contact point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactEventKind {
    /// The point appeared this step.
    Begin,
    /// The point existed last step and still does.
    Persist,
    /// The point disappeared this step.
    End,
}

/// Snapshot of one contact point at event time.
#[derive(Clone, Copy, Debug)]
pub struct ContactEvent {
    /// Lifecycle phase.
    pub kind: ContactEventKind,
    /// First shape handle index.
    pub shape_a: u32,
    /// Second shape handle index.
    pub shape_b: u32,
    /// Contact position (world).
    pub position: Vec2,
    /// Contact normal, pointing from shape A toward shape B.
    pub normal: Vec2,
    /// Signed separation; negative means penetrating.
    pub separation: f32,
    /// Accumulated normal impulse from the previous solve (zero for Begin).
    pub normal_impulse: f32,
    /// Accumulated tangent impulse from the previous solve.
    pub tangent_impulse: f32,
    /// Feature id of the point.
    pub id: ContactId,
}

/// Step-scoped buffer of contact events, drained after the solve.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<ContactEvent>,
}

impl EventBuffer {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for end-of-step delivery.
    #[inline]
    pub fn push(&mut self, event: ContactEvent) {
        self.events.push(event);
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Deliver and clear.
    pub fn drain_to(&mut self, listener: &mut dyn ContactListener) {
        for event in self.events.drain(..) {
            match event.kind {
                ContactEventKind::Begin => listener.begin_contact(&event),
                ContactEventKind::Persist => listener.persist_contact(&event),
                ContactEventKind::End => listener.end_contact(&event),
            }
        }
    }

    /// Drop queued events without delivering.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ============================================================================
// World Listener Seams
// ============================================================================

/// Receiver for contact-point lifecycle events. All methods default to
/// no-ops so implementors only override what they need.
pub trait ContactListener {
    /// A new contact point appeared.
    fn begin_contact(&mut self, _event: &ContactEvent) {}
    /// A contact point persisted across steps.
    fn persist_contact(&mut self, _event: &ContactEvent) {}
    /// A contact point disappeared.
    fn end_contact(&mut self, _event: &ContactEvent) {}
}

/// Custom collision filtering, consulted when a broad-phase pair is created.
pub trait ContactFilter {
    /// Return `false` to suppress all contacts between the two shapes.
    fn should_collide(&self, shape_a: &Shape, shape_b: &Shape) -> bool {
        Filter::should_collide(&shape_a.filter, &shape_b.filter)
    }
}

/// The default filter: category/mask/group bits only.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {}

/// Notification that a body's shapes left the world AABB. The body has
/// already been frozen when this fires.
pub trait BoundaryListener {
    /// `body` escaped the world bounds.
    fn body_out_of_bounds(&mut self, body: u32);
}
