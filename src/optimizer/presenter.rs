//! Rendering seam for interventions.

use super::intervention::{Intervention, InterventionId, InterventionKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Puts interventions on the page and answers the few questions the
/// optimizer asks about page state.
pub trait Presenter {
    /// Show a new intervention.
    fn render(&mut self, intervention: &Intervention);
    /// Replace the content of a visible intervention (countdown ticks).
    fn update(&mut self, intervention: &Intervention);
    /// Remove an intervention. Unknown or already removed ids are ignored.
    fn dismiss(&mut self, id: InterventionId);
    /// Number of product cards on the page.
    fn product_card_count(&self) -> usize;
    fn card_has_badge(&self, index: usize) -> bool;
    fn cta_pulsing(&self) -> bool;
}

/// What happened to an intervention, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    Rendered(Intervention),
    Updated(Intervention),
    Dismissed(InterventionId),
}

/// In-memory page model.
///
/// Tracks which interventions are visible, which cards carry a badge and
/// whether calls to action pulse, and keeps a history for inspection.
#[derive(Debug, Default)]
pub struct PagePresenter {
    product_cards: usize,
    badged: BTreeSet<usize>,
    cta_pulsing: bool,
    visible: BTreeMap<InterventionId, Intervention>,
    history: Vec<PresenterEvent>,
}

impl PagePresenter {
    pub fn new(product_cards: usize) -> Self {
        Self {
            product_cards,
            ..Self::default()
        }
    }

    /// Interventions currently on the page, oldest first.
    pub fn visible(&self) -> impl Iterator<Item = &Intervention> {
        self.visible.values()
    }

    pub fn is_visible(&self, id: InterventionId) -> bool {
        self.visible.contains_key(&id)
    }

    /// Visible interventions with the given label.
    pub fn visible_labeled(&self, label: &str) -> usize {
        self.visible
            .values()
            .filter(|i| i.kind.label() == label)
            .count()
    }

    pub fn history(&self) -> &[PresenterEvent] {
        &self.history
    }

    /// Every intervention ever rendered.
    pub fn rendered(&self) -> impl Iterator<Item = &Intervention> {
        self.history.iter().filter_map(|e| match e {
            PresenterEvent::Rendered(i) => Some(i),
            _ => None,
        })
    }

    /// Count of renders with the given label.
    pub fn rendered_labeled(&self, label: &str) -> usize {
        self.rendered().filter(|i| i.kind.label() == label).count()
    }

    pub fn badged_cards(&self) -> &BTreeSet<usize> {
        &self.badged
    }
}

impl Presenter for PagePresenter {
    fn render(&mut self, intervention: &Intervention) {
        debug!(id = %intervention.id, kind = intervention.kind.label(), "render");
        match &intervention.kind {
            InterventionKind::HotBadges { cards } => {
                self.badged
                    .extend(cards.iter().copied().filter(|c| *c < self.product_cards));
            }
            InterventionKind::CtaPulse => self.cta_pulsing = true,
            _ => {}
        }
        self.visible.insert(intervention.id, intervention.clone());
        self.history.push(PresenterEvent::Rendered(intervention.clone()));
    }

    fn update(&mut self, intervention: &Intervention) {
        if let Some(existing) = self.visible.get_mut(&intervention.id) {
            *existing = intervention.clone();
            self.history.push(PresenterEvent::Updated(intervention.clone()));
        }
    }

    fn dismiss(&mut self, id: InterventionId) {
        if self.visible.remove(&id).is_some() {
            debug!(id = %id, "dismiss");
            self.history.push(PresenterEvent::Dismissed(id));
        }
    }

    fn product_card_count(&self) -> usize {
        self.product_cards
    }

    fn card_has_badge(&self, index: usize) -> bool {
        self.badged.contains(&index)
    }

    fn cta_pulsing(&self) -> bool {
        self.cta_pulsing
    }
}
