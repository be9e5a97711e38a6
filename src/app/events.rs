use super::{App, AppEvent, CardBody};
use crate::content::{Article, SummaryLookup};

impl App {
    /// Apply a background result or timer to the app state.
    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ArticleLoaded {
                link,
                generation,
                result,
            } => self.handle_article_loaded(&link, generation, result),
            AppEvent::SummaryLoaded {
                link,
                generation,
                lookup,
            } => self.handle_summary_loaded(&link, generation, lookup),
            AppEvent::CardExitFinished { generation } => {
                self.gesture.animation_finished();
                if generation != self.card_generation {
                    tracing::debug!(generation, current = self.card_generation, "Stale card exit ignored");
                    return;
                }
                self.deck.advance();
                self.show_current_card();
            }
            AppEvent::SnapBackFinished { seq } => {
                // A newer drag may have interrupted this snap-back
                if seq == self.snap_back_seq
                    && self.gesture.phase() == crate::gesture::GesturePhase::SnappingBack
                {
                    self.gesture.animation_finished();
                }
            }
            AppEvent::TaskPanicked { task, error } => {
                tracing::error!(task, error, "Background task panicked");
                if task == "article_load" {
                    if let Some(card) = self.card.as_mut().filter(|c| c.body == CardBody::Loading) {
                        card.body = CardBody::Failed {
                            error: format!("Internal error in {task} task"),
                            original_url: card.link.clone(),
                        };
                        if let Some(lookup) = card.held_summary.take() {
                            card.show_summary(lookup);
                        }
                    }
                }
            }
        }
    }

    fn handle_article_loaded(&mut self, link: &str, generation: u64, result: Result<Article, String>) {
        let Some(card) = self
            .card
            .as_mut()
            .filter(|c| c.generation == generation && c.link == link)
        else {
            tracing::debug!(link, generation, "Stale article result ignored");
            return;
        };

        card.body = match result {
            Ok(article) => CardBody::Loaded(article),
            Err(error) => CardBody::Failed {
                error,
                original_url: card.link.clone(),
            },
        };
        if let Some(lookup) = card.held_summary.take() {
            card.show_summary(lookup);
        }
    }

    fn handle_summary_loaded(&mut self, link: &str, generation: u64, lookup: SummaryLookup) {
        let Some(card) = self
            .card
            .as_mut()
            .filter(|c| c.generation == generation && c.link == link)
        else {
            tracing::debug!(link, generation, "Stale summary result ignored");
            return;
        };

        if card.body == CardBody::Loading {
            card.held_summary = Some(lookup);
        } else {
            card.show_summary(lookup);
        }
    }
}
