//! Application context: owns the post collection and every component, and
//! turns gestures and background results into state changes.
//!
//! Nothing here blocks on the network. Loads are spawned (see [`tasks`]) and
//! report back as [`AppEvent`]s, which the caller feeds into
//! [`App::handle_event`]. Each shown card gets a fresh generation; results
//! tagged with an older generation are dropped.

mod events;
mod tasks;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::content::{
    build_client, Article, ArticleFetcher, NoSummaries, SummaryFetcher, SummaryLookup,
    SummaryProvider, SummaryRecord,
};
use crate::deck::{Deck, DeckCounts, DeckStateMachine, Transition};
use crate::gesture::{Feedback, GestureOutcome, SwipeDirection, SwipeGestureEngine};
use crate::highlights::{Highlight, HighlightStore, MergeReport};
use crate::storage::{Database, LocalCache, StorageError, ARTICLE_CACHE_KEY, SUMMARY_CACHE_KEY};
use crate::sync::{CloudSync, SyncError};
use crate::util::{validate_url_for_open, Clock, SystemClock};

/// Results and timers delivered back to the [`App`].
#[derive(Debug)]
pub enum AppEvent {
    /// Article body finished loading for the card at `generation`.
    ArticleLoaded {
        link: String,
        generation: u64,
        result: Result<Article, String>,
    },
    /// Summary lookup finished for the card at `generation`.
    SummaryLoaded {
        link: String,
        generation: u64,
        lookup: SummaryLookup,
    },
    /// Exit animation of the committed card at `generation` ended.
    CardExitFinished { generation: u64 },
    /// Snap-back animation number `seq` ended.
    SnapBackFinished { seq: u64 },
    /// A background task panicked.
    TaskPanicked { task: &'static str, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardBody {
    Loading,
    Loaded(Article),
    /// Shown as an error panel with an "open original" fallback.
    Failed { error: String, original_url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryState {
    Loading,
    Ready(SummaryRecord),
    Unavailable,
}

/// The card on top of the active swipe deck.
#[derive(Debug, Clone)]
pub struct Card {
    pub link: String,
    pub generation: u64,
    pub body: CardBody,
    pub summary: SummaryState,
    /// Summary that arrived before the body; shown once the body resolves.
    held_summary: Option<SummaryLookup>,
}

impl Card {
    fn loading(link: String, generation: u64) -> Self {
        Self {
            link,
            generation,
            body: CardBody::Loading,
            summary: SummaryState::Loading,
            held_summary: None,
        }
    }

    fn show_summary(&mut self, lookup: SummaryLookup) {
        self.summary = match lookup {
            SummaryLookup::Ready(record) => SummaryState::Ready(record),
            SummaryLookup::Unavailable => SummaryState::Unavailable,
        };
    }
}

/// What a released pointer asks the front end to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerEffect {
    /// No drag was active.
    None,
    /// Tap on the card: open the reader for this link.
    OpenReader(String),
    /// Card is leaving; the transition (if any) is already applied.
    Committed(Option<Transition>),
    SnapBack,
}

/// What a cloud pull changed locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    pub highlights: MergeReport,
    pub statuses_applied: usize,
}

/// Injected capabilities. [`AppServices::offline`] disables summaries and
/// cloud sync.
pub struct AppServices {
    pub client: reqwest::Client,
    pub summaries: Arc<dyn SummaryProvider>,
    pub sync: CloudSync,
    pub clock: Arc<dyn Clock>,
}

impl AppServices {
    pub fn offline() -> Self {
        Self {
            client: build_client(),
            summaries: Arc::new(NoSummaries),
            sync: CloudSync::disabled(),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct App {
    pub db: Database,
    pub config: Config,
    pub deck: DeckStateMachine,
    pub gesture: SwipeGestureEngine,
    pub highlights: HighlightStore,
    pub articles: ArticleFetcher,
    pub summaries: SummaryFetcher,
    pub sync: CloudSync,
    pub clock: Arc<dyn Clock>,
    pub card: Option<Card>,
    /// Bumped every time a card is shown.
    pub card_generation: u64,
    /// Bumped every time a snap-back starts.
    snap_back_seq: u64,
    event_tx: mpsc::Sender<AppEvent>,
}

impl App {
    /// Load posts, caches and highlights from `db` and start on the inbox deck.
    ///
    /// No card is shown until [`App::show_current_card`] or
    /// [`App::switch_deck`] is called.
    ///
    /// # Errors
    ///
    /// Fails if `config.api_base_url` is invalid or insecure, or if the posts
    /// table cannot be read. Unreadable caches and highlights start empty
    /// instead.
    pub async fn load(
        db: Database,
        config: Config,
        services: AppServices,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Result<Self> {
        let policy = config.cache_policy();
        let article_cache = LocalCache::load(
            db.clone(),
            ARTICLE_CACHE_KEY,
            policy,
            Arc::clone(&services.clock),
        )
        .await;
        let summary_cache = LocalCache::load(
            db.clone(),
            SUMMARY_CACHE_KEY,
            policy,
            Arc::clone(&services.clock),
        )
        .await;

        let articles = ArticleFetcher::new(
            services.client,
            &config.api_base_url,
            Arc::new(Mutex::new(article_cache)),
        )
        .context("Invalid api_base_url")?;
        let summaries = SummaryFetcher::new(services.summaries, Arc::new(Mutex::new(summary_cache)));

        let highlights = HighlightStore::load(
            db.clone(),
            Arc::clone(&services.clock),
            services.sync.clone(),
        )
        .await;

        let posts = db.get_posts().await.context("Failed to load posts")?;
        let mut deck = DeckStateMachine::new(posts);
        deck.set_highlighted(highlights.highlighted_articles());
        deck.reload();

        tracing::info!(
            posts = deck.posts().len(),
            cloud = services.sync.is_enabled(),
            "App loaded"
        );

        Ok(Self {
            gesture: SwipeGestureEngine::new(config.gesture_config()),
            db,
            config,
            deck,
            highlights,
            articles,
            summaries,
            sync: services.sync,
            clock: services.clock,
            card: None,
            card_generation: 0,
            snap_back_seq: 0,
            event_tx,
        })
    }

    pub fn counts(&self) -> DeckCounts {
        self.deck.counts()
    }

    /// Make `deck` active and show its first card (swipe decks only).
    pub fn switch_deck(&mut self, deck: Deck) -> Option<&Card> {
        self.deck.set_highlighted(self.highlights.highlighted_articles());
        self.deck.switch_deck(deck);
        self.show_current_card()
    }

    /// Show the deck's current post as a fresh card and start loading its
    /// body and summary concurrently. Any older card's results become stale.
    pub fn show_current_card(&mut self) -> Option<&Card> {
        self.card_generation += 1;
        let generation = self.card_generation;

        let Some(link) = self.deck.current().map(|p| p.link.clone()) else {
            tracing::debug!(deck = %self.deck.active_deck(), "Deck is empty");
            self.card = None;
            return None;
        };

        tasks::spawn_article_load(
            link.clone(),
            generation,
            self.articles.clone(),
            self.event_tx.clone(),
        );
        tasks::spawn_summary_load(
            link.clone(),
            generation,
            self.summaries.clone(),
            self.event_tx.clone(),
        );
        if let Some(next) = self.deck.peek_next() {
            tasks::spawn_prefetch(next.link.clone(), self.articles.clone());
        }

        tracing::debug!(link = %link, generation, "Showing card");
        self.card = Some(Card::loading(link, generation));
        self.card.as_ref()
    }

    // ========================================================================
    // Gestures
    // ========================================================================

    pub fn pointer_down(&mut self, x: f64, y: f64) -> bool {
        self.card.is_some() && self.gesture.pointer_down(x, y)
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<Feedback> {
        self.gesture.pointer_move(x, y)
    }

    pub async fn pointer_up(&mut self, x: f64, y: f64) -> PointerEffect {
        match self.gesture.pointer_up(x, y) {
            None => PointerEffect::None,
            Some(GestureOutcome::Tap) => match &self.card {
                Some(card) => PointerEffect::OpenReader(card.link.clone()),
                None => PointerEffect::None,
            },
            Some(GestureOutcome::Commit(direction)) => {
                PointerEffect::Committed(self.commit(direction).await)
            }
            Some(outcome @ GestureOutcome::SnapBack) => {
                self.start_snap_back(outcome);
                PointerEffect::SnapBack
            }
        }
    }

    pub fn pointer_cancel(&mut self) -> bool {
        if self.gesture.pointer_cancel() {
            self.start_snap_back(GestureOutcome::SnapBack);
            true
        } else {
            false
        }
    }

    /// Swipe without a drag (button or keyboard). `None` when refused or
    /// when the swipe changed nothing.
    pub async fn swipe(&mut self, direction: SwipeDirection) -> Option<Transition> {
        if self.card.is_none() || !self.gesture.begin_commit(direction) {
            return None;
        }
        self.commit(direction).await
    }

    fn start_snap_back(&mut self, outcome: GestureOutcome) {
        self.snap_back_seq += 1;
        if let Some(delay) = self.gesture.animation_duration(outcome) {
            tasks::spawn_animation_timer(
                delay,
                AppEvent::SnapBackFinished {
                    seq: self.snap_back_seq,
                },
                self.event_tx.clone(),
            );
        }
    }

    /// Apply the swipe to the current card and start its exit animation.
    /// The status changes now; the next card shows when the animation ends.
    async fn commit(&mut self, direction: SwipeDirection) -> Option<Transition> {
        let Some(link) = self.card.as_ref().map(|c| c.link.clone()) else {
            self.gesture.animation_finished();
            return None;
        };

        let transition = self.deck.apply_swipe(&link, direction);
        if let Some(transition) = &transition {
            self.record_transition(transition).await;
        }

        let delay = self
            .gesture
            .animation_duration(GestureOutcome::Commit(direction))
            .unwrap_or_default();
        tasks::spawn_animation_timer(
            delay,
            AppEvent::CardExitFinished {
                generation: self.card_generation,
            },
            self.event_tx.clone(),
        );
        transition
    }

    /// Persist and mirror a status change. Failures are logged; the
    /// in-memory state stays authoritative for this session.
    async fn record_transition(&self, transition: &Transition) {
        let updated_at = self.clock.now_ms();
        tracing::info!(
            link = %transition.link,
            from = %transition.from,
            to = %transition.to,
            "Status changed"
        );
        if let Err(e) = self
            .db
            .set_post_status(&transition.link, transition.to, updated_at)
            .await
        {
            tracing::warn!(link = %transition.link, error = %e, "Failed to persist status");
        }
        self.sync
            .mirror_status(&transition.link, transition.to, updated_at);
    }

    // ========================================================================
    // Explicit actions
    // ========================================================================

    pub async fn favorite(&mut self, link: &str) -> Option<Transition> {
        let transition = self.deck.mark_as_favorite(link)?;
        self.record_transition(&transition).await;
        Some(transition)
    }

    pub async fn add_highlight(
        &mut self,
        article_url: &str,
        text: &str,
        position: u64,
    ) -> Result<Highlight, StorageError> {
        let highlight = self.highlights.add(article_url, text, position).await?;
        self.deck
            .set_highlighted(self.highlights.highlighted_articles());
        Ok(highlight)
    }

    pub async fn remove_highlight(
        &mut self,
        article_url: &str,
        position: u64,
    ) -> Result<Option<Highlight>, StorageError> {
        let removed = self.highlights.remove(article_url, position).await?;
        self.deck
            .set_highlighted(self.highlights.highlighted_articles());
        Ok(removed)
    }

    /// Parse a feed document and add its new posts to the inbox.
    /// Returns the number of posts added.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not RSS/Atom or the posts cannot
    /// be stored.
    pub async fn ingest_feed(&mut self, bytes: &[u8], blog_name: &str) -> Result<usize> {
        let posts = crate::feed::parse_feed(bytes, blog_name)?;
        let inserted = self.db.upsert_posts(&posts).await?;
        self.deck.replace_posts(self.db.get_posts().await?);
        tracing::info!(blog = blog_name, parsed = posts.len(), inserted, "Ingested feed");
        Ok(inserted)
    }

    /// Merge cloud highlights and apply newer cloud statuses.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] when signed out. A status that fails
    /// to apply locally is logged and skipped.
    pub async fn pull_from_cloud(&mut self) -> Result<PullReport, SyncError> {
        let highlights = self.highlights.merge_from_cloud().await?;

        let mut statuses_applied = 0;
        for remote in self.sync.pull_classifications().await? {
            match self
                .db
                .apply_remote_status(&remote.link, remote.status, remote.updated_at)
                .await
            {
                Ok(true) => {
                    self.deck.apply_remote_status(&remote.link, remote.status);
                    statuses_applied += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(link = %remote.link, error = %e, "Failed to apply remote status");
                }
            }
        }

        self.deck
            .set_highlighted(self.highlights.highlighted_articles());
        tracing::info!(statuses_applied, "Pulled classifications");
        Ok(PullReport {
            highlights,
            statuses_applied,
        })
    }

    /// Open the original article in the system browser.
    pub fn open_original(&self, link: &str) -> Result<()> {
        let url = validate_url_for_open(link).context("Refusing to open URL")?;
        open::that(url.as_str()).with_context(|| format!("Failed to open {url}"))?;
        Ok(())
    }
}
